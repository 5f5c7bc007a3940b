//! OLE Automation types on the NDR wire
//!
//! [`Variant`] and [`SafeArray`] are marshaled the way OLE Automation
//! marshals `wireVARIANT` and `wireSAFEARRAY`. Both are built on the
//! two-phase codec traits of `midl-ndr` and can sit anywhere an NDR value
//! can, including behind pointers and inside arrays.
//!
//! ```
//! use midl_ndr::{decode, encode, NdrContext};
//! use oaut::{Variant, VariantValue};
//!
//! let v = Variant::from(42u32);
//! let bytes = encode(&v, NdrContext::new()).unwrap();
//! assert_eq!(bytes.len(), 16);
//! let back: Variant = decode(&bytes, NdrContext::new()).unwrap();
//! assert_eq!(back.value(), &VariantValue::UI4(42));
//! ```

mod blobs;
mod safearray;
mod variant;
mod vartype;

pub use blobs::{
    Currency, Decimal, InterfacePointer, Record, RecordIdentity, IID_IRECORDINFO, OBJREF_CUSTOM, OBJREF_SIGNATURE,
};
pub use safearray::{
    fadf, is_element_type, SafeArray, SafeArrayBound, SafeArrayData, SF_BSTR, SF_DISPATCH, SF_HAVEIID, SF_I1, SF_I2,
    SF_I4, SF_I8, SF_RECORD, SF_UNKNOWN, SF_VARIANT,
};
pub use variant::{Variant, VariantValue};
pub use vartype::*;
