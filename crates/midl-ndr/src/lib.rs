//! NDR (Network Data Representation) runtime library
//!
//! This crate provides the wire codec for DCE RPC payloads, implementing the
//! NDR transfer syntax as specified in DCE RPC and MS-RPCE.
//!
//! # NDR Wire Format
//!
//! NDR is the standard encoding for DCE RPC data. Key characteristics:
//! - Primitives align to their natural size (1, 2, 4, or 8 bytes), measured
//!   from the start of the message
//! - Structures align to their largest member
//! - Conformant data (arrays with runtime-determined size) comes at the end
//! - Strings are conformant varying arrays with null terminator
//! - Pointees are deferred until after the inline part of the enclosing
//!   structure, depth first
//!
//! # Example
//!
//! ```
//! use midl_ndr::{decode, encode, NdrContext, UniquePtr};
//!
//! let value = (7u32, UniquePtr::new(42u16));
//! let bytes = encode(&value, NdrContext::new()).unwrap();
//! let decoded: (u32, UniquePtr<u16>) = decode(&bytes, NdrContext::new()).unwrap();
//! assert_eq!(decoded, value);
//! ```

mod arrays;
mod context;
mod decode;
mod encode;
mod error;
mod pointers;
mod primitives;
mod referent;
mod strings;
mod unions;

pub use arrays::{
    read_conformance, read_elements, read_elements_deferred, reconcile_count, write_conformance, write_elements,
    write_elements_deferred, ConformantArray, ConformantMatrix, ConformantVaryingArray, FixedArray, VaryingArray,
};
pub use context::{NdrContext, NdrLimits, DEFAULT_MAX_ALLOCATION, DEFAULT_MAX_DEPTH, DEFAULT_MAX_ELEMENTS};
pub use decode::{decode, decode_at, NdrDecode, NdrReader};
pub use encode::{encode, NdrEncode, NdrWriter};
pub use error::{NdrError, Result};
pub use pointers::{
    read_pointee, read_ref_referent, read_unique_referent, write_referent, EmbeddedRef, FullPtr, NdrPtr, RefPtr, UniquePtr,
};
pub use primitives::NdrUuid;
pub use referent::FIRST_REFERENT_ID;
pub use strings::{decode_utf16, read_utf16_units, write_utf16_units, NdrString, NdrWString};
pub use unions::{decode_union, encode_union, ArmTable, Encapsulated, NdrUnion};

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
