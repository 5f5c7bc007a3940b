//! VARTYPE tags
//!
//! A VARTYPE is a 12-bit base type plus independent modifier bits. Only the
//! base types that can appear in a wire VARIANT or SAFEARRAY have codecs; the
//! rest are named for diagnostics.

use std::fmt;

pub const VT_EMPTY: u16 = 0x0000;
pub const VT_NULL: u16 = 0x0001;
pub const VT_I2: u16 = 0x0002;
pub const VT_I4: u16 = 0x0003;
pub const VT_R4: u16 = 0x0004;
pub const VT_R8: u16 = 0x0005;
pub const VT_CY: u16 = 0x0006;
pub const VT_DATE: u16 = 0x0007;
pub const VT_BSTR: u16 = 0x0008;
pub const VT_DISPATCH: u16 = 0x0009;
pub const VT_ERROR: u16 = 0x000A;
pub const VT_BOOL: u16 = 0x000B;
pub const VT_VARIANT: u16 = 0x000C;
pub const VT_UNKNOWN: u16 = 0x000D;
pub const VT_DECIMAL: u16 = 0x000E;
pub const VT_I1: u16 = 0x0010;
pub const VT_UI1: u16 = 0x0011;
pub const VT_UI2: u16 = 0x0012;
pub const VT_UI4: u16 = 0x0013;
pub const VT_I8: u16 = 0x0014;
pub const VT_UI8: u16 = 0x0015;
pub const VT_INT: u16 = 0x0016;
pub const VT_UINT: u16 = 0x0017;
pub const VT_VOID: u16 = 0x0018;
pub const VT_HRESULT: u16 = 0x0019;
pub const VT_PTR: u16 = 0x001A;
pub const VT_SAFEARRAY: u16 = 0x001B;
pub const VT_CARRAY: u16 = 0x001C;
pub const VT_USERDEFINED: u16 = 0x001D;
pub const VT_LPSTR: u16 = 0x001E;
pub const VT_LPWSTR: u16 = 0x001F;
pub const VT_RECORD: u16 = 0x0024;
pub const VT_INT_PTR: u16 = 0x0025;
pub const VT_UINT_PTR: u16 = 0x0026;
pub const VT_FILETIME: u16 = 0x0040;
pub const VT_BLOB: u16 = 0x0041;
pub const VT_STREAM: u16 = 0x0042;
pub const VT_STORAGE: u16 = 0x0043;
pub const VT_STREAMED_OBJECT: u16 = 0x0044;
pub const VT_STORED_OBJECT: u16 = 0x0045;
pub const VT_BLOB_OBJECT: u16 = 0x0046;
pub const VT_CF: u16 = 0x0047;
pub const VT_CLSID: u16 = 0x0048;

/// Modifier: the value is a SAFEARRAY of the base type
pub const VT_ARRAY: u16 = 0x2000;
/// Modifier: the value is passed by reference
pub const VT_BYREF: u16 = 0x4000;
/// Mask selecting the base type
pub const VT_TYPEMASK: u16 = 0x0FFF;

static VARTYPE_NAMES: &[(u16, &str)] = &[
    (VT_EMPTY, "VT_EMPTY"),
    (VT_NULL, "VT_NULL"),
    (VT_I2, "VT_I2"),
    (VT_I4, "VT_I4"),
    (VT_R4, "VT_R4"),
    (VT_R8, "VT_R8"),
    (VT_CY, "VT_CY"),
    (VT_DATE, "VT_DATE"),
    (VT_BSTR, "VT_BSTR"),
    (VT_DISPATCH, "VT_DISPATCH"),
    (VT_ERROR, "VT_ERROR"),
    (VT_BOOL, "VT_BOOL"),
    (VT_VARIANT, "VT_VARIANT"),
    (VT_UNKNOWN, "VT_UNKNOWN"),
    (VT_DECIMAL, "VT_DECIMAL"),
    (VT_I1, "VT_I1"),
    (VT_UI1, "VT_UI1"),
    (VT_UI2, "VT_UI2"),
    (VT_UI4, "VT_UI4"),
    (VT_I8, "VT_I8"),
    (VT_UI8, "VT_UI8"),
    (VT_INT, "VT_INT"),
    (VT_UINT, "VT_UINT"),
    (VT_VOID, "VT_VOID"),
    (VT_HRESULT, "VT_HRESULT"),
    (VT_PTR, "VT_PTR"),
    (VT_SAFEARRAY, "VT_SAFEARRAY"),
    (VT_CARRAY, "VT_CARRAY"),
    (VT_USERDEFINED, "VT_USERDEFINED"),
    (VT_LPSTR, "VT_LPSTR"),
    (VT_LPWSTR, "VT_LPWSTR"),
    (VT_RECORD, "VT_RECORD"),
    (VT_INT_PTR, "VT_INT_PTR"),
    (VT_UINT_PTR, "VT_UINT_PTR"),
    (VT_FILETIME, "VT_FILETIME"),
    (VT_BLOB, "VT_BLOB"),
    (VT_STREAM, "VT_STREAM"),
    (VT_STORAGE, "VT_STORAGE"),
    (VT_STREAMED_OBJECT, "VT_STREAMED_OBJECT"),
    (VT_STORED_OBJECT, "VT_STORED_OBJECT"),
    (VT_BLOB_OBJECT, "VT_BLOB_OBJECT"),
    (VT_CF, "VT_CF"),
    (VT_CLSID, "VT_CLSID"),
];

/// Name of a base type, e.g. `VT_I4`
pub fn vartype_name(base: u16) -> Option<&'static str> {
    VARTYPE_NAMES
        .iter()
        .find(|(vt, _)| *vt == base)
        .map(|(_, name)| *name)
}

/// A full VARTYPE tag: base type plus BYREF/ARRAY modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VarType(pub u16);

impl VarType {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Base type without modifiers
    pub const fn base(self) -> u16 {
        self.0 & VT_TYPEMASK
    }

    pub const fn is_byref(self) -> bool {
        self.0 & VT_BYREF != 0
    }

    pub const fn is_array(self) -> bool {
        self.0 & VT_ARRAY != 0
    }

    pub const fn with_byref(self) -> Self {
        Self(self.0 | VT_BYREF)
    }

    pub const fn with_array(self) -> Self {
        Self(self.0 | VT_ARRAY)
    }

    pub const fn without_byref(self) -> Self {
        Self(self.0 & !VT_BYREF)
    }
}

impl From<u16> for VarType {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match vartype_name(self.base()) {
            Some(name) => f.write_str(name)?,
            None => write!(f, "VT_{:#06x}", self.base())?,
        }
        if self.is_array() {
            f.write_str("|VT_ARRAY")?;
        }
        if self.is_byref() {
            f.write_str("|VT_BYREF")?;
        }
        Ok(())
    }
}
