//! NDR string types
//!
//! NDR strings are conformant varying arrays with a null terminator.
//!
//! Wire format:
//! ```text
//! max_count: u32    # Maximum elements including null
//! offset: u32       # Always 0
//! actual_count: u32 # Actual elements including null
//! chars[actual_count]
//! ```
//!
//! Decoding removes exactly one trailing terminator. Anything before it,
//! including embedded nulls, is kept. A string without one is an
//! `InvalidString`.

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

/// Read the `{max_count, offset, actual_count}` header of a string and
/// validate it for `unit_size`-byte characters.
fn read_string_header(r: &mut NdrReader<'_>, unit_size: usize) -> Result<usize> {
    let max_count = r.read_u32()?;
    let offset = r.read_u32()?;
    let actual_count = r.read_u32()?;

    if offset != 0 {
        return Err(NdrError::violation(format!("string with non-zero offset {offset}")));
    }
    if actual_count > max_count {
        return Err(NdrError::violation(format!(
            "string actual_count {actual_count} exceeds max_count {max_count}"
        )));
    }
    r.check_count("string characters", actual_count as usize, unit_size)
}

fn write_string_header(w: &mut NdrWriter, len_with_null: usize) -> Result<()> {
    let count = u32::try_from(len_with_null).map_err(|_| NdrError::IntegerOverflow("string length"))?;
    w.write_u32(count);
    w.write_u32(0);
    w.write_u32(count);
    Ok(())
}

/// ANSI string type (null-terminated char*)
///
/// Used for [string] annotated char* parameters in MIDL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdrString(pub String);

impl NdrString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for NdrString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NdrString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for NdrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl NdrEncode for NdrString {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let bytes = self.0.as_bytes();
        write_string_header(w, bytes.len() + 1)?;
        w.write_bytes(bytes);
        w.write_u8(0); // Null terminator
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrString {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let actual_count = read_string_header(r, 1)?;
        let mut bytes = r.read_bytes(actual_count)?.to_vec();
        if bytes.pop() != Some(0) {
            return Err(NdrError::InvalidString("missing terminator".into()));
        }

        Ok(Self(String::from_utf8(bytes)?))
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        12
    }
}

/// Unicode string type (null-terminated wchar_t*)
///
/// Used for [string] annotated wchar_t* parameters in MIDL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdrWString(pub String);

impl NdrWString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for NdrWString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NdrWString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for NdrWString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl NdrEncode for NdrWString {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let utf16: Vec<u16> = self.0.encode_utf16().collect();
        write_string_header(w, utf16.len() + 1)?;
        write_utf16_units(w, &utf16);
        w.write_u16(0); // Null terminator
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrWString {
    fn ndr_decode(r: &mut NdrReader<'_>) -> Result<Self> {
        let actual_count = read_string_header(r, 2)?;
        let mut utf16 = read_utf16_units(r, actual_count)?;
        if utf16.pop() != Some(0) {
            return Err(NdrError::InvalidString("missing wide terminator".into()));
        }

        Ok(Self(decode_utf16(utf16)?))
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        12
    }
}

/// Write UTF-16 code units in the context byte order
pub fn write_utf16_units(w: &mut NdrWriter, units: &[u16]) {
    for unit in units {
        w.write_u16(*unit);
    }
}

/// Read `count` UTF-16 code units, validating the count first
pub fn read_utf16_units(r: &mut NdrReader<'_>, count: usize) -> Result<Vec<u16>> {
    r.check_count("UTF-16 units", count, 2)?;
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        units.push(r.read_u16()?);
    }
    Ok(units)
}

/// Convert UTF-16 code units to a `String`
pub fn decode_utf16(units: Vec<u16>) -> Result<String> {
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(NdrError::Utf16Error)
}
