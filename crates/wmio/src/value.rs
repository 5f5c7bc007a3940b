//! CIM types and values
//!
//! Fixed-size values sit directly in a value-table slot. Strings, embedded
//! objects and arrays take a 4-byte heap reference instead:
//!
//! ```text
//! string:  HeapRef -> EncodedString
//! object:  HeapRef -> length u32, object block
//! array:   HeapRef -> count u32, count x slot of the element type
//! ```
//!
//! Booleans take two bytes, `0xFFFF` for true.

use crate::heap::{Heap, HeapWriter};
use crate::object::ManagementObject;
use crate::wire::{nested, scratch, take, wire_len};
use midl_ndr::{ArmTable, NdrError, NdrReader, NdrWriter, Result};
use std::fmt;

pub const CIM_SINT16: u32 = 2;
pub const CIM_SINT32: u32 = 3;
pub const CIM_REAL32: u32 = 4;
pub const CIM_REAL64: u32 = 5;
pub const CIM_STRING: u32 = 8;
pub const CIM_BOOLEAN: u32 = 11;
pub const CIM_OBJECT: u32 = 13;
pub const CIM_SINT8: u32 = 16;
pub const CIM_UINT8: u32 = 17;
pub const CIM_UINT16: u32 = 18;
pub const CIM_UINT32: u32 = 19;
pub const CIM_SINT64: u32 = 20;
pub const CIM_UINT64: u32 = 21;
pub const CIM_DATETIME: u32 = 101;
pub const CIM_REFERENCE: u32 = 102;
pub const CIM_CHAR16: u32 = 103;

/// Modifier: the value is an array of the base type
pub const CIM_ARRAY: u32 = 0x2000;
/// Modifier on a property type: declared by a parent class
pub const CIM_INHERITED: u32 = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Sint8,
    Uint8,
    Sint16,
    Uint16,
    Sint32,
    Uint32,
    Sint64,
    Uint64,
    Real32,
    Real64,
    Boolean,
    Char16,
    String,
    DateTime,
    Reference,
    Object,
}

const CIM_KINDS: ArmTable<Kind> = ArmTable::new(
    "CIM type",
    &[
        (CIM_SINT8, Kind::Sint8),
        (CIM_UINT8, Kind::Uint8),
        (CIM_SINT16, Kind::Sint16),
        (CIM_UINT16, Kind::Uint16),
        (CIM_SINT32, Kind::Sint32),
        (CIM_UINT32, Kind::Uint32),
        (CIM_SINT64, Kind::Sint64),
        (CIM_UINT64, Kind::Uint64),
        (CIM_REAL32, Kind::Real32),
        (CIM_REAL64, Kind::Real64),
        (CIM_BOOLEAN, Kind::Boolean),
        (CIM_CHAR16, Kind::Char16),
        (CIM_STRING, Kind::String),
        (CIM_DATETIME, Kind::DateTime),
        (CIM_REFERENCE, Kind::Reference),
        (CIM_OBJECT, Kind::Object),
    ],
    None,
);

impl Kind {
    fn slot_size(self) -> usize {
        match self {
            Kind::Sint8 | Kind::Uint8 => 1,
            Kind::Sint16 | Kind::Uint16 | Kind::Boolean | Kind::Char16 => 2,
            Kind::Sint64 | Kind::Uint64 | Kind::Real64 => 8,
            _ => 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Sint8 => "sint8",
            Kind::Uint8 => "uint8",
            Kind::Sint16 => "sint16",
            Kind::Uint16 => "uint16",
            Kind::Sint32 => "sint32",
            Kind::Uint32 => "uint32",
            Kind::Sint64 => "sint64",
            Kind::Uint64 => "uint64",
            Kind::Real32 => "real32",
            Kind::Real64 => "real64",
            Kind::Boolean => "boolean",
            Kind::Char16 => "char16",
            Kind::String => "string",
            Kind::DateTime => "datetime",
            Kind::Reference => "ref",
            Kind::Object => "object",
        }
    }
}

/// CIM type tag: base type plus the array modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CimType(pub u32);

impl CimType {
    pub const SINT8: Self = Self(CIM_SINT8);
    pub const UINT8: Self = Self(CIM_UINT8);
    pub const SINT16: Self = Self(CIM_SINT16);
    pub const UINT16: Self = Self(CIM_UINT16);
    pub const SINT32: Self = Self(CIM_SINT32);
    pub const UINT32: Self = Self(CIM_UINT32);
    pub const SINT64: Self = Self(CIM_SINT64);
    pub const UINT64: Self = Self(CIM_UINT64);
    pub const REAL32: Self = Self(CIM_REAL32);
    pub const REAL64: Self = Self(CIM_REAL64);
    pub const BOOLEAN: Self = Self(CIM_BOOLEAN);
    pub const CHAR16: Self = Self(CIM_CHAR16);
    pub const STRING: Self = Self(CIM_STRING);
    pub const DATETIME: Self = Self(CIM_DATETIME);
    pub const REFERENCE: Self = Self(CIM_REFERENCE);
    pub const OBJECT: Self = Self(CIM_OBJECT);

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_array(self) -> bool {
        self.0 & CIM_ARRAY != 0
    }

    pub const fn with_array(self) -> Self {
        Self(self.0 | CIM_ARRAY)
    }

    /// Element type of an array type; the type itself otherwise
    pub const fn element(self) -> Self {
        Self(self.0 & !CIM_ARRAY)
    }

    fn kind(self) -> Result<Kind> {
        CIM_KINDS.select(self.element().0)
    }

    /// Bytes a value of this type takes in a value table
    pub fn slot_size(self) -> Result<usize> {
        if self.is_array() {
            self.kind()?;
            return Ok(4);
        }
        Ok(self.kind()?.slot_size())
    }
}

impl fmt::Display for CimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Ok(kind) => f.write_str(kind.name())?,
            Err(_) => write!(f, "cimtype({:#x})", self.element().0)?,
        }
        if self.is_array() {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// A typed CIM value
#[derive(Debug, Clone, PartialEq)]
pub enum CimValue {
    Sint8(i8),
    Uint8(u8),
    Sint16(i16),
    Uint16(u16),
    Sint32(i32),
    Uint32(u32),
    Sint64(i64),
    Uint64(u64),
    Real32(f32),
    Real64(f64),
    Boolean(bool),
    Char16(u16),
    String(String),
    /// DMTF datetime or interval string
    DateTime(String),
    /// Object path
    Reference(String),
    Object(Box<ManagementObject>),
    /// Items of one scalar type
    Array(Vec<CimValue>),
}

impl CimValue {
    fn kind(&self) -> Option<Kind> {
        Some(match self {
            CimValue::Sint8(_) => Kind::Sint8,
            CimValue::Uint8(_) => Kind::Uint8,
            CimValue::Sint16(_) => Kind::Sint16,
            CimValue::Uint16(_) => Kind::Uint16,
            CimValue::Sint32(_) => Kind::Sint32,
            CimValue::Uint32(_) => Kind::Uint32,
            CimValue::Sint64(_) => Kind::Sint64,
            CimValue::Uint64(_) => Kind::Uint64,
            CimValue::Real32(_) => Kind::Real32,
            CimValue::Real64(_) => Kind::Real64,
            CimValue::Boolean(_) => Kind::Boolean,
            CimValue::Char16(_) => Kind::Char16,
            CimValue::String(_) => Kind::String,
            CimValue::DateTime(_) => Kind::DateTime,
            CimValue::Reference(_) => Kind::Reference,
            CimValue::Object(_) => Kind::Object,
            CimValue::Array(_) => return None,
        })
    }

    /// Type implied by the value; `None` for an empty or mixed array
    pub fn natural_type(&self) -> Option<CimType> {
        match self {
            CimValue::Array(items) => {
                let first = items.first()?.kind()?;
                if !items.iter().all(|item| item.kind() == Some(first)) {
                    return None;
                }
                CIM_KINDS.discriminant_of(first).map(|raw| CimType(raw).with_array())
            }
            scalar => CIM_KINDS.discriminant_of(scalar.kind()?).map(CimType),
        }
    }

    /// Whether the value can be stored as `cim_type`
    pub fn fits(&self, cim_type: CimType) -> bool {
        let Ok(kind) = cim_type.kind() else {
            return false;
        };
        match self {
            CimValue::Array(items) => cim_type.is_array() && items.iter().all(|item| item.kind() == Some(kind)),
            scalar => !cim_type.is_array() && scalar.kind() == Some(kind),
        }
    }

    /// Text of a string, datetime or reference value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CimValue::String(s) | CimValue::DateTime(s) | CimValue::Reference(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CimValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ManagementObject> {
        match self {
            CimValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short name of the value's type, for messages
    pub fn kind_name(&self) -> &'static str {
        self.kind().map_or("array", Kind::name)
    }
}

macro_rules! cim_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for CimValue {
                fn from(v: $ty) -> Self {
                    CimValue::$variant(v.into())
                }
            }
        )*
    };
}

cim_from!(
    i8 => Sint8,
    u8 => Uint8,
    i16 => Sint16,
    u16 => Uint16,
    i32 => Sint32,
    u32 => Uint32,
    i64 => Sint64,
    u64 => Uint64,
    f32 => Real32,
    f64 => Real64,
    bool => Boolean,
    String => String,
    &str => String,
);

impl From<ManagementObject> for CimValue {
    fn from(obj: ManagementObject) -> Self {
        CimValue::Object(Box::new(obj))
    }
}

impl<T: Into<CimValue>> From<Vec<T>> for CimValue {
    fn from(items: Vec<T>) -> Self {
        CimValue::Array(items.into_iter().map(Into::into).collect())
    }
}

/// State of a property slot
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    /// A value stored in this object
    Value(CimValue),
    /// Explicitly NULL
    Null,
    /// Not stored here; the class default applies
    #[default]
    Default,
}

impl PropertyValue {
    pub fn value(&self) -> Option<&CimValue> {
        match self {
            PropertyValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<CimValue> for PropertyValue {
    fn from(v: CimValue) -> Self {
        PropertyValue::Value(v)
    }
}

/// Read the slot of a `cim_type` value
pub(crate) fn read_value(r: &mut NdrReader<'_>, cim_type: CimType, heap: &Heap<'_>) -> Result<CimValue> {
    let kind = cim_type.kind()?;
    if !cim_type.is_array() {
        return read_scalar(r, kind, heap);
    }
    let mut items = heap.at("array", r.read_u32_unaligned()?)?;
    let count = items.read_u32_unaligned()? as usize;
    let count = items.check_count("array items", count, kind.slot_size())?;
    let values = (0..count)
        .map(|_| read_scalar(&mut items, kind, heap))
        .collect::<Result<_>>()?;
    Ok(CimValue::Array(values))
}

fn read_scalar(r: &mut NdrReader<'_>, kind: Kind, heap: &Heap<'_>) -> Result<CimValue> {
    Ok(match kind {
        Kind::Sint8 => CimValue::Sint8(r.read_i8()?),
        Kind::Uint8 => CimValue::Uint8(r.read_u8()?),
        Kind::Sint16 => CimValue::Sint16(r.read_u16_unaligned()? as i16),
        Kind::Uint16 => CimValue::Uint16(r.read_u16_unaligned()?),
        Kind::Sint32 => CimValue::Sint32(r.read_u32_unaligned()? as i32),
        Kind::Uint32 => CimValue::Uint32(r.read_u32_unaligned()?),
        Kind::Sint64 => CimValue::Sint64(r.read_u64_unaligned()? as i64),
        Kind::Uint64 => CimValue::Uint64(r.read_u64_unaligned()?),
        Kind::Real32 => CimValue::Real32(f32::from_bits(r.read_u32_unaligned()?)),
        Kind::Real64 => CimValue::Real64(f64::from_bits(r.read_u64_unaligned()?)),
        Kind::Boolean => CimValue::Boolean(r.read_u16_unaligned()? != 0),
        Kind::Char16 => CimValue::Char16(r.read_u16_unaligned()?),
        Kind::String => CimValue::String(heap.string(r.read_u32_unaligned()?)?),
        Kind::DateTime => CimValue::DateTime(heap.string(r.read_u32_unaligned()?)?),
        Kind::Reference => CimValue::Reference(heap.string(r.read_u32_unaligned()?)?),
        Kind::Object => {
            let mut obj = heap.at("embedded object", r.read_u32_unaligned()?)?;
            let len = obj.read_u32_unaligned()?;
            let block = take(&mut obj, "embedded object", len)?;
            let depth = nested(&heap.context(), heap.depth())?;
            CimValue::Object(Box::new(ManagementObject::decode_block(block, heap.context(), depth)?))
        }
    })
}

/// Write the slot of a `cim_type` value, placing referenced data on `heap`
pub(crate) fn write_value(w: &mut NdrWriter, cim_type: CimType, value: &CimValue, heap: &mut HeapWriter) -> Result<()> {
    if !value.fits(cim_type) {
        return Err(NdrError::violation(format!(
            "{} value does not fit {cim_type}",
            value.kind_name()
        )));
    }
    match value {
        CimValue::Array(items) => {
            let mut block = scratch();
            block.write_u32_unaligned(wire_len("array items", items.len())?);
            for item in items {
                write_scalar(&mut block, item, heap)?;
            }
            let href = heap.bytes(block.as_slice())?;
            w.write_u32_unaligned(href);
            Ok(())
        }
        scalar => write_scalar(w, scalar, heap),
    }
}

fn write_scalar(w: &mut NdrWriter, value: &CimValue, heap: &mut HeapWriter) -> Result<()> {
    match value {
        CimValue::Sint8(v) => w.write_i8(*v),
        CimValue::Uint8(v) => w.write_u8(*v),
        CimValue::Sint16(v) => w.write_u16_unaligned(*v as u16),
        CimValue::Uint16(v) | CimValue::Char16(v) => w.write_u16_unaligned(*v),
        CimValue::Sint32(v) => w.write_u32_unaligned(*v as u32),
        CimValue::Uint32(v) => w.write_u32_unaligned(*v),
        CimValue::Sint64(v) => w.write_u64_unaligned(*v as u64),
        CimValue::Uint64(v) => w.write_u64_unaligned(*v),
        CimValue::Real32(v) => w.write_u32_unaligned(v.to_bits()),
        CimValue::Real64(v) => w.write_u64_unaligned(v.to_bits()),
        CimValue::Boolean(v) => w.write_u16_unaligned(if *v { 0xFFFF } else { 0 }),
        CimValue::String(s) | CimValue::DateTime(s) | CimValue::Reference(s) => {
            let href = heap.string(s)?;
            w.write_u32_unaligned(href);
        }
        CimValue::Object(obj) => {
            let block = obj.encode_block()?;
            let mut framed = scratch();
            framed.write_u32_unaligned(wire_len("embedded object", block.len())?);
            framed.write_bytes(&block);
            let href = heap.bytes(framed.as_slice())?;
            w.write_u32_unaligned(href);
        }
        CimValue::Array(_) => return Err(NdrError::violation("arrays of arrays have no encoding")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use midl_ndr::NdrContext;

    fn roundtrip(cim_type: CimType, value: &CimValue) -> (Vec<u8>, CimValue) {
        let mut heap = HeapWriter::new();
        let mut slot = scratch();
        write_value(&mut slot, cim_type, value, &mut heap).unwrap();
        let mut framed = scratch();
        heap.finish(&mut framed).unwrap();
        let framed = framed.into_bytes();
        let mut r = NdrReader::new(&framed, NdrContext::new());
        let heap = Heap::read(&mut r, 0).unwrap();

        let slot = slot.into_bytes().to_vec();
        let decoded = read_value(&mut NdrReader::new(&slot, NdrContext::new()), cim_type, &heap).unwrap();
        (slot, decoded)
    }

    #[test]
    fn test_slot_sizes() {
        assert_eq!(CimType::UINT8.slot_size().unwrap(), 1);
        assert_eq!(CimType::BOOLEAN.slot_size().unwrap(), 2);
        assert_eq!(CimType::REAL64.slot_size().unwrap(), 8);
        assert_eq!(CimType::STRING.slot_size().unwrap(), 4);
        assert_eq!(CimType::UINT64.with_array().slot_size().unwrap(), 4);
        assert!(CimType(0x1F).slot_size().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_display() {
        assert_eq!(CimType::UINT32.to_string(), "uint32");
        assert_eq!(CimType::STRING.with_array().to_string(), "string[]");
        assert_eq!(CimType(0x1F).to_string(), "cimtype(0x1f)");
    }

    #[test]
    fn test_scalar_slots() {
        let (slot, decoded) = roundtrip(CimType::SINT16, &CimValue::Sint16(-2));
        assert_eq!(slot, [0xFE, 0xFF]);
        assert_eq!(decoded, CimValue::Sint16(-2));

        let (slot, decoded) = roundtrip(CimType::BOOLEAN, &CimValue::Boolean(true));
        assert_eq!(slot, [0xFF, 0xFF]);
        assert_eq!(decoded, CimValue::Boolean(true));

        let (slot, _) = roundtrip(CimType::UINT64, &CimValue::Uint64(1 << 40));
        assert_eq!(slot.len(), 8);

        let (slot, decoded) = roundtrip(CimType::STRING, &CimValue::from("svchost.exe"));
        assert_eq!(slot, [0, 0, 0, 0]);
        assert_eq!(decoded.as_str(), Some("svchost.exe"));
    }

    #[test]
    fn test_string_values_never_use_the_dictionary() {
        let (slot, decoded) = roundtrip(CimType::STRING, &CimValue::from("key"));
        assert_eq!(slot, [0, 0, 0, 0]);
        assert_eq!(decoded, CimValue::from("key"));
    }

    #[test]
    fn test_arrays() {
        let value = CimValue::from(vec!["a", "bc"]);
        assert_eq!(value.natural_type(), Some(CimType::STRING.with_array()));
        let (_, decoded) = roundtrip(CimType::STRING.with_array(), &value);
        assert_eq!(decoded, value);

        let value = CimValue::from(vec![1u16, 2, 3]);
        let (_, decoded) = roundtrip(CimType::UINT16.with_array(), &value);
        assert_eq!(decoded, value);

        let empty = CimValue::Array(Vec::new());
        assert_eq!(empty.natural_type(), None);
        let (_, decoded) = roundtrip(CimType::DATETIME.with_array(), &empty);
        assert_eq!(decoded, empty);
    }

    #[test]
    fn test_type_mismatch() {
        let mut heap = HeapWriter::new();
        let mut w = scratch();
        let err = write_value(&mut w, CimType::UINT32, &CimValue::Sint32(1), &mut heap).unwrap_err();
        assert!(matches!(err, NdrError::ProtocolViolation(_)));
        assert!(!CimValue::from(vec![1u8]).fits(CimType::UINT8));
        assert!(!CimValue::Uint8(1).fits(CimType::UINT8.with_array()));
        assert!(CimValue::Array(vec![CimValue::Uint8(1), CimValue::Sint8(1)]).natural_type().is_none());
    }

    #[test]
    fn test_array_count_beyond_heap() {
        // heap: count 0x10000 and nothing after it
        let heap_bytes = [4, 0, 0, 0x80, 0, 0, 1, 0];
        let mut r = NdrReader::new(&heap_bytes, NdrContext::new());
        let heap = Heap::read(&mut r, 0).unwrap();
        let slot = [0u8; 4];
        let err = read_value(&mut NdrReader::new(&slot, NdrContext::new()), CimType::UINT32.with_array(), &heap)
            .unwrap_err();
        assert!(matches!(err, NdrError::MalformedLength { .. }));
    }
}
