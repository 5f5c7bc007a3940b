//! Qualifiers and qualifier sets
//!
//! ```text
//! encodingLength u32          # counts itself
//! {
//!     nameRef  u32            # heap or dictionary reference
//!     flavor   u8
//!     cimType  u32
//!     value    slot of cimType
//! }*
//! ```

use crate::heap::{Heap, HeapWriter};
use crate::value::{read_value, write_value, CimType, CimValue, CIM_INHERITED};
use crate::wire::{read_encoded, scratch, write_encoded};
use midl_ndr::{NdrError, NdrReader, NdrWriter, Result};
use std::fmt;

/// Qualifier propagation and override flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flavor(pub u8);

impl Flavor {
    pub const PROPAGATE_TO_INSTANCE: Self = Self(0x01);
    pub const PROPAGATE_TO_SUBCLASS: Self = Self(0x02);
    pub const NOT_OVERRIDABLE: Self = Self(0x10);
    pub const ORIGIN_PROPAGATED: Self = Self(0x20);
    pub const ORIGIN_SYSTEM: Self = Self(0x40);
    pub const AMENDED: Self = Self(0x80);

    pub const fn contains(self, other: Flavor) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Flavor) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for Flavor {
    type Output = Flavor;

    fn bitor(self, rhs: Flavor) -> Flavor {
        self.union(rhs)
    }
}

/// MOF flavor keywords
impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Flavor::PROPAGATE_TO_SUBCLASS) {
            f.write_str("tosubclass")?;
        } else {
            f.write_str("restricted")?;
        }
        if self.contains(Flavor::NOT_OVERRIDABLE) {
            f.write_str(" disableoverride")?;
        } else {
            f.write_str(" enableoverride")?;
        }
        if self.contains(Flavor::AMENDED) {
            f.write_str(" translatable")?;
        }
        Ok(())
    }
}

/// Named, typed annotation on a class, property, method or instance
#[derive(Debug, Clone, PartialEq)]
pub struct Qualifier {
    pub name: String,
    pub flavor: Flavor,
    pub cim_type: CimType,
    pub value: CimValue,
}

impl Qualifier {
    /// Qualifier typed by its value; fails for an empty or mixed array
    pub fn new(name: impl Into<String>, flavor: Flavor, value: impl Into<CimValue>) -> Result<Self> {
        let value = value.into();
        let cim_type = value
            .natural_type()
            .ok_or_else(|| NdrError::violation(format!("{} value needs an explicit CIM type", value.kind_name())))?;
        Ok(Self {
            name: name.into(),
            flavor,
            cim_type,
            value,
        })
    }

    /// Qualifier with an explicit type, checked against the value
    pub fn with_type(name: impl Into<String>, flavor: Flavor, cim_type: CimType, value: CimValue) -> Result<Self> {
        if !value.fits(cim_type) {
            return Err(NdrError::violation(format!(
                "{} value does not fit {cim_type}",
                value.kind_name()
            )));
        }
        Ok(Self {
            name: name.into(),
            flavor,
            cim_type,
            value,
        })
    }
}

/// MOF-style rendering, e.g. `key` or `CIMTYPE("uint32")`
impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            CimValue::Boolean(true) => f.write_str(&self.name),
            CimValue::Array(items) => write!(f, "{} {{{} items}}", self.name, items.len()),
            CimValue::String(s) => write!(f, "{}({s:?})", self.name),
            other => write!(f, "{}({other:?})", self.name),
        }
    }
}

/// Find a qualifier by case-insensitive name
pub fn find_qualifier<'a>(qualifiers: &'a [Qualifier], name: &str) -> Option<&'a Qualifier> {
    qualifiers.iter().find(|q| q.name.eq_ignore_ascii_case(name))
}

/// Split off a qualifier set without resolving it
pub(crate) fn read_qualifier_set_raw<'a>(r: &mut NdrReader<'a>) -> Result<&'a [u8]> {
    read_encoded(r, "qualifier set")
}

/// Resolve a qualifier set body against the heap of its part
pub(crate) fn decode_qualifier_set(body: &[u8], heap: &Heap<'_>) -> Result<Vec<Qualifier>> {
    let mut r = NdrReader::new(body, heap.context());
    let mut qualifiers = Vec::new();
    while r.remaining() > 0 {
        let name = heap.string(r.read_u32_unaligned()?)?;
        let flavor = Flavor(r.read_u8()?);
        let cim_type = CimType(r.read_u32_unaligned()? & !CIM_INHERITED);
        let value = read_value(&mut r, cim_type, heap)?;
        qualifiers.push(Qualifier {
            name,
            flavor,
            cim_type,
            value,
        });
    }
    Ok(qualifiers)
}

/// Read a qualifier set whose heap has already been read
pub(crate) fn read_qualifier_set(r: &mut NdrReader<'_>, heap: &Heap<'_>) -> Result<Vec<Qualifier>> {
    decode_qualifier_set(read_qualifier_set_raw(r)?, heap)
}

pub(crate) fn write_qualifier_set(w: &mut NdrWriter, qualifiers: &[Qualifier], heap: &mut HeapWriter) -> Result<()> {
    let mut body = scratch();
    for q in qualifiers {
        let name = heap.name(&q.name)?;
        body.write_u32_unaligned(name);
        body.write_u8(q.flavor.0);
        body.write_u32_unaligned(q.cim_type.raw());
        write_value(&mut body, q.cim_type, &q.value, heap)?;
    }
    write_encoded(w, "qualifier set", body.as_slice())
}
