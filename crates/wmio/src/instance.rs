//! Instances decoded against their class
//!
//! ```text
//! encodingLength   u32        # counts itself, up to the end of the heap
//! flags            u8
//! classNameRef     u32
//! ndTable, valueTable         # laid out by the class, value_table_len bytes
//! qualifiers       qualifier set
//! propertyQualifiersFlag u8   # 1: none, 2: one qualifier set per property
//! heap
//! ```

use crate::class::{read_value_table, write_value_table, Property};
use crate::error::{Result as WmioResult, WmioError};
use crate::heap::{Heap, HeapWriter};
use crate::provider::ClassSchema;
use crate::qualifier::{decode_qualifier_set, find_qualifier, read_qualifier_set_raw, write_qualifier_set, Qualifier};
use crate::value::{CimValue, PropertyValue};
use crate::wire::{read_encoded, scratch, take, trailing, write_encoded};
use midl_ndr::{NdrError, NdrReader, NdrWriter, Result};
use std::sync::Arc;
use tracing::debug;

const NO_PROPERTY_QUALIFIERS: u8 = 1;
const PROPERTY_QUALIFIERS: u8 = 2;

/// Property values of one object, interpreted by its class schema
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class: Arc<ClassSchema>,
    flags: u8,
    values: Vec<PropertyValue>,
    qualifiers: Vec<Qualifier>,
    property_qualifiers: Vec<Vec<Qualifier>>,
}

impl Instance {
    /// Instance with every property left at the class default
    pub fn new(class: Arc<ClassSchema>) -> Self {
        let count = class.class().properties().len();
        Self {
            class,
            flags: 0,
            values: vec![PropertyValue::Default; count],
            qualifiers: Vec::new(),
            property_qualifiers: vec![Vec::new(); count],
        }
    }

    pub fn class(&self) -> &Arc<ClassSchema> {
        &self.class
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class.name()
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    fn index(&self, name: &str) -> WmioResult<usize> {
        self.class
            .class()
            .property_index(name)
            .ok_or_else(|| WmioError::UnknownProperty {
                class: self.class_name().unwrap_or_default().to_owned(),
                property: name.to_owned(),
            })
    }

    /// Store a value, checked against the property's declared type
    pub fn set(&mut self, name: &str, value: impl Into<CimValue>) -> WmioResult<()> {
        let index = self.index(name)?;
        let value = value.into();
        let property = &self.class.class().properties()[index];
        if !value.fits(property.cim_type()) {
            return Err(WmioError::TypeMismatch {
                property: property.name().to_owned(),
                expected: property.cim_type(),
            });
        }
        self.values[index] = PropertyValue::Value(value);
        Ok(())
    }

    pub fn with_value(mut self, name: &str, value: impl Into<CimValue>) -> WmioResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn set_null(&mut self, name: &str) -> WmioResult<()> {
        let index = self.index(name)?;
        self.values[index] = PropertyValue::Null;
        Ok(())
    }

    /// Slot state as stored in this instance
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(self.class.class().property_index(name)?)
    }

    /// Effective value: the stored one, else the class default; `None` when NULL
    pub fn value(&self, name: &str) -> Option<&CimValue> {
        let index = self.class.class().property_index(name)?;
        match self.values.get(index)? {
            PropertyValue::Value(v) => Some(v),
            PropertyValue::Null => None,
            PropertyValue::Default => self.class.class().properties().get(index)?.default_value().value(),
        }
    }

    /// Properties of the class paired with this instance's slots
    pub fn properties(&self) -> impl Iterator<Item = (&Property, &PropertyValue)> {
        self.class.class().properties().iter().zip(&self.values)
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn qualifier(&self, name: &str) -> Option<&Qualifier> {
        find_qualifier(&self.qualifiers, name)
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Qualifiers this instance attaches to one of its properties
    pub fn property_qualifiers(&self, name: &str) -> &[Qualifier] {
        self.class
            .class()
            .property_index(name)
            .and_then(|index| self.property_qualifiers.get(index))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn with_property_qualifier(mut self, name: &str, qualifier: Qualifier) -> WmioResult<Self> {
        let index = self.index(name)?;
        self.property_qualifiers[index].push(qualifier);
        Ok(self)
    }

    /// Point the instance at an equivalent schema, e.g. one carrying a class id
    pub(crate) fn rebind(&mut self, class: Arc<ClassSchema>) {
        self.class = class;
    }

    /// Decode the instance part that follows the class part
    pub(crate) fn read(r: &mut NdrReader<'_>, class: Arc<ClassSchema>, depth: usize) -> Result<Self> {
        let body = read_encoded(r, "instance part")?;
        let mut r = NdrReader::new(body, *r.context());
        let flags = r.read_u8()?;
        let name_ref = r.read_u32_unaligned()?;
        let values = take(&mut r, "instance value table", class.class().value_table_len())?;
        let qualifiers = read_qualifier_set_raw(&mut r)?;
        let count = class.class().properties().len();
        let property_qualifiers = match r.read_u8()? {
            NO_PROPERTY_QUALIFIERS => Vec::new(),
            PROPERTY_QUALIFIERS => (0..count)
                .map(|_| read_qualifier_set_raw(&mut r))
                .collect::<Result<Vec<_>>>()?,
            flag => {
                return Err(NdrError::UnsupportedDiscriminant {
                    context: "instance property qualifier flag",
                    value: u32::from(flag),
                })
            }
        };
        let heap = Heap::read(&mut r, depth)?;
        trailing("instance part", &r);

        let name = heap.optional_string(name_ref)?;
        if name.as_deref() != class.name() {
            debug!(instance = ?name, class = ?class.name(), "instance names a different class");
        }
        let values = read_value_table(values, class.class().properties(), &heap)?;
        let property_qualifiers = if property_qualifiers.is_empty() {
            vec![Vec::new(); count]
        } else {
            property_qualifiers
                .into_iter()
                .map(|set| decode_qualifier_set(set, &heap))
                .collect::<Result<_>>()?
        };
        Ok(Self {
            class,
            flags,
            values,
            qualifiers: decode_qualifier_set(qualifiers, &heap)?,
            property_qualifiers,
        })
    }

    pub(crate) fn write(&self, w: &mut NdrWriter) -> Result<()> {
        let class = self.class.class();
        let mut heap = HeapWriter::new();
        let mut body = scratch();
        body.write_u8(self.flags);
        let name_ref = heap.optional_name(class.name())?;
        body.write_u32_unaligned(name_ref);
        let values: Vec<&PropertyValue> = self.values.iter().collect();
        write_value_table(&mut body, class, &values, &mut heap)?;
        write_qualifier_set(&mut body, &self.qualifiers, &mut heap)?;
        if self.property_qualifiers.iter().all(Vec::is_empty) {
            body.write_u8(NO_PROPERTY_QUALIFIERS);
        } else {
            body.write_u8(PROPERTY_QUALIFIERS);
            for set in &self.property_qualifiers {
                write_qualifier_set(&mut body, set, &mut heap)?;
            }
        }
        heap.finish(&mut body)?;
        write_encoded(w, "instance part", body.as_slice())
    }
}
