//! Class definitions
//!
//! A class part describes one class level and carries the default values of
//! its properties:
//!
//! ```text
//! encodingLength u32                  # counts itself
//! reserved       u8
//! classNameRef   u32                  # 0xFFFFFFFF for the empty parent of a root class
//! ndValueLength  u32                  # NdTable + ValueTable
//! derivation     encodingLength u32, { EncodedString, length u32 }*
//! qualifiers     qualifier set
//! propertyCount  u32
//! lookup         propertyCount x { nameRef u32, infoRef u32 }
//! ndTable        2 bits per property  # bit 0 NULL, bit 1 default inherited
//! valueTable     slots at each property's offset
//! heap
//! ```
//!
//! `infoRef` points at the property description in the heap:
//! `cimType u32, order u16, valueOffset u32, classOfOrigin u32, qualifier set`.
//!
//! A full class definition is the parent's class part followed by its
//! methods, then the current class part and its methods.

use crate::heap::{read_encoded_string, write_encoded_string, Heap, HeapWriter, NO_REF};
use crate::object::ManagementObject;
use crate::qualifier::{
    decode_qualifier_set, find_qualifier, read_qualifier_set, read_qualifier_set_raw, write_qualifier_set, Qualifier,
};
use crate::value::{read_value, write_value, CimType, CimValue, PropertyValue, CIM_INHERITED};
use crate::wire::{nested, read_encoded, scratch, take, trailing, wire_len, write_encoded};
use midl_ndr::{NdrContext, NdrError, NdrReader, NdrWriter, Result};
use tracing::trace;

const ND_NULL: u8 = 0x01;
const ND_DEFAULT: u8 = 0x02;

/// One property declaration and its default
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    cim_type: CimType,
    inherited: bool,
    order: u16,
    offset: u32,
    origin: u32,
    qualifiers: Vec<Qualifier>,
    default: PropertyValue,
}

impl Property {
    /// Property with no qualifiers and a NULL default
    pub fn new(name: impl Into<String>, cim_type: CimType) -> Self {
        Self {
            name: name.into(),
            cim_type,
            inherited: false,
            order: 0,
            offset: 0,
            origin: 0,
            qualifiers: Vec::new(),
            default: PropertyValue::Null,
        }
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn with_default(mut self, default: impl Into<CimValue>) -> Self {
        self.default = PropertyValue::Value(default.into());
        self
    }

    /// Mark the property as declared by a parent class
    pub fn inherited(mut self, class_of_origin: u32) -> Self {
        self.inherited = true;
        self.origin = class_of_origin;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cim_type(&self) -> CimType {
        self.cim_type
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    /// Declaration order within the class
    pub fn order(&self) -> u16 {
        self.order
    }

    /// Offset of the property's slot in the value table
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Derivation level that declared the property
    pub fn class_of_origin(&self) -> u32 {
        self.origin
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn qualifier(&self, name: &str) -> Option<&Qualifier> {
        find_qualifier(&self.qualifiers, name)
    }

    /// Default value declared by the class
    pub fn default_value(&self) -> &PropertyValue {
        &self.default
    }

    /// Whether the `key` qualifier marks the property as part of the object path
    pub fn is_key(&self) -> bool {
        self.qualifier("key").is_some_and(|q| q.value == CimValue::Boolean(true))
    }
}

/// One level of a class: name, superclass chain, qualifiers and properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassPart {
    name: Option<String>,
    derivation: Vec<String>,
    qualifiers: Vec<Qualifier>,
    properties: Vec<Property>,
    value_table_len: u32,
}

impl ClassPart {
    /// Lay out a class: properties get their declaration order and value
    /// table offsets in the order given
    pub fn new(
        name: impl Into<String>,
        derivation: Vec<String>,
        qualifiers: Vec<Qualifier>,
        mut properties: Vec<Property>,
    ) -> Result<Self> {
        let mut offset = 0u32;
        for (order, property) in properties.iter_mut().enumerate() {
            property.order = u16::try_from(order).map_err(|_| NdrError::IntegerOverflow("property count"))?;
            property.offset = offset;
            if let PropertyValue::Value(value) = &property.default {
                if !value.fits(property.cim_type) {
                    return Err(NdrError::violation(format!(
                        "default of {} is a {} value, declared {}",
                        property.name,
                        value.kind_name(),
                        property.cim_type
                    )));
                }
            }
            offset = wire_len("value table", property.cim_type.slot_size()?)
                .ok()
                .and_then(|size| offset.checked_add(size))
                .ok_or(NdrError::IntegerOverflow("value table"))?;
        }
        let value_table_len = wire_len("value table", nd_table_len(properties.len()))?
            .checked_add(offset)
            .ok_or(NdrError::IntegerOverflow("value table"))?;
        Ok(Self {
            name: Some(name.into()),
            derivation,
            qualifiers,
            properties,
            value_table_len,
        })
    }

    /// The nameless part standing in for the parent of a root class
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Superclass names, nearest first
    pub fn derivation(&self) -> &[String] {
        &self.derivation
    }

    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub fn qualifier(&self, name: &str) -> Option<&Qualifier> {
        find_qualifier(&self.qualifiers, name)
    }

    /// Properties in value-table order
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Bytes of the NdTable and ValueTable of this class and its instances
    pub fn value_table_len(&self) -> u32 {
        self.value_table_len
    }

    pub(crate) fn read(r: &mut NdrReader<'_>, depth: usize) -> Result<Self> {
        let body = read_encoded(r, "class part")?;
        let mut r = NdrReader::new(body, *r.context());
        let _reserved = r.read_u8()?;
        let name_ref = r.read_u32_unaligned()?;
        let value_table_len = r.read_u32_unaligned()?;

        let derivation = read_derivation(read_encoded(&mut r, "derivation list")?, *r.context())?;
        let qualifiers = read_qualifier_set_raw(&mut r)?;
        let count = r.read_u32_unaligned()? as usize;
        let count = r.check_count("property lookup table", count, 8)?;
        let lookup = take(&mut r, "property lookup table", wire_len("property lookup table", count * 8)?)?;
        let values = take(&mut r, "class value table", value_table_len)?;
        let heap = Heap::read(&mut r, depth)?;
        trailing("class part", &r);

        let mut properties = Vec::with_capacity(count);
        let mut lookup = NdrReader::new(lookup, heap.context());
        for _ in 0..count {
            let name = heap.string(lookup.read_u32_unaligned()?)?;
            let mut info = heap.at("property info", lookup.read_u32_unaligned()?)?;
            let raw_type = info.read_u32_unaligned()?;
            let order = info.read_u16_unaligned()?;
            let offset = info.read_u32_unaligned()?;
            let origin = info.read_u32_unaligned()?;
            let qualifiers = read_qualifier_set(&mut info, &heap)?;
            properties.push(Property {
                name,
                cim_type: CimType(raw_type & !CIM_INHERITED),
                inherited: raw_type & CIM_INHERITED != 0,
                order,
                offset,
                origin,
                qualifiers,
                default: PropertyValue::Null,
            });
        }

        let defaults = read_value_table(values, &properties, &heap)?;
        for (property, default) in properties.iter_mut().zip(defaults) {
            property.default = default;
        }

        let part = Self {
            name: heap.optional_string(name_ref)?,
            derivation,
            qualifiers: decode_qualifier_set(qualifiers, &heap)?,
            properties,
            value_table_len,
        };
        trace!(name = ?part.name, properties = part.properties.len(), "class part");
        Ok(part)
    }

    pub(crate) fn write(&self, w: &mut NdrWriter) -> Result<()> {
        let mut heap = HeapWriter::new();
        let mut body = scratch();
        body.write_u8(0);
        let name_ref = heap.optional_name(self.name.as_deref())?;
        body.write_u32_unaligned(name_ref);
        body.write_u32_unaligned(self.value_table_len);

        let mut derivation = scratch();
        for name in &self.derivation {
            let len = write_encoded_string(&mut derivation, name);
            derivation.write_u32_unaligned(wire_len("derivation entry", len)?);
        }
        write_encoded(&mut body, "derivation list", derivation.as_slice())?;
        write_qualifier_set(&mut body, &self.qualifiers, &mut heap)?;

        body.write_u32_unaligned(wire_len("property count", self.properties.len())?);
        for property in &self.properties {
            let name = heap.name(&property.name)?;
            let mut info = scratch();
            let mut raw_type = property.cim_type.raw();
            if property.inherited {
                raw_type |= CIM_INHERITED;
            }
            info.write_u32_unaligned(raw_type);
            info.write_u16_unaligned(property.order);
            info.write_u32_unaligned(property.offset);
            info.write_u32_unaligned(property.origin);
            write_qualifier_set(&mut info, &property.qualifiers, &mut heap)?;
            let info = heap.bytes(info.as_slice())?;
            body.write_u32_unaligned(name);
            body.write_u32_unaligned(info);
        }

        let defaults: Vec<&PropertyValue> = self.properties.iter().map(|p| &p.default).collect();
        write_value_table(&mut body, self, &defaults, &mut heap)?;
        heap.finish(&mut body)?;
        write_encoded(w, "class part", body.as_slice())
    }
}

fn read_derivation(body: &[u8], ctx: NdrContext) -> Result<Vec<String>> {
    let mut r = NdrReader::new(body, ctx);
    let mut names = Vec::new();
    while r.remaining() > 0 {
        names.push(read_encoded_string(&mut r)?);
        let _len = r.read_u32_unaligned()?;
    }
    Ok(names)
}

fn nd_table_len(properties: usize) -> usize {
    (properties + 3) / 4
}

/// Decode the NdTable and the value slots it marks as present
pub(crate) fn read_value_table(table: &[u8], properties: &[Property], heap: &Heap<'_>) -> Result<Vec<PropertyValue>> {
    let nd_len = nd_table_len(properties.len());
    if table.len() < nd_len {
        return Err(NdrError::MalformedLength {
            what: "NdTable",
            needed: nd_len,
            remaining: table.len(),
        });
    }
    let (nd, slots) = table.split_at(nd_len);
    properties
        .iter()
        .enumerate()
        .map(|(index, property)| {
            let bits = (nd[index / 4] >> ((index % 4) * 2)) & 0x03;
            if bits & ND_DEFAULT != 0 {
                return Ok(PropertyValue::Default);
            }
            if bits & ND_NULL != 0 {
                return Ok(PropertyValue::Null);
            }
            let offset = property.offset as usize;
            let size = property.cim_type.slot_size()?;
            if offset.checked_add(size).map_or(true, |end| end > slots.len()) {
                return Err(NdrError::MalformedLength {
                    what: "value table slot",
                    needed: offset.saturating_add(size),
                    remaining: slots.len(),
                });
            }
            let mut r = NdrReader::new(&slots[offset..], heap.context());
            read_value(&mut r, property.cim_type, heap).map(PropertyValue::Value)
        })
        .collect()
}

/// Encode an NdTable and ValueTable laid out by `class`; NULL and default
/// slots are filled with 0xFF
pub(crate) fn write_value_table(
    w: &mut NdrWriter,
    class: &ClassPart,
    values: &[&PropertyValue],
    heap: &mut HeapWriter,
) -> Result<()> {
    let properties = class.properties();
    let nd_len = nd_table_len(properties.len());
    let mut table = vec![0u8; class.value_table_len as usize];
    if table.len() < nd_len {
        return Err(NdrError::violation("value table shorter than its NdTable"));
    }
    for (index, (property, value)) in properties.iter().zip(values).enumerate() {
        let bits = match value {
            PropertyValue::Value(_) => 0,
            PropertyValue::Null => ND_NULL,
            PropertyValue::Default => ND_DEFAULT,
        };
        table[index / 4] |= bits << ((index % 4) * 2);

        let mut slot = scratch();
        match value {
            PropertyValue::Value(v) => write_value(&mut slot, property.cim_type, v, heap)?,
            _ => {
                for _ in 0..property.cim_type.slot_size()? {
                    slot.write_u8(0xFF);
                }
            }
        }
        let start = nd_len + property.offset as usize;
        let dest = table
            .get_mut(start..start + slot.position())
            .ok_or_else(|| NdrError::violation(format!("slot of {} lies outside the value table", property.name)))?;
        dest.copy_from_slice(slot.as_slice());
    }
    w.write_bytes(&table);
    Ok(())
}

/// A method and its parameter signatures
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Method {
    pub name: String,
    pub flags: u8,
    /// Derivation level that declared the method
    pub origin: u32,
    pub qualifiers: Vec<Qualifier>,
    /// `__PARAMETERS` class of the in parameters
    pub input: Option<Box<ManagementObject>>,
    /// `__PARAMETERS` class of the out parameters
    pub output: Option<Box<ManagementObject>>,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// ```text
/// encodingLength u32      # counts itself
/// count u16, reserved u16
/// count x { nameRef u32, flags u8, pad[3], origin u32, qualifiersRef u32, inRef u32, outRef u32 }
/// heap
/// ```
const METHOD_ENTRY_SIZE: usize = 24;

fn read_methods(r: &mut NdrReader<'_>, depth: usize) -> Result<Vec<Method>> {
    let body = read_encoded(r, "methods part")?;
    let mut r = NdrReader::new(body, *r.context());
    let count = usize::from(r.read_u16_unaligned()?);
    let _reserved = r.read_u16_unaligned()?;
    let count = r.check_count("methods", count, METHOD_ENTRY_SIZE)?;
    let entries = take(&mut r, "methods", wire_len("methods", count * METHOD_ENTRY_SIZE)?)?;
    let heap = Heap::read(&mut r, depth)?;
    trailing("methods part", &r);

    let mut r = NdrReader::new(entries, heap.context());
    (0..count)
        .map(|_| {
            let name = heap.string(r.read_u32_unaligned()?)?;
            let flags = r.read_u8()?;
            take(&mut r, "method padding", 3)?;
            let origin = r.read_u32_unaligned()?;
            let qualifiers = match r.read_u32_unaligned()? {
                NO_REF => Vec::new(),
                href => read_qualifier_set(&mut heap.at("method qualifiers", href)?, &heap)?,
            };
            let input = read_signature(&heap, r.read_u32_unaligned()?)?;
            let output = read_signature(&heap, r.read_u32_unaligned()?)?;
            Ok(Method {
                name,
                flags,
                origin,
                qualifiers,
                input,
                output,
            })
        })
        .collect()
}

fn read_signature(heap: &Heap<'_>, href: u32) -> Result<Option<Box<ManagementObject>>> {
    if href == NO_REF {
        return Ok(None);
    }
    let mut r = heap.at("method signature", href)?;
    let len = r.read_u32_unaligned()?;
    let block = take(&mut r, "method signature", len)?;
    let depth = nested(&heap.context(), heap.depth())?;
    ManagementObject::decode_block(block, heap.context(), depth).map(|obj| Some(Box::new(obj)))
}

fn write_methods(w: &mut NdrWriter, methods: &[Method]) -> Result<()> {
    let count = u16::try_from(methods.len()).map_err(|_| NdrError::IntegerOverflow("method count"))?;
    let mut heap = HeapWriter::new();
    let mut body = scratch();
    body.write_u16_unaligned(count);
    body.write_u16_unaligned(0);
    for method in methods {
        let name = heap.name(&method.name)?;
        let mut qualifiers = scratch();
        write_qualifier_set(&mut qualifiers, &method.qualifiers, &mut heap)?;
        let qualifiers = heap.bytes(qualifiers.as_slice())?;
        let input = write_signature(&mut heap, method.input.as_deref())?;
        let output = write_signature(&mut heap, method.output.as_deref())?;

        body.write_u32_unaligned(name);
        body.write_u8(method.flags);
        body.write_bytes(&[0; 3]);
        body.write_u32_unaligned(method.origin);
        body.write_u32_unaligned(qualifiers);
        body.write_u32_unaligned(input);
        body.write_u32_unaligned(output);
    }
    heap.finish(&mut body)?;
    write_encoded(w, "methods part", body.as_slice())
}

fn write_signature(heap: &mut HeapWriter, signature: Option<&ManagementObject>) -> Result<u32> {
    let Some(signature) = signature else {
        return Ok(NO_REF);
    };
    let block = signature.encode_block()?;
    let mut framed = scratch();
    framed.write_u32_unaligned(wire_len("method signature", block.len())?);
    framed.write_bytes(&block);
    heap.bytes(framed.as_slice())
}

/// A complete class: the parent level and the class itself, each with methods
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDefinition {
    pub parent: ClassPart,
    pub parent_methods: Vec<Method>,
    pub current: ClassPart,
    pub methods: Vec<Method>,
}

impl ClassDefinition {
    /// Root class without methods
    pub fn new(current: ClassPart) -> Self {
        Self {
            current,
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: ClassPart, parent_methods: Vec<Method>) -> Self {
        self.parent = parent;
        self.parent_methods = parent_methods;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.current.name()
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods
            .iter()
            .chain(&self.parent_methods)
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn read(r: &mut NdrReader<'_>, depth: usize) -> Result<Self> {
        Ok(Self {
            parent: ClassPart::read(r, depth)?,
            parent_methods: read_methods(r, depth)?,
            current: ClassPart::read(r, depth)?,
            methods: read_methods(r, depth)?,
        })
    }

    pub(crate) fn write(&self, w: &mut NdrWriter) -> Result<()> {
        self.parent.write(w)?;
        write_methods(w, &self.parent_methods)?;
        self.current.write(w)?;
        write_methods(w, &self.methods)
    }
}
