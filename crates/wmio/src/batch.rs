//! Object array framing
//!
//! Packed little-endian, no NDR alignment:
//!
//! ```text
//! byteOrdering u32 = 0
//! signature    [u8; 8] = "WBEMDATA"
//! headerSize1  u32 = 0x1A   dataSize1 u32   flags u32   version u8 = 1   packetType u8
//! headerSize2  u32 = 8      dataSize2 u32
//! headerSize3  u32 = 0xC    dataSize3 u32   numObjects u32
//! numObjects x {
//!     headerSize u32 = 9    dataSize u32    objectType u8
//!     class:     headerSize u32 = 8     dataSize u32                 object block
//!     instance:  headerSize u32 = 0x18  dataSize u32  classId GUID   body
//! }
//! ```
//!
//! Each `dataSize` counts the bytes after its own header. An instance with
//! its class (type 2) carries a full object block. An instance without its
//! class (type 3) carries the object flags, the optional decoration and the
//! instance part only; its class part is the one in scope.

use crate::class::ClassDefinition;
use crate::error::{Result, WmioError};
use crate::instance::Instance;
use crate::object::{Decoration, ManagementObject, ObjectBody};
use crate::provider::{ClassProvider, ClassSchema, NoClassProvider};
use crate::wire::{take, trailing};
use bytes::Bytes;
use midl_ndr::{ArmTable, NdrContext, NdrError, NdrReader, NdrUuid, NdrWriter};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub const SIGNATURE: &[u8; 8] = b"WBEMDATA";
pub const VERSION: u8 = 1;

const HEADER1_SIZE: u32 = 0x1A;
const HEADER2_SIZE: u32 = 8;
const HEADER3_SIZE: u32 = 0xC;
const OBJECT_HEADER_SIZE: u32 = 9;
const CLASS_HEADER_SIZE: u32 = 8;
const INSTANCE_HEADER_SIZE: u32 = 0x18;

/// Record type of one object in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Class definition; becomes the current class
    ClassDefinition,
    /// Instance carrying its class; also becomes the current class
    InstanceWithClass,
    /// Instance relying on a class sent earlier
    InstanceWithoutClass,
}

const OBJECT_KINDS: ArmTable<ObjectKind> = ArmTable::new(
    "object record type",
    &[
        (1, ObjectKind::ClassDefinition),
        (2, ObjectKind::InstanceWithClass),
        (3, ObjectKind::InstanceWithoutClass),
    ],
    None,
);

impl ObjectKind {
    pub fn wire_value(self) -> u8 {
        match self {
            ObjectKind::ClassDefinition => 1,
            ObjectKind::InstanceWithClass => 2,
            ObjectKind::InstanceWithoutClass => 3,
        }
    }

    fn body_header_size(self) -> u32 {
        match self {
            ObjectKind::ClassDefinition => CLASS_HEADER_SIZE,
            _ => INSTANCE_HEADER_SIZE,
        }
    }
}

/// One object of a batch, with the class schema it resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    kind: ObjectKind,
    class_id: Option<NdrUuid>,
    class: Arc<ClassSchema>,
    object: ManagementObject,
}

impl ObjectRecord {
    /// Class definition record
    pub fn class_definition(definition: ClassDefinition) -> Self {
        Self {
            kind: ObjectKind::ClassDefinition,
            class_id: None,
            class: Arc::new(ClassSchema::new(None, definition.current.clone())),
            object: ManagementObject::class(definition),
        }
    }

    /// Instance whose encoding carries its own class part
    pub fn instance_with_class(class_id: NdrUuid, mut instance: Instance) -> Self {
        let class = Arc::new(ClassSchema::new(Some(class_id), instance.class().class().clone()));
        instance.rebind(Arc::clone(&class));
        Self {
            kind: ObjectKind::InstanceWithClass,
            class_id: Some(class_id),
            class,
            object: ManagementObject::instance(instance),
        }
    }

    /// Instance of a class transmitted earlier or known to the receiver
    pub fn instance_without_class(class_id: NdrUuid, instance: Instance) -> Self {
        Self {
            kind: ObjectKind::InstanceWithoutClass,
            class_id: Some(class_id),
            class: Arc::clone(instance.class()),
            object: ManagementObject::instance(instance),
        }
    }

    pub fn with_decoration(mut self, decoration: Decoration) -> Self {
        self.object.decoration = Some(decoration);
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Class id on the wire; `None` for class definitions
    pub fn class_id(&self) -> Option<NdrUuid> {
        self.class_id
    }

    /// Schema the record is interpreted against
    pub fn class(&self) -> &Arc<ClassSchema> {
        &self.class
    }

    pub fn object(&self) -> &ManagementObject {
        &self.object
    }

    pub fn into_object(self) -> ManagementObject {
        self.object
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.object.as_instance()
    }

    pub fn class_definition(&self) -> Option<&ClassDefinition> {
        self.object.class_definition()
    }

    pub fn is_instance(&self) -> bool {
        self.kind != ObjectKind::ClassDefinition
    }

    fn encode_data(&self) -> midl_ndr::Result<Bytes> {
        match self.kind {
            ObjectKind::InstanceWithoutClass => self.object.encode_elided(),
            _ => self.object.encode_block(),
        }
    }
}

/// Classes in scope while walking a batch in order
#[derive(Default)]
struct SchemaScope {
    current: Option<Arc<ClassSchema>>,
    with_class: HashMap<NdrUuid, Arc<ClassSchema>>,
}

impl SchemaScope {
    fn establish(&mut self, record: &ObjectRecord) {
        match record.kind {
            ObjectKind::ClassDefinition => self.current = Some(Arc::clone(&record.class)),
            ObjectKind::InstanceWithClass => {
                if let Some(class_id) = record.class_id {
                    self.with_class.insert(class_id, Arc::clone(&record.class));
                }
                self.current = Some(Arc::clone(&record.class));
            }
            ObjectKind::InstanceWithoutClass => {}
        }
    }

    fn resolve<P: ClassProvider + ?Sized>(
        &self,
        index: usize,
        class_id: &NdrUuid,
        provider: &P,
    ) -> Result<Arc<ClassSchema>> {
        if let Some(schema) = self.with_class.get(class_id) {
            return Ok(Arc::clone(schema));
        }
        if let Some(schema) = self.current.as_ref().filter(|schema| schema.accepts(class_id)) {
            return Ok(Arc::clone(schema));
        }
        if let Some(schema) = provider.class_for(class_id) {
            debug!(index, %class_id, "class schema supplied by provider");
            return Ok(schema);
        }
        Err(WmioError::MissingSchemaContext {
            index,
            class_id: *class_id,
        })
    }
}

/// A batch of management objects
///
/// Records are kept in stream order. Instances that omit their class are
/// resolved against the records before them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectBatch {
    flags: u32,
    packet_type: u8,
    records: Vec<ObjectRecord>,
}

impl ObjectBatch {
    pub fn new(records: Vec<ObjectRecord>) -> Self {
        Self {
            flags: 0,
            packet_type: 0,
            records,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_packet_type(mut self, packet_type: u8) -> Self {
        self.packet_type = packet_type;
        self
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    pub fn records(&self) -> &[ObjectRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ObjectRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Instance records, skipping class definitions
    pub fn instances(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.iter().filter(|record| record.is_instance())
    }

    /// Decode a self-contained batch
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_with(buf, &NoClassProvider)
    }

    /// Decode a batch, asking `provider` for classes the batch does not carry
    pub fn decode_with<P: ClassProvider + ?Sized>(buf: &[u8], provider: &P) -> Result<Self> {
        let ctx = NdrContext::new();
        let mut r = NdrReader::new(buf, ctx);

        let byte_ordering = r.read_u32_unaligned()?;
        if byte_ordering != 0 {
            return Err(NdrError::violation(format!("unsupported byte ordering {byte_ordering:#x}")).into());
        }
        if r.read_bytes(SIGNATURE.len())? != SIGNATURE {
            return Err(NdrError::violation("missing WBEMDATA signature").into());
        }
        expect_header(&mut r, "packet header", HEADER1_SIZE)?;
        let packet_size = r.read_u32_unaligned()?;
        let flags = r.read_u32_unaligned()?;
        let version = r.read_u8()?;
        if version != VERSION {
            return Err(NdrError::UnsupportedDiscriminant {
                context: "object stream version",
                value: u32::from(version),
            }
            .into());
        }
        let packet_type = r.read_u8()?;
        let packet = take(&mut r, "packet data", packet_size)?;
        trailing("message", &r);
        trace!(flags, packet_type, "object stream header");

        let mut r = NdrReader::new(packet, ctx);
        expect_header(&mut r, "packet header 2", HEADER2_SIZE)?;
        let body_size = r.read_u32_unaligned()?;
        let body = take(&mut r, "packet body", body_size)?;
        trailing("packet", &r);

        let mut r = NdrReader::new(body, ctx);
        expect_header(&mut r, "object array header", HEADER3_SIZE)?;
        let objects_size = r.read_u32_unaligned()?;
        let count = r.read_u32_unaligned()?;
        let objects = take(&mut r, "object array", objects_size)?;
        trailing("packet body", &r);

        let mut r = NdrReader::new(objects, ctx);
        let count = r.check_count("object count", count as usize, MIN_OBJECT_SIZE)?;
        let mut scope = SchemaScope::default();
        let mut records = Vec::with_capacity(count);
        for index in 0..count {
            let record = decode_record(&mut r, index, &scope, provider)?;
            scope.establish(&record);
            records.push(record);
        }
        trailing("object array", &r);

        Ok(Self {
            flags,
            packet_type,
            records,
        })
    }

    /// Encode a self-contained batch
    pub fn encode(&self) -> Result<Bytes> {
        self.encode_with(&NoClassProvider)
    }

    /// Encode a batch whose class-less instances may rely on `provider`
    pub fn encode_with<P: ClassProvider + ?Sized>(&self, provider: &P) -> Result<Bytes> {
        let mut scope = SchemaScope::default();
        let mut objects_size: u32 = 0;
        let mut bodies = Vec::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            if record.kind == ObjectKind::InstanceWithoutClass {
                let class_id = record.class_id.unwrap_or(NdrUuid::NIL);
                let schema = scope.resolve(index, &class_id, provider)?;
                if schema.class() != record.class.class() {
                    return Err(NdrError::violation(format!(
                        "object {index}: class {class_id} in scope differs from the record's class"
                    ))
                    .into());
                }
            }
            scope.establish(record);
            let data = record.encode_data()?;
            objects_size = u32::try_from(data.len())
                .ok()
                .and_then(|len| len.checked_add(record.kind.body_header_size() + OBJECT_HEADER_SIZE))
                .and_then(|len| objects_size.checked_add(len))
                .ok_or(NdrError::IntegerOverflow("object array size"))?;
            bodies.push(data);
        }
        let count = u32::try_from(self.records.len()).map_err(|_| NdrError::IntegerOverflow("object count"))?;
        let body_size = objects_size
            .checked_add(HEADER3_SIZE)
            .ok_or(NdrError::IntegerOverflow("packet size"))?;
        let packet_size = body_size
            .checked_add(HEADER2_SIZE)
            .ok_or(NdrError::IntegerOverflow("packet size"))?;

        let mut w = NdrWriter::with_capacity(NdrContext::new(), HEADER1_SIZE as usize + packet_size as usize);
        w.write_u32_unaligned(0);
        w.write_bytes(SIGNATURE);
        w.write_u32_unaligned(HEADER1_SIZE);
        w.write_u32_unaligned(packet_size);
        w.write_u32_unaligned(self.flags);
        w.write_u8(VERSION);
        w.write_u8(self.packet_type);
        w.write_u32_unaligned(HEADER2_SIZE);
        w.write_u32_unaligned(body_size);
        w.write_u32_unaligned(HEADER3_SIZE);
        w.write_u32_unaligned(objects_size);
        w.write_u32_unaligned(count);

        for (record, data) in self.records.iter().zip(&bodies) {
            let header_size = record.kind.body_header_size();
            let data_len = u32::try_from(data.len()).map_err(|_| NdrError::IntegerOverflow("object size"))?;
            w.write_u32_unaligned(OBJECT_HEADER_SIZE);
            w.write_u32_unaligned(header_size + data_len);
            w.write_u8(record.kind.wire_value());
            w.write_u32_unaligned(header_size);
            w.write_u32_unaligned(data_len);
            if let Some(class_id) = record.class_id {
                w.write_bytes(&class_id.to_le_bytes());
            }
            w.write_bytes(data);
        }
        Ok(w.into_bytes())
    }
}

/// Smallest possible object: empty class definition
const MIN_OBJECT_SIZE: usize = (OBJECT_HEADER_SIZE + CLASS_HEADER_SIZE) as usize;

fn decode_record<P: ClassProvider + ?Sized>(
    r: &mut NdrReader<'_>,
    index: usize,
    scope: &SchemaScope,
    provider: &P,
) -> Result<ObjectRecord> {
    expect_header(r, "object header", OBJECT_HEADER_SIZE)?;
    let size = r.read_u32_unaligned()?;
    let kind = OBJECT_KINDS.select(u32::from(r.read_u8()?))?;
    let body = take(r, "object", size)?;
    trace!(index, ?kind, size, "object record");

    let mut r = NdrReader::new(body, *r.context());
    expect_header(&mut r, "object body header", kind.body_header_size())?;
    let data_size = r.read_u32_unaligned()?;
    let class_id = match kind {
        ObjectKind::ClassDefinition => None,
        _ => {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(take(&mut r, "class id", 16)?);
            Some(NdrUuid::from_le_bytes(guid))
        }
    };
    let data = take(&mut r, "object data", data_size)?;
    trailing("object", &r);

    let ctx = *r.context();
    let record = match (kind, class_id) {
        (ObjectKind::InstanceWithoutClass, Some(class_id)) => {
            let class = scope.resolve(index, &class_id, provider)?;
            let object = ManagementObject::decode_elided(data, ctx, class)?;
            let record = ObjectRecord::instance_without_class(class_id, into_instance(index, object.body)?);
            with_decoration(record, object.decoration)
        }
        (ObjectKind::InstanceWithClass, Some(class_id)) => {
            let object = ManagementObject::decode_block(data, ctx, 0)?;
            let record = ObjectRecord::instance_with_class(class_id, into_instance(index, object.body)?);
            with_decoration(record, object.decoration)
        }
        _ => {
            let object = ManagementObject::decode_block(data, ctx, 0)?;
            let ObjectBody::Class(definition) = object.body else {
                return Err(NdrError::violation(format!("object {index}: class record carries an instance")).into());
            };
            with_decoration(ObjectRecord::class_definition(definition), object.decoration)
        }
    };
    Ok(record)
}

fn into_instance(index: usize, body: ObjectBody) -> Result<Instance> {
    match body {
        ObjectBody::Instance(instance) => Ok(instance),
        ObjectBody::Class(_) => {
            Err(NdrError::violation(format!("object {index}: instance record carries a class")).into())
        }
    }
}

fn with_decoration(record: ObjectRecord, decoration: Option<Decoration>) -> ObjectRecord {
    match decoration {
        Some(decoration) => record.with_decoration(decoration),
        None => record,
    }
}

fn expect_header(r: &mut NdrReader<'_>, what: &'static str, expected: u32) -> Result<()> {
    let size = r.read_u32_unaligned()?;
    if size != expected {
        return Err(NdrError::violation(format!("{what} size {size:#x}, expected {expected:#x}")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassPart, Property};
    use crate::value::{CimType, CimValue};

    fn uuid(n: u32) -> NdrUuid {
        NdrUuid::from_fields(n, 0x11, 0x22, [1, 2, 3, 4, 5, 6, 7, 8])
    }

    fn class_part(name: &str) -> ClassPart {
        ClassPart::new(
            name,
            Vec::new(),
            Vec::new(),
            vec![Property::new("Name", CimType::STRING), Property::new("Id", CimType::UINT32)],
        )
        .unwrap()
    }

    fn schema(class_id: Option<NdrUuid>, name: &str) -> Arc<ClassSchema> {
        Arc::new(ClassSchema::new(class_id, class_part(name)))
    }

    fn instance(class: &Arc<ClassSchema>, id: u32) -> Instance {
        Instance::new(Arc::clone(class)).with_value("Id", id).unwrap()
    }

    fn provider_with(schema: &Arc<ClassSchema>) -> HashMap<NdrUuid, Arc<ClassSchema>> {
        let mut map = HashMap::new();
        if let Some(id) = schema.class_id() {
            map.insert(id, Arc::clone(schema));
        }
        map
    }

    fn empty_class() -> ObjectBatch {
        ObjectBatch::new(vec![ObjectRecord::class_definition(ClassDefinition::default())])
    }

    #[test]
    fn test_wire_layout() {
        let batch = empty_class();
        let bytes = batch.encode().unwrap();
        // flags, two empty class parts of 29 bytes and two empty method parts of 12
        assert_eq!(bytes.len(), 46 + 9 + 8 + 83);
        assert_eq!(&bytes[4..12], b"WBEMDATA");
        assert_eq!(&bytes[12..16], &[0x1A, 0, 0, 0]);
        assert_eq!(&bytes[16..20], &[120, 0, 0, 0]);
        assert_eq!(bytes[24], VERSION);
        assert_eq!(&bytes[26..34], &[8, 0, 0, 0, 112, 0, 0, 0]);
        assert_eq!(&bytes[34..46], &[0xC, 0, 0, 0, 100, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&bytes[46..55], &[9, 0, 0, 0, 91, 0, 0, 0, 1]);
        assert_eq!(&bytes[55..64], &[8, 0, 0, 0, 83, 0, 0, 0, 0x01]);
        assert_eq!(&bytes[64..68], &[29, 0, 0, 0]);
        assert_eq!(ObjectBatch::decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn test_instance_without_class_uses_class_definition() {
        let class = ObjectRecord::class_definition(ClassDefinition::new(class_part("C")));
        let schema = Arc::clone(class.class());
        let batch = ObjectBatch::new(vec![
            class,
            ObjectRecord::instance_without_class(uuid(1), instance(&schema, 1)),
            ObjectRecord::instance_without_class(uuid(1), instance(&schema, 2)),
        ])
        .with_flags(1);
        let bytes = batch.encode().unwrap();
        let decoded = ObjectBatch::decode(&bytes).unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded.instances().count(), 2);
        let records = decoded.records();
        assert!(Arc::ptr_eq(records[0].class(), records[1].class()));
        assert!(Arc::ptr_eq(records[0].class(), records[2].class()));
        assert!(Arc::ptr_eq(records[0].class(), records[2].instance().unwrap().class()));
        assert_eq!(records[2].object().value("Id"), Some(&CimValue::Uint32(2)));
    }

    #[test]
    fn test_elided_instances_are_smaller() {
        let class = schema(None, "C");
        let with = ObjectBatch::new(vec![ObjectRecord::instance_with_class(uuid(1), instance(&class, 1))]);
        let with_len = with.encode().unwrap().len();
        let without = ObjectBatch::new(vec![
            ObjectRecord::instance_with_class(uuid(1), instance(&class, 1)),
            ObjectRecord::instance_without_class(uuid(1), instance(&class, 2)),
        ]);
        let without_len = without.encode().unwrap().len() - with_len;
        assert!(without_len < with_len - 46);
    }

    #[test]
    fn test_instance_with_class_takes_precedence() {
        let a = ObjectRecord::instance_with_class(uuid(1), instance(&schema(None, "A"), 1));
        let a_class = Arc::clone(a.class());
        let batch = ObjectBatch::new(vec![
            a,
            ObjectRecord::class_definition(ClassDefinition::new(class_part("C"))),
            ObjectRecord::instance_without_class(uuid(1), instance(&a_class, 2)),
        ]);
        let decoded = ObjectBatch::decode(&batch.encode().unwrap()).unwrap();
        let records = decoded.records();
        assert!(Arc::ptr_eq(records[0].class(), records[2].class()));
        assert_eq!(records[2].class().class_id(), Some(uuid(1)));
        assert_eq!(records[2].object().class_name(), Some("A"));
    }

    #[test]
    fn test_decoration_survives() {
        let first = ObjectRecord::instance_with_class(uuid(1), instance(&schema(None, "C"), 1))
            .with_decoration(Decoration::new("SRV", "root\\cimv2"));
        let bound = Arc::clone(first.class());
        let batch = ObjectBatch::new(vec![
            first,
            ObjectRecord::instance_without_class(uuid(1), instance(&bound, 2))
                .with_decoration(Decoration::new("SRV", "root\\default")),
        ]);
        let decoded = ObjectBatch::decode(&batch.encode().unwrap()).unwrap();
        assert_eq!(decoded, batch);
        let decoration = decoded.records()[1].object().decoration.as_ref().unwrap();
        assert_eq!(decoration.namespace, "root\\default");
    }

    #[test]
    fn test_missing_schema_context() {
        let schema = schema(Some(uuid(5)), "Remote");
        let provider = provider_with(&schema);
        let batch = ObjectBatch::new(vec![ObjectRecord::instance_without_class(uuid(5), instance(&schema, 1))]);
        assert!(matches!(
            batch.encode(),
            Err(WmioError::MissingSchemaContext { index: 0, .. })
        ));

        let bytes = batch.encode_with(&provider).unwrap();
        let err = ObjectBatch::decode(&bytes).unwrap_err();
        assert!(matches!(err, WmioError::MissingSchemaContext { index: 0, class_id } if class_id == uuid(5)));

        let decoded = ObjectBatch::decode_with(&bytes, &provider).unwrap();
        assert!(Arc::ptr_eq(decoded.records()[0].class(), &schema));
    }

    #[test]
    fn test_current_class_of_other_id_is_not_used() {
        let b = schema(Some(uuid(2)), "B");
        let provider = provider_with(&b);
        let batch = ObjectBatch::new(vec![
            ObjectRecord::instance_with_class(uuid(1), instance(&schema(None, "A"), 1)),
            ObjectRecord::instance_without_class(uuid(2), instance(&b, 2)),
        ]);
        let bytes = batch.encode_with(&provider).unwrap();
        assert!(matches!(
            ObjectBatch::decode(&bytes),
            Err(WmioError::MissingSchemaContext { index: 1, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_foreign_class() {
        let batch = ObjectBatch::new(vec![
            ObjectRecord::class_definition(ClassDefinition::new(class_part("C"))),
            ObjectRecord::instance_without_class(uuid(1), instance(&schema(None, "Other"), 1)),
        ]);
        assert!(matches!(
            batch.encode(),
            Err(WmioError::Ndr(NdrError::ProtocolViolation(_)))
        ));
    }

    #[test]
    fn test_record_body_must_match_type() {
        let mut bytes = empty_class().encode().unwrap().to_vec();
        // object flags of the class definition
        bytes[63] = 0x02;
        assert!(matches!(
            ObjectBatch::decode(&bytes),
            Err(WmioError::Ndr(NdrError::ProtocolViolation(_)) | WmioError::Ndr(NdrError::MalformedLength { .. }))
        ));
    }

    #[test]
    fn test_unknown_object_type() {
        let mut bytes = empty_class().encode().unwrap().to_vec();
        bytes[54] = 4;
        let err = ObjectBatch::decode(&bytes).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_bad_framing() {
        let good = empty_class().encode().unwrap().to_vec();

        let mut bad = good.clone();
        bad[4] = b'X';
        assert!(matches!(
            ObjectBatch::decode(&bad),
            Err(WmioError::Ndr(NdrError::ProtocolViolation(_)))
        ));

        let mut bad = good.clone();
        bad[0] = 1;
        assert!(matches!(
            ObjectBatch::decode(&bad),
            Err(WmioError::Ndr(NdrError::ProtocolViolation(_)))
        ));

        let mut bad = good.clone();
        bad[55] = 9;
        assert!(matches!(
            ObjectBatch::decode(&bad),
            Err(WmioError::Ndr(NdrError::ProtocolViolation(_)))
        ));
    }

    #[test]
    fn test_short_buffer() {
        let bytes = empty_class().encode().unwrap();
        assert!(matches!(
            ObjectBatch::decode(&bytes[..60]),
            Err(WmioError::Ndr(NdrError::MalformedLength { .. }))
        ));
    }

    #[test]
    fn test_huge_object_count() {
        let mut bytes = empty_class().encode().unwrap().to_vec();
        bytes[42..46].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            ObjectBatch::decode(&bytes),
            Err(WmioError::Ndr(NdrError::MalformedLength { .. }))
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let batch = empty_class();
        let mut bytes = batch.encode().unwrap().to_vec();
        bytes.extend_from_slice(&[0; 5]);
        assert_eq!(ObjectBatch::decode(&bytes).unwrap(), batch);
    }

    #[test]
    fn test_empty_batch() {
        let batch = ObjectBatch::default();
        let bytes = batch.encode().unwrap();
        assert_eq!(bytes.len(), 46);
        assert!(ObjectBatch::decode(&bytes).unwrap().is_empty());
    }
}
