//! Object stream tests
//!
//! Covers:
//! - a server-shaped batch assembled byte by byte: class definition with
//!   qualifiers and dictionary names, then instances without their class
//! - class elision within a batch and across batches via a class cache
//! - concurrent decoding of independent buffers

use std::sync::Arc;

use integration_tests::init_tracing;
use midl_ndr::NdrUuid;
use oaut::Variant;
use wmio::*;

fn class_id(n: u32) -> NdrUuid {
    NdrUuid::from_fields(0x8502_c4b0, 0x5fbb, 0x11d2, [0xaa, 0xc1, 0x00, 0x60, 0x08, 0xc7, 0x8b, n as u8])
}

/// Little-endian byte assembler for hand-built streams
#[derive(Default)]
struct Buf(Vec<u8>);

impl Buf {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.0.extend_from_slice(b);
        self
    }

    fn pos(&self) -> u32 {
        self.0.len() as u32
    }

    /// 8-bit encoded string; returns where it starts
    fn ascii(&mut self, s: &str) -> u32 {
        let at = self.pos();
        self.u8(0).bytes(s.as_bytes()).u8(0);
        at
    }

    /// Block behind a length that counts itself
    fn encoded(&mut self, body: &[u8]) -> &mut Self {
        self.u32(body.len() as u32 + 4).bytes(body)
    }

    fn heap(&mut self, heap: &[u8]) -> &mut Self {
        self.u32(heap.len() as u32 | 0x8000_0000).bytes(heap)
    }
}

const SERVICE_GUID: [u8; 16] = [
    0x5a, 0x0b, 0x74, 0x8c, 0x0e, 0x3a, 0xd3, 0x11, 0x8b, 0x6e, 0x00, 0x10, 0x5a, 0x1f, 0x84, 0x17,
];

fn empty_methods() -> Vec<u8> {
    let mut m = Buf::default();
    m.encoded(&[0, 0, 0, 0, 0, 0, 0, 0x80]);
    m.0
}

fn empty_parent() -> Vec<u8> {
    let mut body = Buf::default();
    body.u8(0).u32(0xFFFF_FFFF).u32(0).encoded(&[]).encoded(&[]).u32(0).heap(&[]);
    let mut part = Buf::default();
    part.encoded(&body.0);
    part.0
}

/// Win32_Service with Name (key), State and ProcessId, all NULL by default
fn service_class_part() -> Vec<u8> {
    let mut heap = Buf::default();
    let class_name = heap.ascii("Win32_Service");
    let name = heap.ascii("Name");
    let name_info = heap.pos();
    let mut key = Buf::default();
    key.u32(0x8000_0001).u8(0).u32(11).u16(0xFFFF);
    heap.u32(8).u16(0).u32(0).u32(0).encoded(&key.0);
    let state = heap.ascii("State");
    let state_info = heap.pos();
    heap.u32(8).u16(1).u32(4).u32(0).encoded(&[]);
    let pid = heap.ascii("ProcessId");
    let pid_info = heap.pos();
    heap.u32(19).u16(2).u32(8).u32(0).encoded(&[]);
    let provider = heap.ascii("CIMWin32");

    let mut qualifiers = Buf::default();
    // dynamic, provider("CIMWin32"): both names from the dictionary
    qualifiers.u32(0x8000_0007).u8(0x01).u32(11).u16(0xFFFF);
    qualifiers.u32(0x8000_0006).u8(0x01).u32(8).u32(provider);

    let mut derivation = Buf::default();
    derivation.ascii("CIM_Service");
    derivation.u32(13);

    let mut body = Buf::default();
    body.u8(0).u32(class_name).u32(13);
    body.encoded(&derivation.0).encoded(&qualifiers.0);
    body.u32(3);
    body.u32(name).u32(name_info).u32(state).u32(state_info).u32(pid).u32(pid_info);
    // NdTable: three NULL defaults, then the unused slots
    body.u8(0x15).bytes(&[0xFF; 12]);
    body.heap(&heap.0);

    let mut part = Buf::default();
    part.encoded(&body.0);
    part.0
}

/// Type 3 record body: object flags then the instance part alone
fn service_instance(name: &str, state: Option<&str>, pid: Option<u32>) -> Vec<u8> {
    let mut heap = Buf::default();
    let class_name = heap.ascii("Win32_Service");
    let name_ref = heap.ascii(name);
    let state_ref = state.map(|s| heap.ascii(s));

    let mut nd = 0u8;
    let mut slots = Buf::default();
    slots.u32(name_ref);
    match state_ref {
        Some(at) => slots.u32(at),
        None => {
            nd |= 0x01 << 2;
            slots.u32(0xFFFF_FFFF)
        }
    };
    match pid {
        Some(pid) => slots.u32(pid),
        None => {
            nd |= 0x02 << 4;
            slots.u32(0xFFFF_FFFF)
        }
    };

    let mut body = Buf::default();
    body.u8(0).u32(class_name).u8(nd).bytes(&slots.0);
    body.encoded(&[]).u8(1).heap(&heap.0);

    let mut record = Buf::default();
    record.u8(0x02).encoded(&body.0);
    record.0
}

fn captured_service_batch() -> Vec<u8> {
    let mut class = Buf::default();
    class.u8(0x05);
    class.ascii("SRV01");
    class.ascii("ROOT\\cimv2");
    class.bytes(&empty_parent()).bytes(&empty_methods());
    class.bytes(&service_class_part()).bytes(&empty_methods());

    let spooler = service_instance("Spooler", None, Some(1204));
    let schedule = service_instance("Schedule", Some("Running"), None);

    let mut objects = Buf::default();
    objects.u32(9).u32(8 + class.pos()).u8(1);
    objects.u32(8).u32(class.pos()).bytes(&class.0);
    for data in [&spooler, &schedule] {
        objects.u32(9).u32(0x18 + data.len() as u32).u8(3);
        objects.u32(0x18).u32(data.len() as u32).bytes(&SERVICE_GUID).bytes(data);
    }

    let mut msg = Buf::default();
    msg.u32(0).bytes(b"WBEMDATA").u32(0x1A).u32(8 + 12 + objects.pos()).u32(0).u8(1).u8(0);
    msg.u32(8).u32(12 + objects.pos());
    msg.u32(0xC).u32(objects.pos()).u32(3).bytes(&objects.0);
    msg.0
}

#[test]
fn test_captured_class_and_instances() {
    init_tracing();
    let batch = ObjectBatch::decode(&captured_service_batch()).unwrap();
    assert_eq!(batch.len(), 3);
    let records = batch.records();

    let class = records[0].class_definition().unwrap();
    assert_eq!(records[0].kind(), ObjectKind::ClassDefinition);
    assert_eq!(records[0].object().decoration, Some(Decoration::new("SRV01", "ROOT\\cimv2")));
    assert_eq!(class.parent.name(), None);
    assert!(class.methods.is_empty());

    let service = &class.current;
    assert_eq!(service.name(), Some("Win32_Service"));
    assert_eq!(service.derivation(), ["CIM_Service"]);
    assert_eq!(service.value_table_len(), 13);
    assert_eq!(service.qualifier("dynamic").unwrap().value, CimValue::Boolean(true));
    let provider = service.qualifier("provider").unwrap();
    assert_eq!(provider.value.as_str(), Some("CIMWin32"));
    assert!(provider.flavor.contains(Flavor::PROPAGATE_TO_INSTANCE));

    let names: Vec<&str> = service.properties().iter().map(Property::name).collect();
    assert_eq!(names, ["Name", "State", "ProcessId"]);
    assert!(service.property("Name").unwrap().is_key());
    assert!(!service.property("State").unwrap().is_key());
    assert_eq!(service.property("ProcessId").unwrap().cim_type(), CimType::UINT32);
    assert_eq!(service.property("ProcessId").unwrap().offset(), 8);
    assert!(service.properties().iter().all(|p| p.default_value().is_null()));

    let spooler = records[1].instance().unwrap();
    assert_eq!(records[1].kind(), ObjectKind::InstanceWithoutClass);
    assert_eq!(records[1].class_id(), Some(NdrUuid::from_le_bytes(SERVICE_GUID)));
    assert!(Arc::ptr_eq(spooler.class(), records[0].class()));
    assert_eq!(spooler.value("Name").and_then(CimValue::as_str), Some("Spooler"));
    assert!(spooler.get("State").unwrap().is_null());
    assert_eq!(spooler.value("ProcessId"), Some(&CimValue::Uint32(1204)));

    let schedule = records[2].instance().unwrap();
    assert_eq!(schedule.value("State").and_then(CimValue::as_str), Some("Running"));
    assert_eq!(schedule.get("ProcessId"), Some(&PropertyValue::Default));
    assert_eq!(schedule.value("ProcessId"), None);

    let reencoded = batch.encode().unwrap();
    assert_eq!(ObjectBatch::decode(&reencoded).unwrap(), batch);
}

#[test]
fn test_captured_batch_needs_its_class() {
    init_tracing();
    let bytes = captured_service_batch();
    // flip the class definition record to an unknown type
    let mut bad = bytes.clone();
    bad[54] = 7;
    assert!(ObjectBatch::decode(&bad).unwrap_err().is_unsupported());
}

fn process_class() -> ClassPart {
    ClassPart::new(
        "Win32_Process",
        vec!["CIM_Process".into()],
        Vec::new(),
        vec![
            Property::new("Handle", CimType::STRING)
                .with_qualifier(Qualifier::new("key", Flavor::PROPAGATE_TO_SUBCLASS, true).unwrap()),
            Property::new("ProcessId", CimType::UINT32),
            Property::new("Priority", CimType::UINT32).with_default(8u32),
        ],
    )
    .unwrap()
}

fn process(class: &Arc<ClassSchema>, pid: u32) -> Instance {
    Instance::new(Arc::clone(class))
        .with_value("Handle", pid.to_string())
        .unwrap()
        .with_value("ProcessId", pid)
        .unwrap()
}

fn process_batch(instances: u32) -> ObjectBatch {
    let class = ObjectRecord::class_definition(ClassDefinition::new(process_class()));
    let schema = Arc::clone(class.class());
    let mut records = vec![class];
    for pid in 0..instances {
        records.push(ObjectRecord::instance_without_class(class_id(1), process(&schema, pid)));
    }
    ObjectBatch::new(records)
}

#[test]
fn test_class_definition_then_instances() {
    init_tracing();
    let batch = process_batch(3);
    let decoded = ObjectBatch::decode(&batch.encode().unwrap()).unwrap();
    assert_eq!(decoded, batch);

    let first = Arc::clone(decoded.records()[0].class());
    for (pid, record) in decoded.instances().enumerate() {
        assert_eq!(record.kind(), ObjectKind::InstanceWithoutClass);
        assert!(Arc::ptr_eq(record.class(), &first));
        let object = record.object();
        assert_eq!(object.value("ProcessId"), Some(&CimValue::Uint32(pid as u32)));
        assert_eq!(object.value("Priority"), Some(&CimValue::Uint32(8)));
    }
}

#[test]
fn test_batch_starting_without_class_fails() {
    init_tracing();
    let schema = Arc::new(ClassSchema::new(Some(class_id(2)), process_class()));
    let cache = ClassCache::new();
    cache.register(Arc::clone(&schema));

    let batch = ObjectBatch::new(vec![ObjectRecord::instance_without_class(class_id(2), process(&schema, 1))]);
    let bytes = batch.encode_with(&cache).unwrap();

    match ObjectBatch::decode(&bytes) {
        Err(WmioError::MissingSchemaContext { index, class_id: id }) => {
            assert_eq!(index, 0);
            assert_eq!(id, class_id(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(ObjectBatch::decode_with(&bytes, &cache).unwrap(), batch);
}

#[test]
fn test_class_cache_across_batches() {
    init_tracing();
    let process_schema = Arc::new(ClassSchema::new(None, process_class()));
    let thread_class = ClassPart::new(
        "Win32_Thread",
        Vec::new(),
        Vec::new(),
        vec![Property::new("Handle", CimType::STRING)],
    )
    .unwrap();
    let thread_schema = Arc::new(ClassSchema::new(None, thread_class));
    let first = ObjectBatch::new(vec![
        ObjectRecord::instance_with_class(class_id(3), process(&process_schema, 1)),
        ObjectRecord::instance_with_class(class_id(4), Instance::new(thread_schema)),
    ]);
    let cache = ClassCache::new();
    let decoded = ObjectBatch::decode_with(&first.encode().unwrap(), &cache).unwrap();
    assert_eq!(cache.remember(&decoded), 2);

    let schema = cache.class_for(&class_id(3)).unwrap();
    let second = ObjectBatch::new(vec![ObjectRecord::instance_without_class(class_id(3), process(&schema, 2))]);
    let bytes = second.encode_with(&cache).unwrap();
    let decoded = ObjectBatch::decode_with(&bytes, &cache).unwrap();
    assert_eq!(decoded.records()[0].class().name(), Some("Win32_Process"));
    assert_eq!(decoded.records()[0].object().value("ProcessId"), Some(&CimValue::Uint32(2)));
    assert!(ObjectBatch::decode(&bytes).is_err());
}

#[test]
fn test_concurrent_decode() {
    init_tracing();
    let buffers: Vec<_> = (1..=8).map(|n| process_batch(n * 4).encode().unwrap()).collect();
    let cache = ClassCache::new();
    let cache = &cache;

    std::thread::scope(|s| {
        let handles: Vec<_> = buffers
            .iter()
            .map(|buf| s.spawn(move || ObjectBatch::decode_with(buf, cache)))
            .collect();
        for (n, handle) in (1..=8).zip(handles) {
            let batch = handle.join().unwrap().unwrap();
            assert_eq!(batch.instances().count(), n * 4);
        }
    });
}

#[test]
fn test_batches_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ObjectBatch>();
    assert_send_sync::<ManagementObject>();
    assert_send_sync::<ClassCache>();
    assert_send_sync::<Variant>();
    assert_send_sync::<oaut::SafeArray>();
}
