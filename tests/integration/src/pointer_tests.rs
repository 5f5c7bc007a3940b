//! Pointer and deferral tests across crates
//!
//! Covers:
//! - full pointer aliasing through decode and re-encode
//! - conformance announced ahead of data reached through nested pointers
//! - hostile counts rejected before anything is allocated

use integration_tests::{encode_le, init_tracing, words};
use midl_ndr::{
    decode, ConformantArray, ConformantVaryingArray, FullPtr, NdrContext, NdrError, NdrWString, UniquePtr,
};
use oaut::Variant;

#[test]
fn test_full_pointer_alias_roundtrip() {
    init_tracing();
    let shared = FullPtr::new(Variant::from("shared"));
    let msg = (shared.clone(), 9u32, shared);
    let bytes = encode_le(&msg);
    let w = words(&bytes);
    assert_eq!(w[0], 0x0002_0000);
    assert_eq!(w[1], 9);
    assert_eq!(w[2], 0x0002_0000);

    let decoded: (FullPtr<Variant>, u32, FullPtr<Variant>) = decode(&bytes, NdrContext::new()).unwrap();
    assert!(decoded.0.ptr_eq(&decoded.2));
    assert_eq!(decoded, msg);
    assert_eq!(encode_le(&decoded), bytes);
}

#[test]
fn test_full_pointer_alias_inside_array() {
    init_tracing();
    let a = FullPtr::new(7u64);
    let b = FullPtr::new(7u64);
    let arr = ConformantArray::new(vec![a.clone(), b.clone(), a, FullPtr::null(), b]);
    let bytes = encode_le(&arr);
    assert_eq!(
        &words(&bytes)[..6],
        &[5, 0x0002_0000, 0x0002_0004, 0x0002_0000, 0, 0x0002_0004]
    );

    let decoded: ConformantArray<FullPtr<u64>> = decode(&bytes, NdrContext::new()).unwrap();
    let e = &decoded.elements;
    assert!(e[0].ptr_eq(&e[2]));
    assert!(e[1].ptr_eq(&e[4]));
    assert!(!e[0].ptr_eq(&e[1]));
    assert_eq!(encode_le(&decoded), bytes);
}

#[test]
fn test_conformance_precedes_data_behind_two_pointers() {
    init_tracing();
    let msg = (1u8, UniquePtr::new(UniquePtr::new(ConformantArray::new(vec![10u16, 20, 30]))));
    let bytes = encode_le(&msg);
    assert_eq!(&words(&bytes)[..4], &[1, 0x0002_0000, 0x0002_0004, 3]);
    assert_eq!(&bytes[16..22], &[10, 0, 20, 0, 30, 0]);

    let decoded: (u8, UniquePtr<UniquePtr<ConformantArray<u16>>>) = decode(&bytes, NdrContext::new()).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_conformant_varying_behind_pointer() {
    let arr = ConformantVaryingArray::with_max(8, vec![3u16, 4]);
    let msg = (UniquePtr::new(arr), UniquePtr::new(NdrWString::new("tail")), UniquePtr::<u32>::null());
    let bytes = encode_le(&msg);
    assert_eq!(&words(&bytes)[3..6], &[8, 0, 2]);
    let decoded: (UniquePtr<ConformantVaryingArray<u16>>, UniquePtr<NdrWString>, UniquePtr<u32>) =
        decode(&bytes, NdrContext::new()).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_hostile_count_is_rejected_early() {
    // one conformance word announcing 16M u64 elements, nothing after it
    let bytes = 0x00FF_FFFFu32.to_le_bytes();
    let err = decode::<ConformantArray<u64>>(&bytes, NdrContext::new()).unwrap_err();
    assert!(matches!(err, NdrError::MalformedLength { .. }));

    // a tighter allocation limit trips before the buffer check
    let mut bytes = vec![0u8; 64];
    bytes[..4].copy_from_slice(&8u32.to_le_bytes());
    let ctx = NdrContext::new().with_max_allocation(16);
    let err = decode::<ConformantArray<u64>>(&bytes, ctx).unwrap_err();
    assert!(matches!(err, NdrError::MalformedLength { needed: 64, .. }));
}

#[test]
fn test_variant_referent_ids_continue_across_message() {
    let msg = (UniquePtr::new(Variant::from("a")), UniquePtr::new(Variant::from("b")));
    let w = words(&encode_le(&msg));
    // two outer pointers, then each variant's BSTR referent in order
    assert_eq!(&w[..2], &[0x0002_0000, 0x0002_0004]);
    assert!(w.contains(&0x0002_0008));
    assert!(w.contains(&0x0002_000C));
}
