//! VARIANT wire tests
//!
//! Covers:
//! - exact layout of scalar variants
//! - variants behind NDR pointers and inside SAFEARRAYs
//! - every BYREF flavour, inline and pointer-wrapped
//! - records with a type identity
//! - nesting limits and unknown tags

use bytes::Bytes;
use integration_tests::{encode_le, init_tracing, roundtrip, words};
use midl_ndr::{decode, NdrContext, NdrError, UniquePtr, DEFAULT_MAX_DEPTH};
use oaut::*;

fn identity() -> RecordIdentity {
    RecordIdentity {
        library: midl_ndr::NdrUuid::parse("{6e2b1c37-08a5-4c41-b1d6-3a9f0e7d5c21}").unwrap(),
        major_version: 2,
        minor_version: 0,
        lcid: 0x0409,
        type_info: midl_ndr::NdrUuid::parse("9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d").unwrap(),
    }
}

#[test]
fn test_ui4_layout() {
    init_tracing();
    let v = Variant::from(42u32);
    let bytes = encode_le(&v);
    assert_eq!(words(&bytes), vec![2, u32::from(VT_UI4) << 16, 42, 0]);
    assert_eq!(roundtrip(&v), v);
}

#[test]
fn test_variant_behind_unique_pointer() {
    init_tracing();
    let msg = (7u32, UniquePtr::new(Variant::from(42u32)));
    let bytes = encode_le(&msg);
    assert_eq!(
        words(&bytes),
        vec![7, 0x0002_0000, 2, u32::from(VT_UI4) << 16, 42, 0]
    );
    assert_eq!(roundtrip(&msg), msg);
}

#[test]
fn test_cl_size_covers_pointees() {
    for v in [
        Variant::from("hello world"),
        Variant::from(SafeArray::from_strings(0, vec![Some("a".into()), None, Some("ccc".into())]).unwrap()),
        Variant::byref(VariantValue::Bstr(Some("byref".into()))).unwrap(),
    ] {
        let bytes = encode_le(&v);
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(words(&bytes)[0] as usize * 8, bytes.len(), "{}", v.vt());
    }
}

#[test]
fn test_every_inline_byref_scalar() {
    init_tracing();
    let values = [
        VariantValue::I1(-1),
        VariantValue::UI1(1),
        VariantValue::I2(-2),
        VariantValue::UI2(2),
        VariantValue::I4(-4),
        VariantValue::UI4(4),
        VariantValue::I8(-8),
        VariantValue::UI8(8),
        VariantValue::Int(-16),
        VariantValue::UInt(16),
        VariantValue::R4(0.25),
        VariantValue::R8(-0.5),
        VariantValue::Bool(true),
        VariantValue::Error(0x8002_0009),
        VariantValue::Date(36526.5),
        VariantValue::Currency(Currency(-12_3400)),
        VariantValue::Decimal(Decimal::new(1_000_000_007, 3, true).unwrap()),
    ];
    for value in values {
        let plain = Variant::new(value.clone()).unwrap();
        let by = Variant::byref(value).unwrap();
        assert!(by.is_byref());
        assert_eq!(by.vt(), plain.vt().with_byref());
        // same payload bytes, only the tag differs
        let (a, b) = (encode_le(&plain), encode_le(&by));
        assert_eq!(a.len(), b.len(), "{}", by.vt());
        assert_eq!(&a[8..], &b[8..]);
        assert_eq!(roundtrip(&by), by);
    }
}

#[test]
fn test_pointer_byref_arms() {
    init_tracing();
    let ip = InterfacePointer::new(vec![0x4D, 0x45, 0x4F, 0x57, 1, 0, 0, 0]);
    let cases = [
        Variant::byref(VariantValue::Bstr(Some("text".into()))).unwrap(),
        Variant::byref(VariantValue::Bstr(None)).unwrap(),
        Variant::byref(VariantValue::Unknown(Some(ip.clone()))).unwrap(),
        Variant::byref(VariantValue::Dispatch(Some(ip))).unwrap(),
        Variant::byref(VariantValue::Array(Some(SafeArray::from_u16s(1, &[9, 8]).unwrap()))).unwrap(),
        Variant::with_type(VT_DISPATCH | VT_BYREF, VariantValue::Ref(None)).unwrap(),
    ];
    for v in cases {
        assert_eq!(roundtrip(&v), v, "{}", v.vt());
    }
}

#[test]
fn test_byref_bstr_null_inner_pointer() {
    let v = Variant::byref(VariantValue::Bstr(None)).unwrap();
    let bytes = encode_le(&v);
    // outer referent, then a null inner referent
    assert_eq!(&words(&bytes)[2..4], &[0x0002_0000, 0]);
}

#[test]
fn test_variant_array_of_mixed_variants() {
    init_tracing();
    let inner = SafeArray::from_i64s(-2, &[i64::MIN, 0, i64::MAX]).unwrap();
    let items = vec![
        Variant::from(1u8),
        Variant::from("two"),
        Variant::null(),
        Variant::from(inner),
        Variant::byref(VariantValue::Bstr(Some("five".into()))).unwrap(),
        Variant::empty(),
    ];
    let v = Variant::from(SafeArray::from_variants(0, items.clone()).unwrap());
    assert_eq!(v.vt(), VarType(VT_VARIANT | VT_ARRAY));

    let decoded = roundtrip(&v);
    assert_eq!(decoded, v);
    match decoded.value() {
        VariantValue::Array(Some(sa)) => assert_eq!(sa.as_variants(), Some(&items[..])),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_record_identity_survives() {
    init_tracing();
    let info = InterfacePointer::record_info(&identity());
    let record = Record::new(0, Some(info), Some(Bytes::from_static(&[1, 2, 3, 4, 5])));
    let v = Variant::new(VariantValue::Record(Some(record))).unwrap();
    assert_eq!(v.vt(), VarType(VT_RECORD));

    let decoded = roundtrip(&v);
    assert_eq!(decoded, v);
    match decoded.value() {
        VariantValue::Record(Some(rec)) => {
            assert_eq!(rec.identity(), Some(identity()));
            assert_eq!(rec.data().map(|d| &d[..]), Some(&[1u8, 2, 3, 4, 5][..]));
        }
        other => panic!("unexpected {other:?}"),
    }

    let by = Variant::byref(decoded.into_value()).unwrap();
    assert_eq!(by.vt(), VarType(VT_RECORD | VT_BYREF));
    assert_eq!(roundtrip(&by), by);
}

#[test]
fn test_nesting_past_default_limit() {
    init_tracing();
    let mut v = Variant::from(0u32);
    for _ in 0..DEFAULT_MAX_DEPTH {
        v = Variant::byref(VariantValue::Variant(Some(Box::new(v)))).unwrap();
    }
    let bytes = encode_le(&v);
    let err = decode::<Variant>(&bytes, NdrContext::new()).unwrap_err();
    assert!(matches!(err, NdrError::ProtocolViolation(_)));
    assert!(decode::<Variant>(&bytes, NdrContext::new().with_max_depth(4 * DEFAULT_MAX_DEPTH)).is_ok());
}

#[test]
fn test_unsupported_tags() {
    // VT_LPWSTR never appears in a wire VARIANT
    let bytes = [1u8, 0, 0, 0, 0, 0, 0x1F, 0];
    let err = decode::<Variant>(&bytes, NdrContext::new()).unwrap_err();
    assert!(err.is_unsupported());

    // array of DECIMAL has no SAFEARRAY arm
    let tag = (VT_DECIMAL | VT_ARRAY).to_le_bytes();
    let bytes = [2u8, 0, 0, 0, 0, 0, tag[0], tag[1], 0, 0, 0, 0, 0, 0, 0, 0];
    match decode::<Variant>(&bytes, NdrContext::new()).unwrap_err() {
        NdrError::UnsupportedDiscriminant { context, value } => {
            assert_eq!(context, "SAFEARRAY element type");
            assert_eq!(value, u32::from(VT_DECIMAL));
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn test_variant_in_conformant_array() {
    let items = midl_ndr::ConformantArray::new(vec![Variant::from(1.5f64), Variant::from("x"), Variant::from(true)]);
    assert_eq!(roundtrip(&items), items);
}
