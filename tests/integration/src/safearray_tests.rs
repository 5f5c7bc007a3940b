//! SAFEARRAY wire tests
//!
//! Covers:
//! - 1-D and multi-dimensional scalar arrays with lower bounds
//! - interface arrays with an explicit IID
//! - record and string arrays with null entries
//! - element type refinement through the enclosing VARIANT
//! - structural violations

use bytes::Bytes;
use integration_tests::{encode_le, init_tracing, roundtrip, words};
use midl_ndr::{decode, NdrContext, NdrError, NdrUuid};
use oaut::*;

fn unwrap_array(v: &Variant) -> &SafeArray {
    match v.value() {
        VariantValue::Array(Some(sa)) => sa,
        other => panic!("not an array: {other:?}"),
    }
}

#[test]
fn test_i4_vector_with_lower_bound() {
    init_tracing();
    let sa = SafeArray::vector(VT_I4, 0, SafeArrayData::DWord(vec![1, 2, 3])).unwrap();
    let decoded = roundtrip(&sa);
    assert_eq!(decoded.bounds(), &[SafeArrayBound::new(3, 0)]);
    assert_eq!(decoded.as_i32s(), Some(vec![1, 2, 3]));

    let v = Variant::from(SafeArray::from_i32s(-7, &[1, 2, 3]).unwrap());
    let decoded = roundtrip(&v);
    assert_eq!(decoded, v);
    assert_eq!(unwrap_array(&decoded).bounds()[0].lower_bound, -7);
}

#[test]
fn test_three_dimensional_doubles() {
    init_tracing();
    let values: Vec<f64> = (0..24).map(|i| f64::from(i) * 0.5).collect();
    let bounds = vec![
        SafeArrayBound::new(2, 0),
        SafeArrayBound::new(3, 1),
        SafeArrayBound::new(4, -1),
    ];
    let raw = SafeArrayData::Hyper(values.iter().map(|v| v.to_bits()).collect());
    let sa = SafeArray::new(VT_R8, bounds.clone(), raw).unwrap();
    assert_eq!(sa.dims(), 3);

    let decoded = roundtrip(&Variant::from(sa));
    let decoded = unwrap_array(&decoded);
    assert_eq!(decoded.bounds(), &bounds[..]);
    assert_eq!(decoded.element_type(), VarType(VT_R8));
    assert_eq!(decoded.as_f64s(), Some(values));
}

#[test]
fn test_bool_and_unsigned_arrays_keep_their_type() {
    let flags = Variant::from(SafeArray::from_bools(0, &[true, false, true]).unwrap());
    assert_eq!(unwrap_array(&roundtrip(&flags)).as_bools(), Some(vec![true, false, true]));

    let bytes = Variant::from(SafeArray::from_u8s(0, b"abc").unwrap());
    assert_eq!(unwrap_array(&roundtrip(&bytes)).as_u8s(), Some(b"abc".to_vec()));

    let big = Variant::from(SafeArray::from_u64s(0, &[u64::MAX, 1]).unwrap());
    assert_eq!(unwrap_array(&roundtrip(&big)).as_u64s(), Some(vec![u64::MAX, 1]));
}

#[test]
fn test_have_iid_interface_array() {
    init_tracing();
    let iid = NdrUuid::parse("00020400-0000-0000-c000-000000000046").unwrap();
    let items = vec![Some(InterfacePointer::new(vec![1u8, 2, 3])), None];
    let sa = SafeArray::vector(VT_DISPATCH, 0, SafeArrayData::HaveIid { iid, items }).unwrap();
    assert_eq!(sa.features(), fadf::DISPATCH | fadf::HAVEIID);

    let bytes = encode_le(&sa);
    assert_eq!(words(&bytes)[4], SF_HAVEIID);

    let decoded = roundtrip(&sa);
    assert_eq!(decoded, sa);
    assert_eq!(decoded.element_type(), VarType(VT_DISPATCH));
    match decoded.data() {
        SafeArrayData::HaveIid { iid: got, items } => {
            assert_eq!(*got, iid);
            assert_eq!(items.len(), 2);
            assert!(items[1].is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_record_array() {
    init_tracing();
    let rec = Record::new(0, None, Some(Bytes::from_static(b"payload")));
    let sa = SafeArray::vector(VT_RECORD, 0, SafeArrayData::Record(vec![Some(rec), None])).unwrap();
    assert_eq!(sa.features(), fadf::RECORD);
    let v = Variant::from(sa);
    assert_eq!(roundtrip(&v), v);
}

#[test]
fn test_string_array_with_nulls() {
    let values = vec![Some("alpha".to_string()), None, Some(String::new()), Some("ω".to_string())];
    let sa = SafeArray::from_strings(1, values.clone()).unwrap();
    let decoded = roundtrip(&sa);
    assert_eq!(decoded.as_strings(), Some(&values[..]));
}

#[test]
fn test_empty_array() {
    let sa = SafeArray::from_i32s(0, &[]).unwrap();
    assert!(sa.is_empty());
    assert_eq!(roundtrip(&sa), sa);
}

#[test]
fn test_construction_checks() {
    assert!(SafeArray::new(VT_I4, vec![], SafeArrayData::DWord(vec![])).is_err());
    assert!(SafeArray::new(
        VT_I4,
        vec![SafeArrayBound::new(2, 0), SafeArrayBound::new(2, 0)],
        SafeArrayData::DWord(vec![1, 2, 3])
    )
    .is_err());
    assert!(SafeArray::vector(VT_BSTR, 0, SafeArrayData::DWord(vec![1])).is_err());
    assert!(SafeArray::vector(VT_I8, 0, SafeArrayData::DWord(vec![1])).is_err());
    assert!(!is_element_type(VT_DECIMAL));
    assert!(is_element_type(VT_CY));
}

#[test]
fn test_incompatible_variant_tag() {
    init_tracing();
    let mut bytes = encode_le(&Variant::from(SafeArray::from_i32s(0, &[5]).unwrap())).to_vec();
    bytes[6..8].copy_from_slice(&(VT_BSTR | VT_ARRAY).to_le_bytes());
    let err = decode::<Variant>(&bytes, NdrContext::new()).unwrap_err();
    assert!(matches!(err, NdrError::ProtocolViolation(_)));

    // a refinement within the same arm is accepted
    bytes[6..8].copy_from_slice(&(VT_UI4 | VT_ARRAY).to_le_bytes());
    let v = decode::<Variant>(&bytes, NdrContext::new()).unwrap();
    assert_eq!(unwrap_array(&v).as_u32s(), Some(vec![5]));
}

#[test]
fn test_truncated_element_data() {
    let bytes = encode_le(&SafeArray::from_i64s(0, &[1, 2, 3, 4]).unwrap());
    let err = decode::<SafeArray>(&bytes[..bytes.len() - 4], NdrContext::new()).unwrap_err();
    assert!(matches!(err, NdrError::MalformedLength { .. }));
}
