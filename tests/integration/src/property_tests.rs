//! Property tests
//!
//! Covers:
//! - natural alignment of scalars following a single byte
//! - scalar and string VARIANTs survive a round trip with a consistent size word
//! - SAFEARRAY vectors of arbitrary length and lower bound

use integration_tests::{encode_le, roundtrip, words};
use oaut::{SafeArray, Variant, VariantValue};
use proptest::prelude::*;

fn scalar_variant() -> impl Strategy<Value = Variant> {
    prop_oneof![
        any::<i8>().prop_map(Variant::from),
        any::<u8>().prop_map(Variant::from),
        any::<i16>().prop_map(Variant::from),
        any::<u16>().prop_map(Variant::from),
        any::<i32>().prop_map(Variant::from),
        any::<u32>().prop_map(Variant::from),
        any::<i64>().prop_map(Variant::from),
        any::<u64>().prop_map(Variant::from),
        (-1.0e30f32..1.0e30).prop_map(Variant::from),
        (-1.0e300f64..1.0e300).prop_map(Variant::from),
        any::<bool>().prop_map(Variant::from),
        ".{0,40}".prop_map(|s: String| Variant::from(s)),
    ]
}

proptest! {
    #[test]
    fn scalars_follow_natural_alignment(a in any::<u8>(), b in any::<u16>(), c in any::<u32>(), d in any::<u64>()) {
        let bytes = encode_le(&(a, d));
        prop_assert_eq!(bytes.len(), 16);
        prop_assert_eq!(&bytes[8..16], &d.to_le_bytes()[..]);

        let bytes = encode_le(&(a, b, c));
        prop_assert_eq!(bytes.len(), 8);
        prop_assert_eq!(&bytes[2..4], &b.to_le_bytes()[..]);
        prop_assert_eq!(&bytes[4..8], &c.to_le_bytes()[..]);
    }

    #[test]
    fn scalar_variants_roundtrip(v in scalar_variant()) {
        let bytes = encode_le(&v);
        prop_assert_eq!(bytes.len() % 8, 0);
        prop_assert_eq!(words(&bytes)[0] as usize * 8, bytes.len());
        prop_assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn byref_scalars_share_payload(v in scalar_variant()) {
        prop_assume!(!matches!(v.value(), VariantValue::Bstr(_)));
        let by = Variant::byref(v.value().clone()).unwrap();
        prop_assert_eq!(&encode_le(&by)[8..], &encode_le(&v)[8..]);
        prop_assert_eq!(roundtrip(&by), by);
    }

    #[test]
    fn i32_vectors_roundtrip(lower in -1000i32..1000, values in proptest::collection::vec(any::<i32>(), 0..64)) {
        let v = Variant::from(SafeArray::from_i32s(lower, &values).unwrap());
        let decoded = roundtrip(&v);
        match decoded.value() {
            VariantValue::Array(Some(sa)) => {
                prop_assert_eq!(sa.bounds()[0].lower_bound, lower);
                prop_assert_eq!(sa.as_i32s(), Some(values));
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
