// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for the field coercion table: coercion must be total and
//! deterministic for arbitrary JSON input.

use proptest::prelude::*;
use skb_core::{FieldType, FieldValue, coerce};

/// Arbitrary JSON values a vendor payload could contain.
fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        // finite floats only; NaN cannot appear in JSON
        (-1e12f64..1e12f64).prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 |:.-]{0,24}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4).prop_map(|m| {
                serde_json::Value::Object(m.into_iter().collect())
            }),
        ]
    })
}

fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop::sample::select(FieldType::ALL.to_vec())
}

proptest! {
    /// No input shape may panic, for any declared field type.
    #[test]
    fn coercion_is_total(ft in arb_field_type(), raw in arb_json()) {
        let _ = coerce(ft, &raw);
    }

    /// Same input always yields identical canonical output.
    #[test]
    fn coercion_is_deterministic(ft in arb_field_type(), raw in arb_json()) {
        prop_assert_eq!(coerce(ft, &raw), coerce(ft, &raw));
    }

    /// Booleans always come out as booleans, whatever the input shape.
    #[test]
    fn boolean_output_is_always_boolean(raw in arb_json()) {
        prop_assert!(matches!(coerce(FieldType::Boolean, &raw), FieldValue::Boolean(_)));
    }

    /// Text coercion of any scalar yields Text, and null yields empty Text.
    #[test]
    fn string_scalars_become_text(s in "[a-zA-Z0-9 ]{0,16}") {
        let v = coerce(FieldType::String, &serde_json::Value::String(s.clone()));
        prop_assert_eq!(v, FieldValue::Text(s));
    }
}
