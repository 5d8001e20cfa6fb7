use analytica_cache::SemanticFingerprint;
use proptest::prelude::*;
use serde_json::{json, Value};

fn json_strategy() -> impl Strategy<Value = Value> {
    let scalar = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 .!]{0,80}".prop_map(Value::from),
    ];
    scalar.prop_recursive(3, 32, 8, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,8}", inner, 0..8)
                .prop_map(|m| json!(m)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn similarity_is_bounded_and_symmetric(a in json_strategy(), b in json_strategy()) {
        let fa = SemanticFingerprint::for_json(&a);
        let fb = SemanticFingerprint::for_json(&b);
        let ab = fa.similarity(&fb);
        let ba = fb.similarity(&fa);
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn identical_values_are_fully_similar(a in json_strategy()) {
        let fp = SemanticFingerprint::for_json(&a);
        prop_assert!((fp.similarity(&fp) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn different_kinds_never_match(text in "[a-z ]{1,40}", n in any::<i64>()) {
        let a = SemanticFingerprint::for_json(&Value::from(text));
        let b = SemanticFingerprint::for_json(&Value::from(n));
        prop_assert_eq!(a.similarity(&b), 0.0);
    }
}
