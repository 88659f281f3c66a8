//! Public query surface: existence, match, first, array wrapping, the
//! value wrapper modes and suppression, plus the universal invariants.

use jsonb_path::{
    execute_path, parse_path, path_exists, path_match, path_query, path_query_array,
    path_query_first, path_value, ErrorCode, EvalOptions, ExecStatus, Jsonb, ValueResult, Wrapper,
};
use proptest::prelude::*;
use rstest::rstest;
use serde_json::{json, Value};

fn doc(v: Value) -> Jsonb {
    Jsonb::try_from(v).unwrap()
}

fn sample() -> Jsonb {
    doc(json!({"a": [1, 2, 3], "b": "xy", "c": null}))
}

#[rstest]
fn exists_reports_non_empty_results() {
    let opts = EvalOptions::default();
    let p = parse_path("$.a[*] ? (@ > 2)").unwrap();
    assert_eq!(path_exists(&sample(), &p, &(), &opts).unwrap(), Some(true));
    let p = parse_path("$.a[*] ? (@ > 9)").unwrap();
    assert_eq!(path_exists(&sample(), &p, &(), &opts).unwrap(), Some(false));
}

#[rstest]
fn exists_with_suppressed_error_is_none() {
    let p = parse_path("strict $.missing").unwrap();
    assert_eq!(
        path_exists(&sample(), &p, &(), &EvalOptions::silent()).unwrap(),
        None
    );
}

#[rstest]
fn strict_exists_drains_for_hidden_errors() {
    // The first element already matches, but strict mode keeps scanning
    // and hits the structural error on the second one.
    let d = doc(json!({"a": [{"x": 1}, 2]}));
    let p = parse_path("strict $.a[*].x").unwrap();
    assert_eq!(path_exists(&d, &p, &(), &EvalOptions::silent()).unwrap(), None);

    // Lax existence checking stops at the first hit instead.
    let p = parse_path("$.a[*].x").unwrap();
    assert_eq!(
        path_exists(&d, &p, &(), &EvalOptions::silent()).unwrap(),
        Some(true)
    );
}

#[rstest]
fn match_requires_a_single_boolean() {
    let opts = EvalOptions::default();
    let p = parse_path("$.a[*] > 2").unwrap();
    assert_eq!(path_match(&sample(), &p, &(), &opts).unwrap(), Some(true));
    let p = parse_path("$.b > 1").unwrap();
    assert_eq!(path_match(&sample(), &p, &(), &opts).unwrap(), None);

    let p = parse_path("$.a").unwrap();
    let err = path_match(&sample(), &p, &(), &opts).unwrap_err();
    assert_eq!(err.code, ErrorCode::SingleBooleanRequired);
    assert_eq!(
        path_match(&sample(), &p, &(), &EvalOptions::silent()).unwrap(),
        None
    );
}

#[rstest]
fn query_first_is_the_head_of_query() {
    let opts = EvalOptions::default();
    let p = parse_path("$.a[*]").unwrap();
    let all = path_query(&sample(), &p, &(), &opts).unwrap();
    let first = path_query_first(&sample(), &p, &(), &opts).unwrap();
    assert_eq!(first.as_ref(), all.first());

    let p = parse_path("$.missing").unwrap();
    assert_eq!(path_query_first(&sample(), &p, &(), &opts).unwrap(), None);
}

#[rstest]
fn query_array_wraps_the_result_sequence() {
    let p = parse_path("$.a[*] ? (@ >= 2)").unwrap();
    let arr = path_query_array(&sample(), &p, &(), &EvalOptions::default()).unwrap();
    assert_eq!(arr.to_json(), json!([2, 3]));
}

#[rstest]
fn value_wrapper_modes() {
    let opts = EvalOptions::default();
    let single = parse_path("$.a[0]").unwrap();
    let many = parse_path("$.a[*]").unwrap();
    let none = parse_path("$.missing").unwrap();

    match path_value(&sample(), &single, &(), Wrapper::None, &opts).unwrap() {
        ValueResult::Value(v) => assert_eq!(v.to_json(), json!(1)),
        other => panic!("expected a value, got {other:?}"),
    }
    assert_eq!(
        path_value(&sample(), &none, &(), Wrapper::None, &opts).unwrap(),
        ValueResult::Empty
    );
    match path_value(&sample(), &many, &(), Wrapper::Unconditional, &opts).unwrap() {
        ValueResult::Value(v) => assert_eq!(v.to_json(), json!([1, 2, 3])),
        other => panic!("expected a wrapped array, got {other:?}"),
    }
    match path_value(&sample(), &single, &(), Wrapper::Conditional, &opts).unwrap() {
        ValueResult::Value(v) => assert_eq!(v.to_json(), json!(1)),
        other => panic!("expected the bare value, got {other:?}"),
    }

    let err = path_value(&sample(), &many, &(), Wrapper::None, &opts).unwrap_err();
    assert_eq!(err.code, ErrorCode::MoreThanOneItem);
    assert_eq!(
        path_value(&sample(), &many, &(), Wrapper::None, &EvalOptions::silent()).unwrap(),
        ValueResult::Error
    );
}

#[rstest]
fn suppressed_failures_surface_as_the_error_disposition() {
    let p = parse_path("$.a[0] + \"x\"").unwrap();
    let (status, found) = execute_path(&sample(), &p, &(), &EvalOptions::silent()).unwrap();
    assert_eq!(status, ExecStatus::Error);
    assert!(found.is_empty());

    let p = parse_path("strict $.missing").unwrap();
    match path_value(&sample(), &p, &(), Wrapper::None, &EvalOptions::silent()).unwrap() {
        ValueResult::Error => {}
        other => panic!("expected the error outcome, got {other:?}"),
    }
}

#[rstest]
fn evaluation_depth_is_bounded() {
    let mut path = String::from("$");
    for _ in 0..2000 {
        path.push_str("[0]");
    }
    let p = parse_path(&path).unwrap();
    let d = doc(json!([[1]]));
    let err = path_query(&d, &p, &(), &EvalOptions::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::StackDepthExceeded);
}

proptest! {
    #[test]
    fn exists_agrees_with_query(values in prop::collection::vec(-50i64..50, 0..8)) {
        let d = doc(json!(values));
        let opts = EvalOptions::default();
        for text in ["$[*]", "$[*] ? (@ > 10)", "$[*] ? (@ < -10)"] {
            let p = parse_path(text).unwrap();
            let found = path_query(&d, &p, &(), &opts).unwrap();
            let exists = path_exists(&d, &p, &(), &opts).unwrap();
            prop_assert_eq!(exists, Some(!found.is_empty()));
        }
    }

    #[test]
    fn evaluation_is_deterministic(values in prop::collection::vec(-50i64..50, 0..8)) {
        let d = doc(json!({"a": values}));
        let opts = EvalOptions::default();
        let p = parse_path("$.a[*] ? (@ >= 0)").unwrap();
        let one: Vec<_> = path_query(&d, &p, &(), &opts).unwrap();
        let two: Vec<_> = path_query(&d, &p, &(), &opts).unwrap();
        prop_assert_eq!(one, two);
    }

    #[test]
    fn lax_unwrap_flattens_elementwise(values in prop::collection::vec(0i64..100, 1..6)) {
        // P applied to an array in lax equals flatten(P per element) for
        // auto-unwrapping operators.
        let d = doc(json!({"a": values.clone()}));
        let opts = EvalOptions::default();
        let whole = path_query(&d, &parse_path("$.a.string()").unwrap(), &(), &opts).unwrap();
        let mut parts = Vec::new();
        for i in 0..values.len() {
            let p = parse_path(&format!("$.a[{i}].string()")).unwrap();
            parts.extend(path_query(&d, &p, &(), &opts).unwrap());
        }
        prop_assert_eq!(whole, parts);
    }
}
