use jsonb_path::{execute_path, parse_path, path_query, ErrorCode, EvalOptions, ExecStatus, Jsonb};
use rstest::rstest;
use serde_json::{json, Value};

fn query(input: Value, path: &str) -> Result<Vec<Value>, jsonb_path::Error> {
    let d = Jsonb::try_from(input).unwrap();
    let p = parse_path(path).unwrap();
    path_query(&d, &p, &(), &EvalOptions::default())
        .map(|vs| vs.iter().map(|v| v.to_json()).collect())
}

fn ok(input: Value, path: &str) -> Vec<Value> {
    query(input, path).unwrap()
}

#[rstest]
#[case("1 + 2", json!(3))]
#[case("7 - 10", json!(-3))]
#[case("4 * 2.5", json!(10))]
#[case("9 / 4", json!(2.25))]
#[case("9 % 4", json!(1))]
#[case("-9 % 4", json!(-1))]
#[case("1 + 2 * 3", json!(7))]
#[case("(1 + 2) * 3", json!(9))]
fn literal_arithmetic(#[case] path: &str, #[case] expected: Value) {
    assert_eq!(ok(json!({}), path), vec![expected]);
}

#[rstest]
fn operands_come_from_paths() {
    let d = json!({"x": 19, "y": 4});
    assert_eq!(ok(d, "$.x % $.y"), vec![json!(3)]);
}

#[rstest]
fn binary_operands_are_unwrapped_singletons() {
    // A one-element array unwraps into a usable operand in lax mode.
    assert_eq!(ok(json!({"a": [5]}), "$.a + 1"), vec![json!(6)]);
}

#[rstest]
fn multi_element_operand_is_a_singleton_error() {
    let err = query(json!({"a": [1, 2]}), "$.a + 1").unwrap_err();
    assert_eq!(err.code, ErrorCode::SingletonRequired);
}

#[rstest]
fn non_numeric_operand_is_a_singleton_error() {
    for mode in ["", "strict "] {
        let err = query(
            json!({"a": [1, 2, 3]}),
            &format!("{mode}($.a[0] + \"x\")"),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::SingletonRequired);
        assert!(err.to_string().contains("right operand"));
    }
}

#[rstest]
fn suppressed_arithmetic_errors_yield_the_error_disposition() {
    let d = Jsonb::try_from(json!({"a": [1, 2, 3]})).unwrap();
    let p = parse_path("$.a[0] + \"x\"").unwrap();
    let (status, found) = execute_path(&d, &p, &(), &EvalOptions::silent()).unwrap();
    assert_eq!(status, ExecStatus::Error);
    assert!(found.is_empty());
}

#[rstest]
fn division_by_zero_is_suppressible() {
    let err = query(json!({}), "1 / 0").unwrap_err();
    assert_eq!(err.code, ErrorCode::DivisionByZero);

    let d = Jsonb::try_from(json!({})).unwrap();
    let p = parse_path("1 / 0").unwrap();
    let (status, _) = execute_path(&d, &p, &(), &EvalOptions::silent()).unwrap();
    assert_eq!(status, ExecStatus::Error);
}

#[rstest]
fn unary_minus_distributes_over_sequences() {
    let d = json!({"a": [1, -2, 3]});
    assert_eq!(
        ok(d, "-$.a[*]"),
        vec![json!(-1), json!(2), json!(-3)]
    );
}

#[rstest]
fn unary_plus_requires_numerics_when_collecting() {
    let err = query(json!({"a": ["x"]}), "+$.a[*]").unwrap_err();
    assert_eq!(err.code, ErrorCode::NumberNotFound);
}

#[rstest]
fn arithmetic_feeds_further_steps() {
    assert_eq!(ok(json!({}), "(1 + 2).type()"), vec![json!("number")]);
    assert_eq!(ok(json!({"a": [9]}), "($.a[0] - 4).string()"), vec![json!("5")]);
}
