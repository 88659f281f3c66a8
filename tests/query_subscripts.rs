use jsonb_path::{parse_path, path_query, ErrorCode, EvalOptions, Jsonb};
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

fn arr() -> Value {
    json!({"a": [10, 20, 30, 40]})
}

#[rstest]
#[case("$.a[0]", vec![json!(10)])]
#[case("$.a[3]", vec![json!(40)])]
#[case("$.a[1 to 2]", vec![json!(20), json!(30)])]
#[case("$.a[0, 2]", vec![json!(10), json!(30)])]
#[case("$.a[0, 2 to 3]", vec![json!(10), json!(30), json!(40)])]
fn plain_subscripts(#[case] path: &str, #[case] expected: Vec<Value>) {
    assert_eq!(ok(arr(), path), expected);
}

#[rstest]
fn last_binds_to_the_innermost_array() {
    assert_eq!(ok(arr(), "$.a[last]"), vec![json!(40)]);
    assert_eq!(ok(arr(), "$.a[last - 1]"), vec![json!(30)]);
    assert_eq!(
        ok(arr(), "$.a[last - 3 to last - 2]"),
        vec![json!(10), json!(20)]
    );
}

#[rstest]
fn subscript_expressions_truncate_to_integers() {
    assert_eq!(ok(arr(), "$.a[1.9]"), vec![json!(20)]);
    assert_eq!(ok(arr(), "$.a[0.5 + 0.6]"), vec![json!(20)]);
}

#[rstest]
fn out_of_bounds_is_clipped_in_lax() {
    assert_eq!(
        ok(json!({"a": [1, 2, 3]}), "$.a[1 to 10]"),
        vec![json!(2), json!(3)]
    );
    assert_eq!(ok(json!({"a": [1, 2, 3]}), "$.a[-2 to 0]"), vec![json!(1)]);
    assert_eq!(ok(json!({"a": [1, 2, 3]}), "$.a[5]"), Vec::<Value>::new());
}

#[rstest]
fn inverted_ranges_produce_nothing_in_lax() {
    assert_eq!(ok(json!({"a": [1, 2, 3]}), "$.a[2 to 1]"), Vec::<Value>::new());
}

#[rstest]
fn out_of_bounds_errors_in_strict() {
    let err = query(json!({"a": [1, 2, 3]}), "strict $.a[1 to 10]").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSubscript);
    let err = query(json!({"a": [1, 2, 3]}), "strict $.a[-1]").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSubscript);
}

#[rstest]
fn non_numeric_subscript_errors() {
    let err = query(arr(), "$.a[\"x\"]").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSubscript);
    let err = query(json!({"a": [1], "i": [0, 1]}), "$.a[$.i[*]]").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSubscript);
}

#[rstest]
fn lax_subscript_on_scalar_wraps_it() {
    assert_eq!(ok(json!({"a": 5}), "$.a[0]"), vec![json!(5)]);
    assert_eq!(ok(json!({"a": 5}), "$.a[last]"), vec![json!(5)]);
}

#[rstest]
fn strict_subscript_on_scalar_errors() {
    let err = query(json!({"a": 5}), "strict $.a[0]").unwrap_err();
    assert_eq!(err.code, ErrorCode::ArrayNotFound);
}

#[rstest]
fn nested_subscripts_rebind_last() {
    let d = json!({"a": [[1, 2], [3, 4, 5]]});
    assert_eq!(
        ok(d, "$.a[*][last]"),
        vec![json!(2), json!(5)]
    );
}
