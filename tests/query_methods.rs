//! Item methods: type inspection, numeric casts, string conversion and
//! `.keyvalue()`.

use jsonb_path::{parse_path, path_query, ErrorCode, EvalOptions, Jsonb, JsonbVars};
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

fn err(input: Value, path: &str) -> ErrorCode {
    query(input, path).unwrap_err().code
}

#[rstest]
#[case(json!(null), json!("null"))]
#[case(json!(true), json!("boolean"))]
#[case(json!(1.5), json!("number"))]
#[case(json!("s"), json!("string"))]
#[case(json!([1]), json!("array"))]
#[case(json!({"k": 1}), json!("object"))]
fn type_names_are_exact(#[case] input: Value, #[case] expected: Value) {
    assert_eq!(ok(input, "$.type()"), vec![expected]);
}

#[rstest]
fn abs_floor_ceiling() {
    let d = json!({"n": -1.7});
    assert_eq!(ok(d.clone(), "$.n.abs()"), vec![json!(1.7)]);
    assert_eq!(ok(d.clone(), "$.n.floor()"), vec![json!(-2)]);
    assert_eq!(ok(d.clone(), "$.n.ceiling()"), vec![json!(-1)]);
    assert_eq!(err(json!({"n": "x"}), "$.n.abs()"), ErrorCode::NonNumericItem);
}

#[rstest]
fn double_accepts_numerics_and_numeric_strings() {
    assert_eq!(ok(json!({"v": 1.5}), "$.v.double()"), vec![json!(1.5)]);
    assert_eq!(ok(json!({"v": "2.5e1"}), "$.v.double()"), vec![json!(25)]);
    assert_eq!(err(json!({"v": "abc"}), "$.v.double()"), ErrorCode::NonNumericItem);
    assert_eq!(err(json!({"v": "inf"}), "$.v.double()"), ErrorCode::NonNumericItem);
    assert_eq!(err(json!({"v": "NaN"}), "$.v.double()"), ErrorCode::NonNumericItem);
    assert_eq!(err(json!({"v": true}), "$.v.double()"), ErrorCode::NonNumericItem);
}

#[rstest]
fn integer_and_bigint_round_numerics() {
    assert_eq!(ok(json!({"v": 1.5}), "$.v.integer()"), vec![json!(2)]);
    assert_eq!(ok(json!({"v": -1.5}), "$.v.integer()"), vec![json!(-2)]);
    assert_eq!(ok(json!({"v": "123"}), "$.v.integer()"), vec![json!(123)]);
    assert_eq!(
        ok(json!({"v": "9007199254740993"}), "$.v.bigint()"),
        vec![json!(9007199254740993i64)]
    );
    // The lexical form must be an integer.
    assert_eq!(err(json!({"v": "1.5"}), "$.v.integer()"), ErrorCode::NonNumericItem);
    // Out of the 32-bit range.
    assert_eq!(
        err(json!({"v": 3000000000i64}), "$.v.integer()"),
        ErrorCode::NonNumericItem
    );
}

#[rstest]
fn boolean_accepts_the_usual_spellings() {
    for truthy in ["true", "t", "yes", "on", "1"] {
        assert_eq!(ok(json!({"v": truthy}), "$.v.boolean()"), vec![json!(true)]);
    }
    for falsy in ["false", "f", "no", "off", "0"] {
        assert_eq!(ok(json!({"v": falsy}), "$.v.boolean()"), vec![json!(false)]);
    }
    assert_eq!(ok(json!({"v": 2}), "$.v.boolean()"), vec![json!(true)]);
    assert_eq!(ok(json!({"v": 0}), "$.v.boolean()"), vec![json!(false)]);
    assert_eq!(ok(json!({"v": true}), "$.v.boolean()"), vec![json!(true)]);
    assert_eq!(err(json!({"v": 1.5}), "$.v.boolean()"), ErrorCode::NonNumericItem);
    assert_eq!(err(json!({"v": "maybe"}), "$.v.boolean()"), ErrorCode::NonNumericItem);
}

#[rstest]
fn number_and_decimal_parse_strings() {
    assert_eq!(ok(json!({"v": "1e2"}), "$.v.number()"), vec![json!(100)]);
    assert_eq!(ok(json!({"v": "-0.5"}), "$.v.decimal()"), vec![json!(-0.5)]);
    assert_eq!(err(json!({"v": "one"}), "$.v.number()"), ErrorCode::NonNumericItem);
}

#[rstest]
fn decimal_applies_precision_and_scale() {
    assert_eq!(
        ok(json!({"v": "123.456"}), "$.v.decimal(5, 2)"),
        vec![json!(123.46)]
    );
    assert_eq!(ok(json!({"v": 12.5}), "$.v.decimal(3)"), vec![json!(13)]);
    assert_eq!(
        err(json!({"v": 12345.6}), "$.v.decimal(4, 1)"),
        ErrorCode::NumericOutOfRange
    );
}

#[rstest]
fn string_converts_scalars() {
    assert_eq!(ok(json!({"v": 1.5}), "$.v.string()"), vec![json!("1.5")]);
    assert_eq!(ok(json!({"v": true}), "$.v.string()"), vec![json!("true")]);
    assert_eq!(ok(json!({"v": "as-is"}), "$.v.string()"), vec![json!("as-is")]);
    assert_eq!(err(json!({"v": null}), "$.v.string()"), ErrorCode::NonNumericItem);
    assert_eq!(err(json!({"v": [1]}), "$.v.string()"), ErrorCode::NonNumericItem);
}

#[rstest]
fn keyvalue_emits_key_value_id_objects() {
    let d = json!({"b": 2, "a": 1});
    assert_eq!(
        ok(d.clone(), "$.keyvalue()"),
        vec![
            json!({"id": 0, "key": "a", "value": 1}),
            json!({"id": 0, "key": "b", "value": 2}),
        ]
    );
    assert_eq!(ok(d, "$.keyvalue().key"), vec![json!("a"), json!("b")]);
}

#[rstest]
fn keyvalue_ids_distinguish_source_objects() {
    let d = json!([{"x": 1}, {"y": 2}]);
    let ids = ok(d, "$[*].keyvalue().id");
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    for id in ids {
        let n = id.as_i64().unwrap();
        // Root-based objects: base id 0, offset below the id step.
        assert!(n > 0 && n < 10_000_000_000);
    }
}

#[rstest]
fn keyvalue_ids_for_variables_use_the_variable_base() {
    let d = Jsonb::try_from(json!({})).unwrap();
    let vars_doc = Jsonb::try_from(json!({"x": {"k": "v"}})).unwrap();
    let vars = JsonbVars::new(&vars_doc).unwrap();
    let p = parse_path("$x.keyvalue().id").unwrap();
    let found = path_query(&d, &p, &vars, &EvalOptions::default()).unwrap();
    let id = found[0].to_json().as_i64().unwrap();
    assert_eq!(id, 10_000_000_001);
}

#[rstest]
fn keyvalue_requires_an_object() {
    assert_eq!(err(json!([1, 2]), "strict $.keyvalue()"), ErrorCode::ObjectNotFound);
    assert_eq!(ok(json!({}), "$.keyvalue()"), Vec::<Value>::new());
}

#[rstest]
fn keyvalue_products_are_fresh_base_objects() {
    // Chained .keyvalue() mints ids from the generated-object counter.
    let d = json!({"o": {"k": 1}});
    let ids = ok(d, "$.o.keyvalue().keyvalue() ? (@.key == \"id\").value");
    assert_eq!(ids.len(), 1);
}

#[rstest]
fn methods_unwrap_arrays_in_lax() {
    let d = json!({"a": ["1", "2"]});
    assert_eq!(ok(d, "$.a.integer()"), vec![json!(1), json!(2)]);
}
