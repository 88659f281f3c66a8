use jsonb_path::{parse_path, path_query, ErrorCode, EvalOptions, Jsonb, JsonbVars};
use rstest::rstest;
use serde_json::{json, Value};

fn doc(v: Value) -> Jsonb {
    Jsonb::try_from(v).unwrap()
}

fn query(input: Value, path: &str) -> Vec<Value> {
    let d = doc(input);
    let p = parse_path(path).unwrap();
    path_query(&d, &p, &(), &EvalOptions::default())
        .unwrap()
        .iter()
        .map(|v| v.to_json())
        .collect()
}

#[rstest]
fn root_returns_the_document() {
    assert_eq!(query(json!({"a": 1}), "$"), vec![json!({"a": 1})]);
    assert_eq!(query(json!([1, 2]), "$"), vec![json!([1, 2])]);
    assert_eq!(query(json!(42), "$"), vec![json!(42)]);
}

#[rstest]
fn member_access() {
    let d = json!({"a": {"b": {"c": "deep"}}});
    assert_eq!(query(d.clone(), "$.a.b.c"), vec![json!("deep")]);
    assert_eq!(query(d, "$.a.b"), vec![json!({"c": "deep"})]);
}

#[rstest]
fn quoted_member_access() {
    let d = json!({"odd key": 1, "\"q\"": 2});
    assert_eq!(query(d.clone(), "$.\"odd key\""), vec![json!(1)]);
    assert_eq!(query(d, "$.\"\\\"q\\\"\""), vec![json!(2)]);
}

#[rstest]
fn missing_member_in_lax_is_empty() {
    assert_eq!(query(json!({"a": 1}), "$.nope"), Vec::<Value>::new());
}

#[rstest]
fn wildcard_member_enumerates_in_key_order() {
    // The binary format orders object keys by length, then bytewise.
    let d = json!({"bb": 2, "a": 1, "cc": 3});
    assert_eq!(query(d, "$.*"), vec![json!(1), json!(2), json!(3)]);
}

#[rstest]
fn wildcard_array_iterates_in_order() {
    assert_eq!(
        query(json!([1, "x", null]), "$[*]"),
        vec![json!(1), json!("x"), json!(null)]
    );
}

#[rstest]
fn literals_evaluate_to_themselves() {
    assert_eq!(query(json!({}), "1"), vec![json!(1)]);
    assert_eq!(query(json!({}), "-2.5"), vec![json!(-2.5)]);
    assert_eq!(query(json!({}), "\"txt\""), vec![json!("txt")]);
    assert_eq!(query(json!({}), "true"), vec![json!(true)]);
    assert_eq!(query(json!({}), "null"), vec![json!(null)]);
}

#[rstest]
fn any_depth_visits_parents_before_children() {
    let d = json!({"a": {"b": 1}});
    assert_eq!(
        query(d, "$.**"),
        vec![json!({"a": {"b": 1}}), json!({"b": 1}), json!(1)]
    );
}

#[rstest]
fn any_depth_bounded() {
    let d = json!({"a": {"b": {"c": 9}}});
    assert_eq!(query(d.clone(), "$.**{2}.c"), vec![json!(9)]);
    assert_eq!(query(d.clone(), "$.**{3}.c"), Vec::<Value>::new());
    assert_eq!(query(d, "$.**{last}"), vec![json!(9)]);
}

#[rstest]
fn variables_resolve_from_a_jsonb_object() {
    let d = doc(json!({}));
    let vars_doc = doc(json!({"x": 10, "y": [1, 2]}));
    let vars = JsonbVars::new(&vars_doc).unwrap();
    let p = parse_path("$x").unwrap();
    let found = path_query(&d, &p, &vars, &EvalOptions::default()).unwrap();
    assert_eq!(found[0].to_json(), json!(10));

    let p = parse_path("$y[*]").unwrap();
    let found = path_query(&d, &p, &vars, &EvalOptions::default()).unwrap();
    assert_eq!(found.len(), 2);
}

#[rstest]
fn missing_variable_raises_even_when_silent() {
    let d = doc(json!({}));
    let p = parse_path("$nope").unwrap();
    let err = path_query(&d, &p, &(), &EvalOptions::silent()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UndefinedVariable);
}

#[rstest]
fn current_item_inside_filter_sees_the_candidate() {
    let d = json!({"a": [{"k": 1}, {"k": 2}]});
    assert_eq!(
        query(d, "$.a[*] ? (@.k == 2)"),
        vec![json!({"k": 2})]
    );
}

#[rstest]
fn scalar_document_extracts_eagerly() {
    assert_eq!(query(json!("solo"), "$.type()"), vec![json!("string")]);
}
