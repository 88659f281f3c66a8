//! Filter and predicate semantics: tri-valued logic, error absorption, and
//! the boolean wrapping of top-level predicates.

use jsonb_path::{parse_path, path_query, EvalOptions, Jsonb};
use rstest::rstest;
use serde_json::{json, Value};

fn ok(input: Value, path: &str) -> Vec<Value> {
    let d = Jsonb::try_from(input).unwrap();
    let p = parse_path(path).unwrap();
    path_query(&d, &p, &(), &EvalOptions::default())
        .unwrap()
        .iter()
        .map(|v| v.to_json())
        .collect()
}

fn sample() -> Value {
    json!({"a": [1, 2, 3], "b": "xy", "c": null})
}

#[rstest]
fn filter_keeps_matching_candidates() {
    assert_eq!(ok(sample(), "$.a[*] ? (@ > 1)"), vec![json!(2), json!(3)]);
    assert_eq!(
        ok(sample(), "strict $.a[*] ? (@ > 1)"),
        vec![json!(2), json!(3)]
    );
}

#[rstest]
fn filter_drops_unknown_candidates() {
    let d = json!([1, "a", 2]);
    assert_eq!(ok(d.clone(), "$[*] ? (@ > 1)"), vec![json!(2)]);
    assert_eq!(ok(d, "$[*] ? ((@ > 1) is unknown)"), vec![json!("a")]);
}

#[rstest]
fn exists_inside_filter_absorbs_errors() {
    assert_eq!(ok(sample(), "$ ? (exists(@.missing))"), Vec::<Value>::new());
    assert_eq!(
        ok(sample(), "strict $ ? (exists(@.missing))"),
        Vec::<Value>::new()
    );
    assert_eq!(
        ok(sample(), "$ ? (exists(@.a))"),
        vec![sample()]
    );
}

#[rstest]
fn null_comparison_matrix() {
    assert_eq!(ok(sample(), "$.c == null"), vec![json!(true)]);
    assert_eq!(ok(sample(), "$.c != null"), vec![json!(false)]);
    assert_eq!(ok(sample(), "$.a[0] == null"), vec![json!(false)]);
    assert_eq!(ok(sample(), "$.a[0] != null"), vec![json!(true)]);
    assert_eq!(ok(sample(), "$.a[0] < null"), vec![json!(false)]);
}

#[rstest]
fn empty_sequences_compare_to_false() {
    assert_eq!(ok(sample(), "$.missing == null"), vec![json!(false)]);
}

#[rstest]
fn top_level_predicates_wrap_to_boolean_items() {
    assert_eq!(ok(sample(), "$.a[*] > 1"), vec![json!(true)]);
    assert_eq!(ok(sample(), "$.a[*] > 5"), vec![json!(false)]);
    // Incomparable operands collapse to unknown, reported as null.
    assert_eq!(ok(sample(), "$.b > 1"), vec![json!(null)]);
}

#[rstest]
fn lax_true_wins_over_pending_unknowns() {
    let d = json!([2, "a"]);
    assert_eq!(ok(d.clone(), "$[*] < 10"), vec![json!(true)]);
    // Strict mode examines every pair, so the unknown surfaces instead.
    assert_eq!(ok(d, "strict $[*] < 10"), vec![json!(null)]);
}

#[rstest]
fn boolean_connectives_follow_three_valued_logic() {
    assert_eq!(ok(sample(), "$.a[0] == 1 && $.a[1] == 2"), vec![json!(true)]);
    assert_eq!(ok(sample(), "$.a[0] == 1 && $.b > 1"), vec![json!(null)]);
    assert_eq!(ok(sample(), "$.a[0] == 2 && $.b > 1"), vec![json!(false)]);
    assert_eq!(ok(sample(), "$.a[0] == 1 || $.b > 1"), vec![json!(true)]);
    assert_eq!(ok(sample(), "$.a[0] == 2 || $.b > 1"), vec![json!(null)]);
    assert_eq!(ok(sample(), "!($.a[0] == 2)"), vec![json!(true)]);
    assert_eq!(ok(sample(), "!($.b > 1)"), vec![json!(null)]);
}

#[rstest]
fn starts_with_compares_string_prefixes() {
    let d = json!(["apple", "banana", "apricot", 7]);
    assert_eq!(
        ok(d, "$[*] ? (@ starts with \"ap\")"),
        vec![json!("apple"), json!("apricot")]
    );
}

#[rstest]
fn starts_with_on_non_strings_is_unknown() {
    assert_eq!(ok(json!([7]), "$[0] starts with \"a\""), vec![json!(null)]);
}

#[rstest]
fn like_regex_matches_strings() {
    let d = json!(["abc", "aBc", "xyz", 1]);
    assert_eq!(
        ok(d.clone(), "$[*] ? (@ like_regex \"^ab\")"),
        vec![json!("abc")]
    );
    assert_eq!(
        ok(d, "$[*] ? (@ like_regex \"^ab\" flag \"i\")"),
        vec![json!("abc"), json!("aBc")]
    );
}

#[rstest]
fn like_regex_quote_flag_is_literal() {
    let d = json!(["a.c", "abc"]);
    assert_eq!(
        ok(d, "$[*] ? (@ like_regex \"a.c\" flag \"q\")"),
        vec![json!("a.c")]
    );
}

#[rstest]
fn filters_chain_and_nest() {
    let d = json!({"items": [
        {"price": 5, "tags": ["new"]},
        {"price": 15, "tags": []},
        {"price": 25, "tags": ["new", "sale"]}
    ]});
    assert_eq!(
        ok(d.clone(), "$.items[*] ? (@.price > 10) ? (exists(@.tags[*] ? (@ == \"sale\")))"),
        vec![json!({"price": 25, "tags": ["new", "sale"]})]
    );
    assert_eq!(
        ok(d, "$.items[*] ? (@.price > 10 && @.tags.size() > 0).price"),
        vec![json!(25)]
    );
}

#[rstest]
fn is_unknown_detects_unknown_only() {
    assert_eq!(ok(sample(), "($.b > 1) is unknown"), vec![json!(true)]);
    assert_eq!(ok(sample(), "($.a[0] > 0) is unknown"), vec![json!(false)]);
}
