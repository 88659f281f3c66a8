//! Parser coverage: AST shapes, precedence, context restrictions and
//! rejected inputs.

use jsonb_path::ast::{AnyBounds, ArithOp, CmpOp, PathMode, PathOp, PathStep};
use jsonb_path::{parse_path, ErrorCode};
use rstest::rstest;

fn parse(text: &str) -> jsonb_path::JsonPath {
    parse_path(text).unwrap()
}

fn parse_err(text: &str) {
    let err = parse_path(text).unwrap_err();
    assert_eq!(err.code, ErrorCode::Syntax, "input: {text}");
}

fn ops(path: &jsonb_path::JsonPath) -> Vec<&PathOp> {
    let mut out = Vec::new();
    let mut step = Some(&path.root);
    while let Some(s) = step {
        out.push(&s.op);
        step = s.next();
    }
    out
}

#[rstest]
fn mode_prefix_defaults_to_lax() {
    assert_eq!(parse("$").mode, PathMode::Lax);
    assert_eq!(parse("lax $").mode, PathMode::Lax);
    assert_eq!(parse("strict $").mode, PathMode::Strict);
}

#[rstest]
fn member_chains_link_steps() {
    let p = parse("$.a.b[*]");
    let chain = ops(&p);
    assert!(matches!(chain[0], PathOp::Root));
    assert!(matches!(chain[1], PathOp::Key(k) if k == "a"));
    assert!(matches!(chain[2], PathOp::Key(k) if k == "b"));
    assert!(matches!(chain[3], PathOp::AnyArray));
}

#[rstest]
fn multiplication_binds_tighter_than_addition() {
    let p = parse("1 + 2 * 3");
    match &p.root.op {
        PathOp::Arith(ArithOp::Add, left, right) => {
            assert!(matches!(left.op, PathOp::Numeric(_)));
            assert!(matches!(right.op, PathOp::Arith(ArithOp::Mul, ..)));
        }
        other => panic!("expected addition at the top, got {other:?}"),
    }
}

#[rstest]
fn comparison_takes_whole_additive_operands() {
    let p = parse("$.a + 1 == $.b * 2");
    match &p.root.op {
        PathOp::Comparison(CmpOp::Eq, left, right) => {
            assert!(matches!(left.op, PathOp::Arith(ArithOp::Add, ..)));
            assert!(matches!(right.op, PathOp::Arith(ArithOp::Mul, ..)));
        }
        other => panic!("expected a comparison, got {other:?}"),
    }
}

#[rstest]
fn and_binds_tighter_than_or() {
    let p = parse("$.a == 1 || $.b == 2 && $.c == 3");
    match &p.root.op {
        PathOp::Or(_, right) => assert!(matches!(right.op, PathOp::And(..))),
        other => panic!("expected || at the top, got {other:?}"),
    }
}

#[rstest]
fn any_bounds_forms() {
    assert!(matches!(
        parse("$.**").root.next().unwrap().op,
        PathOp::Any(AnyBounds { first: Some(0), last: None })
    ));
    assert!(matches!(
        parse("$.**{2}").root.next().unwrap().op,
        PathOp::Any(AnyBounds { first: Some(2), last: Some(2) })
    ));
    assert!(matches!(
        parse("$.**{2 to last}").root.next().unwrap().op,
        PathOp::Any(AnyBounds { first: Some(2), last: None })
    ));
}

#[rstest]
fn subscript_ranges_and_lists() {
    let p = parse("$.a[0, 2 to last]");
    let chain = ops(&p);
    match chain[2] {
        PathOp::IndexArray(subs) => {
            assert_eq!(subs.len(), 2);
            assert!(subs[0].to.is_none());
            assert!(matches!(
                subs[1].to.as_ref().map(|s: &PathStep| &s.op),
                Some(PathOp::Last)
            ));
        }
        other => panic!("expected subscripts, got {other:?}"),
    }
}

#[rstest]
fn filter_predicates_require_predicate_form() {
    parse("$.a ? (@ > 1)");
    parse("$.a ? (@ > 1 && @ < 10)");
    parse("$.a ? (!(@ > 1))");
    parse("$.a ? ((@ > 1) is unknown)");
    parse("$.a ? (exists(@.b))");
    parse_err("$.a ? (@)");
    parse_err("$.a ? (1 + 2)");
}

#[rstest]
fn methods_parse_their_arguments() {
    parse("$.type()");
    parse("$.datetime()");
    parse("$.datetime(\"DD-MM-YYYY\")");
    parse("$.decimal()");
    parse("$.decimal(10)");
    parse("$.decimal(10, 2)");
    parse("$.time(3)");
    parse_err("$.size(1)");
    parse_err("$.unknown_method()");
}

#[rstest]
fn like_regex_flags_are_validated() {
    parse("$ ? (@.s like_regex \"^a\")");
    parse("$ ? (@.s like_regex \"^a\" flag \"ismxq\")");
    parse_err("$ ? (@.s like_regex \"^a\" flag \"z\")");
}

#[rstest]
fn starts_with_takes_literal_or_variable() {
    parse("$ ? (@.s starts with \"pre\")");
    parse("$ ? (@.s starts with $prefix)");
    parse_err("$ ? (@.s starts with 1)");
}

#[rstest]
fn current_item_is_rejected_outside_filters() {
    parse_err("@");
    parse_err("@.a");
    parse_err("exists(@.a)");
    parse("$ ? (@.a == 1)");
}

#[rstest]
fn last_is_rejected_outside_subscripts() {
    parse_err("last");
    parse_err("$.a[0] + last");
    parse("$.a[last]");
    // As a member name, "last" is just a key.
    let p = parse("$.last");
    assert!(matches!(&p.root.next().unwrap().op, PathOp::Key(k) if k == "last"));
}

#[rstest]
#[case("$ =")]
#[case("$.a[")]
#[case("$.a ? @ > 1")]
#[case("\"unterminated")]
#[case("$ ? (@ like_regex 1)")]
#[case("1 &")]
#[case("$..a")]
fn malformed_inputs_are_rejected(#[case] text: &str) {
    parse_err(text);
}

#[rstest]
fn string_escapes_decode() {
    let p = parse("\"a\\n\\u0041\\\\\"");
    assert!(matches!(&p.root.op, PathOp::String(s) if s == "a\nA\\"));
}

#[rstest]
fn keywords_still_work_as_member_names() {
    let p = parse("$.exists.strict.flag");
    let chain = ops(&p);
    assert!(matches!(chain[1], PathOp::Key(k) if k == "exists"));
    assert!(matches!(chain[2], PathOp::Key(k) if k == "strict"));
    assert!(matches!(chain[3], PathOp::Key(k) if k == "flag"));
}
