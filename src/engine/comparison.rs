//! Cross-type comparison kernel used by the comparison predicates.
//!
//! Null compares to non-null as `!=` true / everything else false;
//! mismatched non-null types are not comparable and yield `Unknown`, as do
//! structured (binary) items. String ordering is bytewise, which for UTF-8
//! input coincides with codepoint order.

use std::cmp::Ordering;

use chrono::FixedOffset;

use super::datetime::compare_datetime;
use super::predicate::Truth;
use super::runtime::Error;
use crate::ast::CmpOp;
use crate::jsonb::JsonbValue;

fn same_raw_kind(a: &JsonbValue, b: &JsonbValue) -> bool {
    matches!(
        (a, b),
        (JsonbValue::Null, JsonbValue::Null)
            | (JsonbValue::Bool(_), JsonbValue::Bool(_))
            | (JsonbValue::Numeric(_), JsonbValue::Numeric(_))
            | (JsonbValue::String(_), JsonbValue::String(_))
            | (JsonbValue::Datetime(_), JsonbValue::Datetime(_))
            | (JsonbValue::Binary(_), JsonbValue::Binary(_))
    )
}

fn apply(op: CmpOp, ord: Ordering) -> Truth {
    let res = match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    };
    Truth::from_bool(res)
}

/// Compare two items with the given operation.
///
/// Timezone-gated datetime comparisons propagate a hard error when the
/// required cast is forbidden; every other failure mode is absorbed into
/// `Unknown`.
pub(crate) fn compare_items(
    op: CmpOp,
    lhs: &JsonbValue,
    rhs: &JsonbValue,
    use_tz: bool,
    local_tz: FixedOffset,
) -> Result<Truth, Error> {
    if !same_raw_kind(lhs, rhs) {
        if matches!(lhs, JsonbValue::Null) || matches!(rhs, JsonbValue::Null) {
            // Equality and order comparison of nulls to non-nulls is always
            // false; inequality is true.
            return Ok(Truth::from_bool(op == CmpOp::Ne));
        }
        return Ok(Truth::Unknown);
    }

    let ord = match (lhs, rhs) {
        (JsonbValue::Null, JsonbValue::Null) => Ordering::Equal,
        (JsonbValue::Bool(a), JsonbValue::Bool(b)) => a.cmp(b),
        (JsonbValue::Numeric(a), JsonbValue::Numeric(b)) => a.cmp(b),
        (JsonbValue::String(a), JsonbValue::String(b)) => {
            if op == CmpOp::Eq {
                return Ok(Truth::from_bool(a.as_bytes() == b.as_bytes()));
            }
            a.as_bytes().cmp(b.as_bytes())
        }
        (JsonbValue::Datetime(a), JsonbValue::Datetime(b)) => {
            match compare_datetime(a, b, use_tz, local_tz)? {
                Some(ord) => ord,
                None => return Ok(Truth::Unknown),
            }
        }
        // Structured items are not comparable.
        (JsonbValue::Binary(_), JsonbValue::Binary(_)) => return Ok(Truth::Unknown),
        _ => unreachable!("raw kinds verified above"),
    };

    Ok(apply(op, ord))
}
