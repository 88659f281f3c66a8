//! The path evaluator.
//!
//! Evaluation walks the step chain recursively. Each step receives a single
//! item from its predecessor, produces a sequence, and feeds it to its next
//! step one item at a time; items falling off the end of the chain are
//! appended to the caller's `found` list. When no `found` list is supplied
//! the evaluator is answering an existence question and stops at the first
//! produced item, except where strict mode must keep going to prove the
//! absence of errors.
//!
//! Lax-mode array unwrapping happens on entry: operators that are
//! array-unaware re-enter themselves once per element with unwrapping
//! disabled. Suppressible failures either raise or convert to the `Error`
//! disposition depending on the `throw_errors` flag; policy violations
//! (missing variables, forbidden timezone casts, depth and interrupt
//! limits) raise regardless.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::FixedOffset;
use fancy_regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use super::comparison::compare_items;
use super::datetime::{self, DatetimeTarget};
use super::numeric;
use super::predicate::{PairAccumulator, PairStep, Truth};
use super::runtime::{Error, ErrorCode, EvalOptions, Variables};
use crate::ast::{ArithOp, JsonPath, PathOp, PathStep};
use crate::jsonb::{
    build_array, build_object, ContainerKind, Jsonb, JsonbContainer, JsonbType, JsonbValue,
    ValueList,
};

/// Result disposition of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// The result sequence is non-empty (or an existence test matched).
    Found,
    /// The result sequence is empty.
    NotFound,
    /// A suppressible error occurred and error throwing is off.
    Error,
}

impl ExecStatus {
    pub fn is_error(&self) -> bool {
        *self == ExecStatus::Error
    }
}

/// Array-wrapping behavior for [`path_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Unspec,
    None,
    Conditional,
    Unconditional,
}

/// Outcome of [`path_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueResult {
    Value(JsonbValue),
    Empty,
    Error,
}

const MAX_EVAL_DEPTH: u32 = 512;

/// First round decimal number above the largest container position;
/// generated-object ids are `base_id * STEP + offset`.
const GENERATED_ID_STEP: i64 = 10_000_000_000;

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Low-level entry point: evaluate `path` against `doc`, returning the
/// result disposition together with the produced sequence.
pub fn execute_path(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
) -> Result<(ExecStatus, ValueList), Error> {
    execute_internal(doc, path, vars, opts, true)
}

/// Does the path return at least one item for the document?
/// Returns `None` when a suppressed error occurred.
pub fn path_exists(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
) -> Result<Option<bool>, Error> {
    let (status, _) = execute_internal(doc, path, vars, opts, false)?;
    Ok(match status {
        ExecStatus::Found => Some(true),
        ExecStatus::NotFound => Some(false),
        ExecStatus::Error => None,
    })
}

/// Evaluate a predicate path: the result must be a single boolean or null.
pub fn path_match(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
) -> Result<Option<bool>, Error> {
    let (_, found) = execute_internal(doc, path, vars, opts, true)?;
    if found.len() == 1 {
        match found.head() {
            Some(JsonbValue::Bool(b)) => return Ok(Some(*b)),
            Some(JsonbValue::Null) => return Ok(None),
            _ => {}
        }
    }
    if !opts.silent {
        return Err(Error::new(
            ErrorCode::SingleBooleanRequired,
            "single boolean result is expected",
        ));
    }
    Ok(None)
}

/// Evaluate the path and return every produced item.
pub fn path_query(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
) -> Result<Vec<JsonbValue>, Error> {
    let (_, found) = execute_internal(doc, path, vars, opts, true)?;
    Ok(found.into_vec())
}

/// Evaluate the path and return the first produced item, if any.
pub fn path_query_first(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
) -> Result<Option<JsonbValue>, Error> {
    let (_, found) = execute_internal(doc, path, vars, opts, true)?;
    Ok(found.head().cloned())
}

/// Evaluate the path and wrap the produced sequence in a fresh array.
pub fn path_query_array(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
) -> Result<JsonbValue, Error> {
    let (_, found) = execute_internal(doc, path, vars, opts, true)?;
    Ok(build_array(found.into_vec()))
}

/// Evaluate the path and return a single result value, optionally wrapped
/// in an array per `wrapper`.
pub fn path_value(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    wrapper: Wrapper,
    opts: &EvalOptions,
) -> Result<ValueResult, Error> {
    let (status, found) = execute_internal(doc, path, vars, opts, true)?;
    if status.is_error() {
        return Ok(ValueResult::Error);
    }
    let count = found.len();
    if count == 0 {
        return Ok(ValueResult::Empty);
    }
    let wrap = match wrapper {
        Wrapper::None | Wrapper::Unspec => false,
        Wrapper::Unconditional => true,
        Wrapper::Conditional => count > 1,
    };
    if wrap {
        return Ok(ValueResult::Value(build_array(found.into_vec())));
    }
    if count > 1 {
        if opts.silent {
            return Ok(ValueResult::Error);
        }
        return Err(Error::new(
            ErrorCode::MoreThanOneItem,
            "JSON path expression must return single item when no wrapper is requested",
        ));
    }
    let value = found.into_vec().into_iter().next().expect("count checked");
    Ok(ValueResult::Value(value))
}

fn execute_internal(
    doc: &Jsonb,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
    collect: bool,
) -> Result<(ExecStatus, ValueList), Error> {
    execute_path_root(&doc.root_value(), path, vars, opts, collect)
}

/// Evaluate against an already-extracted root item; the tabular driver
/// re-enters here with row values as documents.
pub(crate) fn execute_path_root(
    root: &JsonbValue,
    path: &JsonPath,
    vars: &dyn Variables,
    opts: &EvalOptions,
    collect: bool,
) -> Result<(ExecStatus, ValueList), Error> {
    debug!(lax = path.is_lax(), silent = opts.silent, collect, "executing path");
    let root = JsonbValue::clone(root);
    let mut cxt = ExecContext {
        vars,
        root: root.clone(),
        current: root.clone(),
        base_object: BaseObject {
            container: None,
            id: 0,
        },
        last_generated_object_id: 1 + vars.count() as i64,
        innermost_array_size: None,
        lax: path.is_lax(),
        ignore_structural_errors: path.is_lax(),
        throw_errors: !opts.silent,
        use_tz: opts.use_tz,
        local_tz: opts.local_tz,
        cancel: opts.cancel.clone(),
        depth: 0,
    };

    let mut found = ValueList::new();
    if collect || !cxt.lax {
        // In strict mode an existence test still collects the complete
        // sequence so hidden errors surface.
        let status = cxt.execute_item(&path.root, &root, Some(&mut found))?;
        if status.is_error() {
            return Ok((ExecStatus::Error, found));
        }
        let status = if found.is_empty() {
            ExecStatus::NotFound
        } else {
            ExecStatus::Found
        };
        return Ok((status, found));
    }
    let status = cxt.execute_item(&path.root, &root, None)?;
    Ok((status, found))
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BaseObject {
    container: Option<JsonbContainer>,
    id: i64,
}

struct ExecContext<'a> {
    vars: &'a dyn Variables,
    root: JsonbValue,
    /// The `@` item seen by filter predicates.
    current: JsonbValue,
    base_object: BaseObject,
    last_generated_object_id: i64,
    /// Array size bound to `last`; `None` outside any subscript.
    innermost_array_size: Option<i32>,
    lax: bool,
    ignore_structural_errors: bool,
    throw_errors: bool,
    use_tz: bool,
    local_tz: FixedOffset,
    cancel: Option<Arc<AtomicBool>>,
    depth: u32,
}

type Found<'f> = Option<&'f mut ValueList>;

impl ExecContext<'_> {
    fn auto_unwrap(&self) -> bool {
        self.lax
    }

    fn auto_wrap(&self) -> bool {
        self.lax
    }

    fn strict(&self) -> bool {
        !self.lax
    }

    /// Return or raise a suppressible failure depending on the context.
    fn maybe_throw(&self, err: Error) -> Result<ExecStatus, Error> {
        if self.throw_errors || !err.is_suppressible() {
            Err(err)
        } else {
            Ok(ExecStatus::Error)
        }
    }

    fn enter(&mut self) -> Result<(), Error> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(Error::new(
                ErrorCode::StackDepthExceeded,
                "jsonpath expression is nested too deeply",
            ));
        }
        if let Some(flag) = &self.cancel {
            if flag.load(AtomicOrdering::Relaxed) {
                return Err(Error::new(
                    ErrorCode::Interrupted,
                    "jsonpath evaluation was interrupted",
                ));
            }
        }
        self.depth += 1;
        Ok(())
    }

    fn set_base_object(&mut self, value: &JsonbValue, id: i64) -> BaseObject {
        let prev = self.base_object.clone();
        self.base_object = BaseObject {
            container: match value {
                JsonbValue::Binary(c) => Some(c.clone()),
                _ => None,
            },
            id,
        };
        prev
    }

    // -- chain plumbing ---------------------------------------------------

    /// Execute a step with lax-mode target unwrapping.
    fn execute_item(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let unwrap = self.auto_unwrap();
        self.execute_item_opt_unwrap_target(jsp, jb, found, unwrap)
    }

    fn execute_item_opt_unwrap_target(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
        unwrap: bool,
    ) -> Result<ExecStatus, Error> {
        self.enter()?;
        let res = self.dispatch(jsp, jb, found, unwrap);
        self.depth -= 1;
        res
    }

    /// Pass `v` to the step after `cur`, or surrender it to the result list.
    fn execute_next_item(
        &mut self,
        cur: &PathStep,
        v: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        match cur.next() {
            Some(next) => self.execute_item(next, v, found),
            None => {
                if let Some(f) = found {
                    f.append(v.clone());
                }
                Ok(ExecStatus::Found)
            }
        }
    }

    /// Like [`Self::execute_item`], but additionally unwraps arrays in the
    /// resulting sequence when `unwrap` is set in lax mode.
    fn execute_item_opt_unwrap_result(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        unwrap: bool,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        if unwrap && self.auto_unwrap() {
            if let Some(found) = found {
                let mut seq = ValueList::new();
                let res = self.execute_item(jsp, jb, Some(&mut seq))?;
                if res.is_error() {
                    return Ok(res);
                }
                for item in &seq {
                    match item {
                        JsonbValue::Binary(c) if c.kind() == ContainerKind::Array => {
                            for elem in c.items() {
                                found.append(elem);
                            }
                        }
                        other => found.append(other.clone()),
                    }
                }
                return Ok(ExecStatus::Found);
            }
        }
        self.execute_item(jsp, jb, found)
    }

    /// Result-unwrapping execution with error suppression, as used inside
    /// predicates.
    fn execute_silent(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        unwrap: bool,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let saved = self.throw_errors;
        self.throw_errors = false;
        let res = self.execute_item_opt_unwrap_result(jsp, jb, unwrap, found);
        self.throw_errors = saved;
        res
    }

    /// Re-enter `jsp` (or its successor) once per element of an array item.
    fn execute_unwrap_array(
        &mut self,
        jsp: Option<&PathStep>,
        jb: &JsonbValue,
        found: Found<'_>,
        unwrap_elements: bool,
    ) -> Result<ExecStatus, Error> {
        let container = match jb {
            JsonbValue::Binary(c) => c.clone(),
            _ => return Err(Error::internal("array expected for element unwrapping")),
        };
        self.execute_any_item(jsp, &container, found, 1, 1, 1, false, unwrap_elements)
    }

    // -- operator dispatch ------------------------------------------------

    fn dispatch(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        mut found: Found<'_>,
        unwrap: bool,
    ) -> Result<ExecStatus, Error> {
        match &jsp.op {
            PathOp::Null
            | PathOp::Bool(_)
            | PathOp::Numeric(_)
            | PathOp::String(_)
            | PathOp::Variable(_) => {
                let is_variable = matches!(jsp.op, PathOp::Variable(_));
                if !jsp.has_next() && found.is_none() && !is_variable {
                    // Skip evaluation, but not for variables: a missing
                    // variable must still raise.
                    return Ok(ExecStatus::Found);
                }
                let saved = self.base_object.clone();
                let v = self.literal_or_variable(&jsp.op)?;
                let res = self.execute_next_item(jsp, &v, found);
                self.base_object = saved;
                res
            }

            PathOp::And(..)
            | PathOp::Or(..)
            | PathOp::Not(_)
            | PathOp::IsUnknown(_)
            | PathOp::Comparison(..)
            | PathOp::StartsWith(..)
            | PathOp::LikeRegex { .. }
            | PathOp::Exists(_) => {
                let st = self.execute_bool_item(jsp, jb, true)?;
                self.append_bool_result(jsp, found, st)
            }

            PathOp::Arith(op, larg, rarg) => {
                self.execute_binary_arith(jsp, *op, larg, rarg, jb, found)
            }
            PathOp::Plus(arg) => self.execute_unary_arith(jsp, false, arg, jb, found),
            PathOp::Minus(arg) => self.execute_unary_arith(jsp, true, arg, jb, found),

            PathOp::AnyArray => {
                if jb.jsonb_type() == JsonbType::Array {
                    self.execute_unwrap_array(jsp.next(), jb, found, self.auto_unwrap())
                } else if self.auto_wrap() {
                    self.execute_next_item(jsp, jb, found)
                } else if !self.ignore_structural_errors {
                    self.maybe_throw(Error::new(
                        ErrorCode::ArrayNotFound,
                        "jsonpath wildcard array accessor can only be applied to an array",
                    ))
                } else {
                    Ok(ExecStatus::NotFound)
                }
            }

            PathOp::AnyKey => {
                if let JsonbValue::Binary(c) = jb {
                    if c.kind() == ContainerKind::Object {
                        let container = c.clone();
                        return self.execute_any_item(
                            jsp.next(),
                            &container,
                            found,
                            1,
                            1,
                            1,
                            false,
                            self.auto_unwrap(),
                        );
                    }
                }
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                if !self.ignore_structural_errors {
                    self.maybe_throw(Error::new(
                        ErrorCode::ObjectNotFound,
                        "jsonpath wildcard member accessor can only be applied to an object",
                    ))
                } else {
                    Ok(ExecStatus::NotFound)
                }
            }

            PathOp::IndexArray(subscripts) => {
                if jb.jsonb_type() == JsonbType::Array || self.auto_wrap() {
                    self.execute_index_array(jsp, subscripts, jb, found)
                } else if !self.ignore_structural_errors {
                    self.maybe_throw(Error::new(
                        ErrorCode::ArrayNotFound,
                        "jsonpath array accessor can only be applied to an array",
                    ))
                } else {
                    Ok(ExecStatus::NotFound)
                }
            }

            PathOp::Any(bounds) => {
                let first = bounds.first.unwrap_or(u32::MAX);
                let last = bounds.last.unwrap_or(u32::MAX);
                let mut res = ExecStatus::NotFound;
                if first == 0 {
                    // First try the next step on the current item itself,
                    // with structural errors suppressed.
                    let saved = self.ignore_structural_errors;
                    self.ignore_structural_errors = true;
                    let r = self.execute_next_item(jsp, jb, found.as_deref_mut());
                    self.ignore_structural_errors = saved;
                    res = r?;
                    if res == ExecStatus::Found && found.is_none() {
                        return Ok(res);
                    }
                }
                if let JsonbValue::Binary(c) = jb {
                    let container = c.clone();
                    res = self.execute_any_item(
                        jsp.next(),
                        &container,
                        found,
                        1,
                        first,
                        last,
                        true,
                        self.auto_unwrap(),
                    )?;
                }
                Ok(res)
            }

            PathOp::Key(key) => {
                if let JsonbValue::Binary(c) = jb {
                    if c.kind() == ContainerKind::Object {
                        return match c.find_key(key) {
                            Some(v) => self.execute_next_item(jsp, &v, found),
                            None => {
                                if self.ignore_structural_errors {
                                    Ok(ExecStatus::NotFound)
                                } else if !self.throw_errors {
                                    Ok(ExecStatus::Error)
                                } else {
                                    Err(Error::new(
                                        ErrorCode::MemberNotFound,
                                        format!("JSON object does not contain key \"{key}\""),
                                    ))
                                }
                            }
                        };
                    }
                }
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                if !self.ignore_structural_errors {
                    self.maybe_throw(Error::new(
                        ErrorCode::MemberNotFound,
                        "jsonpath member accessor can only be applied to an object",
                    ))
                } else {
                    Ok(ExecStatus::NotFound)
                }
            }

            PathOp::Current => {
                let current = self.current.clone();
                self.execute_next_item(jsp, &current, found)
            }

            PathOp::Root => {
                let root = self.root.clone();
                let saved = self.set_base_object(&root, 0);
                let res = self.execute_next_item(jsp, &root, found);
                self.base_object = saved;
                res
            }

            PathOp::Filter(pred) => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                let st = self.execute_nested_bool_item(pred, jb)?;
                if st != Truth::True {
                    Ok(ExecStatus::NotFound)
                } else {
                    self.execute_next_item(jsp, jb, found)
                }
            }

            PathOp::Type => {
                let v = JsonbValue::String(jb.type_name().to_string());
                self.execute_next_item(jsp, &v, found)
            }

            PathOp::Size => {
                let size = match jb.array_size() {
                    Some(s) => s as i64,
                    None => {
                        if !self.auto_wrap() {
                            if !self.ignore_structural_errors {
                                return self.maybe_throw(Error::new(
                                    ErrorCode::ArrayNotFound,
                                    "jsonpath item method .size() can only be applied to an array",
                                ));
                            }
                            return Ok(ExecStatus::NotFound);
                        }
                        1
                    }
                };
                let v = JsonbValue::Numeric(Decimal::from(size));
                self.execute_next_item(jsp, &v, found)
            }

            PathOp::Abs => self.execute_numeric_method(jsp, jb, unwrap, found, |d| d.abs()),
            PathOp::Floor => self.execute_numeric_method(jsp, jb, unwrap, found, |d| d.floor()),
            PathOp::Ceiling => self.execute_numeric_method(jsp, jb, unwrap, found, |d| d.ceil()),

            PathOp::Double => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_double_method(jsp, jb, found)
            }

            PathOp::Bigint | PathOp::Integer => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_integer_method(jsp, jb, found)
            }

            PathOp::Boolean => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_boolean_method(jsp, jb, found)
            }

            PathOp::Decimal { .. } | PathOp::Number => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_decimal_method(jsp, jb, found)
            }

            PathOp::StringFunc => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_string_method(jsp, jb, found)
            }

            PathOp::Datetime(_)
            | PathOp::Date
            | PathOp::Time { .. }
            | PathOp::TimeTz { .. }
            | PathOp::Timestamp { .. }
            | PathOp::TimestampTz { .. } => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_datetime_method(jsp, jb, found)
            }

            PathOp::KeyValue => {
                if unwrap && jb.jsonb_type() == JsonbType::Array {
                    return self.execute_unwrap_array(Some(jsp), jb, found, false);
                }
                self.execute_keyvalue_method(jsp, jb, found)
            }

            PathOp::Last => {
                let size = self.innermost_array_size.ok_or_else(|| {
                    Error::internal("evaluating jsonpath LAST outside of array subscript")
                })?;
                if !jsp.has_next() && found.is_none() {
                    return Ok(ExecStatus::Found);
                }
                let v = JsonbValue::Numeric(Decimal::from(size - 1));
                self.execute_next_item(jsp, &v, found)
            }
        }
    }

    fn literal_or_variable(&mut self, op: &PathOp) -> Result<JsonbValue, Error> {
        Ok(match op {
            PathOp::Null => JsonbValue::Null,
            PathOp::Bool(b) => JsonbValue::Bool(*b),
            PathOp::Numeric(n) => JsonbValue::Numeric(*n),
            PathOp::String(s) => JsonbValue::String(s.clone()),
            PathOp::Variable(name) => {
                let binding = self.vars.get(name).ok_or_else(|| {
                    Error::new(
                        ErrorCode::UndefinedVariable,
                        format!("could not find jsonpath variable \"{name}\""),
                    )
                })?;
                if binding.base_id > 0 {
                    self.base_object = BaseObject {
                        container: binding.base.clone(),
                        id: binding.base_id,
                    };
                }
                binding.value
            }
            other => return Err(Error::internal(format!("unexpected item {}", other.name()))),
        })
    }

    // -- structural helpers ----------------------------------------------

    /// Shared driver behind `.*`, `[*]`, `.**` and element unwrapping:
    /// iterate container members between the requested nesting levels,
    /// apply `jsp` to each visited value (or collect it when `jsp` is
    /// absent), and recurse into child containers.
    #[allow(clippy::too_many_arguments)]
    fn execute_any_item(
        &mut self,
        jsp: Option<&PathStep>,
        container: &JsonbContainer,
        mut found: Found<'_>,
        level: u32,
        first: u32,
        last: u32,
        ignore_structural: bool,
        unwrap_next: bool,
    ) -> Result<ExecStatus, Error> {
        self.enter()?;
        let res = self.execute_any_item_inner(
            jsp,
            container,
            found.as_deref_mut(),
            level,
            first,
            last,
            ignore_structural,
            unwrap_next,
        );
        self.depth -= 1;
        res
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_any_item_inner(
        &mut self,
        jsp: Option<&PathStep>,
        container: &JsonbContainer,
        mut found: Found<'_>,
        level: u32,
        first: u32,
        last: u32,
        ignore_structural: bool,
        unwrap_next: bool,
    ) -> Result<ExecStatus, Error> {
        let mut res = ExecStatus::NotFound;
        if level > last {
            return Ok(res);
        }

        for v in container.items() {
            let unbounded_leaf = first == u32::MAX
                && last == u32::MAX
                && !matches!(v, JsonbValue::Binary(_));
            if level >= first || unbounded_leaf {
                match jsp {
                    Some(step) => {
                        if ignore_structural {
                            let saved = self.ignore_structural_errors;
                            self.ignore_structural_errors = true;
                            let r = self.execute_item_opt_unwrap_target(
                                step,
                                &v,
                                found.as_deref_mut(),
                                unwrap_next,
                            );
                            self.ignore_structural_errors = saved;
                            res = r?;
                        } else {
                            res = self.execute_item_opt_unwrap_target(
                                step,
                                &v,
                                found.as_deref_mut(),
                                unwrap_next,
                            )?;
                        }
                        if res.is_error() {
                            break;
                        }
                        if res == ExecStatus::Found && found.is_none() {
                            break;
                        }
                    }
                    None => match found.as_deref_mut() {
                        Some(f) => f.append(v.clone()),
                        None => return Ok(ExecStatus::Found),
                    },
                }
            }

            if level < last {
                if let JsonbValue::Binary(child) = &v {
                    res = self.execute_any_item(
                        jsp,
                        child,
                        found.as_deref_mut(),
                        level + 1,
                        first,
                        last,
                        ignore_structural,
                        unwrap_next,
                    )?;
                    if res.is_error() {
                        break;
                    }
                    if res == ExecStatus::Found && found.is_none() {
                        break;
                    }
                }
            }
        }

        Ok(res)
    }

    fn execute_index_array(
        &mut self,
        jsp: &PathStep,
        subscripts: &[crate::ast::Subscript],
        jb: &JsonbValue,
        mut found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let (size, singleton) = match jb.array_size() {
            Some(s) => (s as i32, false),
            None => (1, true),
        };
        let saved_size = self.innermost_array_size;
        self.innermost_array_size = Some(size);
        let res = self.execute_index_array_inner(jsp, subscripts, jb, found.as_deref_mut(), size, singleton);
        self.innermost_array_size = saved_size;
        res
    }

    fn execute_index_array_inner(
        &mut self,
        jsp: &PathStep,
        subscripts: &[crate::ast::Subscript],
        jb: &JsonbValue,
        mut found: Found<'_>,
        size: i32,
        singleton: bool,
    ) -> Result<ExecStatus, Error> {
        let has_next = jsp.has_next();
        let mut res = ExecStatus::NotFound;

        for sub in subscripts {
            let index_from = match self.get_array_index(&sub.from, jb)? {
                Ok(i) => i,
                Err(status) => return Ok(status),
            };
            let index_to = match &sub.to {
                Some(to) => match self.get_array_index(to, jb)? {
                    Ok(i) => i,
                    Err(status) => return Ok(status),
                },
                None => index_from,
            };

            if !self.ignore_structural_errors
                && (index_from < 0 || index_from > index_to || index_to >= size)
            {
                return self.maybe_throw(Error::new(
                    ErrorCode::InvalidSubscript,
                    "jsonpath array subscript is out of bounds",
                ));
            }

            let index_from = index_from.max(0);
            let index_to = index_to.min(size - 1);
            res = ExecStatus::NotFound;

            for index in index_from..=index_to {
                let v = if singleton {
                    jb.clone()
                } else {
                    let container = match jb {
                        JsonbValue::Binary(c) => c,
                        _ => return Err(Error::internal("array subscript on non-container")),
                    };
                    match container.element(index as usize) {
                        Some(v) => v,
                        None => continue,
                    }
                };

                if !has_next && found.is_none() {
                    return Ok(ExecStatus::Found);
                }
                res = self.execute_next_item(jsp, &v, found.as_deref_mut())?;
                if res.is_error() {
                    return Ok(res);
                }
                if res == ExecStatus::Found && found.is_none() {
                    return Ok(res);
                }
            }
        }

        Ok(res)
    }

    /// Evaluate one subscript expression down to a truncated 32-bit index.
    fn get_array_index(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
    ) -> Result<Result<i32, ExecStatus>, Error> {
        let mut seq = ValueList::new();
        let res = self.execute_item(jsp, jb, Some(&mut seq))?;
        if res.is_error() {
            return Ok(Err(res));
        }
        let num = match (seq.len(), seq.head().and_then(|v| v.as_numeric())) {
            (1, Some(n)) => *n,
            _ => {
                let st = self.maybe_throw(Error::new(
                    ErrorCode::InvalidSubscript,
                    "jsonpath array subscript is not a single numeric value",
                ))?;
                return Ok(Err(st));
            }
        };
        match numeric::to_i32_truncated(num) {
            Some(i) => Ok(Ok(i)),
            None => {
                let st = self.maybe_throw(Error::new(
                    ErrorCode::InvalidSubscript,
                    "jsonpath array subscript is out of integer range",
                ))?;
                Ok(Err(st))
            }
        }
    }

    // -- boolean items ----------------------------------------------------

    fn execute_bool_item(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        can_have_next: bool,
    ) -> Result<Truth, Error> {
        self.enter()?;
        let res = self.execute_bool_item_inner(jsp, jb, can_have_next);
        self.depth -= 1;
        res
    }

    fn execute_bool_item_inner(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        can_have_next: bool,
    ) -> Result<Truth, Error> {
        if !can_have_next && jsp.has_next() {
            return Err(Error::internal("boolean jsonpath item cannot have next item"));
        }

        match &jsp.op {
            PathOp::And(larg, rarg) => {
                let res = self.execute_bool_item(larg, jb, false)?;
                if res == Truth::False {
                    return Ok(Truth::False);
                }
                // The right side is evaluated even on Unknown so its
                // verdict can override per the SQL tri-valued rules.
                let res2 = self.execute_bool_item(rarg, jb, false)?;
                Ok(if res2 == Truth::True { res } else { res2 })
            }
            PathOp::Or(larg, rarg) => {
                let res = self.execute_bool_item(larg, jb, false)?;
                if res == Truth::True {
                    return Ok(Truth::True);
                }
                let res2 = self.execute_bool_item(rarg, jb, false)?;
                Ok(if res2 == Truth::False { res } else { res2 })
            }
            PathOp::Not(arg) => Ok(self.execute_bool_item(arg, jb, false)?.negate()),
            PathOp::IsUnknown(arg) => {
                let res = self.execute_bool_item(arg, jb, false)?;
                Ok(Truth::from_bool(res.is_unknown()))
            }

            PathOp::Comparison(op, larg, rarg) => {
                let op = *op;
                let use_tz = self.use_tz;
                let local_tz = self.local_tz;
                self.execute_predicate(larg, Some(rarg), jb, true, &mut |lv, rv| {
                    compare_items(op, lv, rv.expect("binary predicate"), use_tz, local_tz)
                })
            }

            PathOp::StartsWith(larg, rarg) => {
                self.execute_predicate(larg, Some(rarg), jb, false, &mut |lv, rv| {
                    let whole = lv.as_string();
                    let initial = rv.expect("binary predicate").as_string();
                    Ok(match (whole, initial) {
                        (Some(w), Some(i)) => {
                            Truth::from_bool(w.as_bytes().starts_with(i.as_bytes()))
                        }
                        _ => Truth::Unknown,
                    })
                })
            }

            PathOp::LikeRegex {
                expr,
                pattern,
                flags,
            } => {
                // The compiled form is cached across the pairs of one
                // predicate evaluation.
                let mut compiled: Option<Regex> = None;
                self.execute_predicate(expr, None, jb, false, &mut |lv, _| {
                    let text = match lv.as_string() {
                        Some(s) => s,
                        None => return Ok(Truth::Unknown),
                    };
                    if compiled.is_none() {
                        compiled = Some(compile_regex(pattern, flags)?);
                    }
                    let re = compiled.as_ref().expect("compiled above");
                    match re.is_match(text) {
                        Ok(matched) => Ok(Truth::from_bool(matched)),
                        Err(e) => Err(Error::new(
                            ErrorCode::InvalidRegex,
                            format!("regular expression evaluation failed: {e}"),
                        )),
                    }
                })
            }

            PathOp::Exists(arg) => {
                if self.strict() {
                    // Drain the full sequence so hidden errors surface.
                    let mut vals = ValueList::new();
                    let res = self.execute_silent(arg, jb, false, Some(&mut vals))?;
                    if res.is_error() {
                        return Ok(Truth::Unknown);
                    }
                    Ok(Truth::from_bool(!vals.is_empty()))
                } else {
                    let res = self.execute_silent(arg, jb, false, None)?;
                    Ok(match res {
                        ExecStatus::Error => Truth::Unknown,
                        ExecStatus::Found => Truth::True,
                        ExecStatus::NotFound => Truth::False,
                    })
                }
            }

            other => Err(Error::internal(format!(
                "invalid boolean jsonpath item {}",
                other.name()
            ))),
        }
    }

    /// Evaluate a filter predicate with the candidate item installed as `@`.
    fn execute_nested_bool_item(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
    ) -> Result<Truth, Error> {
        let prev = std::mem::replace(&mut self.current, jb.clone());
        let res = self.execute_bool_item(jsp, jb, false);
        self.current = prev;
        res
    }

    /// Sequence-pair predicate driver (comparisons, `starts with`,
    /// `like_regex`).
    fn execute_predicate(
        &mut self,
        larg: &PathStep,
        rarg: Option<&PathStep>,
        jb: &JsonbValue,
        unwrap_right: bool,
        exec: &mut dyn FnMut(&JsonbValue, Option<&JsonbValue>) -> Result<Truth, Error>,
    ) -> Result<Truth, Error> {
        // The left argument is always auto-unwrapped.
        let mut lseq = ValueList::new();
        let res = self.execute_silent(larg, jb, true, Some(&mut lseq))?;
        if res.is_error() {
            return Ok(Truth::Unknown);
        }

        let mut rseq = ValueList::new();
        if let Some(rarg) = rarg {
            let res = self.execute_silent(rarg, jb, unwrap_right, Some(&mut rseq))?;
            if res.is_error() {
                return Ok(Truth::Unknown);
            }
        }

        let mut acc = PairAccumulator::new(self.strict());
        for lval in &lseq {
            if rarg.is_some() {
                for rval in &rseq {
                    match acc.push(exec(lval, Some(rval))?) {
                        PairStep::Done(t) => return Ok(t),
                        PairStep::Continue => {}
                    }
                }
            } else {
                match acc.push(exec(lval, None)?) {
                    PairStep::Done(t) => return Ok(t),
                    PairStep::Continue => {}
                }
            }
        }
        Ok(acc.finish())
    }

    fn append_bool_result(
        &mut self,
        jsp: &PathStep,
        found: Found<'_>,
        res: Truth,
    ) -> Result<ExecStatus, Error> {
        if !jsp.has_next() && found.is_none() {
            // Found a singleton boolean value.
            return Ok(ExecStatus::Found);
        }
        let v = match res {
            Truth::Unknown => JsonbValue::Null,
            other => JsonbValue::Bool(other.is_true()),
        };
        self.execute_next_item(jsp, &v, found)
    }

    // -- arithmetic -------------------------------------------------------

    fn execute_binary_arith(
        &mut self,
        jsp: &PathStep,
        op: ArithOp,
        larg: &PathStep,
        rarg: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        // Both operands are auto-unwrapped regardless of the operator.
        let mut lseq = ValueList::new();
        let res = self.execute_item_opt_unwrap_result(larg, jb, true, Some(&mut lseq))?;
        if res.is_error() {
            return Ok(res);
        }
        let mut rseq = ValueList::new();
        let res = self.execute_item_opt_unwrap_result(rarg, jb, true, Some(&mut rseq))?;
        if res.is_error() {
            return Ok(res);
        }

        let lval = match (lseq.len(), lseq.head().and_then(|v| v.as_numeric())) {
            (1, Some(n)) => *n,
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::SingletonRequired,
                    format!(
                        "left operand of jsonpath operator {} is not a single numeric value",
                        op.name()
                    ),
                ));
            }
        };
        let rval = match (rseq.len(), rseq.head().and_then(|v| v.as_numeric())) {
            (1, Some(n)) => *n,
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::SingletonRequired,
                    format!(
                        "right operand of jsonpath operator {} is not a single numeric value",
                        op.name()
                    ),
                ));
            }
        };

        let value = match numeric::binary_arith(op, lval, rval) {
            Ok(v) => v,
            Err(e) => return self.maybe_throw(e),
        };

        if !jsp.has_next() && found.is_none() {
            return Ok(ExecStatus::Found);
        }
        self.execute_next_item(jsp, &JsonbValue::Numeric(value), found)
    }

    fn execute_unary_arith(
        &mut self,
        jsp: &PathStep,
        negate: bool,
        arg: &PathStep,
        jb: &JsonbValue,
        mut found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let mut seq = ValueList::new();
        let res = self.execute_item_opt_unwrap_result(arg, jb, true, Some(&mut seq))?;
        if res.is_error() {
            return Ok(res);
        }

        let has_next = jsp.has_next();
        let mut jper = ExecStatus::NotFound;

        for val in &seq {
            let num = match val.as_numeric() {
                Some(n) => {
                    if found.is_none() && !has_next {
                        return Ok(ExecStatus::Found);
                    }
                    *n
                }
                None => {
                    if found.is_none() && !has_next {
                        // Skip non-numeric processing in existence mode.
                        continue;
                    }
                    return self.maybe_throw(Error::new(
                        ErrorCode::NumberNotFound,
                        format!(
                            "operand of unary jsonpath operator {} is not a numeric value",
                            if negate { "-" } else { "+" }
                        ),
                    ));
                }
            };

            let v = JsonbValue::Numeric(if negate { -num } else { num });
            let res = self.execute_next_item(jsp, &v, found.as_deref_mut())?;
            match res {
                ExecStatus::Error => return Ok(res),
                ExecStatus::Found => {
                    if found.is_none() {
                        return Ok(res);
                    }
                    jper = ExecStatus::Found;
                }
                ExecStatus::NotFound => {}
            }
        }

        Ok(jper)
    }

    // -- item methods -----------------------------------------------------

    fn execute_numeric_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        unwrap: bool,
        found: Found<'_>,
        func: fn(&Decimal) -> Decimal,
    ) -> Result<ExecStatus, Error> {
        if unwrap && jb.jsonb_type() == JsonbType::Array {
            return self.execute_unwrap_array(Some(jsp), jb, found, false);
        }
        let num = match jb.as_numeric() {
            Some(n) => n,
            None => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NonNumericItem,
                    format!(
                        "jsonpath item method .{}() can only be applied to a numeric value",
                        jsp.op.name()
                    ),
                ));
            }
        };
        let v = JsonbValue::Numeric(func(num));
        self.execute_next_item(jsp, &v, found)
    }

    fn execute_double_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let double = match jb {
            JsonbValue::Numeric(n) => match numeric::decimal_to_f64(*n) {
                Some(f) => f,
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::NonNumericItem,
                        format!(
                            "argument \"{n}\" of jsonpath item method .double() is invalid \
                             for type double precision"
                        ),
                    ));
                }
            },
            JsonbValue::String(s) => match numeric::parse_f64(s) {
                Some(f) if f.is_finite() => f,
                Some(_) => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::NonNumericItem,
                        "NaN or Infinity is not allowed for jsonpath item method .double()",
                    ));
                }
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::NonNumericItem,
                        format!(
                            "argument \"{s}\" of jsonpath item method .double() is invalid \
                             for type double precision"
                        ),
                    ));
                }
            },
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NonNumericItem,
                    "jsonpath item method .double() can only be applied to a string or \
                     numeric value",
                ));
            }
        };
        let value = match numeric::f64_to_decimal(double) {
            Some(d) => d,
            None => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NumericOutOfRange,
                    format!("value {double} is out of range for the number type"),
                ));
            }
        };
        self.execute_next_item(jsp, &JsonbValue::Numeric(value), found)
    }

    fn execute_integer_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let bigint = matches!(jsp.op, PathOp::Bigint);
        let type_name = if bigint { "bigint" } else { "integer" };
        let value: i64 = match jb {
            JsonbValue::Numeric(n) => {
                let converted = if bigint {
                    numeric::to_i64_rounded(*n)
                } else {
                    numeric::to_i32_rounded(*n).map(i64::from)
                };
                match converted {
                    Some(v) => v,
                    None => {
                        return self.maybe_throw(Error::new(
                            ErrorCode::NonNumericItem,
                            format!(
                                "argument \"{n}\" of jsonpath item method .{}() is invalid \
                                 for type {type_name}",
                                jsp.op.name()
                            ),
                        ));
                    }
                }
            }
            JsonbValue::String(s) => {
                let converted = if bigint {
                    numeric::parse_i64(s)
                } else {
                    numeric::parse_i32(s).map(i64::from)
                };
                match converted {
                    Some(v) => v,
                    None => {
                        return self.maybe_throw(Error::new(
                            ErrorCode::NonNumericItem,
                            format!(
                                "argument \"{s}\" of jsonpath item method .{}() is invalid \
                                 for type {type_name}",
                                jsp.op.name()
                            ),
                        ));
                    }
                }
            }
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NonNumericItem,
                    format!(
                        "jsonpath item method .{}() can only be applied to a string or \
                         numeric value",
                        jsp.op.name()
                    ),
                ));
            }
        };
        self.execute_next_item(jsp, &JsonbValue::Numeric(Decimal::from(value)), found)
    }

    fn execute_boolean_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let value = match jb {
            JsonbValue::Bool(b) => *b,
            JsonbValue::Numeric(n) => {
                // The numeric goes through its canonical text form, so a
                // fractional value is rejected rather than truncated.
                match numeric::parse_i32(&n.to_string()) {
                    Some(i) => i != 0,
                    None => {
                        return self.maybe_throw(Error::new(
                            ErrorCode::NonNumericItem,
                            format!(
                                "argument \"{n}\" of jsonpath item method .boolean() is \
                                 invalid for type boolean"
                            ),
                        ));
                    }
                }
            }
            JsonbValue::String(s) => match numeric::parse_bool(s) {
                Some(b) => b,
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::NonNumericItem,
                        format!(
                            "argument \"{s}\" of jsonpath item method .boolean() is invalid \
                             for type boolean"
                        ),
                    ));
                }
            },
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NonNumericItem,
                    "jsonpath item method .boolean() can only be applied to a boolean, \
                     string, or numeric value",
                ));
            }
        };
        self.execute_next_item(jsp, &JsonbValue::Bool(value), found)
    }

    fn execute_decimal_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let mut num = match jb {
            JsonbValue::Numeric(n) => *n,
            JsonbValue::String(s) => match numeric::parse_decimal(s) {
                Some(n) => n,
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::NonNumericItem,
                        format!(
                            "argument \"{s}\" of jsonpath item method .{}() is invalid \
                             for type numeric",
                            jsp.op.name()
                        ),
                    ));
                }
            },
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NonNumericItem,
                    format!(
                        "jsonpath item method .{}() can only be applied to a string or \
                         numeric value",
                        jsp.op.name()
                    ),
                ));
            }
        };

        if let PathOp::Decimal {
            precision: Some(precision),
            scale,
        } = &jsp.op
        {
            let precision = match numeric::to_i32_rounded(*precision) {
                Some(p) => p,
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::NonNumericItem,
                        "precision of jsonpath item method .decimal() is out of range \
                         for type integer",
                    ));
                }
            };
            let scale = match scale {
                Some(s) => match numeric::to_i32_rounded(*s) {
                    Some(s) => s,
                    None => {
                        return self.maybe_throw(Error::new(
                            ErrorCode::NonNumericItem,
                            "scale of jsonpath item method .decimal() is out of range \
                             for type integer",
                        ));
                    }
                },
                None => 0,
            };
            num = match numeric::apply_typmod(num, precision, scale) {
                Ok(n) => n,
                Err(e) => return self.maybe_throw(e),
            };
        }

        self.execute_next_item(jsp, &JsonbValue::Numeric(num), found)
    }

    fn execute_string_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let text = match jb {
            JsonbValue::String(s) => s.clone(),
            JsonbValue::Numeric(n) => n.to_string(),
            JsonbValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            JsonbValue::Datetime(dt) => dt.to_string(),
            JsonbValue::Null | JsonbValue::Binary(_) => {
                return self.maybe_throw(Error::new(
                    ErrorCode::NonNumericItem,
                    "jsonpath item method .string() can only be applied to a boolean, \
                     string, numeric, or datetime value",
                ));
            }
        };
        self.execute_next_item(jsp, &JsonbValue::String(text), found)
    }

    fn execute_datetime_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let (target, template, precision) = match &jsp.op {
            PathOp::Datetime(template) => (DatetimeTarget::Any, template.as_deref(), None),
            PathOp::Date => (DatetimeTarget::Date, None, None),
            PathOp::Time { precision } => (DatetimeTarget::Time, None, *precision),
            PathOp::TimeTz { precision } => (DatetimeTarget::TimeTz, None, *precision),
            PathOp::Timestamp { precision } => (DatetimeTarget::Timestamp, None, *precision),
            PathOp::TimestampTz { precision } => (DatetimeTarget::TimestampTz, None, *precision),
            other => return Err(Error::internal(format!("not a datetime method: {}", other.name()))),
        };

        let text = match jb.as_string() {
            Some(s) => s,
            None => {
                return self.maybe_throw(Error::new(
                    ErrorCode::DatetimeFormat,
                    format!(
                        "jsonpath item method .{}() can only be applied to a string",
                        jsp.op.name()
                    ),
                ));
            }
        };

        let precision = match precision {
            Some(p) => match numeric::to_i32_rounded(p) {
                Some(p) => Some(p),
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::DatetimeFormat,
                        format!(
                            "time precision of jsonpath item method .{}() is out of range \
                             for type integer",
                            jsp.op.name()
                        ),
                    ));
                }
            },
            None => None,
        };

        let parsed = match template {
            Some(template) => match datetime::parse_with_template(text, template) {
                Ok(v) => v,
                Err(e) => return self.maybe_throw(e),
            },
            None => match datetime::parse_iso_datetime(text) {
                Some(v) => v,
                None => {
                    return self.maybe_throw(Error::new(
                        ErrorCode::DatetimeFormat,
                        format!(
                            "{} format is not recognized: \"{text}\"",
                            target_display_name(target)
                        ),
                    ));
                }
            },
        };

        let cast = match datetime::cast_to_target(parsed, target, text, self.use_tz, self.local_tz)
        {
            Ok(v) => v,
            Err(e) => return self.maybe_throw(e),
        };

        let value = match precision {
            Some(p) => match datetime::apply_precision(cast, target, p) {
                Ok(v) => v,
                Err(e) => return self.maybe_throw(e),
            },
            None => cast,
        };

        self.execute_next_item(jsp, &JsonbValue::Datetime(value), found)
    }

    fn execute_keyvalue_method(
        &mut self,
        jsp: &PathStep,
        jb: &JsonbValue,
        mut found: Found<'_>,
    ) -> Result<ExecStatus, Error> {
        let container = match jb {
            JsonbValue::Binary(c) if c.kind() == ContainerKind::Object => c.clone(),
            _ => {
                return self.maybe_throw(Error::new(
                    ErrorCode::ObjectNotFound,
                    "jsonpath item method .keyvalue() can only be applied to an object",
                ));
            }
        };

        if container.is_empty() {
            return Ok(ExecStatus::NotFound);
        }

        // The id names the iterated object: its base id scaled up, plus the
        // object's distance from the base container.
        let base_position = self
            .base_object
            .container
            .as_ref()
            .map(|c| c.position() as i64)
            .unwrap_or(0);
        let id = self.base_object.id * GENERATED_ID_STEP
            + (container.position() as i64 - base_position);
        let id_value = JsonbValue::Numeric(Decimal::from(id));

        let has_next = jsp.has_next();
        let mut res = ExecStatus::NotFound;

        for (key, value) in container.entries() {
            res = ExecStatus::Found;
            if !has_next && found.is_none() {
                break;
            }

            let obj = build_object(vec![
                ("key".to_string(), JsonbValue::String(key)),
                ("value".to_string(), value),
                ("id".to_string(), id_value.clone()),
            ]);

            let generated_id = self.last_generated_object_id;
            self.last_generated_object_id += 1;
            let saved = self.set_base_object(&obj, generated_id);
            let r = self.execute_next_item(jsp, &obj, found.as_deref_mut());
            self.base_object = saved;
            res = r?;

            if res.is_error() {
                return Ok(res);
            }
            if res == ExecStatus::Found && found.is_none() {
                break;
            }
        }

        Ok(res)
    }
}

fn target_display_name(target: DatetimeTarget) -> &'static str {
    match target {
        DatetimeTarget::Any => "datetime",
        DatetimeTarget::Date => "date",
        DatetimeTarget::Time => "time",
        DatetimeTarget::TimeTz => "time_tz",
        DatetimeTarget::Timestamp => "timestamp",
        DatetimeTarget::TimestampTz => "timestamp_tz",
    }
}

// ---------------------------------------------------------------------------
// Regex support
// ---------------------------------------------------------------------------

fn compile_regex(pattern: &str, flags: &str) -> Result<Regex, Error> {
    let quoted = flags.contains('q');
    let escaped;
    let pattern = if quoted {
        escaped = regex_escape(pattern);
        escaped.as_str()
    } else {
        pattern
    };

    let mut builder = fancy_regex::RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            'x' => {
                if !quoted {
                    builder.verbose_mode(true);
                }
            }
            'q' => {}
            other => {
                return Err(Error::new(
                    ErrorCode::InvalidRegex,
                    format!("unrecognized flag character \"{other}\" in like_regex predicate"),
                ));
            }
        }
    }
    builder.build().map_err(|e| {
        Error::new(
            ErrorCode::InvalidRegex,
            format!("invalid regular expression: {e}"),
        )
    })
}

fn regex_escape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        if c.is_ascii_alphanumeric() || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}
