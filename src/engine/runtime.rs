//! Runtime support for path evaluation: the error type with its closed code
//! set, evaluation options, and variable environments.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::FixedOffset;

use crate::jsonb::{ContainerKind, Jsonb, JsonbContainer, JsonbValue};

/// Canonicalized set of error codes emitted by the engine.
///
/// Suppressible codes collapse into the `Error` disposition when evaluation
/// runs silently; the remaining codes are policy violations that surface
/// regardless of suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Structural
    ArrayNotFound,  // array accessor applied to a non-array
    ObjectNotFound, // member accessor applied to a non-object
    MemberNotFound, // object key missing in strict mode
    // Operand shape
    SingletonRequired, // operand is not a single numeric item
    NumberNotFound,    // unary operand is not numeric
    NonNumericItem,    // method argument has the wrong item type
    // Numerics
    NumericOutOfRange,
    DivisionByZero,
    InvalidSubscript, // subscript not a single numeric / out of bounds
    // Datetime
    DatetimeFormat, // unrecognized format, bad precision, incompatible target
    // Surface shape
    SingleBooleanRequired, // match requires a single boolean result
    MoreThanOneItem,       // unwrapped query produced multiple items
    // Non-suppressible policy violations
    UndefinedVariable,
    TimezoneRequired, // cast crosses the tz boundary while use_tz is off
    InvalidRegex,
    InvalidDocument,
    StackDepthExceeded,
    Interrupted,
    Internal,
    // Path compilation
    Syntax,
}

impl ErrorCode {
    /// Whether an error of this code may be suppressed into the `Error`
    /// disposition (rendered as SQL NULL upstream).
    pub fn is_suppressible(&self) -> bool {
        matches!(
            self,
            ErrorCode::ArrayNotFound
                | ErrorCode::ObjectNotFound
                | ErrorCode::MemberNotFound
                | ErrorCode::SingletonRequired
                | ErrorCode::NumberNotFound
                | ErrorCode::NonNumericItem
                | ErrorCode::NumericOutOfRange
                | ErrorCode::DivisionByZero
                | ErrorCode::InvalidSubscript
                | ErrorCode::DatetimeFormat
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} ({code:?})")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::new(ErrorCode::Internal, message)
    }

    pub fn is_suppressible(&self) -> bool {
        self.code.is_suppressible()
    }
}

/// Evaluation options shared by every public entry point.
///
/// The default configuration raises suppressible errors, refuses casts that
/// need a timezone and treats the local timezone as UTC.
#[derive(Clone)]
pub struct EvalOptions {
    /// Suppress suppressible errors into the `Error` disposition.
    pub silent: bool,
    /// Permit timezone-sensitive datetime casts.
    pub use_tz: bool,
    /// Timezone applied when a tz-crossing cast needs one.
    pub local_tz: FixedOffset,
    /// Cooperative cancellation flag, polled at every recursion step.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            silent: false,
            use_tz: false,
            local_tz: FixedOffset::east_opt(0).expect("utc offset"),
            cancel: None,
        }
    }
}

impl EvalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the suppressing configuration used by the `@?`/`@@`
    /// style wrappers.
    pub fn silent() -> Self {
        EvalOptions {
            silent: true,
            ..Self::default()
        }
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_tz(mut self) -> Self {
        self.use_tz = true;
        self
    }

    pub fn with_local_tz(mut self, offset_seconds: i32) -> Self {
        if let Some(tz) = FixedOffset::east_opt(offset_seconds) {
            self.local_tz = tz;
        }
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }
}

impl fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalOptions")
            .field("silent", &self.silent)
            .field("use_tz", &self.use_tz)
            .field("local_tz", &self.local_tz)
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

/// Resolved variable binding: the value plus the base-object identity used
/// by `.keyvalue()`.
#[derive(Debug, Clone)]
pub struct VarBinding {
    pub value: JsonbValue,
    pub base_id: i64,
    pub base: Option<JsonbContainer>,
}

/// Environment resolving `$name` references.
///
/// `count` reports the number of base objects contributed by the
/// environment; it seeds the generated-object id counter.
pub trait Variables {
    fn get(&self, name: &str) -> Option<VarBinding>;
    fn count(&self) -> usize;
}

/// The empty environment.
impl Variables for () {
    fn get(&self, _name: &str) -> Option<VarBinding> {
        None
    }

    fn count(&self) -> usize {
        0
    }
}

/// Variables supplied as a single JSON object document; every binding
/// shares the object as its base (id 1).
#[derive(Debug, Clone)]
pub struct JsonbVars {
    object: JsonbContainer,
}

impl JsonbVars {
    pub fn new(doc: &Jsonb) -> Result<Self, Error> {
        match doc.root_value() {
            JsonbValue::Binary(c) if c.kind() == ContainerKind::Object => {
                Ok(JsonbVars { object: c })
            }
            _ => Err(Error::new(
                ErrorCode::InvalidDocument,
                "path variables must be encoded as key-value pairs of an object",
            )),
        }
    }
}

impl Variables for JsonbVars {
    fn get(&self, name: &str) -> Option<VarBinding> {
        self.object.find_key(name).map(|value| VarBinding {
            value,
            base_id: 1,
            base: Some(self.object.clone()),
        })
    }

    fn count(&self) -> usize {
        1
    }
}

/// Variables supplied as an ordered name/value list (the PASSING-argument
/// form used by the tabular driver). Ids are 1-based ordinals; a binary
/// value acts as its own base object.
impl Variables for Vec<(String, JsonbValue)> {
    fn get(&self, name: &str) -> Option<VarBinding> {
        self.iter()
            .position(|(n, _)| n == name)
            .map(|idx| {
                let value = self[idx].1.clone();
                let base = match &value {
                    JsonbValue::Binary(c) => Some(c.clone()),
                    _ => None,
                };
                VarBinding {
                    value,
                    base_id: (idx + 1) as i64,
                    base,
                }
            })
    }

    fn count(&self) -> usize {
        self.len()
    }
}
