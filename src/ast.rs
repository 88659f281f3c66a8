//! Compiled path representation consumed by the engine.
//!
//! A path is a linked chain of [`PathStep`]s; every step carries its
//! operator payload and an optional next step. Operand sub-expressions
//! (arithmetic and predicate arguments, subscripts) are themselves step
//! chains, so the whole expression is one tree of chains.

use rust_decimal::Decimal;

/// Evaluation mode of a compiled path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// Auto-unwrap arrays, auto-wrap scalars and ignore structural errors.
    Lax,
    /// Demand exact shapes; sequences are drained to surface hidden errors.
    Strict,
}

/// A compiled path expression: mode prefix plus the root step chain.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    pub mode: PathMode,
    pub root: PathStep,
}

impl JsonPath {
    pub fn is_lax(&self) -> bool {
        self.mode == PathMode::Lax
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    pub op: PathOp,
    pub next: Option<Box<PathStep>>,
}

impl PathStep {
    pub fn new(op: PathOp) -> Self {
        PathStep { op, next: None }
    }

    pub fn next(&self) -> Option<&PathStep> {
        self.next.as_deref()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Whether this step is a boolean-valued (predicate) operator.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self.op,
            PathOp::And(..)
                | PathOp::Or(..)
                | PathOp::Not(_)
                | PathOp::IsUnknown(_)
                | PathOp::Comparison(..)
                | PathOp::StartsWith(..)
                | PathOp::LikeRegex { .. }
                | PathOp::Exists(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    /// Operator spelling used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// One array subscript: a single index expression or a `from to` range.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscript {
    pub from: PathStep,
    pub to: Option<PathStep>,
}

/// Bounds of the `.**` accessor; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyBounds {
    pub first: Option<u32>,
    pub last: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathOp {
    // Producers
    Root,
    Current,
    Last,
    Null,
    Bool(bool),
    Numeric(Decimal),
    String(String),
    Variable(String),

    // Accessors
    Key(String),
    AnyKey,
    AnyArray,
    IndexArray(Vec<Subscript>),
    Any(AnyBounds),
    Filter(Box<PathStep>),

    // Boolean items
    And(Box<PathStep>, Box<PathStep>),
    Or(Box<PathStep>, Box<PathStep>),
    Not(Box<PathStep>),
    IsUnknown(Box<PathStep>),
    Comparison(CmpOp, Box<PathStep>, Box<PathStep>),
    StartsWith(Box<PathStep>, Box<PathStep>),
    LikeRegex {
        expr: Box<PathStep>,
        pattern: String,
        flags: String,
    },
    Exists(Box<PathStep>),

    // Arithmetic
    Arith(ArithOp, Box<PathStep>, Box<PathStep>),
    Plus(Box<PathStep>),
    Minus(Box<PathStep>),

    // Item methods
    Type,
    Size,
    Abs,
    Floor,
    Ceiling,
    Double,
    KeyValue,
    Bigint,
    Integer,
    Boolean,
    Number,
    Decimal {
        precision: Option<Decimal>,
        scale: Option<Decimal>,
    },
    StringFunc,
    Datetime(Option<String>),
    Date,
    Time {
        precision: Option<Decimal>,
    },
    TimeTz {
        precision: Option<Decimal>,
    },
    Timestamp {
        precision: Option<Decimal>,
    },
    TimestampTz {
        precision: Option<Decimal>,
    },
}

impl PathOp {
    /// Operation name as used in error messages (`.size()`, `+`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            PathOp::Root => "$",
            PathOp::Current => "@",
            PathOp::Last => "last",
            PathOp::Null => "null",
            PathOp::Bool(_) => "boolean literal",
            PathOp::Numeric(_) => "numeric literal",
            PathOp::String(_) => "string literal",
            PathOp::Variable(_) => "variable",
            PathOp::Key(_) => "member accessor",
            PathOp::AnyKey => ".*",
            PathOp::AnyArray => "[*]",
            PathOp::IndexArray(_) => "array subscript",
            PathOp::Any(_) => ".**",
            PathOp::Filter(_) => "filter",
            PathOp::And(..) => "&&",
            PathOp::Or(..) => "||",
            PathOp::Not(_) => "!",
            PathOp::IsUnknown(_) => "is unknown",
            PathOp::Comparison(CmpOp::Eq, ..) => "==",
            PathOp::Comparison(CmpOp::Ne, ..) => "!=",
            PathOp::Comparison(CmpOp::Lt, ..) => "<",
            PathOp::Comparison(CmpOp::Le, ..) => "<=",
            PathOp::Comparison(CmpOp::Gt, ..) => ">",
            PathOp::Comparison(CmpOp::Ge, ..) => ">=",
            PathOp::StartsWith(..) => "starts with",
            PathOp::LikeRegex { .. } => "like_regex",
            PathOp::Exists(_) => "exists",
            PathOp::Arith(op, ..) => op.name(),
            PathOp::Plus(_) => "+",
            PathOp::Minus(_) => "-",
            PathOp::Type => "type",
            PathOp::Size => "size",
            PathOp::Abs => "abs",
            PathOp::Floor => "floor",
            PathOp::Ceiling => "ceiling",
            PathOp::Double => "double",
            PathOp::KeyValue => "keyvalue",
            PathOp::Bigint => "bigint",
            PathOp::Integer => "integer",
            PathOp::Boolean => "boolean",
            PathOp::Number => "number",
            PathOp::Decimal { .. } => "decimal",
            PathOp::StringFunc => "string",
            PathOp::Datetime(_) => "datetime",
            PathOp::Date => "date",
            PathOp::Time { .. } => "time",
            PathOp::TimeTz { .. } => "time_tz",
            PathOp::Timestamp { .. } => "timestamp",
            PathOp::TimestampTz { .. } => "timestamp_tz",
        }
    }
}
