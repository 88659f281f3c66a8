pub mod evaluator;
pub mod runtime;

pub(crate) mod comparison;
pub(crate) mod datetime;
pub(crate) mod numeric;
pub(crate) mod predicate;

pub use evaluator::{
    execute_path, path_exists, path_match, path_query, path_query_array, path_query_first,
    path_value, ExecStatus, ValueResult, Wrapper,
};
pub use runtime::{Error, ErrorCode, EvalOptions, JsonbVars, VarBinding, Variables};
