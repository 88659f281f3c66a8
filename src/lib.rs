//! SQL/JSON path interpreter over a self-describing binary JSON document
//! model.
//!
//! Compile a path with [`parse_path`], build a document with
//! [`Jsonb::try_from`] or [`Jsonb::from_str`](std::str::FromStr), then
//! query it:
//!
//! ```
//! use jsonb_path::{parse_path, path_query, EvalOptions, Jsonb};
//!
//! let doc = Jsonb::try_from(serde_json::json!({"a": [1, 2, 3]})).unwrap();
//! let path = parse_path("$.a[*] ? (@ > 1)").unwrap();
//! let found = path_query(&doc, &path, &(), &EvalOptions::default()).unwrap();
//! assert_eq!(found.len(), 2);
//! ```

pub mod ast;
pub mod engine;
pub mod jsonb;
pub mod parser;
pub mod table;

pub use ast::{JsonPath, PathMode};
pub use engine::{
    execute_path, path_exists, path_match, path_query, path_query_array, path_query_first,
    path_value, Error, ErrorCode, EvalOptions, ExecStatus, JsonbVars, ValueResult, VarBinding,
    Variables, Wrapper,
};
pub use jsonb::{
    ContainerKind, Jsonb, JsonbContainer, JsonbDatetime, JsonbType, JsonbValue, ValueList,
};
pub use parser::parse_path;
pub use table::{JsonTable, TableColumn, TablePlan};
