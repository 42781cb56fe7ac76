//! MCP tool implementations.
//!
//! - `schema`: `list_tables` and `get_table_schema`
//! - `query`: `execute_query` and `execute_safe_query`
//! - `safe_query`: the read-only gate used by `execute_safe_query`

pub mod query;
pub mod safe_query;
pub mod schema;

pub use query::{ExecuteQueryInput, QueryToolHandler};
pub use safe_query::{RejectionReason, SafeQueryGate, Verdict, classify};
pub use schema::{GetTableSchemaInput, ListTablesInput, ListTablesOutput, SchemaToolHandler};
