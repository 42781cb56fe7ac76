//! Database access layer.
//!
//! - Connection provider over a single database-specific pool
//! - Query execution with timeouts, row caps and read-only scopes
//! - Schema introspection
//! - Type mappings from driver values to JSON

pub mod executor;
pub(crate) mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::{ExecutionMode, QueryExecutor};
pub use pool::{ConnectionProvider, DbConnection, DbPool};
pub use schema::SchemaInspector;
