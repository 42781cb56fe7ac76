//! Data models shared by the database layer and the tool handlers.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionConfig, DatabaseType};
pub use query::{ColumnMetadata, QueryParam, QueryRequest, QueryResult};
pub use schema::{ColumnDefinition, IndexInfo, TableInfo, TableSchema, TableType};
