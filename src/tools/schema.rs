//! Schema introspection tools.
//!
//! This module implements the `list_tables` and `get_table_schema` MCP tools.

use crate::db::ConnectionProvider;
use crate::db::schema::SchemaInspector;
use crate::error::{SqlToolError, SqlToolResult};
use crate::models::{TableInfo, TableSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the list_tables tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list. PostgreSQL defaults to "public", MySQL to the current database; ignored by SQLite
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// Tables and views, ordered by name
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

/// Input for the get_table_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTableSchemaInput {
    /// Table name
    pub table_name: String,
    /// Schema containing the table. Same defaults as list_tables
    #[serde(default)]
    pub schema: Option<String>,
}

impl GetTableSchemaInput {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
        }
    }
}

/// Handler for schema tools.
#[derive(Clone)]
pub struct SchemaToolHandler {
    provider: Arc<ConnectionProvider>,
}

impl SchemaToolHandler {
    pub fn new(provider: Arc<ConnectionProvider>) -> Self {
        Self { provider }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> SqlToolResult<ListTablesOutput> {
        let schema = non_blank(input.schema.as_deref());
        let tables = SchemaInspector::list_tables(&self.provider, schema).await?;
        let count = tables.len();

        info!(count, schema = ?schema, "Listed tables");
        Ok(ListTablesOutput { tables, count })
    }

    pub async fn get_table_schema(&self, input: GetTableSchemaInput) -> SqlToolResult<TableSchema> {
        let table_name = input.table_name.trim();
        if table_name.is_empty() {
            return Err(SqlToolError::invalid_input("table_name must not be empty"));
        }
        let schema = non_blank(input.schema.as_deref());

        let described = SchemaInspector::describe_table(&self.provider, table_name, schema).await?;

        info!(
            table = %described.qualified_name(),
            columns = described.columns.len(),
            indexes = described.indexes.len(),
            "Described table"
        );
        Ok(described)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
