//! MCP service implementation using rmcp.
//!
//! [`SqlToolsService`] exposes the four SQL tools through rmcp's macros.
//! Tool handlers return [`SqlToolError`](crate::error::SqlToolError), converted
//! to MCP errors here.

use crate::db::{ConnectionProvider, QueryExecutor};
use crate::models::{QueryResult, TableSchema};
use crate::tools::query::{ExecuteQueryInput, QueryToolHandler};
use crate::tools::schema::{
    GetTableSchemaInput, ListTablesInput, ListTablesOutput, SchemaToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct SqlToolsService {
    schema_handler: SchemaToolHandler,
    query_handler: QueryToolHandler,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl SqlToolsService {
    /// Create a service over one shared connection provider.
    pub fn new(provider: Arc<ConnectionProvider>, executor: QueryExecutor) -> Self {
        Self {
            schema_handler: SchemaToolHandler::new(provider.clone()),
            query_handler: QueryToolHandler::new(provider, executor),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl SqlToolsService {
    #[tool(
        description = "List all tables and views in the database.\nPostgreSQL defaults to the `public` schema, MySQL to the current database.\nSQLite has a single namespace and ignores `schema`."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        self.schema_handler
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Get the schema of a table: columns (in order) with types, nullability and defaults, the primary key, and indexes.\nAn unknown table returns an empty column list."
    )]
    async fn get_table_schema(
        &self,
        Parameters(input): Parameters<GetTableSchemaInput>,
    ) -> Result<Json<TableSchema>, McpError> {
        self.schema_handler
            .get_table_schema(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute any SQL statement, including INSERT, UPDATE, DELETE and DDL.\nSupports parameterized queries (? or $1,$2... placeholders) to prevent SQL injection.\nReturns columns, rows (capped at the server's row limit) and a truncated flag.\nPrefer execute_safe_query for reads."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Result<Json<QueryResult>, McpError> {
        self.query_handler
            .execute_query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a read-only query.\nOnly a single SELECT (or WITH ... SELECT) statement is accepted; anything else is rejected with a reason and never executed.\nThe statement also runs inside a read-only transaction.\nSupports parameterized queries (? or $1,$2... placeholders)."
    )]
    async fn execute_safe_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Result<Json<QueryResult>, McpError> {
        self.query_handler
            .execute_safe_query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for SqlToolsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                title: Some("SQL Tools MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "SQL tools for one configured database (PostgreSQL, MySQL or SQLite).\n\
                \n\
                ## Workflow\n\
                1. Call `list_tables` to discover tables and views\n\
                2. Call `get_table_schema` for the columns and indexes you need\n\
                3. Read data with `execute_safe_query`\n\
                4. Use `execute_query` only when a statement must modify data or schema\n\
                \n\
                ## Safe Queries\n\
                `execute_safe_query` accepts exactly one SELECT (or WITH ... SELECT).\n\
                Multiple statements, DDL, DML and administrative commands are rejected\n\
                with a reason and never reach the database.\n\
                \n\
                ## Parameters\n\
                Pass values in `params` instead of splicing them into SQL.\n\
                Placeholders: `$1, $2, ...` for PostgreSQL, `?` for MySQL and SQLite.\n\
                \n\
                ## Limits\n\
                Results are capped at the server's row limit; `truncated: true` means\n\
                more rows exist. Narrow the query or add LIMIT."
                    .to_string(),
            ),
        }
    }
}
