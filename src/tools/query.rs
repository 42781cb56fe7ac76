//! Query execution tools.
//!
//! `execute_query` runs any SQL as given. `execute_safe_query` first asks the
//! [`SafeQueryGate`] and only runs statements it allows, inside a read-only
//! scope; a rejected statement never reaches the database.

use crate::db::{ConnectionProvider, ExecutionMode, QueryExecutor};
use crate::error::{SqlToolError, SqlToolResult};
use crate::models::{QueryParam, QueryRequest, QueryResult};
use crate::tools::safe_query::{SafeQueryGate, Verdict};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Input for the execute_query and execute_safe_query tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// SQL statement to execute
    pub query: String,
    /// Positional parameters for parameterized queries (use ? or $1,$2... placeholders in SQL)
    #[serde(default)]
    pub params: Option<Vec<QueryParam>>,
    /// Query timeout in seconds. Capped by the server's configured timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ExecuteQueryInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: None,
            timeout_secs: None,
        }
    }

    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = Some(params);
        self
    }

    fn into_request(self) -> SqlToolResult<QueryRequest> {
        if self.query.trim().is_empty() {
            return Err(SqlToolError::invalid_input("query must not be empty"));
        }
        let mut request = QueryRequest::new(self.query).with_params(self.params.unwrap_or_default());
        request.timeout_secs = self.timeout_secs;
        Ok(request)
    }
}

/// Handler for the query tools.
#[derive(Clone)]
pub struct QueryToolHandler {
    provider: Arc<ConnectionProvider>,
    executor: QueryExecutor,
    gate: SafeQueryGate,
}

impl QueryToolHandler {
    pub fn new(provider: Arc<ConnectionProvider>, executor: QueryExecutor) -> Self {
        let gate = SafeQueryGate::for_database(provider.db_type());
        Self {
            provider,
            executor,
            gate,
        }
    }

    /// Run the statement unconditionally.
    pub async fn execute_query(&self, input: ExecuteQueryInput) -> SqlToolResult<QueryResult> {
        let request = input.into_request()?;
        let result = self
            .executor
            .execute(&self.provider, &request, ExecutionMode::ReadWrite)
            .await?;

        info!(
            rows = result.row_count(),
            truncated = result.truncated(),
            execution_time_ms = result.execution_time_ms(),
            "execute_query completed"
        );
        Ok(result)
    }

    /// Run the statement only if the gate allows it.
    pub async fn execute_safe_query(
        &self,
        input: ExecuteQueryInput,
    ) -> SqlToolResult<QueryResult> {
        let request = input.into_request()?;

        if let Verdict::Rejected(reason) = self.gate.check(&request.sql) {
            warn!(
                sql = %request.preview(),
                reason = %reason,
                "Safe query rejected"
            );
            return Err(SqlToolError::safety_rejection(reason.to_string()));
        }

        let result = self
            .executor
            .execute(&self.provider, &request, ExecutionMode::ReadOnly)
            .await?;

        info!(
            rows = result.row_count(),
            truncated = result.truncated(),
            execution_time_ms = result.execution_time_ms(),
            "execute_safe_query completed"
        );
        Ok(result)
    }
}
