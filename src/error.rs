//! Error types for the SQL tools server.
//!
//! Every failure a tool call can produce is a variant of [`SqlToolError`].
//! Variants carry enough context (SQLSTATE, suggestion, rejection reason) for
//! an AI assistant to correct its request without a second round-trip.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlToolError {
    /// Missing or malformed startup configuration. Fatal.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// The safe-query gate refused the statement; it was never executed.
    #[error("Query rejected: {reason}")]
    SafetyRejection { reason: String },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g. "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SqlToolError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn safety_rejection(reason: impl Into<String>) -> Self {
        Self::SafetyRejection {
            reason: reason.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Execution { suggestion, .. } => Some(suggestion),
            Self::SafetyRejection { .. } => Some(
                "execute_safe_query accepts a single SELECT (or WITH ... SELECT) statement; use execute_query for anything else",
            ),
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or narrowing the query")
            }
            _ => None,
        }
    }
}

/// Convert sqlx errors into connection or execution failures.
impl From<sqlx::Error> for SqlToolError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => SqlToolError::connection(
                msg.to_string(),
                "Check the DATABASE_URL format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                SqlToolError::execution(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => SqlToolError::execution(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => SqlToolError::connection(
                "Timed out waiting for a pooled connection",
                "The database may be overloaded; retry later or raise max_connections",
            ),
            sqlx::Error::PoolClosed => SqlToolError::connection(
                "Connection pool is closed",
                "The server is shutting down",
            ),
            sqlx::Error::Io(io_err) => SqlToolError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => SqlToolError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => SqlToolError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => SqlToolError::execution(
                format!("Column not found: {}", col),
                None,
                "Check the column names referenced by the query",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                SqlToolError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                SqlToolError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => SqlToolError::internal("Database worker crashed"),
            _ => SqlToolError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

pub type SqlToolResult<T> = Result<T, SqlToolError>;

fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert into MCP error data, carrying the suggestion in `data` when present.
impl From<SqlToolError> for rmcp::ErrorData {
    fn from(err: SqlToolError) -> Self {
        match &err {
            SqlToolError::InvalidInput { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }
            SqlToolError::SafetyRejection { reason } => rmcp::ErrorData::invalid_params(
                err.to_string(),
                Some(serde_json::json!({
                    "reason": reason,
                    "suggestion": err.suggestion(),
                })),
            ),
            SqlToolError::Execution {
                message,
                sql_state,
                suggestion,
            } => {
                let msg = match sql_state {
                    Some(code) => format!("Execution failed: {} (SQLSTATE: {})", message, code),
                    None => err.to_string(),
                };
                rmcp::ErrorData::internal_error(msg, suggestion_data(Some(suggestion)))
            }
            SqlToolError::Configuration { .. }
            | SqlToolError::Connection { .. }
            | SqlToolError::Timeout { .. }
            | SqlToolError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}
