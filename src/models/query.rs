//! Query request and result models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A positional parameter for a parameterized query.
///
/// Deserialized straight from the JSON value the caller supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl QueryParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

/// SQL text plus its bound parameters, owned by a single tool invocation.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<QueryParam>,
    /// Per-call override; capped by the server's configured timeout.
    pub timeout_secs: Option<u64>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn with_param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = QueryParam>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Requested timeout, never above `max_secs` and never zero.
    pub fn effective_timeout(&self, max_secs: u64) -> u64 {
        self.timeout_secs
            .map(|t| t.clamp(1, max_secs.max(1)))
            .unwrap_or(max_secs)
    }

    /// First 100 characters of the SQL, for logs.
    pub fn preview(&self) -> String {
        const PREVIEW_CHARS: usize = 100;
        let mut chars = self.sql.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "INT8", "VARCHAR", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Rows produced by one successful execution.
///
/// Fields are read-only once built.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryResult {
    columns: Vec<ColumnMetadata>,
    rows: Vec<serde_json::Map<String, JsonValue>>,
    row_count: usize,
    /// More rows were available than the configured maximum
    truncated: bool,
    execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(
        columns: Vec<ColumnMetadata>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
        truncated: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            truncated,
            execution_time_ms,
        }
    }

    /// Result of a statement that produced no rows.
    pub fn empty(execution_time_ms: u64) -> Self {
        Self::new(Vec::new(), Vec::new(), false, execution_time_ms)
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn rows(&self) -> &[serde_json::Map<String, JsonValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_from_json() {
        let params: Vec<QueryParam> =
            serde_json::from_value(json!([null, true, 42, 1.5, "alice", [1, 2], {"k": "v"}]))
                .unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(42),
                QueryParam::Float(1.5),
                QueryParam::String("alice".to_string()),
                QueryParam::Json(json!([1, 2])),
                QueryParam::Json(json!({"k": "v"})),
            ]
        );
    }

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::Json(json!({})).type_name(), "json");
    }

    #[test]
    fn test_effective_timeout() {
        let req = QueryRequest::new("SELECT 1");
        assert_eq!(req.effective_timeout(30), 30);
        assert_eq!(req.clone().with_timeout(5).effective_timeout(30), 5);
        assert_eq!(req.clone().with_timeout(600).effective_timeout(30), 30);
        assert_eq!(req.with_timeout(0).effective_timeout(30), 1);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let short = QueryRequest::new("SELECT 1");
        assert_eq!(short.preview(), "SELECT 1");

        let long = QueryRequest::new(format!("SELECT '{}'", "é".repeat(200)));
        let preview = long.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 103);
    }

    #[test]
    fn test_query_result_counts_rows() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), json!(1));
        let result = QueryResult::new(
            vec![ColumnMetadata::new("id", "INTEGER")],
            vec![row.clone(), row],
            true,
            12,
        );
        assert_eq!(result.row_count(), 2);
        assert!(result.truncated());
        assert_eq!(result.columns()[0].name, "id");

        let serialized = serde_json::to_value(&result).unwrap();
        assert_eq!(serialized["row_count"], 2);
        assert_eq!(serialized["rows"][0]["id"], 1);
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty(3);
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert!(!result.truncated());
        assert_eq!(result.execution_time_ms(), 3);
    }
}
