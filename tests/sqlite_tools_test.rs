//! End-to-end tests of the four tools against a file-backed SQLite database.
//!
//! Each test gets its own temporary database file so tests can run in
//! parallel without sharing state.

use serde_json::json;
use sqltools_mcp_server::SqlToolError;
use sqltools_mcp_server::db::{ConnectionProvider, QueryExecutor};
use sqltools_mcp_server::models::{ConnectionConfig, QueryParam, TableType};
use sqltools_mcp_server::tools::{
    ExecuteQueryInput, GetTableSchemaInput, ListTablesInput, QueryToolHandler, SchemaToolHandler,
};
use std::sync::Arc;
use tempfile::NamedTempFile;

struct Fixture {
    query: QueryToolHandler,
    schema: SchemaToolHandler,
    provider: Arc<ConnectionProvider>,
}

async fn setup(max_rows: usize) -> Fixture {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_file.into_temp_path().keep().expect("Failed to keep temp file");
    let url = format!("sqlite:{}", db_path.display());

    let config = Arc::new(ConnectionConfig::parse(&url).expect("Failed to parse config"));
    let provider = Arc::new(
        ConnectionProvider::connect(config)
            .await
            .expect("Failed to connect"),
    );
    let query = QueryToolHandler::new(provider.clone(), QueryExecutor::new(10, max_rows));
    let schema = SchemaToolHandler::new(provider.clone());

    query
        .execute_query(ExecuteQueryInput::new(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX idx_users_name ON users (name);
            CREATE VIEW active_users AS SELECT * FROM users WHERE active = 1;
            INSERT INTO users (email, name) VALUES
                ('ada@example.com', 'Ada'),
                ('grace@example.com', 'Grace'),
                ('linus@example.com', 'Linus');",
        ))
        .await
        .expect("Failed to seed database");

    Fixture {
        query,
        schema,
        provider,
    }
}

async fn user_count(fixture: &Fixture) -> i64 {
    let result = fixture
        .query
        .execute_safe_query(ExecuteQueryInput::new("SELECT COUNT(*) AS n FROM users"))
        .await
        .unwrap();
    result.rows()[0]["n"].as_i64().unwrap()
}

#[tokio::test]
async fn test_list_tables_includes_views() {
    let fixture = setup(100).await;
    let output = fixture
        .schema
        .list_tables(ListTablesInput::default())
        .await
        .unwrap();

    assert_eq!(output.count, 2);
    assert_eq!(output.tables[0].name, "active_users");
    assert_eq!(output.tables[0].table_type, TableType::View);
    assert_eq!(output.tables[1].name, "users");
    assert_eq!(output.tables[1].table_type, TableType::Table);
}

#[tokio::test]
async fn test_get_table_schema_describes_columns_and_indexes() {
    let fixture = setup(100).await;
    let described = fixture
        .schema
        .get_table_schema(GetTableSchemaInput::new("users"))
        .await
        .unwrap();

    let names: Vec<&str> = described.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "name", "active"]);
    assert_eq!(described.primary_key, vec!["id".to_string()]);

    let email = &described.columns[1];
    assert!(!email.nullable);
    let name = &described.columns[2];
    assert!(name.nullable);
    let active = &described.columns[3];
    assert_eq!(active.default_value, Some(json!(1)));

    let by_name = described
        .indexes
        .iter()
        .find(|i| i.name == "idx_users_name")
        .expect("index listed");
    assert_eq!(by_name.columns, vec!["name".to_string()]);
    assert!(!by_name.is_unique);
    assert!(described.indexes.iter().any(|i| i.is_unique && i.columns == ["email"]));
}

#[tokio::test]
async fn test_schema_reads_are_stable_until_changed() {
    let fixture = setup(100).await;
    let first = fixture
        .schema
        .get_table_schema(GetTableSchemaInput::new("users"))
        .await
        .unwrap();
    let second = fixture
        .schema
        .get_table_schema(GetTableSchemaInput::new("users"))
        .await
        .unwrap();
    assert_eq!(first, second);

    fixture
        .query
        .execute_query(ExecuteQueryInput::new("ALTER TABLE users ADD COLUMN age INTEGER"))
        .await
        .unwrap();
    let third = fixture
        .schema
        .get_table_schema(GetTableSchemaInput::new("users"))
        .await
        .unwrap();
    assert_eq!(third.columns.len(), first.columns.len() + 1);
    assert_eq!(third.columns.last().unwrap().name, "age");
}

#[tokio::test]
async fn test_unknown_table_is_empty() {
    let fixture = setup(100).await;
    let described = fixture
        .schema
        .get_table_schema(GetTableSchemaInput::new("no_such_table"))
        .await
        .unwrap();
    assert!(described.is_empty());
    assert!(described.indexes.is_empty());
}

#[tokio::test]
async fn test_execute_query_with_params() {
    let fixture = setup(100).await;
    fixture
        .query
        .execute_query(
            ExecuteQueryInput::new("INSERT INTO users (email, name, active) VALUES (?, ?, ?)")
                .with_params(vec![
                    QueryParam::String("ken@example.com".into()),
                    QueryParam::Null,
                    QueryParam::Bool(false),
                ]),
        )
        .await
        .unwrap();

    let result = fixture
        .query
        .execute_query(
            ExecuteQueryInput::new("SELECT name, active FROM users WHERE email = ?")
                .with_params(vec![QueryParam::String("ken@example.com".into())]),
        )
        .await
        .unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.rows()[0]["name"], json!(null));
    assert_eq!(result.rows()[0]["active"], json!(0));
}

#[tokio::test]
async fn test_param_is_never_interpolated() {
    let fixture = setup(100).await;
    let result = fixture
        .query
        .execute_safe_query(
            ExecuteQueryInput::new("SELECT id FROM users WHERE name = ?")
                .with_params(vec![QueryParam::String("x' OR '1'='1".into())]),
        )
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(user_count(&fixture).await, 3);
}

#[tokio::test]
async fn test_safe_query_reads() {
    let fixture = setup(100).await;
    let result = fixture
        .query
        .execute_safe_query(ExecuteQueryInput::new(
            "WITH named AS (SELECT name FROM users WHERE name IS NOT NULL) \
             SELECT name FROM named ORDER BY name",
        ))
        .await
        .unwrap();

    assert_eq!(result.columns()[0].name, "name");
    let names: Vec<&str> = result
        .rows()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ada", "Grace", "Linus"]);
    assert!(!result.truncated());
}

#[tokio::test]
async fn test_safe_query_rejections_leave_data_intact() {
    let fixture = setup(100).await;
    for sql in [
        "DELETE FROM users",
        "DROP TABLE users",
        "SELECT * FROM users; DROP TABLE users",
        "SELECT 1; DELETE FROM users",
        "UPDATE users SET name = 'x'",
        "PRAGMA query_only = OFF",
    ] {
        let err = fixture
            .query
            .execute_safe_query(ExecuteQueryInput::new(sql))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SqlToolError::SafetyRejection { .. }),
            "{sql:?} gave {err:?}"
        );
    }

    assert_eq!(user_count(&fixture).await, 3);
    let output = fixture
        .schema
        .list_tables(ListTablesInput::default())
        .await
        .unwrap();
    assert_eq!(output.count, 2);
}

#[tokio::test]
async fn test_writes_work_after_safe_queries() {
    let fixture = setup(100).await;
    for _ in 0..3 {
        fixture
            .query
            .execute_safe_query(ExecuteQueryInput::new("SELECT * FROM users"))
            .await
            .unwrap();
    }
    fixture
        .query
        .execute_query(ExecuteQueryInput::new("DELETE FROM users WHERE name = 'Linus'"))
        .await
        .unwrap();
    assert_eq!(user_count(&fixture).await, 2);
}

#[tokio::test]
async fn test_row_cap_truncates() {
    let fixture = setup(2).await;
    let result = fixture
        .query
        .execute_safe_query(ExecuteQueryInput::new("SELECT id FROM users ORDER BY id"))
        .await
        .unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(result.truncated());

    let result = fixture
        .query
        .execute_safe_query(ExecuteQueryInput::new("SELECT id FROM users WHERE id <= 2"))
        .await
        .unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(!result.truncated());
}

#[tokio::test]
async fn test_execution_error_reports_database_message() {
    let fixture = setup(100).await;
    let err = fixture
        .query
        .execute_query(ExecuteQueryInput::new("SELECT nope FROM users"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nope"), "{err}");

    // the pool stays usable
    assert_eq!(user_count(&fixture).await, 3);
}

#[tokio::test]
async fn test_unicode_round_trip() {
    let fixture = setup(100).await;
    let samples = ["日本語", "Ελληνικά", "emoji 🚀🔥", "mixed ÄÖÜ ß"];
    for (i, sample) in samples.iter().enumerate() {
        fixture
            .query
            .execute_query(
                ExecuteQueryInput::new("INSERT INTO users (email, name) VALUES (?, ?)").with_params(
                    vec![
                        QueryParam::String(format!("u{i}@example.com")),
                        QueryParam::String(sample.to_string()),
                    ],
                ),
            )
            .await
            .unwrap();
    }

    for sample in samples {
        let result = fixture
            .query
            .execute_safe_query(
                ExecuteQueryInput::new("SELECT name FROM users WHERE name = ?")
                    .with_params(vec![QueryParam::String(sample.to_string())]),
            )
            .await
            .unwrap();
        assert_eq!(result.rows()[0]["name"], json!(sample));
    }
}

#[tokio::test]
async fn test_concurrent_tool_calls() {
    let fixture = setup(100).await;
    let mut handles = Vec::new();
    for i in 0..8 {
        let query = fixture.query.clone();
        let schema = fixture.schema.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                query
                    .execute_safe_query(ExecuteQueryInput::new("SELECT * FROM users"))
                    .await
                    .map(|r| r.row_count())
            } else {
                schema
                    .list_tables(ListTablesInput::default())
                    .await
                    .map(|o| o.count)
            }
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let count = handle.await.unwrap().unwrap();
        assert_eq!(count, if i % 2 == 0 { 3 } else { 2 });
    }

    fixture.provider.close().await;
    assert!(fixture.provider.pool().is_closed());
}
