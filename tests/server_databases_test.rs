//! Tool tests against live PostgreSQL and MySQL servers.
//!
//! Set `TEST_POSTGRES_URL` and/or `TEST_MYSQL_URL` to run them; each test
//! returns early when its variable is unset. Tables get a random suffix so
//! runs never collide.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use sqltools_mcp_server::SqlToolError;
use sqltools_mcp_server::db::{ConnectionProvider, QueryExecutor};
use sqltools_mcp_server::models::{ConnectionConfig, QueryParam};
use sqltools_mcp_server::tools::{
    ExecuteQueryInput, GetTableSchemaInput, ListTablesInput, QueryToolHandler, SchemaToolHandler,
};
use std::sync::Arc;

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

async fn handlers(url: &str) -> (QueryToolHandler, SchemaToolHandler) {
    let config = Arc::new(ConnectionConfig::parse(url).expect("Failed to parse config"));
    let provider = Arc::new(
        ConnectionProvider::connect(config)
            .await
            .expect("Failed to connect"),
    );
    (
        QueryToolHandler::new(provider.clone(), QueryExecutor::new(10, 100)),
        SchemaToolHandler::new(provider),
    )
}

async fn exercise(url: &str, placeholder: &str) {
    let (query, schema) = handlers(url).await;
    let table = format!("tools_test_{}", random_suffix());

    query
        .execute_query(ExecuteQueryInput::new(format!(
            "CREATE TABLE {table} (id BIGINT PRIMARY KEY, label VARCHAR(40) NOT NULL, score INT DEFAULT 0)"
        )))
        .await
        .unwrap();

    for (id, label) in [(1, "alpha"), (2, "beta"), (3, "gamma")] {
        let sql = match placeholder {
            "$" => format!("INSERT INTO {table} (id, label) VALUES ($1, $2)"),
            _ => format!("INSERT INTO {table} (id, label) VALUES (?, ?)"),
        };
        query
            .execute_query(ExecuteQueryInput::new(sql).with_params(vec![
                QueryParam::Int(id),
                QueryParam::String(label.into()),
            ]))
            .await
            .unwrap();
    }

    let listed = schema.list_tables(ListTablesInput::default()).await.unwrap();
    assert!(listed.tables.iter().any(|t| t.name == table));

    let first = schema
        .get_table_schema(GetTableSchemaInput::new(&table))
        .await
        .unwrap();
    let second = schema
        .get_table_schema(GetTableSchemaInput::new(&table))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.primary_key, vec!["id".to_string()]);
    let names: Vec<&str> = first.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "label", "score"]);
    assert!(!first.columns[1].nullable);

    let result = query
        .execute_safe_query(ExecuteQueryInput::new(format!(
            "SELECT label FROM {table} ORDER BY id"
        )))
        .await
        .unwrap();
    assert_eq!(result.row_count(), 3);
    assert_eq!(result.rows()[0]["label"], json!("alpha"));

    let err = query
        .execute_safe_query(ExecuteQueryInput::new(format!(
            "SELECT 1; DELETE FROM {table}"
        )))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlToolError::SafetyRejection { .. }));

    let count = query
        .execute_safe_query(ExecuteQueryInput::new(format!(
            "SELECT COUNT(*) AS n FROM {table}"
        )))
        .await
        .unwrap();
    assert_eq!(count.rows()[0]["n"], json!(3));

    query
        .execute_query(ExecuteQueryInput::new(format!("DROP TABLE {table}")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_postgres_tools() {
    let Ok(url) = std::env::var("TEST_POSTGRES_URL") else {
        return;
    };
    exercise(&url, "$").await;
}

#[tokio::test]
async fn test_mysql_tools() {
    let Ok(url) = std::env::var("TEST_MYSQL_URL") else {
        return;
    };
    exercise(&url, "?").await;
}

#[tokio::test]
async fn test_postgres_read_only_scope_blocks_side_effects() {
    let Ok(url) = std::env::var("TEST_POSTGRES_URL") else {
        return;
    };
    let (query, _) = handlers(&url).await;
    let sequence = format!("tools_seq_{}", random_suffix());
    query
        .execute_query(ExecuteQueryInput::new(format!("CREATE SEQUENCE {sequence}")))
        .await
        .unwrap();

    // The gate allows the SELECT; the read-only transaction refuses nextval
    let err = query
        .execute_safe_query(ExecuteQueryInput::new(format!(
            "SELECT nextval('{sequence}')"
        )))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlToolError::Execution { .. }));

    query
        .execute_query(ExecuteQueryInput::new(format!("DROP SEQUENCE {sequence}")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_postgres_numeric_values() {
    let Ok(url) = std::env::var("TEST_POSTGRES_URL") else {
        return;
    };
    let (query, _) = handlers(&url).await;

    // Bound parameters use the extended protocol, so NUMERIC arrives in binary
    let result = query
        .execute_safe_query(
            ExecuteQueryInput::new(
                "SELECT $1::numeric(12,2) AS price, 'NaN'::numeric AS nan, \
                 0.00001::numeric AS tiny, 123456789012345678901234567890::numeric AS huge",
            )
            .with_params(vec![QueryParam::String("123.45".into())]),
        )
        .await
        .unwrap();
    let row = &result.rows()[0];

    let price: f64 = row["price"].as_str().unwrap().parse().unwrap();
    assert!((price - 123.45).abs() < 1e-9);
    assert_eq!(row["nan"], json!("NaN"));
    let tiny: f64 = row["tiny"].as_str().unwrap().parse().unwrap();
    assert!((tiny - 0.00001).abs() < 1e-12);
    assert_eq!(row["huge"], json!("123456789012345678901234567890"));
}
