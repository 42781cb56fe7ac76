//! Schema introspection.
//!
//! SQL lives in the `queries` submodule, one block per database, and each
//! database-specific submodule (postgres, mysql, sqlite) exposes the same
//! interface. Every identifier supplied by a caller is passed as a bound
//! parameter; nothing is interpolated into the SQL text.
//!
//! Nothing is cached: each call reads the catalogs again, so a table altered
//! between two calls is reported in its new shape.

use crate::db::pool::{ConnectionProvider, DbPool};
use crate::error::SqlToolResult;
use crate::models::{ColumnDefinition, IndexInfo, TableInfo, TableSchema, TableType};
use tracing::debug;

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List tables and views, ordered by name.
    ///
    /// PostgreSQL defaults to `public`, MySQL to the connection's current
    /// database; SQLite has a single namespace and ignores `schema`.
    pub async fn list_tables(
        provider: &ConnectionProvider,
        schema: Option<&str>,
    ) -> SqlToolResult<Vec<TableInfo>> {
        let mut tables = match provider.pool() {
            DbPool::Postgres(p) => postgres::list_tables(p, schema).await?,
            DbPool::MySql(p) => mysql::list_tables(p, schema).await?,
            DbPool::Sqlite(p) => sqlite::list_tables(p).await?,
        };
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    /// Describe a table's columns (ordinal order) and indexes (by name).
    ///
    /// An unknown table yields a descriptor with no columns and no indexes.
    pub async fn describe_table(
        provider: &ConnectionProvider,
        table_name: &str,
        schema: Option<&str>,
    ) -> SqlToolResult<TableSchema> {
        let described = match provider.pool() {
            DbPool::Postgres(p) => postgres::describe_table(p, table_name, schema).await?,
            DbPool::MySql(p) => mysql::describe_table(p, table_name, schema).await?,
            DbPool::Sqlite(p) => sqlite::describe_table(p, table_name).await?,
        };

        if described.is_empty() {
            debug!(table = %table_name, "Table not found; returning empty descriptor");
        }
        Ok(described)
    }
}

mod queries {
    pub mod postgres {
        // information_schema domain types (sql_identifier, yes_or_no, ...) are cast
        // to text so they decode as String
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name, table_type::text AS table_type
            FROM information_schema.tables
            WHERE table_schema = $1
            AND table_type IN ('BASE TABLE', 'VIEW', 'LOCAL TEMPORARY')
            UNION ALL
            SELECT matviewname::text AS table_name, 'MATERIALIZED VIEW' AS table_type
            FROM pg_matviews
            WHERE schemaname = $1
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key
        FROM information_schema.columns c
        JOIN pg_class t ON t.relname = c.table_name
        JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        LEFT JOIN (
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = $2
            AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = $1 AND c.table_schema = $2
        ORDER BY c.ordinal_position
        "#;

        pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            i.relname::text AS index_name,
            array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS column_names,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        WHERE t.relname = $1 AND n.nspname = $2
        GROUP BY i.relname, ix.indisunique, ix.indisprimary
        ORDER BY i.relname
        "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME,
                CONVERT(TABLE_SCHEMA USING utf8mb4) AS TABLE_SCHEMA,
                CONVERT(TABLE_TYPE USING utf8mb4) AS TABLE_TYPE
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
            "#;

        pub const CURRENT_SCHEMA: &str = "SELECT CONVERT(COALESCE(?, DATABASE()) USING utf8mb4)";

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8mb4) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8mb4) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8mb4) AS COLUMN_KEY
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;

        pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            CONVERT(INDEX_NAME USING utf8mb4) AS INDEX_NAME,
            CONVERT(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) USING utf8mb4) AS COLUMN_NAMES,
            CAST(MIN(NON_UNIQUE) = 0 AS SIGNED) AS IS_UNIQUE
        FROM information_schema.STATISTICS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        GROUP BY INDEX_NAME
        ORDER BY INDEX_NAME
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const TABLE_INFO: &str =
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid";

        pub const INDEX_LIST: &str =
            "SELECT name, \"unique\", origin FROM pragma_index_list(?) ORDER BY name";

        pub const INDEX_INFO: &str = "SELECT name FROM pragma_index_info(?) ORDER BY seqno";
    }
}

mod postgres {
    use super::*;
    use crate::models::DatabaseType;
    use sqlx::{PgPool, Row};

    fn schema_or_default(schema: Option<&str>) -> &str {
        schema
            .or(DatabaseType::Postgres.default_schema())
            .unwrap_or("public")
    }

    pub async fn list_tables(pool: &PgPool, schema: Option<&str>) -> SqlToolResult<Vec<TableInfo>> {
        let schema_name = schema_or_default(schema);
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("table_name")?;
            let type_str: String = row.try_get("table_type")?;
            tables.push(TableInfo::new(name, TableType::parse(&type_str)).with_schema(schema_name));
        }

        debug!(
            count = tables.len(),
            schema = schema_name,
            "Listed PostgreSQL tables"
        );
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &PgPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> SqlToolResult<TableSchema> {
        let schema_name = schema_or_default(schema);
        let described = TableSchema::new(table_name).with_schema(schema_name);

        let columns = fetch_columns(pool, table_name, schema_name).await?;
        if columns.is_empty() {
            return Ok(described);
        }
        let indexes = fetch_indexes(pool, table_name, schema_name).await?;

        Ok(described.with_columns(columns).with_indexes(indexes))
    }

    async fn fetch_columns(
        pool: &PgPool,
        table_name: &str,
        schema_name: &str,
    ) -> SqlToolResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("column_name")?;
            let column_type: String = row.try_get("column_type")?;
            let nullable: String = row.try_get("is_nullable")?;
            let default_value: Option<String> = row.try_get("column_default")?;
            let is_pk: bool = row.try_get("is_primary_key")?;

            let mut col =
                ColumnDefinition::new(name, column_type, nullable == "YES").with_primary_key(is_pk);
            if let Some(ref def) = default_value {
                col = col.with_default_str(def);
            }
            columns.push(col);
        }
        Ok(columns)
    }

    async fn fetch_indexes(
        pool: &PgPool,
        table_name: &str,
        schema_name: &str,
    ) -> SqlToolResult<Vec<IndexInfo>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_INDEXES)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("index_name")?;
            let columns: Vec<String> = row.try_get("column_names")?;
            let is_unique: bool = row.try_get("is_unique")?;
            let is_primary: bool = row.try_get("is_primary")?;

            if !columns.is_empty() {
                indexes.push(
                    IndexInfo::new(name, columns)
                        .with_unique(is_unique)
                        .with_primary(is_primary),
                );
            }
        }
        Ok(indexes)
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_optional_string<I>(row: &MySqlRow, column: I) -> Option<String>
    where
        I: sqlx::ColumnIndex<MySqlRow> + Copy,
    {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    /// Resolve the schema name reported back to the caller.
    async fn resolve_schema(pool: &MySqlPool, schema: Option<&str>) -> SqlToolResult<Option<String>> {
        let row = sqlx::query(queries::mysql::CURRENT_SCHEMA)
            .bind(schema)
            .fetch_one(pool)
            .await?;
        Ok(get_optional_string(&row, 0))
    }

    pub async fn list_tables(
        pool: &MySqlPool,
        schema: Option<&str>,
    ) -> SqlToolResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, "TABLE_NAME");
                if name.is_empty() {
                    return None;
                }
                let type_str = get_string(row, "TABLE_TYPE");
                let mut table = TableInfo::new(name, TableType::parse(&type_str));
                if let Some(s) = get_optional_string(row, "TABLE_SCHEMA") {
                    table = table.with_schema(s);
                }
                Some(table)
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> SqlToolResult<TableSchema> {
        let mut described = TableSchema::new(table_name);
        if let Some(s) = resolve_schema(pool, schema).await? {
            described = described.with_schema(s);
        }

        let columns = fetch_columns(pool, table_name, schema).await?;
        if columns.is_empty() {
            return Ok(described);
        }
        let indexes = fetch_indexes(pool, table_name, schema).await?;

        Ok(described.with_columns(columns).with_indexes(indexes))
    }

    async fn fetch_columns(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> SqlToolResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "COLUMN_NAME");
                let column_type = get_string(row, "COLUMN_TYPE");
                let nullable = get_string(row, "IS_NULLABLE");
                let default_value = get_optional_string(row, "COLUMN_DEFAULT");
                let is_pk = get_string(row, "COLUMN_KEY") == "PRI";

                let mut col = ColumnDefinition::new(name, column_type, nullable == "YES")
                    .with_primary_key(is_pk);
                if let Some(ref def) = default_value {
                    col = col.with_default_str(def);
                }
                col
            })
            .collect())
    }

    async fn fetch_indexes(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> SqlToolResult<Vec<IndexInfo>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_INDEXES)
            .bind(table_name)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "INDEX_NAME");
                let columns = get_string(row, "COLUMN_NAMES")
                    .split(',')
                    .map(str::to_string)
                    .collect();
                let is_unique: i64 = row.try_get("IS_UNIQUE").unwrap_or(0);
                let is_primary = name == "PRIMARY";

                IndexInfo::new(name, columns)
                    .with_unique(is_unique != 0)
                    .with_primary(is_primary)
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn list_tables(pool: &SqlitePool) -> SqlToolResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name")?;
            let type_str: String = row.try_get("type")?;
            tables.push(TableInfo::new(name, TableType::parse(&type_str)));
        }

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub async fn describe_table(pool: &SqlitePool, table_name: &str) -> SqlToolResult<TableSchema> {
        let described = TableSchema::new(table_name);

        let columns = fetch_columns(pool, table_name).await?;
        if columns.is_empty() {
            return Ok(described);
        }
        let indexes = fetch_indexes(pool, table_name).await?;

        Ok(described.with_columns(columns).with_indexes(indexes))
    }

    async fn fetch_columns(
        pool: &SqlitePool,
        table_name: &str,
    ) -> SqlToolResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::sqlite::TABLE_INFO)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type")?;
            let notnull: i64 = row.try_get("notnull")?;
            let default_value: Option<String> = row.try_get("dflt_value")?;
            // pk is the 1-based position within the primary key, 0 otherwise
            let pk: i64 = row.try_get("pk")?;

            let mut col =
                ColumnDefinition::new(name, data_type, notnull == 0).with_primary_key(pk > 0);
            if let Some(ref def) = default_value {
                col = col.with_default_str(def);
            }
            columns.push(col);
        }
        Ok(columns)
    }

    async fn fetch_indexes(pool: &SqlitePool, table_name: &str) -> SqlToolResult<Vec<IndexInfo>> {
        let idx_list = sqlx::query(queries::sqlite::INDEX_LIST)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let mut indexes = Vec::with_capacity(idx_list.len());
        for idx_row in &idx_list {
            let name: String = idx_row.try_get("name")?;
            let is_unique: i64 = idx_row.try_get("unique")?;
            let origin: String = idx_row.try_get("origin")?;

            let columns = fetch_index_columns(pool, &name).await?;
            if !columns.is_empty() {
                indexes.push(
                    IndexInfo::new(name, columns)
                        .with_unique(is_unique != 0)
                        .with_primary(origin == "pk"),
                );
            }
        }
        Ok(indexes)
    }

    async fn fetch_index_columns(pool: &SqlitePool, index_name: &str) -> SqlToolResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::INDEX_INFO)
            .bind(index_name)
            .fetch_all(pool)
            .await?;

        // Expression columns have no name
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: Option<String> = row.try_get("name")?;
            columns.push(name.unwrap_or_else(|| "<expression>".to_string()));
        }
        Ok(columns)
    }
}
