//! Query execution engine.
//!
//! Every statement runs on a single connection checked out from the
//! [`ConnectionProvider`] and returned when the call finishes. The executor
//! enforces two limits:
//! - a wall-clock timeout around the whole checkout
//! - a row cap, enforced while streaming (at most `max_rows + 1` are fetched)
//!
//! In [`ExecutionMode::ReadOnly`] the statement is wrapped in the database's
//! read-only scope, so the server itself refuses writes that slip past the
//! safe-query gate:
//! - PostgreSQL: `BEGIN READ ONLY` ... `ROLLBACK`
//! - MySQL: `START TRANSACTION READ ONLY` ... `ROLLBACK`
//! - SQLite: `PRAGMA query_only = ON` ... `PRAGMA query_only = OFF`
//!
//! The per-database submodules share one shape so their differences stay
//! easy to spot.

use crate::db::pool::{ConnectionProvider, DbConnection};
use crate::db::types::RowToJson;
use crate::error::{SqlToolError, SqlToolResult};
use crate::models::{QueryRequest, QueryResult};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, info, warn};

/// Whether the statement may modify the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    ReadWrite,
    ReadOnly,
}

impl ExecutionMode {
    pub fn is_read_only(self) -> bool {
        self == Self::ReadOnly
    }
}

/// Rows fetched on one connection, plus whether that connection can be
/// handed back to the pool.
struct Fetched<R> {
    rows: SqlToolResult<Vec<R>>,
    reusable: bool,
}

#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout_secs: u64,
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(timeout_secs: u64, max_rows: usize) -> Self {
        Self {
            timeout_secs: timeout_secs.max(1),
            max_rows: max_rows.max(1),
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Execute one request and collect at most `max_rows` rows.
    pub async fn execute(
        &self,
        provider: &ConnectionProvider,
        request: &QueryRequest,
        mode: ExecutionMode,
    ) -> SqlToolResult<QueryResult> {
        let start = Instant::now();
        let timeout_secs = request.effective_timeout(self.timeout_secs);
        let query_timeout = Duration::from_secs(timeout_secs);
        let fetch_limit = self.max_rows + 1;

        info!(
            sql = %request.preview(),
            params = request.params.len(),
            read_only = mode.is_read_only(),
            timeout_secs,
            "Executing query"
        );

        let conn = provider.acquire().await?;
        match conn {
            DbConnection::MySql(mut conn) => {
                let outcome =
                    timeout(query_timeout, mysql::fetch_rows(&mut conn, request, fetch_limit, mode))
                        .await;
                let rows = settle(DbConnection::MySql(conn), outcome, timeout_secs)?;
                Ok(process_rows(rows, self.max_rows, start))
            }
            DbConnection::Postgres(mut conn) => {
                let outcome = timeout(
                    query_timeout,
                    postgres::fetch_rows(&mut conn, request, fetch_limit, mode),
                )
                .await;
                let rows = settle(DbConnection::Postgres(conn), outcome, timeout_secs)?;
                Ok(process_rows(rows, self.max_rows, start))
            }
            DbConnection::Sqlite(mut conn) => {
                let outcome = timeout(
                    query_timeout,
                    sqlite::fetch_rows(&mut conn, request, fetch_limit, mode),
                )
                .await;
                let rows = settle(DbConnection::Sqlite(conn), outcome, timeout_secs)?;
                Ok(process_rows(rows, self.max_rows, start))
            }
        }
    }
}

/// Decide the connection's fate and unwrap the rows.
///
/// A timed-out statement may still be running server-side, and a scope that
/// failed to close may leave the session read-only, so neither connection
/// goes back to the pool.
fn settle<R>(
    conn: DbConnection,
    outcome: Result<Fetched<R>, Elapsed>,
    timeout_secs: u64,
) -> SqlToolResult<Vec<R>> {
    match outcome {
        Ok(fetched) => {
            if fetched.reusable {
                drop(conn);
            } else {
                warn!("Discarding connection with unknown session state");
                conn.discard();
            }
            fetched.rows
        }
        Err(_) => {
            warn!(timeout_secs, "Query timed out; discarding connection");
            conn.discard();
            Err(SqlToolError::timeout("query execution", timeout_secs))
        }
    }
}

/// Turn fetched rows into a [`QueryResult`], flagging truncation.
fn process_rows<R: RowToJson>(rows: Vec<R>, max_rows: usize, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    let Some(first) = rows.first() else {
        return QueryResult::empty(execution_time_ms);
    };

    let columns = first.column_metadata();
    let truncated = rows.len() > max_rows;
    if truncated {
        warn!(max_rows, "Query result truncated");
    }

    let json_rows = rows
        .iter()
        .take(max_rows)
        .map(RowToJson::to_json_map)
        .collect::<Vec<_>>();

    debug!(
        rows = json_rows.len(),
        truncated, execution_time_ms, "Query completed"
    );
    QueryResult::new(columns, json_rows, truncated, execution_time_ms)
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> SqlToolResult<Vec<R>> {
    results
        .into_iter()
        .map(|r| r.map_err(SqlToolError::from))
        .collect()
}

/// Combine the statement's result with the outcome of closing its scope.
fn close_scope<R>(rows: SqlToolResult<Vec<R>>, exit: Result<(), sqlx::Error>) -> Fetched<R> {
    match exit {
        Ok(()) => Fetched {
            rows,
            reusable: true,
        },
        Err(e) => {
            warn!(error = %e, "Failed to leave read-only scope");
            Fetched {
                rows: rows.and(Err(SqlToolError::from(e))),
                reusable: false,
            }
        }
    }
}

mod mysql {
    use super::*;
    use crate::db::params::BindParams;
    use sqlx::mysql::{MySqlConnection, MySqlRow};
    use sqlx::Executor;

    const ENTER_READ_ONLY: &str = "START TRANSACTION READ ONLY";
    const EXIT_READ_ONLY: &str = "ROLLBACK";

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        request: &QueryRequest,
        fetch_limit: usize,
        mode: ExecutionMode,
    ) -> Fetched<MySqlRow> {
        if !mode.is_read_only() {
            return Fetched {
                rows: fetch(conn, request, fetch_limit).await,
                reusable: true,
            };
        }

        if let Err(e) = conn.execute(ENTER_READ_ONLY).await {
            return Fetched {
                rows: Err(e.into()),
                reusable: true,
            };
        }
        let rows = fetch(conn, request, fetch_limit).await;
        let exit = conn.execute(EXIT_READ_ONLY).await.map(|_| ());
        close_scope(rows, exit)
    }

    async fn fetch(
        conn: &mut MySqlConnection,
        request: &QueryRequest,
        fetch_limit: usize,
    ) -> SqlToolResult<Vec<MySqlRow>> {
        // Unprepared when there is nothing to bind; some statements can't be prepared
        let results = if request.params.is_empty() {
            conn.fetch(request.sql.as_str())
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await
        } else {
            sqlx::query(&request.sql)
                .bind_params(&request.params)
                .fetch(&mut *conn)
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await
        };
        collect_rows(results)
    }
}

mod postgres {
    use super::*;
    use crate::db::params::BindParams;
    use sqlx::postgres::{PgConnection, PgRow};
    use sqlx::Executor;

    const ENTER_READ_ONLY: &str = "BEGIN READ ONLY";
    const EXIT_READ_ONLY: &str = "ROLLBACK";

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        request: &QueryRequest,
        fetch_limit: usize,
        mode: ExecutionMode,
    ) -> Fetched<PgRow> {
        if !mode.is_read_only() {
            return Fetched {
                rows: fetch(conn, request, fetch_limit).await,
                reusable: true,
            };
        }

        if let Err(e) = conn.execute(ENTER_READ_ONLY).await {
            return Fetched {
                rows: Err(e.into()),
                reusable: true,
            };
        }
        // A failed statement aborts the transaction; ROLLBACK still clears it
        let rows = fetch(conn, request, fetch_limit).await;
        let exit = conn.execute(EXIT_READ_ONLY).await.map(|_| ());
        close_scope(rows, exit)
    }

    async fn fetch(
        conn: &mut PgConnection,
        request: &QueryRequest,
        fetch_limit: usize,
    ) -> SqlToolResult<Vec<PgRow>> {
        let results = if request.params.is_empty() {
            conn.fetch(request.sql.as_str())
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await
        } else {
            sqlx::query(&request.sql)
                .bind_params(&request.params)
                .fetch(&mut *conn)
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await
        };
        collect_rows(results)
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::BindParams;
    use sqlx::sqlite::{SqliteConnection, SqliteRow};
    use sqlx::Executor;

    const ENTER_READ_ONLY: &str = "PRAGMA query_only = ON";
    const EXIT_READ_ONLY: &str = "PRAGMA query_only = OFF";

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        request: &QueryRequest,
        fetch_limit: usize,
        mode: ExecutionMode,
    ) -> Fetched<SqliteRow> {
        if !mode.is_read_only() {
            return Fetched {
                rows: fetch(conn, request, fetch_limit).await,
                reusable: true,
            };
        }

        if let Err(e) = conn.execute(ENTER_READ_ONLY).await {
            return Fetched {
                rows: Err(e.into()),
                reusable: true,
            };
        }
        let rows = fetch(conn, request, fetch_limit).await;
        let exit = conn.execute(EXIT_READ_ONLY).await.map(|_| ());
        close_scope(rows, exit)
    }

    async fn fetch(
        conn: &mut SqliteConnection,
        request: &QueryRequest,
        fetch_limit: usize,
    ) -> SqlToolResult<Vec<SqliteRow>> {
        let results = if request.params.is_empty() {
            conn.fetch(request.sql.as_str())
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await
        } else {
            sqlx::query(&request.sql)
                .bind_params(&request.params)
                .fetch(&mut *conn)
                .take(fetch_limit)
                .collect::<Vec<_>>()
                .await
        };
        collect_rows(results)
    }
}
