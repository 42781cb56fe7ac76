//! Positional binding of [`QueryParam`] values.
//!
//! Placeholders are `$1, $2, ...` on PostgreSQL and `?` on MySQL and SQLite;
//! values bind in the order the caller supplied them.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// A prepared query that accepts [`QueryParam`] values.
pub(crate) trait BindParams<'q>: Sized {
    fn bind_param(self, param: &'q QueryParam) -> Self;

    fn bind_params(self, params: &'q [QueryParam]) -> Self {
        params.iter().fold(self, Self::bind_param)
    }
}

impl<'q> BindParams<'q> for Query<'q, MySql, MySqlArguments> {
    fn bind_param(self, param: &'q QueryParam) -> Self {
        match param {
            QueryParam::Null => self.bind(None::<String>),
            QueryParam::Bool(v) => self.bind(*v),
            QueryParam::Int(v) => self.bind(*v),
            QueryParam::Float(v) => self.bind(*v),
            QueryParam::String(v) => self.bind(v.as_str()),
            QueryParam::Json(v) => self.bind(Json(v)),
        }
    }
}

impl<'q> BindParams<'q> for Query<'q, Postgres, PgArguments> {
    fn bind_param(self, param: &'q QueryParam) -> Self {
        match param {
            QueryParam::Null => self.bind(None::<String>),
            QueryParam::Bool(v) => self.bind(*v),
            QueryParam::Int(v) => self.bind(*v),
            QueryParam::Float(v) => self.bind(*v),
            QueryParam::String(v) => self.bind(v.as_str()),
            QueryParam::Json(v) => self.bind(Json(v)),
        }
    }
}

impl<'q> BindParams<'q> for Query<'q, Sqlite, SqliteArguments<'q>> {
    fn bind_param(self, param: &'q QueryParam) -> Self {
        match param {
            QueryParam::Null => self.bind(None::<String>),
            QueryParam::Bool(v) => self.bind(*v),
            QueryParam::Int(v) => self.bind(*v),
            QueryParam::Float(v) => self.bind(*v),
            QueryParam::String(v) => self.bind(v.as_str()),
            // json1 functions take JSON as text
            QueryParam::Json(v) => self.bind(v.to_string()),
        }
    }
}
