//! Connection configuration.

use crate::config::PoolOptions;
use crate::error::{SqlToolError, SqlToolResult};
use schemars::JsonSchema;
use serde::Serialize;
use url::Url;

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgres,
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl DatabaseType {
    /// Detect the database family from a connection string's scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim_start().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Schema used when a tool call does not name one.
    ///
    /// `None` means "whatever the connection is currently using"
    /// (MySQL's `DATABASE()`, SQLite's `main`).
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("public"),
            Self::MySql | Self::Sqlite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Immutable description of the one database this server talks to.
///
/// Built once at startup from `DATABASE_URL` and shared by reference.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    db_type: DatabaseType,
    /// Contains credentials; log [`ConnectionConfig::masked_connection_string`] instead.
    connection_string: String,
    pool_options: PoolOptions,
}

impl ConnectionConfig {
    /// Parse a connection URL, stripping pool options from its query string.
    pub fn parse(raw: &str) -> SqlToolResult<Self> {
        let raw = raw.trim();
        let db_type = DatabaseType::from_connection_string(raw).ok_or_else(|| {
            SqlToolError::configuration(format!(
                "Unsupported database URL scheme in '{}' (expected postgres://, mysql:// or sqlite:)",
                scheme_of(raw)
            ))
        })?;

        let mut url = Url::parse(raw)
            .map_err(|e| SqlToolError::configuration(format!("Invalid DATABASE_URL: {e}")))?;

        if db_type != DatabaseType::Sqlite && url.host_str().is_none_or(str::is_empty) {
            return Err(SqlToolError::configuration(
                "DATABASE_URL must include a host",
            ));
        }
        if db_type == DatabaseType::Sqlite && url.path().is_empty() {
            return Err(SqlToolError::configuration(
                "SQLite DATABASE_URL must include a file path or :memory:",
            ));
        }

        let pool_options = PoolOptions::take_from_url(&mut url).map_err(|e| {
            SqlToolError::configuration(format!("Invalid pool option in DATABASE_URL: {e}"))
        })?;

        Ok(Self {
            db_type,
            connection_string: url.to_string(),
            pool_options,
        })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Connection string as handed to the driver. Contains credentials.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn pool_options(&self) -> &PoolOptions {
        &self.pool_options
    }

    /// SQLite databases that live only as long as their connection.
    pub fn is_in_memory(&self) -> bool {
        self.db_type == DatabaseType::Sqlite
            && (self.connection_string.contains(":memory:")
                || self.connection_string.contains("mode=memory"))
    }

    /// Connection string with the password replaced, safe for logs.
    pub fn masked_connection_string(&self) -> String {
        match Url::parse(&self.connection_string) {
            Ok(mut url) if url.password().is_some() => {
                // set_password only fails for URLs that cannot carry credentials
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => self.connection_string.clone(),
        }
    }
}

fn scheme_of(raw: &str) -> &str {
    raw.split_once(':').map_or(raw, |(scheme, _)| scheme)
}
