//! Configuration handling for the SQL tools server.
//!
//! Everything is read once at startup from CLI arguments with environment
//! fallbacks; the resulting [`Config`] is never re-read or mutated.

use crate::error::{SqlToolError, SqlToolResult};
use crate::models::ConnectionConfig;
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ROWS: usize = 1000;

// Pool defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Query parameters consumed by the server and removed before the URL
/// reaches the driver.
const POOL_OPTION_KEYS: &[&str] = &[
    "max_connections",
    "min_connections",
    "idle_timeout",
    "acquire_timeout",
    "test_before_acquire",
];

/// Connection pool options parsed from the database URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10, or 1 for SQLite)
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub idle_timeout_secs: Option<u64>,
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to ping connections before handing them out (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Remove pool options from the URL query string and parse them.
    ///
    /// Unknown parameters are left in place for the driver
    /// (e.g. `sslmode=require`, `mode=rwc`).
    pub fn take_from_url(url: &mut Url) -> Result<Self, String> {
        let mut opts = extract_options(url, POOL_OPTION_KEYS);

        let options = Self {
            max_connections: parse_opt(&mut opts, "max_connections")?,
            min_connections: parse_opt(&mut opts, "min_connections")?,
            idle_timeout_secs: parse_opt(&mut opts, "idle_timeout")?,
            acquire_timeout_secs: parse_opt(&mut opts, "acquire_timeout")?,
            test_before_acquire: parse_opt(&mut opts, "test_before_acquire")?,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_connections, self.max_connections) {
            if min > max {
                return Err(format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    min, max
                ));
            }
        }
        Ok(())
    }
}

fn parse_opt<T: std::str::FromStr>(
    opts: &mut HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, String> {
    match opts.remove(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid value '{}' for {}", raw, key)),
        None => Ok(None),
    }
}

/// Pull the given keys out of the URL query, re-encoding whatever remains.
fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
    let mut opts = HashMap::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the SQL tools server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqltools-mcp-server",
    about = "MCP server exposing SQL tools (list tables, table schema, query, safe query)",
    version
)]
pub struct Config {
    /// Database connection string (postgres://, mysql://, sqlite:).
    /// Pool options may be appended as query parameters, e.g. ?max_connections=5
    #[arg(
        long = "database-url",
        value_name = "URL",
        env = "DATABASE_URL",
        hide_env_values = true
    )]
    pub database_url: Option<String>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MCP_HTTP_PORT")]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MCP_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Maximum number of rows returned by a single query
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, env = "MCP_MAX_ROWS")]
    pub max_rows: usize,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            database_url: None,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_rows: DEFAULT_MAX_ROWS,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Build the immutable connection configuration from `DATABASE_URL`.
    ///
    /// A missing, blank or unparseable value is a [`SqlToolError::Configuration`].
    pub fn connection_config(&self) -> SqlToolResult<ConnectionConfig> {
        let url = self
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SqlToolError::configuration("DATABASE_URL environment variable is required")
            })?;
        ConnectionConfig::parse(url)
    }

    /// Validate the non-database options.
    pub fn validate(&self) -> SqlToolResult<()> {
        if self.query_timeout == 0 {
            return Err(SqlToolError::configuration(
                "query timeout must be greater than 0",
            ));
        }
        if self.max_rows == 0 {
            return Err(SqlToolError::configuration(
                "max rows must be greater than 0",
            ));
        }
        if !self.mcp_endpoint.starts_with('/') {
            return Err(SqlToolError::configuration(format!(
                "MCP endpoint must start with '/': {}",
                self.mcp_endpoint
            )));
        }
        Ok(())
    }

    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
