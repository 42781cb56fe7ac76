//! SQL Tools MCP Server Library
//!
//! MCP (Model Context Protocol) tools that let AI assistants inspect and
//! query one SQL database (PostgreSQL, MySQL or SQLite): list tables,
//! describe a table, run arbitrary SQL, and run gated read-only SQL.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{SqlToolError, SqlToolResult};
pub use mcp::SqlToolsService;
