//! MCP server integration module.
//!
//! Connects the MCP protocol to the SQL tool handlers using the rmcp framework.

pub mod service;

pub use service::SqlToolsService;
