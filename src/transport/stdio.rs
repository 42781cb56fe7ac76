//! Stdio transport for the MCP server.
//!
//! Reads JSON-RPC messages from stdin and writes responses to stdout.
//! Logs go to stderr so they never interleave with protocol output.

use crate::db::{ConnectionProvider, QueryExecutor};
use crate::error::{SqlToolError, SqlToolResult};
use crate::mcp::SqlToolsService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StdioTransport {
    provider: Arc<ConnectionProvider>,
    executor: QueryExecutor,
}

impl StdioTransport {
    pub fn new(provider: Arc<ConnectionProvider>, executor: QueryExecutor) -> Self {
        Self { provider, executor }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> SqlToolResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = SqlToolsService::new(self.provider.clone(), self.executor.clone());
        let running_service = service.serve(stdio()).await.map_err(|e| {
            SqlToolError::internal(format!("Failed to start stdio transport: {}", e))
        })?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Stdio transport completed normally"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        self.provider.close().await;
                        return Err(SqlToolError::internal(format!(
                            "Stdio transport error: {}",
                            e
                        )));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        self.provider.close().await;

        if shutdown_requested {
            // tokio::select! cannot interrupt a blocking stdin read
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
