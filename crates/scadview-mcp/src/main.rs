//! scadview MCP Server Binary
//!
//! Runs the scadview MCP server on stdio transport, allowing AI agents to
//! render OpenSCAD models.
//!
//! ## Usage
//!
//! Run directly:
//! ```bash
//! scadview-mcp --config scadview.json
//! ```
//!
//! Or add to an MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "openscad": {
//!       "command": "scadview-mcp",
//!       "env": { "MCP_RESPONSE_MAX_TOKENS": "20000" }
//!     }
//!   }
//! }
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::io::stdio;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use scadview_mcp::ScadviewMcpService;
use scadview_mcp::config::Config;

#[derive(Parser)]
#[command(name = "scadview-mcp")]
#[command(about = "MCP server for rendering OpenSCAD models", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // CRITICAL: Log to stderr only - stdout is reserved for MCP JSON-RPC
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(filter)
        .init();

    eprintln!("scadview MCP server v{}", env!("CARGO_PKG_VERSION"));

    let service = ScadviewMcpService::new(config);
    match service.renderer().executable() {
        Some(path) => eprintln!("Using OpenSCAD at {}", path.display()),
        None => {
            tracing::warn!("OpenSCAD not found; renders will fail until it is installed");
        }
    }

    eprintln!("Ready. Listening on stdio...");

    // Create service and serve on stdio transport
    let server = service.serve(stdio()).await?;

    // Wait for client to disconnect or error
    server.waiting().await?;

    eprintln!("Client disconnected. Shutting down.");
    Ok(())
}
