//! Flux MCP Server
//!
//! MCP server for image generation using the Black Forest Labs Flux API.

use anyhow::Result;
use clap::Parser;
use flux_mcp::{transport, Config, FluxServer, TransportArgs};

/// Command-line arguments for the Flux server.
#[derive(Parser, Debug)]
#[command(name = "flux-mcp")]
#[command(about = "MCP server for image generation using the Flux API")]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("flux-mcp server starting...");

    let args = Args::parse();

    // A missing API key aborts here, before serving anything.
    let config = Config::from_env()?;
    tracing::info!(
        base_url = %config.base_url,
        history_size = config.history_size,
        "Configuration loaded"
    );

    let server = FluxServer::new(config)?;

    transport::serve(server, args.transport.into_transport()).await?;

    tracing::info!("Server stopped");
    Ok(())
}
