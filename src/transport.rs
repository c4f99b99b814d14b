//! MCP transport configuration and server runtime.
//!
//! Supports two transport modes:
//!
//! - **Stdio**: default mode for local subprocess communication
//! - **HTTP**: streamable HTTP transport for web-based clients
//!
//! The server runs until the transport closes or a shutdown signal
//! (SIGTERM/SIGINT) arrives.

use clap::Args;
use rmcp::{ServerHandler, ServiceExt};
use std::fmt;
use thiserror::Error;

/// Transport mode for MCP server communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Standard input/output transport (default).
    #[default]
    Stdio,
    /// HTTP streamable transport on the given port.
    Http {
        /// Port to listen on
        port: u16,
    },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http { port } => write!(f, "http (port {})", port),
        }
    }
}

/// Command-line arguments for transport configuration.
///
/// Use with `clap::Parser` via `#[command(flatten)]`.
#[derive(Args, Debug, Clone)]
pub struct TransportArgs {
    /// Transport mode: stdio or http
    #[arg(long, default_value = "stdio", value_parser = parse_transport_mode)]
    pub transport: TransportMode,

    /// Port for HTTP transport (default: 8080, or from PORT env var)
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,
}

/// Transport mode parsed from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Stdio,
    Http,
}

fn parse_transport_mode(s: &str) -> Result<TransportMode, String> {
    match s.to_lowercase().as_str() {
        "stdio" => Ok(TransportMode::Stdio),
        "http" => Ok(TransportMode::Http),
        _ => Err(format!(
            "Invalid transport mode '{}'. Valid options: stdio, http",
            s
        )),
    }
}

impl TransportArgs {
    /// Convert command-line arguments into a Transport configuration.
    pub fn into_transport(self) -> Transport {
        match self.transport {
            TransportMode::Stdio => Transport::Stdio,
            TransportMode::Http => Transport::Http { port: self.port },
        }
    }
}

/// Errors that can occur when running the MCP server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Failed to bind to the specified port
    #[error("Failed to bind to port {port}: {message}")]
    BindFailed { port: u16, message: String },

    /// Transport error during communication
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Run an MCP server handler over the given transport until shutdown.
pub async fn serve<H>(handler: H, transport: Transport) -> Result<(), ServeError>
where
    H: ServerHandler + Clone + Send + Sync + 'static,
{
    tracing::info!(transport = %transport, "Starting MCP server");

    match transport {
        Transport::Stdio => serve_stdio(handler).await,
        Transport::Http { port } => serve_http(handler, port).await,
    }
}

async fn serve_stdio<H>(handler: H) -> Result<(), ServeError>
where
    H: ServerHandler + Clone + Send + Sync + 'static,
{
    use rmcp::transport::io::stdio;

    let service = handler
        .serve(stdio())
        .await
        .map_err(|e| ServeError::Transport(e.to_string()))?;

    tokio::select! {
        result = service.waiting() => {
            result.map_err(|e| ServeError::Transport(e.to_string()))?;
            Ok(())
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("Received shutdown signal, stopping server");
            Ok(())
        }
    }
}

async fn serve_http<H>(handler: H, port: u16) -> Result<(), ServeError>
where
    H: ServerHandler + Clone + Send + Sync + 'static,
{
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };

    let service = StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let bind_addr = format!("0.0.0.0:{}", port);
    let tcp_listener =
        tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServeError::BindFailed {
                port,
                message: e.to_string(),
            })?;

    tracing::info!(port, "HTTP server listening");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| ServeError::Transport(e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        tracing::info!("Received Ctrl+C");
    }
}
