//! Flux MCP Server Library
//!
//! MCP server exposing the Black Forest Labs Flux text-to-image API as a
//! `generate_image` tool, with the most recent results readable as resources.

pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use handler::{FluxGenerateParams, FluxHandler};
pub use history::{GenerationHistory, GenerationRecord};
pub use server::FluxServer;
pub use transport::{Transport, TransportArgs, TransportMode};
