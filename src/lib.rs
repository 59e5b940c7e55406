//! Composable middleware chains for MCP servers.
//!
//! Stack reusable transforms in front of one terminal handler and serve the
//! result as if it were the terminal handler itself.

pub mod chain;
pub mod config;
pub mod error;
pub mod front;
pub mod handler;
pub mod logging;
pub mod middleware;
pub mod protocol;
pub mod serve;
pub mod terminal;

pub use chain::{chain, Chain, ChainArg};
pub use error::{ChainError, Result};
pub use front::FrontServer;
pub use handler::{McpHandler, SharedHandler, SharedTransform, Transform};
pub use serve::{serve, serve_stdio};
pub use terminal::{CliServer, ExternalServer};
