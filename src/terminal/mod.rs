//! Terminal handlers
//!
//! - `external`: an MCP server running as a child process, spoken to over stdio
//! - `cli`: plain command-line programs exposed as MCP tools

pub mod cli;
pub mod external;

pub use cli::CliServer;
pub use external::ExternalServer;
