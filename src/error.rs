use std::io;
use thiserror::Error;

use crate::protocol::codes;

#[derive(Error, Debug)]
pub enum ChainError {
    /// Malformed extension call: wrong arity, or an argument that is neither
    /// a handler nor a transform where one is required.
    #[error("Invalid chain argument at position {position}: {reason}")]
    InvalidChainArgument { position: usize, reason: String },

    #[error("Chain is already sealed with a terminal handler")]
    ChainAlreadySealed,

    #[error("No downstream server configured")]
    UnconfiguredChain,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Tool '{name}' failed: {reason}")]
    Tool { name: String, reason: String },

    /// Failure raised by a transform or terminal handler.
    #[error("{0}")]
    Handler(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Transport closed")]
    Closed,
}

impl ChainError {
    pub fn handler(message: impl Into<String>) -> Self {
        ChainError::Handler(message.into())
    }

    pub fn invalid_argument(position: usize, reason: impl Into<String>) -> Self {
        ChainError::InvalidChainArgument {
            position,
            reason: reason.into(),
        }
    }

    /// JSON-RPC error code used when this error is reported to a remote caller.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            ChainError::Serialization(_) => codes::PARSE_ERROR,
            ChainError::InvalidChainArgument { .. } => codes::INVALID_PARAMS,
            ChainError::Tool { .. } => codes::INVALID_PARAMS,
            _ => codes::INTERNAL_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
