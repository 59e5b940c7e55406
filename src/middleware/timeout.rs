use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::Middleware;
use crate::error::{ChainError, Result};
use crate::handler::SharedHandler;

/// Fails downstream calls that take longer than `timeout_ms`.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    pub timeout_ms: u64,
}

impl Timeout {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    fn duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[async_trait]
impl Middleware for Timeout {
    async fn on_metadata(&self, downstream: SharedHandler) -> Result<Value> {
        tokio::time::timeout(self.duration(), downstream.get_metadata())
            .await
            .map_err(|_| {
                warn!("Metadata fetch timed out after {}ms", self.timeout_ms);
                ChainError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            })?
    }

    async fn on_request(&self, downstream: SharedHandler, request: Value) -> Result<Value> {
        tokio::time::timeout(self.duration(), downstream.handle_request(request))
            .await
            .map_err(|_| {
                warn!("Request timed out after {}ms", self.timeout_ms);
                ChainError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            })?
    }
}
