use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::Middleware;
use crate::error::Result;
use crate::handler::SharedHandler;

/// Traces every request and how it went.
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub label: String,
}

impl RequestLog {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl Middleware for RequestLog {
    async fn on_metadata(&self, downstream: SharedHandler) -> Result<Value> {
        let metadata = downstream.get_metadata().await?;
        let tools = metadata
            .get("tools")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        debug!("[{}] Metadata lists {} tools", self.label, tools);
        Ok(metadata)
    }

    async fn on_request(&self, downstream: SharedHandler, request: Value) -> Result<Value> {
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("<none>")
            .to_string();
        info!("[{}] Incoming request: {}", self.label, method);

        let started = Instant::now();
        let result = downstream.handle_request(request).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &result {
            Ok(response) => info!(
                "[{}] {} completed in {}ms (error={})",
                self.label,
                method,
                elapsed_ms,
                response.get("error").is_some()
            ),
            Err(e) => warn!("[{}] {} failed after {}ms: {}", self.label, method, elapsed_ms, e),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{chain, ChainArg};
    use crate::error::ChainError;
    use crate::handler::McpHandler;
    use crate::middleware::test_support::Recorder;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_log_is_transparent() {
        let chain = chain()
            .with(RequestLog::new("edge"))
            .unwrap()
            .then(ChainArg::shared_handler(Arc::new(Recorder::new(
                json!({"tools": [{"name": "x"}]}),
            ))))
            .unwrap();

        let metadata = chain.get_metadata().await.unwrap();
        assert_eq!(metadata, json!({"tools": [{"name": "x"}]}));

        let response = chain
            .handle_request(json!({"id": 1, "method": "tools/call"}))
            .await
            .unwrap();
        assert_eq!(response["result"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_log_passes_errors_through() {
        let failing = ChainArg::transform(|_next: SharedHandler, _request: Value| async move {
            Err::<Value, _>(ChainError::handler("backend down"))
        });
        let chain = chain()
            .with(RequestLog::new("edge"))
            .unwrap()
            .then(failing)
            .unwrap()
            .then(ChainArg::shared_handler(Arc::new(Recorder::new(json!({})))))
            .unwrap();

        let err = chain.handle_request(json!({"method": "x"})).await.unwrap_err();
        assert_eq!(err.to_string(), "backend down");
    }
}
