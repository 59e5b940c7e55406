//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_chain::{ChainArg, ChainError, McpHandler, Result, SharedHandler};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

mock! {
    pub Handler {}

    #[async_trait]
    impl McpHandler for Handler {
        async fn get_metadata(&self) -> Result<Value>;
        async fn handle_request(&self, request: Value) -> Result<Value>;
    }
}

/// Terminal handler with fixed metadata that counts its calls and echoes
/// requests back inside a result envelope.
pub struct Backend {
    metadata: Value,
    calls: AtomicUsize,
    log: Option<EventLog>,
}

impl Backend {
    pub fn new(metadata: Value) -> Self {
        Self {
            metadata,
            calls: AtomicUsize::new(0),
            log: None,
        }
    }

    pub fn logging_to(mut self, log: &EventLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl McpHandler for Backend {
    async fn get_metadata(&self) -> Result<Value> {
        if let Some(log) = &self.log {
            log.push("H.metadata");
        }
        Ok(self.metadata.clone())
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push("H.request");
        }
        Ok(json!({"jsonrpc": "2.0", "id": request["id"], "result": {"echo": request}}))
    }
}

/// Ordered record of which layer saw a call, shared between layers.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Request transform that records entry and exit around the downstream call.
pub fn tracing_layer(label: &'static str, log: &EventLog) -> ChainArg {
    let log = log.clone();
    ChainArg::transform(move |next: SharedHandler, request: Value| {
        let log = log.clone();
        async move {
            log.push(format!("{label}.in"));
            let response = next.handle_request(request).await;
            log.push(format!("{label}.out"));
            response
        }
    })
}

/// Metadata transform that records itself and passes the downstream value
/// through.
pub fn metadata_recorder(label: &'static str, log: &EventLog) -> ChainArg {
    let log = log.clone();
    ChainArg::transform(move |next: SharedHandler, _seed: Value| {
        let log = log.clone();
        async move {
            log.push(format!("{label}.metadata"));
            next.get_metadata().await
        }
    })
}

/// Metadata transform marking every tool `auth_required: true`.
pub fn mark_auth() -> ChainArg {
    ChainArg::transform(|next: SharedHandler, _seed: Value| async move {
        let mut metadata = next.get_metadata().await?;
        if let Some(tools) = metadata.get_mut("tools").and_then(Value::as_array_mut) {
            for tool in tools {
                tool["auth_required"] = json!(true);
            }
        }
        Ok::<_, ChainError>(metadata)
    })
}

/// Metadata transform adding `key: value` to every tool.
pub fn mark(key: &'static str, value: Value) -> ChainArg {
    ChainArg::transform(move |next: SharedHandler, _seed: Value| {
        let value = value.clone();
        async move {
            let mut metadata = next.get_metadata().await?;
            if let Some(tools) = metadata.get_mut("tools").and_then(Value::as_array_mut) {
                for tool in tools {
                    tool[key] = value.clone();
                }
            }
            Ok::<_, ChainError>(metadata)
        }
    })
}

/// Request transform rejecting requests without a `token` field.
pub fn reject_unless_token() -> ChainArg {
    ChainArg::transform(|next: SharedHandler, request: Value| async move {
        if request.get("token").is_none() {
            return Ok(json!({"error": "Authentication required", "code": 401}));
        }
        next.handle_request(request).await
    })
}

/// Request transform that fails without calling downstream.
pub fn failing(message: &'static str) -> ChainArg {
    ChainArg::transform(move |_next: SharedHandler, _request: Value| async move {
        Err::<Value, _>(ChainError::handler(message))
    })
}

pub fn tools_call(id: i64, name: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": {}}
    })
}
