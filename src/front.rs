//! Protocol-facing front end
//!
//! Translates JSON-RPC messages from an MCP client into calls against a sealed
//! chain. Handshake and listing methods are answered here from the chain's
//! metadata; everything else is forwarded to the chain as a request.

use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, error, warn};

use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::handler::McpHandler;
use crate::protocol::{codes, methods, JsonRpcResponse, PROTOCOL_VERSION};

pub struct FrontServer {
    name: String,
    chain: Chain,
}

impl FrontServer {
    /// Fails with [`ChainError::UnconfiguredChain`] unless the chain is sealed.
    pub fn new(name: impl Into<String>, chain: Chain) -> Result<Self> {
        if !chain.is_sealed() {
            return Err(ChainError::UnconfiguredChain);
        }
        Ok(Self {
            name: name.into(),
            chain,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handles one raw message. Returns the serialized reply, or `None` for
    /// notifications.
    ///
    /// Forwarded requests reach the chain exactly as received, top-level
    /// fields outside the JSON-RPC envelope included.
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let message: Value = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid JSON-RPC message: {}", e);
                return encode(JsonRpcResponse::failure(
                    Value::Null,
                    codes::PARSE_ERROR,
                    "Parse error",
                ));
            }
        };

        let id = message.get("id").filter(|id| !id.is_null()).cloned();
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            warn!("JSON-RPC message without a method");
            return encode(JsonRpcResponse::failure(
                id.unwrap_or(Value::Null),
                codes::INVALID_REQUEST,
                "Invalid Request",
            ));
        };
        let method = method.to_string();

        let Some(id) = id else {
            debug!("Notification: {}", method);
            return None;
        };

        let reply = self.dispatch(id, &method, message).await;
        match serde_json::to_string(&reply) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to serialize reply: {}", e);
                None
            }
        }
    }

    async fn dispatch(&self, id: Value, method: &str, message: Value) -> Value {
        let outcome = match method {
            methods::INITIALIZE => Ok(self.initialize_result()),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self
                .list("tools")
                .await
                .map(|tools| json!({ "tools": tools })),
            methods::RESOURCES_LIST => self
                .list("resources")
                .await
                .map(|resources| json!({ "resources": resources })),
            _ => return self.forward(id, method, message).await,
        };

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => failure(id, &e),
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
            },
            "serverInfo": {
                "name": self.name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    /// Entries of one metadata list, with later duplicates of a name dropped.
    async fn list(&self, key: &str) -> Result<Vec<Value>> {
        let metadata = self.chain.get_metadata().await?;
        let entries = metadata
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut seen = HashSet::new();
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let Some(name) = entry
                    .get("name")
                    .or_else(|| entry.get("uri"))
                    .and_then(Value::as_str)
                else {
                    return true;
                };
                let fresh = seen.insert(name.to_string());
                if !fresh {
                    warn!("Duplicate {} entry '{}' dropped", key, name);
                }
                fresh
            })
            .collect())
    }

    async fn forward(&self, id: Value, method: &str, message: Value) -> Value {
        match self.chain.handle_request(message).await {
            Ok(mut response) if crate::protocol::is_envelope(&response) => {
                response["id"] = id;
                response
            }
            Ok(result) => serde_json::to_value(JsonRpcResponse::success(id, result))
                .unwrap_or(Value::Null),
            Err(e) => {
                error!("Request '{}' failed: {}", method, e);
                serde_json::to_value(failure(id, &e)).unwrap_or(Value::Null)
            }
        }
    }
}

fn failure(id: Value, err: &ChainError) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, err.json_rpc_code(), err.to_string())
}

fn encode(reply: JsonRpcResponse) -> Option<String> {
    serde_json::to_string(&reply).ok()
}
