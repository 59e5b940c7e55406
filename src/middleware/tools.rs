use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::Middleware;
use crate::error::Result;
use crate::handler::SharedHandler;
use crate::protocol::{self, codes, methods};

fn tool_name(tool: &Value) -> Option<&str> {
    tool.get("name").and_then(Value::as_str)
}

/// Adds fixed fields to tools in the metadata, e.g. `auth_required: true`.
#[derive(Debug, Clone, Default)]
pub struct MarkTools {
    pub fields: Map<String, Value>,
    /// Only mark these tools; every tool when `None`.
    pub tools: Option<Vec<String>>,
}

impl MarkTools {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            tools: None,
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn only(mut self, tools: Vec<String>) -> Self {
        self.tools = Some(tools);
        self
    }

    fn applies_to(&self, tool: &Value) -> bool {
        match (&self.tools, tool_name(tool)) {
            (None, _) => true,
            (Some(names), Some(name)) => names.iter().any(|n| n == name),
            (Some(_), None) => false,
        }
    }
}

#[async_trait]
impl Middleware for MarkTools {
    async fn on_metadata(&self, downstream: SharedHandler) -> Result<Value> {
        let mut metadata = downstream.get_metadata().await?;
        if let Some(tools) = metadata.get_mut("tools").and_then(Value::as_array_mut) {
            for tool in tools.iter_mut().filter(|t| self.applies_to(t)) {
                if let Some(entry) = tool.as_object_mut() {
                    for (key, value) in &self.fields {
                        entry.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(metadata)
    }
}

/// Hides tools from metadata and refuses calls to them.
#[derive(Debug, Clone, Default)]
pub struct FilterTools {
    /// When set, only these tools stay visible.
    pub allow: Option<Vec<String>>,
    pub deny: Vec<String>,
}

impl FilterTools {
    pub fn allow(names: Vec<String>) -> Self {
        Self {
            allow: Some(names),
            deny: Vec::new(),
        }
    }

    pub fn deny(names: Vec<String>) -> Self {
        Self {
            allow: None,
            deny: names,
        }
    }

    pub fn permits(&self, name: &str) -> bool {
        if self.deny.iter().any(|n| n == name) {
            return false;
        }
        self.allow
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|n| n == name))
    }
}

#[async_trait]
impl Middleware for FilterTools {
    async fn on_metadata(&self, downstream: SharedHandler) -> Result<Value> {
        let mut metadata = downstream.get_metadata().await?;
        if let Some(tools) = metadata.get_mut("tools").and_then(Value::as_array_mut) {
            let before = tools.len();
            tools.retain(|tool| tool_name(tool).map_or(true, |name| self.permits(name)));
            debug!("Filtered {} of {} tools", before - tools.len(), before);
        }
        Ok(metadata)
    }

    async fn on_request(&self, downstream: SharedHandler, request: Value) -> Result<Value> {
        if request.get("method").and_then(Value::as_str) == Some(methods::TOOLS_CALL) {
            let name = request
                .pointer("/params/name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !self.permits(name) {
                debug!("Refusing call to filtered tool '{}'", name);
                return Ok(protocol::error(
                    request.get("id").cloned(),
                    codes::INVALID_PARAMS,
                    format!("Tool not found: {name}"),
                ));
            }
        }
        downstream.handle_request(request).await
    }
}
