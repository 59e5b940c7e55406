use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::Middleware;
use crate::error::Result;
use crate::handler::SharedHandler;

/// Rejects requests that do not carry a token.
///
/// The token is looked up at the top level of the request, then in `params`,
/// then in `params.arguments`. When `token` is set the value must also match.
/// Rejected requests never reach downstream.
#[derive(Debug, Clone)]
pub struct RequireToken {
    pub field: String,
    pub token: Option<String>,
}

impl RequireToken {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn find<'a>(&self, request: &'a Value) -> Option<&'a Value> {
        request
            .get(&self.field)
            .or_else(|| request.get("params")?.get(&self.field))
            .or_else(|| request.get("params")?.get("arguments")?.get(&self.field))
    }

    fn accepts(&self, request: &Value) -> bool {
        match (self.find(request), &self.token) {
            (None, _) => false,
            (Some(found), Some(expected)) => found.as_str() == Some(expected.as_str()),
            (Some(_), None) => true,
        }
    }
}

pub fn rejection() -> Value {
    json!({
        "error": "Authentication required",
        "code": 401,
    })
}

#[async_trait]
impl Middleware for RequireToken {
    async fn on_request(&self, downstream: SharedHandler, request: Value) -> Result<Value> {
        if !self.accepts(&request) {
            debug!("Rejecting request without valid '{}'", self.field);
            return Ok(rejection());
        }
        downstream.handle_request(request).await
    }
}
