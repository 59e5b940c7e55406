//! The handler capability shared by every link of a chain.
//!
//! A handler answers two questions: what it offers ([`McpHandler::get_metadata`])
//! and how it answers a request ([`McpHandler::handle_request`]). Terminal
//! handlers, pipeline nodes and the chain itself all speak this contract, so a
//! sealed chain can stand in anywhere a terminal handler could.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;

#[async_trait]
pub trait McpHandler: Send + Sync {
    /// Server metadata, e.g. `{"tools": [...], "resources": [...]}`.
    async fn get_metadata(&self) -> Result<Value>;

    /// Answers one request with one response.
    async fn handle_request(&self, request: Value) -> Result<Value>;

    /// False when some call can still end at an unconfigured tail.
    fn is_sealed(&self) -> bool {
        true
    }
}

pub type SharedHandler = Arc<dyn McpHandler>;

/// A transform receives the downstream handler and an input value, and decides
/// whether, when and how often to call downstream before producing its result.
///
/// Metadata transforms receive the neutral seed (`{}`) as input; request
/// transforms receive the inbound request.
pub trait Transform: Send + Sync {
    fn apply(&self, downstream: SharedHandler, input: Value) -> BoxFuture<'static, Result<Value>>;
}

impl<F, Fut> Transform for F
where
    F: Fn(SharedHandler, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn apply(&self, downstream: SharedHandler, input: Value) -> BoxFuture<'static, Result<Value>> {
        Box::pin(self(downstream, input))
    }
}

pub type SharedTransform = Arc<dyn Transform>;

/// Seed handed to metadata transforms.
pub fn metadata_seed() -> Value {
    Value::Object(Map::new())
}

/// Passes metadata through untouched.
pub fn identity_metadata() -> SharedTransform {
    Arc::new(|downstream: SharedHandler, _seed: Value| async move {
        downstream.get_metadata().await
    })
}

/// Forwards the request downstream and returns the response untouched.
pub fn identity_request() -> SharedTransform {
    Arc::new(|downstream: SharedHandler, request: Value| async move {
        downstream.handle_request(request).await
    })
}

#[async_trait]
impl<H: McpHandler + ?Sized> McpHandler for Arc<H> {
    async fn get_metadata(&self) -> Result<Value> {
        (**self).get_metadata().await
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        (**self).handle_request(request).await
    }

    fn is_sealed(&self) -> bool {
        (**self).is_sealed()
    }
}
