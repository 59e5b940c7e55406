//! Reusable middleware layers
//!
//! Each layer is a pair of transforms packaged behind the [`Middleware`]
//! trait. [`layer`] turns one into the two call-site arguments expected by
//! [`Chain::extend`](crate::chain::Chain::extend).
//!
//! # Modules
//!
//! - `auth`: reject requests that lack a token
//! - `tools`: annotate or hide tools in metadata
//! - `request_log`: trace requests and their outcome
//! - `timeout`: bound the time spent downstream

pub mod auth;
pub mod request_log;
pub mod timeout;
pub mod tools;

pub use auth::RequireToken;
pub use request_log::RequestLog;
pub use timeout::Timeout;
pub use tools::{FilterTools, MarkTools};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::chain::{Chain, ChainArg};
use crate::error::Result;
use crate::handler::SharedHandler;

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn on_metadata(&self, downstream: SharedHandler) -> Result<Value> {
        downstream.get_metadata().await
    }

    async fn on_request(&self, downstream: SharedHandler, request: Value) -> Result<Value> {
        downstream.handle_request(request).await
    }
}

/// Metadata and request transforms for one middleware, in call-site order.
pub fn layer<M: Middleware>(middleware: M) -> [ChainArg; 2] {
    let middleware = Arc::new(middleware);
    let for_metadata = middleware.clone();

    let metadata = ChainArg::transform(move |downstream: SharedHandler, _seed: Value| {
        let middleware = for_metadata.clone();
        async move { middleware.on_metadata(downstream).await }
    });
    let request = ChainArg::transform(move |downstream: SharedHandler, request: Value| {
        let middleware = middleware.clone();
        async move { middleware.on_request(downstream, request).await }
    });

    [metadata, request]
}

impl Chain {
    /// Adds a middleware as the next layer.
    pub fn with<M: Middleware>(&self, middleware: M) -> Result<Chain> {
        self.extend(&layer(middleware))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::Result;
    use crate::handler::McpHandler;

    /// Terminal handler that records what reaches it.
    pub struct Recorder {
        pub metadata: Value,
        pub calls: AtomicUsize,
        pub last_request: Mutex<Option<Value>>,
    }

    impl Recorder {
        pub fn new(metadata: Value) -> Self {
            Self {
                metadata,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl McpHandler for Recorder {
        async fn get_metadata(&self) -> Result<Value> {
            Ok(self.metadata.clone())
        }

        async fn handle_request(&self, request: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            Ok(json!({"jsonrpc": "2.0", "id": request.get("id").cloned(), "result": {"ok": true}}))
        }
    }
}
