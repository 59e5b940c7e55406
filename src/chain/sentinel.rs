use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::args::Extension;
use super::node::PipelineNode;
use super::Chain;
use crate::error::{ChainError, Result};
use crate::handler::McpHandler;

/// Tail of a chain that has no terminal handler yet.
///
/// Extending it with a handler returns that handler itself, which is how the
/// sentinel disappears from a chain once it is sealed.
#[derive(Debug, Default)]
pub struct Sentinel;

impl Sentinel {
    pub(super) fn extend(self: &Arc<Self>, extension: &Extension) -> Chain {
        match extension {
            Extension::Seal(handler) => {
                debug!("Sentinel replaced by terminal handler");
                Chain::Terminal(handler.clone())
            }
            Extension::Layer { metadata, request } => Chain::Node(Arc::new(PipelineNode::new(
                metadata.clone(),
                request.clone(),
                Chain::Open(self.clone()),
            ))),
        }
    }
}

#[async_trait]
impl McpHandler for Sentinel {
    async fn get_metadata(&self) -> Result<Value> {
        Err(ChainError::UnconfiguredChain)
    }

    async fn handle_request(&self, _request: Value) -> Result<Value> {
        Err(ChainError::UnconfiguredChain)
    }

    fn is_sealed(&self) -> bool {
        false
    }
}
