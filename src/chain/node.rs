use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::args::Extension;
use super::Chain;
use crate::error::Result;
use crate::handler::{metadata_seed, McpHandler, SharedTransform};

/// One middleware layer: a metadata transform and a request transform in
/// front of a downstream link.
///
/// Nodes are never modified after construction. Extending a chain rebuilds
/// every node on the path to the tail.
pub struct PipelineNode {
    metadata: SharedTransform,
    request: SharedTransform,
    downstream: Chain,
}

impl PipelineNode {
    pub(super) fn new(
        metadata: SharedTransform,
        request: SharedTransform,
        downstream: Chain,
    ) -> Self {
        Self {
            metadata,
            request,
            downstream,
        }
    }

    pub fn downstream(&self) -> &Chain {
        &self.downstream
    }

    /// Applies the extension to the downstream link, then rebuilds this layer
    /// over whatever came back.
    pub(super) fn extend(&self, extension: &Extension) -> Result<Chain> {
        let downstream = self.downstream.apply(extension)?;
        Ok(Chain::Node(Arc::new(Self::new(
            self.metadata.clone(),
            self.request.clone(),
            downstream,
        ))))
    }
}

#[async_trait]
impl McpHandler for PipelineNode {
    async fn get_metadata(&self) -> Result<Value> {
        self.metadata
            .apply(self.downstream.as_handler(), metadata_seed())
            .await
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        self.request
            .apply(self.downstream.as_handler(), request)
            .await
    }

    fn is_sealed(&self) -> bool {
        self.downstream.is_sealed()
    }
}

impl fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineNode")
            .field("downstream", &self.downstream)
            .finish_non_exhaustive()
    }
}
