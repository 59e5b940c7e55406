//! Chain assembly.
//!
//! A chain starts out as a lone [`Sentinel`] ("no terminal handler yet").
//! Each extension call returns a new chain and leaves the receiver untouched:
//!
//! ```rust,ignore
//! use mcp_chain::{chain, ChainArg};
//!
//! let chain = chain()
//!     .then(ChainArg::transform(log_requests))?   // outermost
//!     .then_pair(ChainArg::transform(mark_auth), ChainArg::none())?
//!     .seal(postgres)?;                          // terminal handler
//! ```
//!
//! The first layer added is the first to see an inbound call. Layers added
//! later are pushed down towards the tail, and attaching the terminal handler
//! replaces the sentinel on a freshly rebuilt path, so a sealed chain contains
//! no sentinel at all.

pub mod args;
pub mod node;
pub mod sentinel;

pub use args::{classify, Capability, ChainArg, Extension};
pub use node::PipelineNode;
pub use sentinel::Sentinel;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ChainError, Result};
use crate::handler::{McpHandler, SharedHandler};

/// A reference to one link of a chain.
#[derive(Clone)]
pub enum Chain {
    /// Unsealed tail.
    Open(Arc<Sentinel>),
    /// Middleware layer over the rest of the chain.
    Node(Arc<PipelineNode>),
    /// Terminal handler supplied by the integrator.
    Terminal(SharedHandler),
}

/// Starts an empty, unsealed chain.
pub fn chain() -> Chain {
    Chain::new()
}

impl Chain {
    pub fn new() -> Self {
        Chain::Open(Arc::new(Sentinel))
    }

    /// Extends the chain with one or two call-site arguments.
    ///
    /// See [`classify`] for how the arguments are interpreted. Extending a
    /// sealed chain fails with [`ChainError::ChainAlreadySealed`].
    pub fn extend(&self, args: &[ChainArg]) -> Result<Chain> {
        let extension = classify(args)?;
        debug!(
            "Extending chain (depth {}) with {:?}",
            self.depth(),
            extension
        );
        self.apply(&extension)
    }

    pub fn then(&self, arg: ChainArg) -> Result<Chain> {
        self.extend(&[arg])
    }

    pub fn then_pair(&self, metadata: ChainArg, request: ChainArg) -> Result<Chain> {
        self.extend(&[metadata, request])
    }

    pub fn seal<H: McpHandler + 'static>(&self, handler: H) -> Result<Chain> {
        self.then(ChainArg::handler(handler))
    }

    pub(crate) fn apply(&self, extension: &Extension) -> Result<Chain> {
        match self {
            Chain::Open(sentinel) => Ok(sentinel.extend(extension)),
            Chain::Node(node) => node.extend(extension),
            Chain::Terminal(_) => Err(ChainError::ChainAlreadySealed),
        }
    }

    /// True once the tail is a terminal handler.
    pub fn is_sealed(&self) -> bool {
        match self {
            Chain::Open(_) => false,
            Chain::Node(node) => node.downstream().is_sealed(),
            Chain::Terminal(handler) => handler.is_sealed(),
        }
    }

    /// Number of pipeline layers in front of the tail.
    pub fn depth(&self) -> usize {
        match self {
            Chain::Node(node) => 1 + node.downstream().depth(),
            _ => 0,
        }
    }

    /// Number of sentinels reachable from this link.
    pub fn sentinel_count(&self) -> usize {
        match self {
            Chain::Open(_) => 1,
            Chain::Node(node) => node.downstream().sentinel_count(),
            Chain::Terminal(_) => 0,
        }
    }

    /// This link as a shareable handler, as handed to transforms.
    pub fn as_handler(&self) -> SharedHandler {
        match self {
            Chain::Open(sentinel) => sentinel.clone(),
            Chain::Node(node) => node.clone(),
            Chain::Terminal(handler) => handler.clone(),
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl McpHandler for Chain {
    async fn get_metadata(&self) -> Result<Value> {
        match self {
            Chain::Open(sentinel) => sentinel.get_metadata().await,
            Chain::Node(node) => node.get_metadata().await,
            Chain::Terminal(handler) => handler.get_metadata().await,
        }
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        match self {
            Chain::Open(sentinel) => sentinel.handle_request(request).await,
            Chain::Node(node) => node.handle_request(request).await,
            Chain::Terminal(handler) => handler.handle_request(request).await,
        }
    }

    fn is_sealed(&self) -> bool {
        Chain::is_sealed(self)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Open(_) => f.write_str("Open"),
            Chain::Node(node) => fmt::Debug::fmt(node, f),
            Chain::Terminal(_) => f.write_str("Terminal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl McpHandler for Named {
        async fn get_metadata(&self) -> Result<Value> {
            Ok(json!({"server_name": self.0}))
        }

        async fn handle_request(&self, _request: Value) -> Result<Value> {
            Ok(json!({"from": self.0}))
        }
    }

    fn noop() -> ChainArg {
        ChainArg::transform(|next: SharedHandler, request: Value| async move {
            next.handle_request(request).await
        })
    }

    fn downstream_of(chain: &Chain) -> &Chain {
        match chain {
            Chain::Node(node) => node.downstream(),
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn test_new_chain_is_open() {
        let chain = chain();
        assert!(!chain.is_sealed());
        assert_eq!(chain.depth(), 0);
        assert_eq!(chain.sentinel_count(), 1);
    }

    #[test]
    fn test_sealing_open_chain_returns_handler_itself() {
        let terminal: SharedHandler = Arc::new(Named("db"));
        let sealed = chain()
            .then(ChainArg::shared_handler(terminal.clone()))
            .unwrap();

        match &sealed {
            Chain::Terminal(handler) => assert!(Arc::ptr_eq(handler, &terminal)),
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn test_layer_over_sentinel_keeps_sentinel_tail() {
        let layered = chain().then(noop()).unwrap();
        assert_eq!(layered.depth(), 1);
        assert!(matches!(downstream_of(&layered), Chain::Open(_)));
    }

    #[test]
    fn test_seal_rebuilds_every_layer() {
        let open = chain().then(noop()).unwrap().then(noop()).unwrap();
        let sealed = open.seal(Named("db")).unwrap();

        assert!(sealed.is_sealed());
        assert_eq!(sealed.depth(), 2);
        assert_eq!(sealed.sentinel_count(), 0);
        assert!(matches!(
            downstream_of(downstream_of(&sealed)),
            Chain::Terminal(_)
        ));

        // The unsealed precursor is untouched.
        assert_eq!(open.sentinel_count(), 1);
        assert!(matches!(downstream_of(downstream_of(&open)), Chain::Open(_)));
    }

    #[test]
    fn test_extension_never_reuses_nodes() {
        let open = chain().then(noop()).unwrap();
        let sealed = open.seal(Named("db")).unwrap();
        match (&open, &sealed) {
            (Chain::Node(before), Chain::Node(after)) => assert!(!Arc::ptr_eq(before, after)),
            _ => panic!("expected nodes"),
        }
    }

    #[test]
    fn test_second_terminal_is_rejected() {
        let sealed = chain().then(noop()).unwrap().seal(Named("a")).unwrap();
        assert!(matches!(
            sealed.seal(Named("b")),
            Err(ChainError::ChainAlreadySealed)
        ));

        let bare = chain().seal(Named("a")).unwrap();
        assert!(matches!(
            bare.seal(Named("b")),
            Err(ChainError::ChainAlreadySealed)
        ));
    }

    #[test]
    fn test_layer_on_sealed_chain_is_rejected() {
        let sealed = chain().seal(Named("a")).unwrap();
        assert!(matches!(
            sealed.then(noop()),
            Err(ChainError::ChainAlreadySealed)
        ));
    }

    #[test]
    fn test_sealed_chain_can_terminate_another() {
        let inner = chain().then(noop()).unwrap().seal(Named("db")).unwrap();
        let outer = chain().then(noop()).unwrap().seal(inner).unwrap();
        assert!(outer.is_sealed());
        assert_eq!(outer.sentinel_count(), 0);
    }

    #[test]
    fn test_open_chain_cannot_terminate_another() {
        let err = chain().then(noop()).unwrap().seal(chain()).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InvalidChainArgument { position: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_unsealed_execution_fails() {
        let open = chain().then(noop()).unwrap();
        assert!(matches!(
            open.handle_request(json!({})).await,
            Err(ChainError::UnconfiguredChain)
        ));
        assert!(matches!(
            chain().get_metadata().await,
            Err(ChainError::UnconfiguredChain)
        ));
    }

    #[tokio::test]
    async fn test_invalid_arguments_leave_chain_usable() {
        let open = chain().then(noop()).unwrap();
        assert!(open.extend(&[]).is_err());
        let sealed = open.seal(Named("db")).unwrap();
        assert_eq!(
            sealed.handle_request(json!({})).await.unwrap(),
            json!({"from": "db"})
        );
    }
}
