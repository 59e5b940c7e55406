//! Classification of the arguments handed to [`Chain::extend`](super::Chain::extend).
//!
//! Every argument carries an explicit capability tag. A value that can act
//! both as a handler and as a transform is tagged [`Capability::Handler`]:
//! handler capability always wins, so passing such a value seals the chain
//! instead of adding a layer.

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{ChainError, Result};
use crate::handler::{
    identity_metadata, identity_request, McpHandler, SharedHandler, SharedTransform, Transform,
};

/// Capability exposed by a call-site argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Exposes both `get_metadata` and `handle_request`.
    Handler,
    /// Invocable as `(downstream, input) -> output`.
    Transform,
    /// Explicitly omitted; stands for the identity transform in the
    /// two-argument form.
    None,
}

#[derive(Clone)]
pub enum ChainArg {
    Handler(SharedHandler),
    Transform(SharedTransform),
    None,
}

impl ChainArg {
    pub fn handler<H: McpHandler + 'static>(handler: H) -> Self {
        ChainArg::Handler(Arc::new(handler))
    }

    pub fn shared_handler(handler: SharedHandler) -> Self {
        ChainArg::Handler(handler)
    }

    pub fn transform<F, Fut>(transform: F) -> Self
    where
        F: Fn(SharedHandler, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        ChainArg::Transform(Arc::new(transform))
    }

    pub fn shared_transform(transform: SharedTransform) -> Self {
        ChainArg::Transform(transform)
    }

    pub fn none() -> Self {
        ChainArg::None
    }

    /// Tags a value that satisfies both capabilities.
    ///
    /// Handler capability takes precedence: the value is attached as the
    /// terminal handler and is never used as a transform. Wrap the transform
    /// half in a closure and pass it to [`ChainArg::transform`] to get the
    /// other behaviour.
    pub fn from_dual<T>(value: T) -> Self
    where
        T: McpHandler + Transform + 'static,
    {
        ChainArg::Handler(Arc::new(value))
    }

    pub fn capability(&self) -> Capability {
        match self {
            ChainArg::Handler(_) => Capability::Handler,
            ChainArg::Transform(_) => Capability::Transform,
            ChainArg::None => Capability::None,
        }
    }
}

impl From<SharedHandler> for ChainArg {
    fn from(handler: SharedHandler) -> Self {
        ChainArg::Handler(handler)
    }
}

impl From<SharedTransform> for ChainArg {
    fn from(transform: SharedTransform) -> Self {
        ChainArg::Transform(transform)
    }
}

impl From<Option<SharedTransform>> for ChainArg {
    fn from(transform: Option<SharedTransform>) -> Self {
        transform.map_or(ChainArg::None, ChainArg::Transform)
    }
}

impl fmt::Debug for ChainArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChainArg").field(&self.capability()).finish()
    }
}

/// What an extension call asks for, once its arguments are classified.
#[derive(Clone)]
pub enum Extension {
    /// Attach a terminal handler.
    Seal(SharedHandler),
    /// Add one pipeline layer.
    Layer {
        metadata: SharedTransform,
        request: SharedTransform,
    },
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::Seal(_) => f.write_str("Extension::Seal"),
            Extension::Layer { .. } => f.write_str("Extension::Layer"),
        }
    }
}

/// Classifies an argument list.
///
/// - one handler: seal the chain with it, unless it is itself an unsealed chain
/// - one transform: add a layer with it as request transform, metadata untouched
/// - two transforms (either may be `None` for identity): metadata then request
///
/// Anything else is an [`ChainError::InvalidChainArgument`] naming the first
/// offending position.
pub fn classify(args: &[ChainArg]) -> Result<Extension> {
    match args {
        [] => Err(ChainError::invalid_argument(
            0,
            "expected 1 or 2 arguments, got none",
        )),
        [single] => match single {
            ChainArg::Handler(handler) if !handler.is_sealed() => {
                Err(ChainError::invalid_argument(
                    0,
                    "an unsealed chain cannot be used as a terminal handler",
                ))
            }
            ChainArg::Handler(handler) => Ok(Extension::Seal(handler.clone())),
            ChainArg::Transform(request) => Ok(Extension::Layer {
                metadata: identity_metadata(),
                request: request.clone(),
            }),
            ChainArg::None => Err(ChainError::invalid_argument(
                0,
                "expected a handler or a request transform, got nothing",
            )),
        },
        [metadata, request] => Ok(Extension::Layer {
            metadata: layer_transform(0, metadata, identity_metadata)?,
            request: layer_transform(1, request, identity_request)?,
        }),
        more => Err(ChainError::invalid_argument(
            2,
            format!("expected 1 or 2 arguments, got {}", more.len()),
        )),
    }
}

fn layer_transform(
    position: usize,
    arg: &ChainArg,
    identity: fn() -> SharedTransform,
) -> Result<SharedTransform> {
    match arg {
        ChainArg::Transform(transform) => Ok(transform.clone()),
        ChainArg::None => Ok(identity()),
        ChainArg::Handler(_) => Err(ChainError::invalid_argument(
            position,
            "a handler cannot be used as a transform in the two-argument form",
        )),
    }
}
