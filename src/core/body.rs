use std::panic::Location;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesOrdered, StreamExt};

use crate::core::error::{BoxError, RequiresAwait};
use crate::core::node::Node;
use crate::core::{Execution, NodeValue};

/// Frame name used for leaves whose logic is a trait object rather than a named function.
pub const ENTRY_POINT: &str = "transform";

/// Synchronous leaf logic.
pub trait Transform: Send + Sync + 'static {
    fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError>;
}

/// Asynchronous leaf logic.
///
/// See [`Transform`] for the synchronous version.
#[async_trait]
pub trait AsyncTransform: Send + Sync + 'static {
    /// Produce the output for `input`. Resolving to `null` is reported as
    /// [`MissingResult`](crate::core::error::MissingResult).
    async fn transform_async(&self, input: NodeValue) -> Result<NodeValue, BoxError>;
}

/// A source location attached to a leaf, used to build location hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: &'static str,
    pub line: u32,
}

impl Frame {
    /// Records the location of the (tracked) caller under `function`.
    #[track_caller]
    pub fn caller(function: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            function: function.into(),
            file: location.file(),
            line: location.line(),
        }
    }
}

/// Leaf logic together with the frames that locate it.
pub struct Leaf<L: ?Sized> {
    pub(crate) logic: Arc<L>,
    pub(crate) frames: Vec<Frame>,
}

impl<L: ?Sized> Clone for Leaf<L> {
    fn clone(&self) -> Self {
        Self {
            logic: Arc::clone(&self.logic),
            frames: self.frames.clone(),
        }
    }
}

/// What a node runs when called.
///
/// Leaves wrap user logic; composites hold the copies they were built from.
#[derive(Clone)]
pub enum Body {
    Sync(Leaf<dyn Transform>),
    Async(Leaf<dyn AsyncTransform>),
    Serial {
        first: Arc<Node>,
        second: Arc<Node>,
    },
    Diverging {
        incident: Arc<Node>,
        branches: Arc<[Node]>,
    },
}

impl Body {
    /// A synchronous leaf body, located at the caller.
    #[track_caller]
    pub fn sync<T: Transform>(logic: T) -> Self {
        Body::Sync(Leaf {
            logic: Arc::new(logic),
            frames: vec![Frame::caller(ENTRY_POINT)],
        })
    }

    /// An asynchronous leaf body, located at the caller.
    #[track_caller]
    pub fn from_async<T: AsyncTransform>(logic: T) -> Self {
        Body::Async(Leaf {
            logic: Arc::new(logic),
            frames: vec![Frame::caller(ENTRY_POINT)],
        })
    }

    /// Replaces the frames of a leaf body. Composite bodies carry no frames.
    pub fn with_frames(self, frames: Vec<Frame>) -> Self {
        match self {
            Body::Sync(leaf) => Body::Sync(Leaf { frames, ..leaf }),
            Body::Async(leaf) => Body::Async(Leaf { frames, ..leaf }),
            composite => composite,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        match self {
            Body::Sync(leaf) => &leaf.frames,
            Body::Async(leaf) => &leaf.frames,
            Body::Serial { .. } | Body::Diverging { .. } => &[],
        }
    }

    pub fn execution(&self) -> Execution {
        match self {
            Body::Sync(_) => Execution::Sync,
            Body::Async(_) => Execution::Async,
            Body::Serial { first, second } => first.execution().and(second.execution()),
            Body::Diverging { incident, branches } => branches
                .iter()
                .fold(incident.execution(), |acc, branch| acc.and(branch.execution())),
        }
    }

    /// Async leaves must always produce a value.
    pub(crate) fn requires_value(&self) -> bool {
        matches!(self, Body::Async(_))
    }

    /// Runs the body synchronously on behalf of the node labelled `label`,
    /// without wrapping its errors.
    pub(crate) fn transform(&self, label: &str, input: NodeValue) -> Result<NodeValue, BoxError> {
        match self {
            Body::Sync(leaf) => leaf.logic.transform(input),
            Body::Async(_) => Err(Box::new(RequiresAwait {
                label: label.to_string(),
            })),
            Body::Serial { first, second } => {
                let intermediate = first.call(input)?;
                Ok(second.call(intermediate)?)
            }
            Body::Diverging { incident, branches } => {
                let intermediate = incident.call(input)?;
                let results = branches
                    .iter()
                    .map(|branch| branch.call(intermediate.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NodeValue::Array(results))
            }
        }
    }

    /// Runs the body, awaiting every async participant. Sync participants run
    /// inline, so the only suspension points are the awaits below.
    pub(crate) fn transform_async(&self, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, BoxError>> {
        Box::pin(async move {
            match self {
                Body::Sync(leaf) => leaf.logic.transform(input),
                Body::Async(leaf) => leaf.logic.transform_async(input).await,
                Body::Serial { first, second } => {
                    let intermediate = first.call_async(input).await?;
                    Ok(second.call_async(intermediate).await?)
                }
                Body::Diverging { incident, branches } => {
                    let intermediate = incident.call_async(input).await?;
                    let mut pending: FuturesOrdered<_> = branches
                        .iter()
                        .map(|branch| branch.call_async(intermediate.clone()))
                        .collect();

                    let mut results = Vec::with_capacity(branches.len());
                    while let Some(result) = pending.next().await {
                        results.push(result?);
                    }
                    Ok(NodeValue::Array(results))
                }
            }
        })
    }
}
