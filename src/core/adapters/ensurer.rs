//! Input and output checks wrapped around an existing node.
//!
//! An [`Ensure`] never touches the node it is applied to. It builds a copy
//! whose body runs the checks around the original body, keeping the node's
//! identity, label, links and graph metadata.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::body::{AsyncTransform, Body, ENTRY_POINT, Frame, Transform};
use crate::core::error::BoxError;
use crate::core::node::Node;
use crate::core::{Execution, NodeValue};

type ValueCheck = Arc<dyn Fn(&NodeValue) -> Result<(), BoxError> + Send + Sync>;
type ChangeCheck = Arc<dyn Fn(&NodeValue, &NodeValue) -> Result<(), BoxError> + Send + Sync>;

/// A set of checks to attach to nodes.
///
/// ```rust
/// use pipeforge::prelude::*;
/// use serde_json::json;
///
/// let half = transformer("half", signature!("float -> float"), |x| {
///     Ok(json!(x.as_f64().unwrap_or_default() / 2.0))
/// });
/// let checked = Ensure::new()
///     .incoming(|x| match x.as_f64() {
///         Some(_) => Ok(()),
///         None => Err("expected a number".into()),
///     })
///     .apply(&half);
///
/// assert!(checked.call(json!("four")).is_err());
/// assert_eq!(checked.call(json!(4.0)).unwrap(), json!(2.0));
/// ```
#[derive(Clone, Default)]
pub struct Ensure {
    incoming: Vec<ValueCheck>,
    outcome: Vec<ValueCheck>,
    changes: Vec<ChangeCheck>,
}

impl Ensure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the input before the body runs.
    pub fn incoming<F>(mut self, check: F) -> Self
    where
        F: Fn(&NodeValue) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.incoming.push(Arc::new(check));
        self
    }

    /// Checks the output after the body ran.
    pub fn outcome<F>(mut self, check: F) -> Self
    where
        F: Fn(&NodeValue) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.outcome.push(Arc::new(check));
        self
    }

    /// Checks `(input, output)` after the body ran.
    pub fn changes<F>(mut self, check: F) -> Self
    where
        F: Fn(&NodeValue, &NodeValue) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.changes.push(Arc::new(check));
        self
    }

    /// Returns a checked copy of `node`.
    #[track_caller]
    pub fn apply(&self, node: &Node) -> Node {
        let mut frames = node.frames().to_vec();
        frames.push(Frame::caller(ENTRY_POINT));

        let logic = Ensured {
            label: node.label().to_string(),
            inner: node.body().clone(),
            checks: self.clone(),
        };
        let body = match node.execution() {
            Execution::Sync => Body::sync(logic),
            Execution::Async => Body::from_async(logic),
        };
        node.copy(Some(body.with_frames(frames)), false)
    }

    fn check_incoming(&self, input: &NodeValue) -> Result<(), BoxError> {
        self.incoming.iter().try_for_each(|check| check(input))
    }

    fn check_outcome(&self, input: &NodeValue, output: &NodeValue) -> Result<(), BoxError> {
        self.outcome.iter().try_for_each(|check| check(output))?;
        self.changes.iter().try_for_each(|check| check(input, output))
    }
}

struct Ensured {
    label: String,
    inner: Body,
    checks: Ensure,
}

impl Transform for Ensured {
    fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        self.checks.check_incoming(&input)?;
        let output = self.inner.transform(&self.label, input.clone())?;
        self.checks.check_outcome(&input, &output)?;
        Ok(output)
    }
}

#[async_trait]
impl AsyncTransform for Ensured {
    async fn transform_async(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        self.checks.check_incoming(&input)?;
        let output = self.inner.transform_async(input.clone()).await?;
        self.checks.check_outcome(&input, &output)?;
        Ok(output)
    }
}
