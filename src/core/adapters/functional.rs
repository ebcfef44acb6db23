//! Function adapters.
//!
//! Each adapter records the location it was called from under the node's
//! label, so failures point back at the line that built the step.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::NodeValue;
use crate::core::body::{AsyncTransform, Body, Frame, Transform};
use crate::core::compose::compose;
use crate::core::error::{BoxError, ComposeError};
use crate::core::node::Node;
use crate::core::types::{Signature, TypeDesc};

/// [`Transform`] backed by a closure.
pub struct FnTransform<F> {
    f: F,
}

impl<F> FnTransform<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(NodeValue) -> Result<NodeValue, BoxError> + Send + Sync + 'static,
{
    fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        (self.f)(input)
    }
}

/// [`AsyncTransform`] backed by a closure returning a future.
pub struct AsyncFnTransform<F> {
    f: F,
}

impl<F> AsyncFnTransform<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AsyncTransform for AsyncFnTransform<F>
where
    F: Fn(NodeValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NodeValue, BoxError>> + Send + 'static,
{
    async fn transform_async(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        (self.f)(input).await
    }
}

/// Wraps a one-argument function into a sync node.
///
/// ```rust
/// use pipeforge::prelude::*;
/// use serde_json::json;
///
/// let square = transformer("square", signature!("float -> float"), |x| {
///     let x = x.as_f64().unwrap_or_default();
///     Ok(json!(x * x))
/// });
/// assert_eq!(square.call(json!(3.0)).unwrap(), json!(9.0));
/// ```
#[track_caller]
pub fn transformer<F>(label: impl Into<String>, signature: Signature, f: F) -> Node
where
    F: Fn(NodeValue) -> Result<NodeValue, BoxError> + Send + Sync + 'static,
{
    let label = label.into();
    let frame = Frame::caller(label.as_str());
    Node::from_body(label, signature, Body::sync(FnTransform::new(f)).with_frames(vec![frame]))
}

/// Wraps a one-argument async function into an async node.
#[track_caller]
pub fn async_transformer<F, Fut>(label: impl Into<String>, signature: Signature, f: F) -> Node
where
    F: Fn(NodeValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NodeValue, BoxError>> + Send + 'static,
{
    let label = label.into();
    let frame = Frame::caller(label.as_str());
    Node::from_body(
        label,
        signature,
        Body::from_async(AsyncFnTransform::new(f)).with_frames(vec![frame]),
    )
}

/// A two-argument function waiting for its extra argument.
pub struct PartialTransformer<A, F> {
    label: String,
    signature: Signature,
    f: Arc<F>,
    _arg: std::marker::PhantomData<fn(A)>,
}

impl<A, F> PartialTransformer<A, F>
where
    A: Send + Sync + 'static,
    F: Fn(NodeValue, &A) -> Result<NodeValue, BoxError> + Send + Sync + 'static,
{
    /// Fixes the extra argument, producing a node.
    #[track_caller]
    pub fn bind(&self, arg: A) -> Node {
        let f = Arc::clone(&self.f);
        transformer(self.label.clone(), self.signature.clone(), move |input| f(input, &arg))
    }
}

/// Curries `f(data, arg)`: the returned factory builds one node per bound `arg`.
///
/// ```rust
/// use pipeforge::prelude::*;
/// use serde_json::json;
///
/// let multiply = partial_transformer("multiply", signature!("float -> float"), |x, by: &f64| {
///     Ok(json!(x.as_f64().unwrap_or_default() * by))
/// });
/// assert_eq!(multiply.bind(3.0).call(json!(2.0)).unwrap(), json!(6.0));
/// ```
pub fn partial_transformer<A, F>(
    label: impl Into<String>,
    signature: Signature,
    f: F,
) -> PartialTransformer<A, F>
where
    A: Send + Sync + 'static,
    F: Fn(NodeValue, &A) -> Result<NodeValue, BoxError> + Send + Sync + 'static,
{
    PartialTransformer {
        label: label.into(),
        signature,
        f: Arc::new(f),
        _arg: std::marker::PhantomData,
    }
}

/// Async counterpart of [`PartialTransformer`]. The bound argument is cloned
/// into every call.
pub struct PartialAsyncTransformer<A, F> {
    label: String,
    signature: Signature,
    f: Arc<F>,
    _arg: std::marker::PhantomData<fn(A)>,
}

impl<A, F, Fut> PartialAsyncTransformer<A, F>
where
    A: Clone + Send + Sync + 'static,
    F: Fn(NodeValue, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NodeValue, BoxError>> + Send + 'static,
{
    #[track_caller]
    pub fn bind(&self, arg: A) -> Node {
        let f = Arc::clone(&self.f);
        async_transformer(self.label.clone(), self.signature.clone(), move |input| {
            f(input, arg.clone())
        })
    }
}

pub fn partial_async_transformer<A, F, Fut>(
    label: impl Into<String>,
    signature: Signature,
    f: F,
) -> PartialAsyncTransformer<A, F>
where
    A: Clone + Send + Sync + 'static,
    F: Fn(NodeValue, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NodeValue, BoxError>> + Send + 'static,
{
    PartialAsyncTransformer {
        label: label.into(),
        signature,
        f: Arc::new(f),
        _arg: std::marker::PhantomData,
    }
}

/// Invisible identity step, `T -> T`.
#[track_caller]
pub fn forward() -> Node {
    forward_of(TypeDesc::var("T"))
}

/// Invisible identity step over a fixed type.
#[track_caller]
pub fn forward_of(ty: TypeDesc) -> Node {
    transformer("forward", Signature::new(ty.clone(), ty), |input| Ok(input)).invisible()
}

/// Drops its input, producing `null`.
#[track_caller]
pub fn forget() -> Node {
    transformer(
        "forget",
        Signature::new(TypeDesc::var("T"), TypeDesc::null()),
        |_| Ok(NodeValue::Null),
    )
}

/// `forward >> (inner, forward)`: returns `[inner(x), x]`.
pub fn forward_incoming(inner: &Node) -> Result<Node, ComposeError> {
    compose(&forward(), vec![inner.clone(), forward()])
}
