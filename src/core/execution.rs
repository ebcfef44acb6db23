//! Calling nodes, and normalizing what comes out of a failed call.

use std::error::Error;

use futures::future::BoxFuture;

use crate::core::NodeValue;
use crate::core::body::{ENTRY_POINT, Frame};
use crate::core::error::{BoxError, ExecutionError, MissingResult, RequiresAwait};
use crate::core::node::Node;

impl Node {
    /// Runs a sync node.
    ///
    /// Async nodes (and composites containing one) are rejected with an
    /// [`ExecutionError`] caused by [`RequiresAwait`].
    pub fn call(&self, input: NodeValue) -> Result<NodeValue, ExecutionError> {
        if self.is_async() {
            return Err(self.wrap(Box::new(RequiresAwait {
                label: self.label.clone(),
            })));
        }
        self.body.transform(&self.label, input).map_err(|err| self.wrap(err))
    }

    /// Runs any node. Sync participants run inline.
    pub fn call_async(&self, input: NodeValue) -> BoxFuture<'_, Result<NodeValue, ExecutionError>> {
        Box::pin(async move {
            let output = self
                .body
                .transform_async(input)
                .await
                .map_err(|err| self.wrap(err))?;

            if output.is_null() && self.body.requires_value() && !self.output_type().is_nullable() {
                return Err(self.wrap(Box::new(MissingResult {
                    label: self.label.clone(),
                })));
            }
            Ok(output)
        })
    }

    /// Attributes a body error to this node, unless an inner node already did.
    pub(crate) fn wrap(&self, error: BoxError) -> ExecutionError {
        let error = match error.downcast::<ExecutionError>() {
            Ok(wrapped) => return *wrapped,
            Err(error) => error,
        };

        if let Some(inner) = find_wrapped(error.as_ref()) {
            let raiser = inner.raiser().clone();
            let hint = inner.location_hint().to_string();
            log::trace!(
                "Error in \"{}\" already carries a wrapped error from \"{}\"",
                self.label,
                raiser.label
            );
            return ExecutionError::new(raiser, hint, error);
        }

        log::trace!("Wrapping error raised by transformer \"{}\": {error}", self.label);
        ExecutionError::new(self.info(), location_hint(&self.label, self.frames()), error)
    }
}

/// Looks for an [`ExecutionError`] in the source chain of `error`.
fn find_wrapped<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a ExecutionError> {
    let mut current = error.source();
    while let Some(err) = current {
        if let Some(wrapped) = err.downcast_ref::<ExecutionError>() {
            return Some(wrapped);
        }
        current = err.source();
    }
    None
}

/// One-line hint pointing at the frame of the failing transformer.
///
/// Only frames named after `label` or the [`ENTRY_POINT`] qualify. Anything
/// other than exactly one candidate gives the generic message.
pub fn location_hint(label: &str, frames: &[Frame]) -> String {
    let mut candidates = frames
        .iter()
        .filter(|frame| frame.function == label || frame.function == ENTRY_POINT);

    match (candidates.next(), candidates.next()) {
        (Some(frame), None) => format!(
            "File \"{}\", line {}, in transformer \"{label}\"",
            frame.file, frame.line
        ),
        _ => format!("An error occurred in transformer \"{label}\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::body::{AsyncTransform, Transform};
    use async_trait::async_trait;
    use serde_json::json;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("negative input")]
    struct Negative;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer(#[source] ExecutionError);

    struct Sqrt;

    impl Transform for Sqrt {
        fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
            let x = input.as_f64().unwrap_or_default();
            if x < 0.0 {
                return Err(Box::new(Negative));
            }
            Ok(json!(x.sqrt()))
        }
    }

    struct Nothing;

    #[async_trait]
    impl AsyncTransform for Nothing {
        async fn transform_async(&self, _input: NodeValue) -> Result<NodeValue, BoxError> {
            Ok(NodeValue::Null)
        }
    }

    fn frame(function: &str, line: u32) -> Frame {
        Frame {
            function: function.to_string(),
            file: "pipeline.rs",
            line,
        }
    }

    #[test]
    fn test_call_wraps_body_errors() {
        let node = Node::new("sqrt", crate::signature!("float -> float"), Sqrt);
        assert_eq!(node.call(json!(4.0)).unwrap(), json!(2.0));

        let err = node.call(json!(-1.0)).unwrap_err();
        assert_eq!(err.raiser().instance_id, node.instance_id());
        assert!(err.cause_as::<Negative>().is_some());
        assert!(err.location_hint().contains("in transformer \"sqrt\""));
        assert!(err.location_hint().contains(file!()));
    }

    #[test]
    fn test_wrap_passes_existing_error_through() {
        let node = Node::new("sqrt", crate::signature!("float -> float"), Sqrt);
        let other = Node::new("other", crate::signature!("float -> float"), Sqrt);

        let inner = node.call(json!(-1.0)).unwrap_err();
        let rewrapped = other.wrap(Box::new(inner));
        assert_eq!(rewrapped.raiser().label, "sqrt");
        assert!(rewrapped.cause_as::<Negative>().is_some());
    }

    #[test]
    fn test_wrap_reattributes_nested_error() {
        let node = Node::new("sqrt", crate::signature!("float -> float"), Sqrt);
        let other = Node::new("other", crate::signature!("float -> float"), Sqrt);

        let inner = node.call(json!(-1.0)).unwrap_err();
        let hint = inner.location_hint().to_string();
        let err = other.wrap(Box::new(Outer(inner)));

        assert_eq!(err.raiser().label, "sqrt");
        assert_eq!(err.location_hint(), hint);
        assert!(err.cause_as::<Outer>().is_some());
    }

    #[test]
    fn test_sync_call_on_async_node() {
        let node = Node::new_async("nothing", crate::signature!("T -> T"), Nothing);
        let err = node.call(json!(1)).unwrap_err();
        assert!(err.cause_as::<RequiresAwait>().is_some());
    }

    #[tokio::test]
    async fn test_async_null_is_missing_result() {
        let node = Node::new_async("nothing", crate::signature!("T -> T"), Nothing);
        let err = node.call_async(json!(1)).await.unwrap_err();
        let cause = err.cause_as::<MissingResult>().unwrap();
        assert_eq!(cause.label, "nothing");
    }

    #[tokio::test]
    async fn test_async_null_allowed_when_declared() {
        let node = Node::new_async("nothing", crate::signature!("T -> union[T, null]"), Nothing);
        assert_eq!(node.call_async(json!(1)).await.unwrap(), NodeValue::Null);
    }

    #[tokio::test]
    async fn test_call_async_runs_sync_nodes() {
        let node = Node::new("sqrt", crate::signature!("float -> float"), Sqrt);
        assert_eq!(node.call_async(json!(9.0)).await.unwrap(), json!(3.0));
    }

    #[test]
    fn test_location_hint() {
        assert_eq!(
            location_hint("square", &[frame("square", 12)]),
            "File \"pipeline.rs\", line 12, in transformer \"square\""
        );
        assert_eq!(
            location_hint("square", &[frame("helper", 3), frame(ENTRY_POINT, 40)]),
            "File \"pipeline.rs\", line 40, in transformer \"square\""
        );
        assert_eq!(
            location_hint("square", &[frame("square", 12), frame(ENTRY_POINT, 40)]),
            "An error occurred in transformer \"square\""
        );
        assert_eq!(
            location_hint("square", &[frame("helper", 3)]),
            "An error occurred in transformer \"square\""
        );
    }
}
