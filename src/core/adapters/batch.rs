use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};

use crate::core::body::{AsyncTransform, Body, Transform};
use crate::core::error::{BoxError, NotAnArray};
use crate::core::node::Node;
use crate::core::types::{Signature, TypeDesc};
use crate::core::{Execution, NodeValue};

/// Runs the wrapped node once per item of an array input.
struct MapOver {
    inner: Arc<Node>,
}

impl MapOver {
    fn items(input: &NodeValue) -> Result<&Vec<NodeValue>, BoxError> {
        input.as_array().ok_or_else(|| {
            Box::new(NotAnArray {
                found: json_kind(input).to_string(),
            }) as BoxError
        })
    }
}

fn json_kind(value: &NodeValue) -> &'static str {
    match value {
        NodeValue::Null => "null",
        NodeValue::Bool(_) => "bool",
        NodeValue::Number(_) => "number",
        NodeValue::String(_) => "string",
        NodeValue::Array(_) => "array",
        NodeValue::Object(_) => "object",
    }
}

impl Transform for MapOver {
    fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        let results = Self::items(&input)?
            .iter()
            .map(|item| self.inner.call(item.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results.into())
    }
}

#[async_trait]
impl AsyncTransform for MapOver {
    async fn transform_async(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        let items = Self::items(&input)?;
        let mut pending: FuturesOrdered<_> = items
            .iter()
            .map(|item| self.inner.call_async(item.clone()))
            .collect();

        let mut results = Vec::with_capacity(items.len());
        while let Some(result) = pending.next().await {
            results.push(result?);
        }
        Ok(results.into())
    }
}

/// Lifts `node: I -> O` into `list[I] -> list[O]`.
///
/// Sync nodes map the items one after the other. Async nodes have all items
/// in flight at once; results keep the item order either way.
#[track_caller]
pub fn map_over(node: &Node) -> Node {
    let signature = Signature::new(
        TypeDesc::param("list", vec![node.input_type().clone()]),
        TypeDesc::param("list", vec![node.output_type().clone()]),
    );
    let logic = MapOver {
        inner: Arc::new(node.copy(None, true)),
    };
    let body = match node.execution() {
        Execution::Sync => Body::sync(logic),
        Execution::Async => Body::from_async(logic),
    };
    Node::from_body(node.label(), signature, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapters::functional::{async_transformer, transformer};
    use crate::core::error::ExecutionError;
    use serde_json::json;
    use std::time::Duration;

    fn double() -> Node {
        transformer("double", crate::signature!("float -> float"), |x| {
            match x.as_f64() {
                Some(x) => Ok(json!(x * 2.0)),
                None => Err("not a number".into()),
            }
        })
    }

    #[test]
    fn test_map_over_sync() {
        let node = map_over(&double());
        assert_eq!(node.signature().to_string(), "list[float] -> list[float]");
        assert!(!node.is_async());
        assert_eq!(node.call(json!([1.0, 2.0, 3.0])).unwrap(), json!([2.0, 4.0, 6.0]));
        assert_eq!(node.call(json!([])).unwrap(), json!([]));
    }

    #[test]
    fn test_map_over_rejects_non_array() {
        let err = map_over(&double()).call(json!("not an array")).unwrap_err();
        let cause = err.cause_as::<NotAnArray>().unwrap();
        assert_eq!(cause.found, "string");
    }

    #[test]
    fn test_item_failure_is_raised_by_inner_node() {
        let inner = double();
        let err: ExecutionError = map_over(&inner).call(json!([1.0, "x"])).unwrap_err();
        assert_eq!(err.raiser().id, inner.id());
    }

    #[tokio::test]
    async fn test_map_over_async_preserves_order() {
        let delayed = async_transformer("delayed", crate::signature!("int -> int"), |x| async move {
            let n = x.as_u64().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(30 - n * 10)).await;
            Ok(json!(n))
        });
        let node = map_over(&delayed);
        assert!(node.is_async());
        assert_eq!(node.call_async(json!([0, 1, 2])).await.unwrap(), json!([0, 1, 2]));
    }
}
