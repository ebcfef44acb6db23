use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};

use crate::core::body::{AsyncTransform, Body, Transform};
use crate::core::compose::Branches;
use crate::core::error::{BoxError, ComposeError};
use crate::core::node::{GraphProps, Node, Role, VertexShape};
use crate::core::types::{Signature, TypeDesc};
use crate::core::{Execution, NodeValue};

/// Label of gateway vertices and of the box drawn around their branches.
pub const GATEWAY_LABEL: &str = "parallel";

struct Parallel {
    branches: Arc<[Node]>,
}

impl Transform for Parallel {
    fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        let results = self
            .branches
            .iter()
            .map(|branch| branch.call(input.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results.into())
    }
}

#[async_trait]
impl AsyncTransform for Parallel {
    async fn transform_async(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        let mut pending: FuturesOrdered<_> = self
            .branches
            .iter()
            .map(|branch| branch.call_async(input.clone()))
            .collect();

        let mut results = Vec::with_capacity(self.branches.len());
        while let Some(result) = pending.next().await {
            results.push(result?);
        }
        Ok(results.into())
    }
}

/// Fans one input out to every branch and collects their outputs in
/// declaration order.
///
/// Unlike a diverging composition there is no incident node: the gateway
/// itself is the entry point, and it carries its branches as children so
/// each one is drawn as a boxed subgraph.
#[track_caller]
pub fn parallel(branches: impl Into<Branches>) -> Result<Node, ComposeError> {
    let Branches(branches) = branches.into();
    let Some(first) = branches.first() else {
        return Err(ComposeError::UnsupportedOperand(
            "parallel gateway needs at least one branch".to_string(),
        ));
    };

    let signature = Signature::new(
        first.input_type().clone(),
        TypeDesc::tuple(branches.iter().map(|b| b.output_type().clone()).collect()),
    );
    let branches: Vec<Node> = branches
        .iter()
        .map(|branch| {
            let mut branch = branch.relocated();
            branch.props.bounding_box = Some(GATEWAY_LABEL.to_string());
            branch
        })
        .collect();

    let execution = branches
        .iter()
        .fold(Execution::Sync, |acc, branch| acc.and(branch.execution()));
    let logic = Parallel {
        branches: branches.clone().into(),
    };
    let body = match execution {
        Execution::Sync => Body::sync(logic),
        Execution::Async => Body::from_async(logic),
    };
    log::debug!("Built parallel gateway over {} branches as {signature}", branches.len());

    let props = GraphProps {
        shape: VertexShape::Diamond,
        is_async: execution == Execution::Async,
        ..GraphProps::default()
    };
    let len = branches.iter().map(Node::step_count).sum();
    let mut gateway = Node::from_body(GATEWAY_LABEL, signature, body)
        .with_role(Role::Gateway)
        .with_props(props)
        .with_children(branches);
    gateway.len = len;
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapters::functional::{async_transformer, transformer};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn sleeper(label: &str, millis: u64) -> Node {
        async_transformer(label, crate::signature!("int -> int"), move |x| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(json!(x.as_u64().unwrap_or_default() + millis))
        })
    }

    #[test]
    fn test_sync_parallel() {
        let plus = transformer("plus", crate::signature!("int -> int"), |x| {
            Ok(json!(x.as_i64().unwrap_or_default() + 1))
        });
        let text = transformer("text", crate::signature!("int -> str"), |x| Ok(json!(x.to_string())));
        let gateway = parallel([plus, text]).unwrap();

        assert_eq!(gateway.role(), Role::Gateway);
        assert_eq!(gateway.signature().to_string(), "int -> tuple[int, str]");
        assert_eq!(gateway.children().len(), 2);
        assert_eq!(gateway.call(json!(1)).unwrap(), json!([2, "1"]));
    }

    #[test]
    fn test_empty_parallel_is_rejected() {
        let err = parallel(Vec::<Node>::new()).unwrap_err();
        assert!(matches!(err, ComposeError::UnsupportedOperand(_)));
    }

    #[tokio::test]
    async fn test_async_branches_run_concurrently_in_order() {
        let gateway = parallel([sleeper("slow", 200), sleeper("fast", 20), sleeper("mid", 100)]).unwrap();
        assert!(gateway.is_async());

        let started = Instant::now();
        let result = gateway.call_async(json!(0)).await.unwrap();
        assert_eq!(result, json!([200, 20, 100]));
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_gateway_graph_boxes_branches() {
        let source = transformer("source", crate::signature!("int -> int"), |x| Ok(x));
        let sink = transformer("sink", crate::signature!("T -> T"), |x| Ok(x));
        let left = transformer("left", crate::signature!("int -> int"), |x| Ok(x));
        let right = transformer("right", crate::signature!("int -> int"), |x| Ok(x));

        let pipeline = (source >> parallel([left, right]).unwrap() >> sink).unwrap();
        assert_eq!(pipeline.call(json!(7)).unwrap(), json!([7, 7]));

        let graph = pipeline.graph();
        assert_eq!(graph.vertex_count(), 5);
        let gateway = graph.find(GATEWAY_LABEL).unwrap();
        let left = graph.find("left").unwrap();
        assert_eq!(left.parent_id, Some(gateway.instance_id));
        assert_eq!(left.props.bounding_box.as_deref(), Some(GATEWAY_LABEL));

        let dot = graph.to_dot(false);
        assert_eq!(dot.matches("subgraph").count(), 1);
    }
}
