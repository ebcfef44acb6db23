//! Conditional gateway: the first arm whose condition holds handles the input.
//!
//! ```text
//! condition("if_positive", ..).then(a)
//!     .else_if(condition("if_small", ..)).then(b)
//!     .otherwise(c)        // or .otherwise_none() for a null result
//! ```
//!
//! The gateway's output is the union of its arms' outputs, so a chain whose
//! arms all produce `float` still reads `float`. Each arm is drawn as its own
//! boxed subgraph labelled with the condition guarding it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::body::{AsyncTransform, Body, Transform};
use crate::core::error::BoxError;
use crate::core::node::{GraphProps, Node, Role, VertexShape};
use crate::core::types::{Signature, TypeDesc};
use crate::core::{Execution, NodeValue};

/// Box label of the fallback arm.
pub const ELSE_LABEL: &str = "else";

type Predicate = Arc<dyn Fn(&NodeValue) -> bool + Send + Sync>;

/// A named condition.
#[derive(Clone)]
pub struct If {
    label: String,
    predicate: Predicate,
}

impl If {
    pub fn new<P>(label: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&NodeValue) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Routes inputs satisfying the condition to `node`.
    pub fn then(&self, node: Node) -> Conditional {
        Conditional {
            arms: vec![Arm {
                condition: self.clone(),
                node,
            }],
        }
    }
}

/// Shorthand for [`If::new`].
pub fn condition<P>(label: impl Into<String>, predicate: P) -> If
where
    P: Fn(&NodeValue) -> bool + Send + Sync + 'static,
{
    If::new(label, predicate)
}

#[derive(Clone)]
struct Arm {
    condition: If,
    node: Node,
}

/// Arms declared so far, in evaluation order.
#[derive(Clone)]
pub struct Conditional {
    arms: Vec<Arm>,
}

/// A condition waiting for the node it guards.
pub struct ElseIf {
    arms: Vec<Arm>,
    condition: If,
}

impl ElseIf {
    pub fn then(mut self, node: Node) -> Conditional {
        self.arms.push(Arm {
            condition: self.condition,
            node,
        });
        Conditional { arms: self.arms }
    }
}

impl Conditional {
    /// Adds a condition tried when every earlier one failed.
    pub fn else_if(self, condition: If) -> ElseIf {
        ElseIf {
            arms: self.arms,
            condition,
        }
    }

    /// Closes the gateway, sending unmatched inputs to `node`.
    #[track_caller]
    pub fn otherwise(self, node: Node) -> Node {
        self.build(Some(node))
    }

    /// Closes the gateway, producing `null` for unmatched inputs.
    #[track_caller]
    pub fn otherwise_none(self) -> Node {
        self.build(None)
    }

    #[track_caller]
    fn build(self, fallback: Option<Node>) -> Node {
        let label = self
            .arms
            .first()
            .map(|arm| arm.condition.label.clone())
            .unwrap_or_default();
        let input = self
            .arms
            .first()
            .map_or_else(|| TypeDesc::var("T"), |arm| arm.node.input_type().clone());

        let arms: Vec<(Predicate, Node)> = self
            .arms
            .into_iter()
            .map(|arm| {
                let node = boxed(&arm.node, &arm.condition.label);
                (arm.condition.predicate, node)
            })
            .collect();
        let fallback = fallback.map(|node| boxed(&node, ELSE_LABEL));

        let mut outputs: Vec<TypeDesc> = arms.iter().map(|(_, node)| node.output_type().clone()).collect();
        outputs.push(match &fallback {
            Some(node) => node.output_type().clone(),
            None => TypeDesc::null(),
        });
        let signature = Signature::new(input, TypeDesc::union(outputs));

        let mut children: Vec<Node> = arms.iter().map(|(_, node)| node.clone()).collect();
        children.extend(fallback.iter().cloned());
        let execution = children
            .iter()
            .fold(Execution::Sync, |acc, arm| acc.and(arm.execution()));
        let len = children.iter().map(Node::step_count).sum();
        log::debug!(
            "Built conditional gateway \"{label}\" over {} arms as {signature}",
            children.len()
        );

        let logic = Branching {
            arms: arms.into(),
            fallback: fallback.map(Arc::new),
        };
        let body = match execution {
            Execution::Sync => Body::sync(logic),
            Execution::Async => Body::from_async(logic),
        };
        let props = GraphProps {
            shape: VertexShape::Diamond,
            is_async: execution == Execution::Async,
            ..GraphProps::default()
        };
        let mut gateway = Node::from_body(label, signature, body)
            .with_role(Role::Gateway)
            .with_props(props)
            .with_children(children);
        gateway.len = len;
        gateway
    }
}

/// Copy of an arm placed inside the gateway, drawn in a box named `label`.
fn boxed(node: &Node, label: &str) -> Node {
    let mut arm = node.relocated();
    arm.props.bounding_box = Some(label.to_string());
    arm
}

struct Branching {
    arms: Arc<[(Predicate, Node)]>,
    fallback: Option<Arc<Node>>,
}

impl Branching {
    fn select(&self, input: &NodeValue) -> Option<&Node> {
        self.arms
            .iter()
            .find(|(predicate, _)| predicate(input))
            .map(|(_, node)| node)
            .or(self.fallback.as_deref())
    }
}

impl Transform for Branching {
    fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        match self.select(&input) {
            Some(node) => Ok(node.call(input)?),
            None => Ok(NodeValue::Null),
        }
    }
}

#[async_trait]
impl AsyncTransform for Branching {
    async fn transform_async(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
        match self.select(&input) {
            Some(node) => Ok(node.call_async(input).await?),
            None => Ok(NodeValue::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapters::functional::{async_transformer, transformer};
    use serde_json::json;

    fn number(value: &NodeValue) -> f64 {
        value.as_f64().unwrap_or_default()
    }

    fn plus1() -> Node {
        transformer("plus1", crate::signature!("float -> float"), |x| Ok(json!(number(&x) + 1.0)))
    }

    fn minus1() -> Node {
        transformer("minus1", crate::signature!("float -> float"), |x| Ok(json!(number(&x) - 1.0)))
    }

    fn to_string() -> Node {
        transformer("to_string", crate::signature!("float -> str"), |x| Ok(json!(x.to_string())))
    }

    fn async_plus1() -> Node {
        async_transformer("async_plus1", crate::signature!("float -> float"), |x| async move {
            Ok(json!(number(&x) + 1.0))
        })
    }

    fn if_not_zero() -> If {
        condition("if_not_zero", |x| number(x) != 0.0)
    }

    fn if_is_even() -> If {
        condition("if_is_even", |x| number(x) % 2.0 == 0.0)
    }

    fn if_below_ten() -> If {
        condition("if_below_ten", |x| number(x) < 10.0)
    }

    #[test]
    fn test_then_else_same_output() {
        let gateway = if_not_zero().then(plus1()).otherwise(minus1());

        assert_eq!(gateway.role(), Role::Gateway);
        assert_eq!(gateway.label(), "if_not_zero");
        assert_eq!(gateway.signature().to_string(), "float -> float");
        assert!(!gateway.is_async());
        assert_eq!(gateway.call(json!(2.0)).unwrap(), json!(3.0));
        assert_eq!(gateway.call(json!(0.0)).unwrap(), json!(-1.0));
    }

    #[test]
    fn test_then_else_union_output() {
        let gateway = if_not_zero().then(to_string()).otherwise(plus1());
        assert_eq!(gateway.signature().to_string(), "float -> union[str, float]");
        assert_eq!(gateway.call(json!(2.5)).unwrap(), json!("2.5"));
        assert_eq!(gateway.call(json!(0.0)).unwrap(), json!(1.0));
    }

    #[test]
    fn test_chained_conditions_else_none() {
        let gateway = if_is_even()
            .then(plus1())
            .else_if(if_below_ten())
            .then(to_string())
            .otherwise_none();

        assert_eq!(
            gateway.signature().to_string(),
            "float -> union[float, str, null]"
        );
        assert_eq!(gateway.step_count(), 2);
        assert_eq!(gateway.call(json!(4.0)).unwrap(), json!(5.0));
        assert_eq!(gateway.call(json!(3.0)).unwrap(), json!("3.0"));
        assert_eq!(gateway.call(json!(11.0)).unwrap(), NodeValue::Null);
    }

    #[tokio::test]
    async fn test_async_arm_makes_gateway_async() {
        let gateway = if_is_even()
            .then(async_plus1())
            .else_if(if_below_ten())
            .then(to_string())
            .otherwise_none();

        assert!(gateway.is_async());
        assert_eq!(
            gateway.signature().to_string(),
            "float -> union[float, str, null]"
        );
        assert!(gateway.call(json!(2.0)).is_err());
        assert_eq!(gateway.call_async(json!(2.0)).await.unwrap(), json!(3.0));
        assert_eq!(gateway.call_async(json!(3.0)).await.unwrap(), json!("3.0"));
        // The declared output admits null, so an unmatched input is not an error.
        assert_eq!(gateway.call_async(json!(11.0)).await.unwrap(), NodeValue::Null);

        let merged = if_is_even().then(plus1()).else_if(if_below_ten()).then(async_plus1()).otherwise_none();
        assert_eq!(merged.signature().to_string(), "float -> union[float, null]");
    }

    #[test]
    fn test_arm_failure_names_the_arm() {
        let failing = transformer("failing", crate::signature!("float -> float"), |_| {
            Err("arm failed".into())
        });
        let gateway = if_not_zero().then(failing).otherwise(minus1());

        let err = gateway.call(json!(1.0)).unwrap_err();
        assert_eq!(err.raiser().label, "failing");
        assert_eq!(err.cause().to_string(), "arm failed");
    }

    #[test]
    fn test_arms_are_boxed_by_condition() {
        let gateway = if_is_even()
            .then(plus1())
            .else_if(if_below_ten())
            .then(to_string())
            .otherwise(minus1());
        let boxes: Vec<Option<&str>> = gateway
            .children()
            .iter()
            .map(|arm| arm.props().bounding_box.as_deref())
            .collect();
        assert_eq!(
            boxes,
            vec![Some("if_is_even"), Some("if_below_ten"), Some(ELSE_LABEL)]
        );

        let square = transformer("square", crate::signature!("float -> float"), |x| {
            Ok(json!(number(&x) * number(&x)))
        });
        let pipeline = (square >> gateway).unwrap();
        assert_eq!(pipeline.call(json!(4.0)).unwrap(), json!(17.0));
        assert_eq!(pipeline.call(json!(3.0)).unwrap(), json!("9.0"));

        let graph = pipeline.graph();
        assert_eq!(graph.vertex_count(), 5);
        assert_eq!(graph.to_dot(false).matches("subgraph").count(), 3);
    }
}
