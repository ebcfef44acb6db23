use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::Serialize;
use uuid::Uuid;

use crate::core::Execution;
use crate::core::body::{AsyncTransform, Body, Frame, Transform};
use crate::core::error::NodeInfo;
use crate::core::types::{Signature, TypeDesc};

/// Link from a node to whatever feeds it.
#[derive(Clone, Default)]
pub enum Previous {
    #[default]
    None,
    Single(Arc<Node>),
    /// The branches of a diverging composition.
    Tuple(Arc<[Node]>),
}

impl Previous {
    pub fn is_none(&self) -> bool {
        matches!(self, Previous::None)
    }
}

/// How a node is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VertexShape {
    Box,
    Diamond,
}

impl fmt::Display for VertexShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexShape::Box => write!(f, "box"),
            VertexShape::Diamond => write!(f, "diamond"),
        }
    }
}

/// Visualization hints. Never consulted during execution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GraphProps {
    pub shape: VertexShape,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub is_async: bool,
    /// Label of the dotted box grouping this vertex with its siblings.
    pub bounding_box: Option<String>,
}

impl Default for GraphProps {
    fn default() -> Self {
        Self {
            shape: VertexShape::Box,
            width: None,
            height: None,
            is_async: false,
            bounding_box: None,
        }
    }
}

impl GraphProps {
    pub(crate) fn junction() -> Self {
        Self {
            shape: VertexShape::Diamond,
            width: Some(0.5),
            height: Some(0.5),
            ..Self::default()
        }
    }
}

/// Visual category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Role {
    Step,
    /// Result of a diverging composition.
    Converge,
    /// A parallel gateway fanning out to its children.
    Gateway,
}

/// A composable pipeline step.
///
/// Nodes are values: composition never touches its operands, it copies them
/// and links the copies. `id` is the logical identity used for equality;
/// `instance_id` tells apart copies of the same step placed at different
/// positions of a pipeline.
#[derive(Clone)]
pub struct Node {
    pub(crate) id: Uuid,
    pub(crate) instance_id: Uuid,
    pub(crate) label: String,
    pub(crate) role: Role,
    pub(crate) invisible: bool,
    pub(crate) props: GraphProps,
    pub(crate) signature: Signature,
    pub(crate) previous: Previous,
    pub(crate) children: Vec<Node>,
    pub(crate) body: Body,
    pub(crate) execution: Execution,
    pub(crate) len: usize,
}

impl Node {
    /// Creates a synchronous leaf.
    #[track_caller]
    pub fn new<T: Transform>(label: impl Into<String>, signature: Signature, logic: T) -> Self {
        Self::from_body(label, signature, Body::sync(logic))
    }

    /// Creates an asynchronous leaf.
    #[track_caller]
    pub fn new_async<T: AsyncTransform>(
        label: impl Into<String>,
        signature: Signature,
        logic: T,
    ) -> Self {
        Self::from_body(label, signature, Body::from_async(logic))
    }

    /// Creates a leaf around an existing body.
    pub fn from_body(label: impl Into<String>, signature: Signature, body: Body) -> Self {
        let execution = body.execution();
        Node {
            id: Uuid::new_v4(),
            instance_id: Uuid::new_v4(),
            label: label.into(),
            role: Role::Step,
            invisible: false,
            props: GraphProps {
                is_async: execution == Execution::Async,
                ..GraphProps::default()
            },
            signature,
            previous: Previous::None,
            children: Vec::new(),
            body,
            execution,
            len: 1,
        }
    }

    /// Marks the node as a pass-through that the graph builder skips.
    pub fn invisible(mut self) -> Self {
        self.invisible = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_props(mut self, props: GraphProps) -> Self {
        self.props = props;
        self
    }

    pub(crate) fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub(crate) fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Structural copy.
    ///
    /// The predecessor chain is shared with `self`, keeping its instance ids;
    /// linking a copy never writes through to the original (see
    /// [`set_previous`](Self::set_previous)). Children always get fresh
    /// instance ids. `body` replaces what the copy runs while keeping every
    /// piece of graph metadata.
    pub fn copy(&self, body: Option<Body>, regenerate_instance_id: bool) -> Node {
        let mut copied = self.clone();
        if let Some(body) = body {
            copied.execution = body.execution();
            copied.body = body;
        }
        if regenerate_instance_id {
            copied.instance_id = Uuid::new_v4();
        }
        copied.children = self
            .children
            .iter()
            .map(|child| child.copy(None, true))
            .collect();
        copied
    }

    /// Copy placed at a brand new position: this node and everything it is
    /// linked to or built from get fresh instance ids. A position reachable
    /// along several paths (a diverging incident, say) maps to one new id.
    pub(crate) fn relocated(&self) -> Node {
        Relocation::default().node(self)
    }

    /// Links `previous` in front of this node.
    ///
    /// A node's own link is only ever set once: if it is already linked, the
    /// call descends to the start of its chain (into every branch for a
    /// tuple) and links there. Shared links are copied before being written.
    pub fn set_previous(&mut self, previous: impl Into<Arc<Node>>) {
        self.link(previous.into());
    }

    fn link(&mut self, previous: Arc<Node>) {
        match &mut self.previous {
            Previous::Single(prev) => Arc::make_mut(prev).link(previous),
            Previous::Tuple(prevs) => {
                let mut linked = prevs.to_vec();
                for prev in &mut linked {
                    prev.link(Arc::clone(&previous));
                }
                *prevs = linked.into();
            }
            Previous::None => self.previous = Previous::Single(previous),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible
    }

    pub fn props(&self) -> &GraphProps {
        &self.props
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn input_type(&self) -> &TypeDesc {
        &self.signature.input
    }

    pub fn output_type(&self) -> &TypeDesc {
        &self.signature.output
    }

    pub fn previous(&self) -> &Previous {
        &self.previous
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    pub fn is_async(&self) -> bool {
        self.execution == Execution::Async
    }

    /// Number of leaf steps the node was built from.
    pub fn step_count(&self) -> usize {
        self.len
    }

    pub fn frames(&self) -> &[Frame] {
        self.body.frames()
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id,
            instance_id: self.instance_id,
            label: self.label.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// Instance id renewal memoized by position, so shared links stay shared.
#[derive(Default)]
struct Relocation {
    ids: HashMap<Uuid, Uuid>,
    nodes: HashMap<*const Node, Arc<Node>>,
    tuples: HashMap<*const Node, Arc<[Node]>>,
}

impl Relocation {
    fn id(&mut self, old: Uuid) -> Uuid {
        *self.ids.entry(old).or_insert_with(Uuid::new_v4)
    }

    fn node(&mut self, node: &Node) -> Node {
        let previous = match &node.previous {
            Previous::None => Previous::None,
            Previous::Single(prev) => Previous::Single(self.shared(prev)),
            Previous::Tuple(prevs) => Previous::Tuple(self.tuple(prevs)),
        };
        let body = match &node.body {
            Body::Serial { first, second } => Body::Serial {
                first: self.shared(first),
                second: self.shared(second),
            },
            Body::Diverging { incident, branches } => Body::Diverging {
                incident: self.shared(incident),
                branches: self.tuple(branches),
            },
            leaf => leaf.clone(),
        };
        Node {
            id: node.id,
            instance_id: self.id(node.instance_id),
            label: node.label.clone(),
            role: node.role,
            invisible: node.invisible,
            props: node.props.clone(),
            signature: node.signature.clone(),
            previous,
            children: node.children.iter().map(|child| self.node(child)).collect(),
            body,
            execution: node.execution,
            len: node.len,
        }
    }

    fn shared(&mut self, node: &Arc<Node>) -> Arc<Node> {
        let key = Arc::as_ptr(node);
        if let Some(done) = self.nodes.get(&key) {
            return Arc::clone(done);
        }
        let relocated = Arc::new(self.node(node));
        self.nodes.insert(key, Arc::clone(&relocated));
        relocated
    }

    fn tuple(&mut self, nodes: &Arc<[Node]>) -> Arc<[Node]> {
        let key = nodes.as_ptr();
        if let Some(done) = self.tuples.get(&key) {
            return Arc::clone(done);
        }
        let relocated: Arc<[Node]> = nodes.iter().map(|node| self.node(node)).collect();
        self.tuples.insert(key, Arc::clone(&relocated));
        relocated
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> ({}) -> {}",
            self.signature.input, self.label, self.signature.output
        )
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("label", &self.label)
            .field("id", &self.id)
            .field("instance_id", &self.instance_id)
            .field("signature", &self.signature.to_string())
            .field("execution", &self.execution)
            .field("steps", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::BoxError;
    use crate::core::NodeValue;

    fn identity(input: NodeValue) -> Result<NodeValue, BoxError> {
        Ok(input)
    }

    struct Identity;

    impl Transform for Identity {
        fn transform(&self, input: NodeValue) -> Result<NodeValue, BoxError> {
            identity(input)
        }
    }

    fn leaf(label: &str) -> Node {
        Node::new(label, crate::signature!("T -> T"), Identity)
    }

    #[test]
    fn test_node_creation() {
        let node = leaf("step");
        assert_eq!(node.label(), "step");
        assert_eq!(node.role(), Role::Step);
        assert!(node.previous().is_none());
        assert!(node.children().is_empty());
        assert_eq!(node.step_count(), 1);
        assert_eq!(node.execution(), Execution::Sync);
        assert!(!node.props().is_async);
        assert_eq!(node.to_string(), "T -> (step) -> T");
    }

    #[test]
    fn test_copy_keeps_identity() {
        let node = leaf("step");
        let same = node.copy(None, false);
        let fresh = node.copy(None, true);

        assert_eq!(node, fresh);
        assert_eq!(node.id(), fresh.id());
        assert_eq!(node.instance_id(), same.instance_id());
        assert_ne!(node.instance_id(), fresh.instance_id());
    }

    #[test]
    fn test_copy_regenerates_children() {
        let parent = leaf("parent").with_children(vec![leaf("child")]);
        let copied = parent.copy(None, false);
        assert_eq!(copied.children()[0].id(), parent.children()[0].id());
        assert_ne!(
            copied.children()[0].instance_id(),
            parent.children()[0].instance_id()
        );
    }

    #[test]
    fn test_set_previous_descends_to_chain_start() {
        let mut third = leaf("third");
        third.set_previous(leaf("second"));
        third.set_previous(leaf("first"));

        let Previous::Single(second) = third.previous() else {
            panic!("expected a single predecessor");
        };
        assert_eq!(second.label(), "second");
        let Previous::Single(first) = second.previous() else {
            panic!("expected a single predecessor");
        };
        assert_eq!(first.label(), "first");
        assert!(first.previous().is_none());
    }

    #[test]
    fn test_set_previous_on_tuple_links_every_branch() {
        let mut converge = leaf("converge");
        converge.previous = Previous::Tuple(vec![leaf("a"), leaf("b")].into());
        converge.set_previous(leaf("incident"));

        let Previous::Tuple(branches) = converge.previous() else {
            panic!("expected branches");
        };
        for branch in branches.iter() {
            match branch.previous() {
                Previous::Single(prev) => assert_eq!(prev.label(), "incident"),
                _ => panic!("branch was not linked"),
            }
        }
    }

    #[test]
    fn test_relocated_renews_shared_positions_once() {
        let incident: Arc<Node> = Arc::new(leaf("incident"));
        let mut left = leaf("left");
        let mut right = leaf("right");
        left.set_previous(Arc::clone(&incident));
        right.set_previous(Arc::clone(&incident));
        let mut converge = leaf("converge");
        converge.previous = Previous::Tuple(vec![left, right].into());

        let moved = converge.relocated();
        assert_eq!(moved.id(), converge.id());
        assert_ne!(moved.instance_id(), converge.instance_id());

        let Previous::Tuple(branches) = moved.previous() else {
            panic!("expected branches");
        };
        let heads: Vec<Uuid> = branches
            .iter()
            .map(|branch| match branch.previous() {
                Previous::Single(prev) => prev.instance_id(),
                _ => panic!("branch lost its incident"),
            })
            .collect();
        assert_eq!(heads[0], heads[1]);
        assert_ne!(heads[0], incident.instance_id());
    }

    #[test]
    fn test_copy_with_body_override_keeps_metadata() {
        let node = leaf("step").invisible();
        let copied = node.copy(Some(Body::sync(Identity)), false);
        assert!(copied.is_invisible());
        assert_eq!(copied.label(), "step");
        assert_eq!(copied.instance_id(), node.instance_id());
    }
}
