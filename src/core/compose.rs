//! The composition engine.
//!
//! Composition is the only way to build bigger nodes out of smaller ones.
//! Both operands are copied first, so the nodes handed in stay reusable; the
//! copies are linked together and wrapped in a new composite node whose
//! signature is recomputed by the type resolver.
//!
//! ```text
//! a >> b          serial: b(a(x))
//! a >> [b, c]     diverging: (b(a(x)), c(a(x)))
//! ```

use std::mem;
use std::ops::Shr;
use std::sync::Arc;

use uuid::Uuid;

use crate::core::body::Body;
use crate::core::error::ComposeError;
use crate::core::node::{GraphProps, Node, Previous, Role};
use crate::core::types::{BindingMap, Signature, TypeDesc, match_types, substitute};

/// Options for type resolution during composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    /// Report disagreeing type shapes as [`ComposeError::TypeMismatch`]
    /// instead of ignoring them.
    pub strict: bool,
}

impl ComposeOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Right-hand side of a composition.
#[derive(Debug, Clone)]
pub enum Next {
    Node(Node),
    Branches(Vec<Node>),
}

/// A fixed list of nodes receiving the same input.
#[derive(Debug, Clone)]
pub struct Branches(pub Vec<Node>);

impl From<Vec<Node>> for Branches {
    fn from(nodes: Vec<Node>) -> Self {
        Branches(nodes)
    }
}

impl<const N: usize> From<[Node; N]> for Branches {
    fn from(nodes: [Node; N]) -> Self {
        Branches(nodes.into())
    }
}

impl From<Node> for Next {
    fn from(node: Node) -> Self {
        Next::Node(node)
    }
}

impl From<&Node> for Next {
    fn from(node: &Node) -> Self {
        Next::Node(node.clone())
    }
}

impl From<Branches> for Next {
    fn from(branches: Branches) -> Self {
        Next::Branches(branches.0)
    }
}

impl From<Vec<Node>> for Next {
    fn from(nodes: Vec<Node>) -> Self {
        Next::Branches(nodes)
    }
}

impl<const N: usize> From<[Node; N]> for Next {
    fn from(nodes: [Node; N]) -> Self {
        Next::Branches(nodes.into())
    }
}

/// Composes `current` with `next` using permissive type resolution.
pub fn compose(current: &Node, next: impl Into<Next>) -> Result<Node, ComposeError> {
    compose_with(current, next, &ComposeOptions::default())
}

pub fn compose_with(
    current: &Node,
    next: impl Into<Next>,
    options: &ComposeOptions,
) -> Result<Node, ComposeError> {
    match next.into() {
        Next::Node(next) => compose_serial(current, &next, options),
        Next::Branches(branches) => compose_diverging(current, &branches, options),
    }
}

/// Union of the bindings found in both matching directions; the second wins.
fn connection_bindings(
    produced: &TypeDesc,
    consumed: &TypeDesc,
    strict: bool,
) -> Result<BindingMap, ComposeError> {
    let mut bindings = match_types(consumed, produced, strict)?;
    bindings.extend(match_types(produced, consumed, strict)?);
    Ok(bindings)
}

/// Copies the producer of a composition. Unlinked nodes get a fresh instance
/// id so repeated uses draw as distinct vertices; a linked producer keeps the
/// positions it already has.
fn place(node: &Node) -> Node {
    node.copy(None, node.previous().is_none())
}

/// Builds `b(a(x))`.
pub fn compose_serial(a: &Node, b: &Node, options: &ComposeOptions) -> Result<Node, ComposeError> {
    let mut first = place(a);
    let mut second = b.relocated();

    let bindings = connection_bindings(first.output_type(), second.input_type(), options.strict)?;
    first.signature.output = substitute(first.output_type(), &bindings);
    let signature = Signature::new(
        substitute(first.input_type(), &bindings),
        substitute(second.output_type(), &bindings),
    );
    log::debug!(
        "Composing \"{}\" >> \"{}\" as {signature} with bindings {bindings:?}",
        first.label(),
        second.label()
    );

    let execution = first.execution().and(second.execution());
    let len = first.step_count() + second.step_count();
    let first = Arc::new(first);
    second.set_previous(Arc::clone(&first));
    let previous = mem::take(&mut second.previous);

    Ok(Node {
        id: Uuid::new_v4(),
        instance_id: Uuid::new_v4(),
        label: second.label.clone(),
        role: second.role,
        invisible: second.invisible,
        props: second.props.clone(),
        signature,
        previous,
        children: second.children.clone(),
        body: Body::Serial {
            first,
            second: Arc::new(second),
        },
        execution,
        len,
    })
}

/// Builds `(b1(a(x)), .., bn(a(x)))`.
pub fn compose_diverging(
    incident: &Node,
    branches: &[Node],
    options: &ComposeOptions,
) -> Result<Node, ComposeError> {
    if branches.is_empty() {
        return Err(ComposeError::UnsupportedOperand(format!(
            "\"{}\" cannot diverge into an empty list of branches",
            incident.label()
        )));
    }

    let incident = Arc::new(place(incident));
    let mut outputs = Vec::with_capacity(branches.len());
    let mut linked = Vec::with_capacity(branches.len());
    for branch in branches {
        let mut branch = branch.relocated();
        let bindings = match_types(branch.input_type(), incident.output_type(), options.strict)?;
        branch.signature.output = substitute(branch.output_type(), &bindings);
        outputs.push(branch.output_type().clone());
        branch.set_previous(Arc::clone(&incident));
        linked.push(branch);
    }

    let signature = Signature::new(incident.input_type().clone(), TypeDesc::tuple(outputs));
    log::debug!(
        "Composing \"{}\" >> {} branches as {signature}",
        incident.label(),
        linked.len()
    );

    let execution = linked
        .iter()
        .fold(incident.execution(), |acc, branch| acc.and(branch.execution()));
    let len = linked.iter().map(Node::step_count).sum::<usize>() + incident.step_count();
    let branches: Arc<[Node]> = linked.into();

    Ok(Node {
        id: Uuid::new_v4(),
        instance_id: Uuid::new_v4(),
        label: String::new(),
        role: Role::Converge,
        invisible: false,
        props: GraphProps::junction(),
        signature,
        previous: Previous::Tuple(Arc::clone(&branches)),
        children: Vec::new(),
        body: Body::Diverging { incident, branches },
        execution,
        len,
    })
}

impl Node {
    /// `self >> next`.
    pub fn then(&self, next: impl Into<Next>) -> Result<Node, ComposeError> {
        compose(self, next)
    }

    pub fn then_with(
        &self,
        next: impl Into<Next>,
        options: &ComposeOptions,
    ) -> Result<Node, ComposeError> {
        compose_with(self, next, options)
    }
}

impl<N: Into<Next>> Shr<N> for Node {
    type Output = Result<Node, ComposeError>;

    fn shr(self, next: N) -> Self::Output {
        compose(&self, next)
    }
}

impl<N: Into<Next>> Shr<N> for &Node {
    type Output = Result<Node, ComposeError>;

    fn shr(self, next: N) -> Self::Output {
        compose(self, next)
    }
}

impl Shr<Node> for Result<Node, ComposeError> {
    type Output = Result<Node, ComposeError>;

    fn shr(self, next: Node) -> Self::Output {
        self.and_then(|current| compose(&current, next))
    }
}

impl Shr<Branches> for Result<Node, ComposeError> {
    type Output = Result<Node, ComposeError>;

    fn shr(self, next: Branches) -> Self::Output {
        self.and_then(|current| compose(&current, next))
    }
}
