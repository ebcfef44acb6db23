//! Materializes a pipeline into a directed graph for visualization.
//!
//! Every visible node becomes one vertex keyed by its `instance_id`. Edges run
//! from producer to consumer and carry the producer's output type. Invisible
//! nodes are skipped while keeping connectivity, and the children of a node
//! are drawn as one subgraph each, hanging off the node and rejoining its
//! downstream vertex.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
#[cfg(feature = "serde")]
use serde::Serialize;
use uuid::Uuid;

use crate::core::node::{GraphProps, Node, Previous};

/// A drawn node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Vertex {
    pub instance_id: Uuid,
    pub label: String,
    pub props: GraphProps,
    /// Instance id of the node whose children subgraph this vertex belongs to.
    pub parent_id: Option<Uuid>,
}

impl Vertex {
    fn of(node: &Node, parent_id: Option<Uuid>) -> Self {
        Self {
            instance_id: node.instance_id(),
            label: node.label().to_string(),
            props: node.props().clone(),
            parent_id,
        }
    }
}

/// A producer to consumer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Edge {
    /// Type flowing along the edge, when known.
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PipelineGraph {
    graph: DiGraph<Vertex, Edge>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<Uuid, NodeIndex>,
    /// Vertices with at least one incoming edge.
    #[cfg_attr(feature = "serde", serde(skip))]
    targets: HashSet<NodeIndex>,
}

impl Node {
    /// Builds the visualization graph of this node and everything feeding it.
    pub fn graph(&self) -> PipelineGraph {
        let mut graph = PipelineGraph::default();
        graph.walk(self, None, None);
        graph
    }
}

impl PipelineGraph {
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.graph.node_weights()
    }

    pub fn vertex(&self, instance_id: Uuid) -> Option<&Vertex> {
        self.index.get(&instance_id).map(|&ix| &self.graph[ix])
    }

    /// First vertex carrying `label`.
    pub fn find(&self, label: &str) -> Option<&Vertex> {
        self.vertices().find(|vertex| vertex.label == label)
    }

    /// `(source, target, edge)` triples.
    pub fn edges(&self) -> impl Iterator<Item = (&Vertex, &Vertex, &Edge)> {
        self.graph
            .edge_references()
            .map(|edge| (&self.graph[edge.source()], &self.graph[edge.target()], edge.weight()))
    }

    /// Edge between two vertices, if any.
    pub fn edge(&self, from: Uuid, to: Uuid) -> Option<&Edge> {
        let (from, to) = (self.index.get(&from)?, self.index.get(&to)?);
        self.graph
            .find_edge(*from, *to)
            .map(|edge| &self.graph[edge])
    }

    pub fn inner(&self) -> &DiGraph<Vertex, Edge> {
        &self.graph
    }

    /// Graphviz rendering.
    pub fn to_dot(&self, with_edge_labels: bool) -> String {
        Dot {
            graph: self,
            with_edge_labels,
        }
        .to_string()
    }

    fn upsert_vertex(&mut self, vertex: Vertex) -> NodeIndex {
        match self.index.get(&vertex.instance_id) {
            Some(&ix) => {
                let existing = &mut self.graph[ix];
                existing.label = vertex.label;
                existing.props = vertex.props;
                if vertex.parent_id.is_some() {
                    existing.parent_id = vertex.parent_id;
                }
                ix
            }
            None => {
                let instance_id = vertex.instance_id;
                let ix = self.graph.add_node(vertex);
                self.index.insert(instance_id, ix);
                ix
            }
        }
    }

    fn upsert(&mut self, node: &Node, parent_id: Option<Uuid>) -> NodeIndex {
        self.upsert_vertex(Vertex::of(node, parent_id))
    }

    fn connect(&mut self, from: NodeIndex, to: NodeIndex, label: Option<String>) {
        self.graph.update_edge(from, to, Edge { label });
        self.targets.insert(to);
    }

    /// True if `node` is already the target of an edge, meaning its own
    /// predecessors have been walked.
    fn was_walked(&self, node: &Node) -> bool {
        self.index
            .get(&node.instance_id())
            .is_some_and(|ix| self.targets.contains(ix))
    }

    /// The vertex that predecessors of `node` attach to: `node` itself, or
    /// its downstream vertex when `node` is invisible.
    fn attach_point<'n>(
        &mut self,
        node: &'n Node,
        downstream: Option<&'n Node>,
        parent_id: Option<Uuid>,
    ) -> (NodeIndex, &'n Node) {
        match downstream {
            Some(next) if node.is_invisible() => (self.upsert(next, None), next),
            _ => (self.upsert(node, parent_id), node),
        }
    }

    fn walk(&mut self, node: &Node, downstream: Option<&Node>, parent_id: Option<Uuid>) {
        match node.previous() {
            Previous::None => {
                self.upsert(node, parent_id);
            }
            Previous::Single(prev) => {
                let (target, next) = self.attach_point(node, downstream, parent_id);
                if prev.children().is_empty() && (!prev.is_invisible() || prev.previous().is_none())
                {
                    let source = self.upsert(prev, None);
                    self.connect(source, target, Some(prev.output_type().to_string()));
                }
                if !self.was_walked(prev) {
                    self.walk(prev, Some(next), parent_id);
                }
            }
            Previous::Tuple(prevs) => {
                let (target, next) = self.attach_point(node, downstream, parent_id);
                for prev in prevs.iter() {
                    if !prev.is_invisible() && prev.children().is_empty() {
                        let source = self.upsert(prev, None);
                        self.connect(source, target, Some(prev.output_type().to_string()));
                    }
                    if !self.was_walked(prev) {
                        self.walk(prev, Some(next), parent_id);
                    }
                }
            }
        }

        if !node.children().is_empty() {
            self.add_children(node, downstream);
        }
    }

    /// Draws each child of `node` as its own subgraph, grouped under the
    /// node's instance id.
    fn add_children(&mut self, node: &Node, downstream: Option<&Node>) {
        let visible_previous = visible_previous(node);

        for child in node.children() {
            let mut sub = PipelineGraph::default();
            sub.walk(child, downstream, Some(node.instance_id()));
            let (Some(root), Some(last)) = (sub.boundary(Direction::Incoming), sub.boundary(Direction::Outgoing))
            else {
                continue;
            };
            let last_id = sub.graph[last].instance_id;
            let root_id = sub.graph[root].instance_id;
            self.absorb(sub);

            let (Some(&root), Some(&last)) = (self.index.get(&root_id), self.index.get(&last_id)) else {
                continue;
            };

            if node.is_invisible() {
                for prev in &visible_previous {
                    let source = self.upsert(prev, None);
                    self.connect(source, root, Some(prev.output_type().to_string()));
                }
            } else {
                let source = self.upsert(node, None);
                self.connect(source, root, None);
            }

            if let Some(next) = downstream.filter(|next| next.instance_id() != last_id) {
                let target = self.upsert(next, None);
                self.connect(last, target, Some(next.input_type().to_string()));
            }
        }
    }

    /// First vertex, in insertion order, with no edge in `direction`.
    fn boundary(&self, direction: Direction) -> Option<NodeIndex> {
        self.graph.node_indices().find(|&ix| {
            self.graph
                .neighbors_directed(ix, direction)
                .next()
                .is_none()
        })
    }

    fn absorb(&mut self, other: PipelineGraph) {
        let (vertices, edges) = other.graph.into_nodes_edges();
        let mut mapping = Vec::with_capacity(vertices.len());
        for vertex in vertices {
            mapping.push(self.upsert_vertex(vertex.weight));
        }
        for edge in edges {
            let (source, target) = (mapping[edge.source().index()], mapping[edge.target().index()]);
            self.connect(source, target, edge.weight.label);
        }
    }
}

/// Nearest visible nodes feeding `node`. An invisible chain start counts as
/// visible since it is the only thing left to draw.
fn visible_previous(node: &Node) -> Vec<&Node> {
    match node.previous() {
        Previous::None => Vec::new(),
        Previous::Tuple(prevs) => prevs.iter().collect(),
        Previous::Single(prev) if !prev.is_invisible() => vec![&**prev],
        Previous::Single(prev) => match prev.previous() {
            Previous::None => vec![&**prev],
            Previous::Tuple(prevs) => prevs.iter().collect(),
            Previous::Single(_) => visible_previous(prev),
        },
    }
}

struct Dot<'a> {
    graph: &'a PipelineGraph,
    with_edge_labels: bool,
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = &self.graph.graph;
        writeln!(f, "digraph {{")?;
        writeln!(f, "    splines=ortho;")?;

        for vertex in graph.node_weights() {
            let props = &vertex.props;
            write!(
                f,
                "    {} [label={}, shape={}",
                quote(&vertex.instance_id.to_string()),
                quote(&vertex.label),
                props.shape
            )?;
            if let Some(width) = props.width {
                write!(f, ", width={width}")?;
            }
            if let Some(height) = props.height {
                write!(f, ", height={height}")?;
            }
            if props.is_async {
                write!(f, ", isAsync=true")?;
            }
            writeln!(f, "];")?;
        }

        for edge in graph.edge_references() {
            write!(
                f,
                "    {} -> {}",
                quote(&graph[edge.source()].instance_id.to_string()),
                quote(&graph[edge.target()].instance_id.to_string())
            )?;
            match &edge.weight().label {
                Some(label) if self.with_edge_labels => writeln!(f, " [label={}];", quote(label))?,
                _ => writeln!(f, ";")?,
            }
        }

        // Boxed vertices grouped by owning node and box label, first-seen order.
        let mut clusters: Vec<(Uuid, &str, Vec<Uuid>)> = Vec::new();
        for vertex in graph.node_weights() {
            let (Some(parent_id), Some(box_label)) = (vertex.parent_id, vertex.props.bounding_box.as_deref())
            else {
                continue;
            };
            match clusters
                .iter_mut()
                .find(|(id, label, _)| *id == parent_id && *label == box_label)
            {
                Some((_, _, members)) => members.push(vertex.instance_id),
                None => clusters.push((parent_id, box_label, vec![vertex.instance_id])),
            }
        }
        let mut ordinals: HashMap<Uuid, usize> = HashMap::new();
        for (parent_id, box_label, members) in clusters {
            let ordinal = ordinals.entry(parent_id).or_default();
            writeln!(f, "    subgraph {} {{", quote(&format!("cluster_{parent_id}_{ordinal}")))?;
            *ordinal += 1;
            writeln!(f, "        label={};", quote(box_label))?;
            writeln!(f, "        style=dotted;")?;
            for member in members {
                writeln!(f, "        {};", quote(&member.to_string()))?;
            }
            writeln!(f, "    }}")?;
        }

        writeln!(f, "}}")
    }
}
