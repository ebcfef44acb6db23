pub mod adapters;
pub mod body;
pub mod compose;
pub mod error;
pub mod execution;
pub mod graph;
pub mod node;
pub mod types;

/// The dynamic value flowing between nodes.
pub type NodeValue = serde_json::Value;

/// Call contract of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Execution {
    /// Callable directly with [`Node::call`](node::Node::call).
    Sync,
    /// Must be driven with [`Node::call_async`](node::Node::call_async).
    Async,
}

impl Execution {
    /// Combines the contracts of two participants: sync only if both are.
    pub fn and(self, other: Execution) -> Execution {
        match (self, other) {
            (Execution::Sync, Execution::Sync) => Execution::Sync,
            _ => Execution::Async,
        }
    }
}
