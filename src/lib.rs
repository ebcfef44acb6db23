//! # Pipeforge
//!
//! A composable transformer pipeline engine: small unary steps combined with a
//! single composition operator into bigger pipelines, with declared types
//! carried along and a graph of the result available on demand.
//!
//! ## Features
//!
//! - **One Operator**: `a >> b` chains steps, `a >> [b, c]` fans one output out to several steps
//! - **Typed Signatures**: every node declares `input -> output`; generic variables are resolved at composition time
//! - **Sync & Async Unified**: a composite is sync only if all of its steps are, otherwise it is awaited
//! - **Single-Wrap Errors**: a failing step surfaces exactly one [`ExecutionError`] naming the step and its location
//! - **Graph Export**: any pipeline renders to a Graphviz DOT graph
//!
//! ## Quick Start
//!
//! ```rust
//! use pipeforge::prelude::*;
//! use serde_json::json;
//!
//! let square = transformer("square", signature!("float -> float"), |x| {
//!     let x = x.as_f64().unwrap_or_default();
//!     Ok(json!(x * x))
//! });
//! let half = transformer("half", signature!("float -> float"), |x| {
//!     Ok(json!(x.as_f64().unwrap_or_default() / 2.0))
//! });
//!
//! let pipeline = (square >> half).unwrap();
//! assert_eq!(pipeline.call(json!(4.0)).unwrap(), json!(8.0));
//! println!("{}", pipeline.graph().to_dot(true));
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: type descriptors, matching and substitution
//! - [`node`]: the node model
//! - [`compose`]: serial and diverging composition
//! - [`graph`]: the visualization graph and DOT rendering
//! - [`adapters`]: functions, checks, collection mapping and the parallel and conditional gateways as nodes
//! - [`prelude`]: commonly used items (import with `use pipeforge::prelude::*`)

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

pub use crate::core::{adapters, body, compose, error, execution, graph, node, types};

// Core types
pub use crate::core::{Execution, NodeValue};
pub use crate::core::body::{AsyncTransform, Body, ENTRY_POINT, Frame, Transform};
pub use crate::core::error::{
    BoxError, ComposeError, ExecutionError, MissingResult, NodeInfo, NotAnArray, RequiresAwait,
    TypeParseError,
};
pub use crate::core::execution::location_hint;
pub use crate::core::node::{GraphProps, Node, Previous, Role, VertexShape};
pub use crate::core::types::{BindingMap, Signature, TypeDesc, match_types, substitute};

// Composition
pub use crate::core::compose::{
    Branches, ComposeOptions, Next, compose, compose_diverging, compose_serial, compose_with,
};

// Graph
pub use crate::core::graph::{Edge, PipelineGraph, Vertex};

// Adapters
pub use crate::core::adapters::{
    AsyncFnTransform, Conditional, ElseIf, Ensure, FnTransform, If, PartialAsyncTransformer,
    PartialTransformer, async_transformer, condition, forget, forward, forward_incoming, forward_of, map_over, parallel,
    partial_async_transformer, partial_transformer, transformer,
};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// The main prelude: everything needed to build, run and draw pipelines.
///
/// # Example
/// ```rust
/// use pipeforge::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Adapters
        async_transformer,
        condition,
        forget,
        forward,
        forward_incoming,
        map_over,
        parallel,
        partial_async_transformer,
        partial_transformer,
        signature,
        transformer,
        AsyncTransform,
        BoxError,
        Branches,
        ComposeError,
        ComposeOptions,
        Ensure,
        ExecutionError,
        If,
        Node,
        NodeValue,
        PipelineGraph,
        Signature,
        Transform,
        TypeDesc,
    };
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
