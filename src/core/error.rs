use std::error::Error;

use thiserror::Error;
use uuid::Uuid;

use crate::core::types::{Signature, TypeDesc};

/// Error type produced by transformer bodies.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors raised while building a pipeline.
///
/// These are never caught by the engine: a composition either yields a new
/// node or fails immediately.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComposeError {
    /// The right-hand side of a composition is not a node or a non-empty tuple of nodes.
    #[error("unsupported operand for composition: {0}")]
    UnsupportedOperand(String),

    /// Only raised by strict resolution.
    #[error("type {generic} does not match {specific}: {reason}")]
    TypeMismatch {
        generic: TypeDesc,
        specific: TypeDesc,
        reason: String,
    },
}

/// Failure to parse a type descriptor or signature shorthand.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("unexpected end of input in `{0}`")]
    UnexpectedEnd(String),

    #[error("unexpected character `{found}` at position {position} in `{input}`")]
    UnexpectedChar {
        input: String,
        position: usize,
        found: char,
    },

    #[error("signature must contain exactly one `->`: `{0}`")]
    MissingArrow(String),
}

/// Identity snapshot of the node that raised an [`ExecutionError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub label: String,
    pub signature: Signature,
}

/// A runtime failure inside a node body, carrying the original cause, the
/// raising node and a one-line location hint.
///
/// A pipeline call surfaces at most one of these: composites propagate the
/// error raised by their innermost failing step unchanged.
#[derive(Debug, Error)]
#[error("{hint}")]
pub struct ExecutionError {
    raiser: NodeInfo,
    hint: String,
    #[source]
    source: BoxError,
}

impl ExecutionError {
    pub(crate) fn new(raiser: NodeInfo, hint: String, source: BoxError) -> Self {
        Self {
            raiser,
            hint,
            source,
        }
    }

    /// The node whose body failed.
    pub fn raiser(&self) -> &NodeInfo {
        &self.raiser
    }

    pub fn location_hint(&self) -> &str {
        &self.hint
    }

    /// The error returned by the failing body.
    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Returns the cause if it is of type `E`.
    pub fn cause_as<E: Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    pub fn into_cause(self) -> BoxError {
        self.source
    }
}

/// An async node was called through the synchronous entry point.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transformer \"{label}\" is async and must be awaited with `call_async`")]
pub struct RequiresAwait {
    pub label: String,
}

/// An async body resolved to `null`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transformer \"{label}\" did not return a valid result")]
pub struct MissingResult {
    pub label: String,
}

/// A collection step received something other than an array.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("expected an array input, got {found}")]
pub struct NotAnArray {
    pub found: String,
}
