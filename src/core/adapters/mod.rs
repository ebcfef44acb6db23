//! Thin wrappers turning functions, checks, conditions and node lists into nodes.

pub mod batch;
pub mod conditional;
pub mod ensurer;
pub mod functional;
pub mod parallel;

pub use batch::map_over;
pub use conditional::{Conditional, ElseIf, If, condition};
pub use ensurer::Ensure;
pub use functional::{
    AsyncFnTransform, FnTransform, PartialAsyncTransformer, PartialTransformer, async_transformer,
    forget, forward, forward_incoming, forward_of, partial_async_transformer, partial_transformer,
    transformer,
};
pub use parallel::parallel;
