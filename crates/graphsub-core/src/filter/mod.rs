//! Declarative per-subscriber event filtering.
//!
//! - [`tree`]: the filter tree shape (leaves, `AND`/`OR`/`NOT`, field paths).
//! - [`eval`]: pure evaluation against a canonical event, plus up-front
//!   validation against declared schema kinds.

mod eval;
mod tree;

pub use eval::{evaluate, validate, FilterTypeError};
pub use tree::{
    EndpointSide,
    FieldPath,
    FilterLeaf,
    FilterNode,
    FilterOp,
    RelationshipLifecycle,
};
