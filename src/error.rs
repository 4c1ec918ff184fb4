//! Failure kinds of the restructuring pipeline.
//!
//! There are no recoverable conditions at this layer: callers either receive
//! a valid tree or no tree. Every variant refers to the vertex or AST node
//! that made the pass abort.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StructureError>;

#[derive(Debug, Error)]
pub enum StructureError {
    /// The input CFG has no entry, or an edge refers to a missing vertex.
    #[error("malformed input CFG: {reason}")]
    MalformedInput { reason: String },

    /// Inflation exceeded its sanity bound without reaching a fixed point.
    #[error("inflation exceeded {bound} clones while processing vertex `{vertex}`")]
    InflationDiverged { vertex: String, bound: usize },

    /// A pass would have produced a tree that breaks a structural invariant.
    #[error("invariant violation at `{node}`: {reason}")]
    InvariantViolation { node: String, reason: String },

    /// A dispatch saw a vertex or node kind it does not handle.
    #[error("unexpected node kind at `{node}`: {reason}")]
    UnexpectedNode { node: String, reason: String },
}

impl StructureError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        StructureError::MalformedInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(node: impl Into<String>, reason: impl Into<String>) -> Self {
        StructureError::InvariantViolation {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unexpected(node: impl Into<String>, reason: impl Into<String>) -> Self {
        StructureError::UnexpectedNode {
            node: node.into(),
            reason: reason.into(),
        }
    }
}
