//! Error types
//!
//! Structural misuse of the candidate graph, the volumes or the solvers is reported synchronously as [`UsageError`].
//! Non-optimal backend results are not errors: they are logged and the solver continues with the values it got.
//!

use crate::util::*;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UsageError {
    #[error("node {0} does not exist or has been erased")]
    ErasedNode(NodeIndex),
    #[error("adjacency edge {0} does not exist or has been erased")]
    ErasedEdge(EdgeIndex),
    #[error("subset arc {0} does not exist or has been erased")]
    ErasedArc(ArcIndex),
    #[error("node {0} cannot be a subset of itself")]
    SelfLoop(NodeIndex),
    #[error("adding subset arc {child} -> {parent} would create a cycle in the subset graph")]
    SubsetCycle { child: NodeIndex, parent: NodeIndex },
    #[error("node {0} is not a leaf node")]
    NotALeafNode(NodeIndex),
    #[error("adjacency edge {0} is not a leaf edge")]
    NotALeafEdge(EdgeIndex),
    #[error("node {0} is a leaf node but has no volume assigned")]
    MissingLeafVolume(NodeIndex),
    #[error("volumes of node {node} have different resolutions: {expected:?} vs {found:?}")]
    ResolutionMismatch {
        node: NodeIndex,
        expected: [f64; 3],
        found: [f64; 3],
    },
    #[error("node {node} has type {node_type:?}, which this operation does not support")]
    IncompatibleNodeType { node: NodeIndex, node_type: NodeType },
    #[error("adjacency edge {edge} has type {edge_type:?}, which this operation does not support")]
    IncompatibleEdgeType { edge: EdgeIndex, edge_type: EdgeType },
    #[error("slice node {node} has no link edge in direction {direction:+}")]
    NoDirectionalLink { node: NodeIndex, direction: i32 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type CragResult<T> = Result<T, UsageError>;
