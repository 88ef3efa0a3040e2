use std::fmt;

use crate::node::Node;

/// What went wrong while evaluating a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An operand is of a kind the operation cannot take (e.g. `dot` on a
    /// rank-3 tensor).
    IncompatibleArguments,
    /// Broadcast or dot-product shape mismatch.
    IncompatibleDimensions,
    NumericOverflow,
    UnboundVariable,
    NotImplemented,
    DivideByZero,
    /// A variable was evaluated with no graph in scope.
    MissingGraph,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::IncompatibleArguments => "incompatible argument types",
            ErrorKind::IncompatibleDimensions => "incompatible dimensions",
            ErrorKind::NumericOverflow => "numeric overflow",
            ErrorKind::UnboundVariable => "unbound variable",
            ErrorKind::NotImplemented => "operation not implemented",
            ErrorKind::DivideByZero => "divide by zero",
            ErrorKind::MissingGraph => "missing graph instance",
        };
        f.write_str(text)
    }
}

/// Recoverable evaluation failure, attached to the node that raised it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Graph `{graph}` runtime error ({kind}) at {}: {message}", .node.label())]
pub struct GraphError {
    pub kind: ErrorKind,
    /// The node whose evaluation failed.
    pub node: Node,
    /// Name of the graph in scope, or `<detached>` for free expressions.
    pub graph: String,
    pub message: String,
}

impl GraphError {
    pub fn new(
        kind: ErrorKind,
        node: &Node,
        graph: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GraphError {
            kind,
            node: node.clone(),
            graph: graph.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
