//! # bolt
//!
//! Expression graphs over strided tensors, evaluated by a session and
//! differentiated by synthesizing derivative expressions.
//!
//! ## Usage
//!
//! ```rust
//! use bolt::prelude::*;
//!
//! let x = Node::variable("x");
//! let y = x.mul(&x);
//! let graph = Graph::new("square", &y);
//! let value = Node::scalar(3.0);
//!
//! let session = Session::default();
//! session.run(&graph, &[(value.clone(), "x")]).unwrap();
//! session.backward(&graph).unwrap();
//! assert_eq!(value.grad().unwrap().to_vec(), vec![6.0]);
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `bolt-core` | Shape, Layout, Tensor and views, kernels, BLAS trait |
//! | `bolt` | Node, Graph, Session, autograd, failure policy |
//!
//! ## Modules
//!
//! - [`node`] - node handles and their result/gradient slots
//! - [`graph`] - variable bindings and the node registry
//! - [`session`] - the memoizing evaluator
//! - [`autograd`] - `Session::backward`
//! - [`failure`] - fatal error reporting

pub mod autograd;
pub mod config;
pub mod error;
pub mod failure;
pub mod graph;
pub mod node;
pub mod session;

/// Re-export core types.
pub use bolt_core::{
    AxisOp, BinaryOp, Blas, FaerBlas, Layout, ReferenceBlas, Shape, Tensor, TensorAccess,
    TensorView, TensorViewMut, UnaryOp,
};

pub use config::SessionConfig;
pub use error::{ErrorKind, GraphError, Result};
pub use failure::{ExitPolicy, Failure, FailurePolicy, PanicPolicy};
pub use graph::Graph;
pub use node::{Node, NodeId, NodeKind};
pub use session::Session;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::{
        ErrorKind, ExitPolicy, FailurePolicy, Graph, GraphError, Node, PanicPolicy, Session,
        SessionConfig,
    };
    pub use bolt_core::{Shape, Tensor, TensorAccess};
}
