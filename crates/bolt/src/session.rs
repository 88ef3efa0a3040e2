// Session - evaluates expression graphs
//
// A run walks the graph from its root, depth first:
//
//   Variable    look the name up in the graph in scope and evaluate the
//               bound node (unbound names are an UnboundVariable error,
//               no graph at all is MissingGraph)
//   Constant    its tensor
//   Graph       re-bind the parameters, evaluate the inner root with the
//               inner graph in scope, in a pass of its own
//   operations  evaluate operands, then call the kernel
//
// Each run gets a fresh pass id. The first time a node is reached in a pass
// its value is stored on the node (result slot) together with a zeroed
// gradient slot; any later visit in the same pass returns the stored value.
// A nested graph is a function: every Graph node evaluates its inner graph
// under a new pass id, so two Graph nodes sharing one inner graph with
// different parameters never see each other's values.
// The autograd engine reads those stored values, so a graph is never
// recomputed between evaluation and differentiation.
//
// Kernel shape mismatches come back as GraphError. Other kernel failures
// are precondition violations and go to the failure policy.

use std::sync::atomic::{AtomicU64, Ordering};

use bolt_core::kernels;
use bolt_core::{Blas, BinaryOp, Error as CoreError, FaerBlas, Tensor, TensorAccess};

use crate::config::SessionConfig;
use crate::error::{ErrorKind, GraphError, Result};
use crate::failure::{Failure, FailurePolicy, PanicPolicy};
use crate::graph::Graph;
use crate::node::{Node, NodeKind};

const DETACHED: &str = "<detached>";

pub(crate) fn next_pass() -> u64 {
    // starts at 1: pass 0 marks a node that was never evaluated
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Marks a node as being evaluated until dropped, so the mark is cleared
/// even when a failure policy unwinds out of the evaluation.
struct InFlight<'a>(&'a Node);

impl<'a> InFlight<'a> {
    fn enter(node: &'a Node) -> Self {
        node.set_in_flight(true);
        InFlight(node)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set_in_flight(false);
    }
}

/// Evaluates graphs and differentiates them.
pub struct Session {
    config: SessionConfig,
    blas: Box<dyn Blas>,
    policy: Box<dyn FailurePolicy>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    /// A session using faer for `dot` and panicking on fatal failures.
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            blas: Box::new(FaerBlas),
            policy: Box::new(PanicPolicy),
        }
    }

    /// Replace the gemm implementation used by `dot`.
    pub fn with_blas(mut self, blas: impl Blas + 'static) -> Self {
        self.blas = Box::new(blas);
        self
    }

    /// Replace the strategy that reports fatal failures.
    pub fn with_policy(mut self, policy: impl FailurePolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bind `params` into `graph`, then evaluate its root.
    pub fn run(&self, graph: &Graph, params: &[(Node, &str)]) -> Result<Tensor> {
        for (node, name) in params {
            graph.bind(*name, node);
        }
        let pass = next_pass();
        tracing::debug!(
            graph = graph.name(),
            nodes = graph.nodes().len(),
            device = %self.config.device,
            pass,
            "run session"
        );
        self.eval(graph.root(), Some(graph), pass)
    }

    /// Evaluate a free-standing expression. Variables inside it have no
    /// graph to resolve against and fail with `MissingGraph`.
    pub fn run_node(&self, node: &Node) -> Result<Tensor> {
        self.eval(node, None, next_pass())
    }

    /// Report a fatal failure through the installed policy.
    pub(crate) fn fail(
        &self,
        condition: &'static str,
        operation: &'static str,
        detail: impl Into<String>,
    ) -> ! {
        self.policy.fail(Failure {
            condition,
            operation,
            detail: detail.into(),
        })
    }

    pub(crate) fn eval(&self, node: &Node, scope: Option<&Graph>, pass: u64) -> Result<Tensor> {
        if node.pass() == pass {
            if let Some(value) = node.result() {
                return Ok(value);
            }
        }
        if node.in_flight() {
            self.fail(
                "no cycle through bindings",
                "eval",
                format!("{} depends on itself", node.label()),
            );
        }

        let computed = {
            let _guard = InFlight::enter(node);
            self.compute(node, scope, pass)
        };
        let value = computed?;

        tracing::trace!(node = %node.id(), op = %node.label(), shape = %value.shape(), "evaluated");
        node.store_result(value.clone(), pass);
        Ok(value)
    }

    fn compute(&self, node: &Node, scope: Option<&Graph>, pass: u64) -> Result<Tensor> {
        match node.kind() {
            NodeKind::Variable { name } => {
                let Some(graph) = scope else {
                    return Err(GraphError::new(
                        ErrorKind::MissingGraph,
                        node,
                        DETACHED,
                        format!("variable `{name}` evaluated without a graph instance"),
                    ));
                };
                match graph.var(name) {
                    Some(bound) => self.eval(&bound, Some(graph), pass),
                    None => Err(GraphError::new(
                        ErrorKind::UnboundVariable,
                        node,
                        graph.name(),
                        format!(
                            "Graph `{}` runtime error, variable `{}` does not exist",
                            graph.name(),
                            name
                        ),
                    )),
                }
            }
            NodeKind::Constant { value } => Ok(value.clone()),
            NodeKind::Graph { graph, params } => {
                for (param, name) in params {
                    graph.bind(name.as_str(), param);
                }
                self.eval(graph.root(), Some(graph), next_pass())
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs, scope, pass)?;
                let r = self.eval(rhs, scope, pass)?;
                if self.config.check_numerics
                    && *op == BinaryOp::Div
                    && r.to_vec().contains(&0.0)
                {
                    return Err(self.error(
                        ErrorKind::DivideByZero,
                        node,
                        scope,
                        format!("divisor {} holds a zero", r.shape()),
                    ));
                }
                let out = kernels::binary(*op, &l, &r, self.blas.as_ref())
                    .map_err(|e| self.classify(e, node, scope, "binary"))?;
                self.check_finite(out, node, scope)
            }
            NodeKind::Unary { op, input } => {
                let x = self.eval(input, scope, pass)?;
                self.check_finite(kernels::unary(*op, &x), node, scope)
            }
            NodeKind::Axis { op, input, axis } => {
                let x = self.eval(input, scope, pass)?;
                let out = kernels::axis(*op, &x, *axis)
                    .map_err(|e| self.classify(e, node, scope, "axis"))?;
                self.check_finite(out, node, scope)
            }
            NodeKind::Transpose {
                input,
                axis1,
                axis2,
            } => {
                let x = self.eval(input, scope, pass)?;
                kernels::transpose(&x, *axis1, *axis2)
                    .map_err(|e| self.classify(e, node, scope, "transpose"))
            }
        }
    }

    fn error(
        &self,
        kind: ErrorKind,
        node: &Node,
        scope: Option<&Graph>,
        message: String,
    ) -> GraphError {
        GraphError::new(kind, node, scope.map_or(DETACHED, Graph::name), message)
    }

    /// Shape mismatches between operands become a GraphError; any other
    /// kernel error is a violated precondition.
    fn classify(
        &self,
        err: CoreError,
        node: &Node,
        scope: Option<&Graph>,
        operation: &'static str,
    ) -> GraphError {
        let kind = match &err {
            CoreError::BroadcastMismatch { .. } | CoreError::MatmulShapeMismatch { .. } => {
                ErrorKind::IncompatibleDimensions
            }
            CoreError::RankMismatch { .. } => ErrorKind::IncompatibleArguments,
            CoreError::DimOutOfRange { .. } => {
                self.fail("axis < rank", operation, format!("{}: {err}", node.label()))
            }
            _ => self.fail(
                "kernel precondition",
                operation,
                format!("{}: {err}", node.label()),
            ),
        };
        tracing::debug!(node = %node.id(), %kind, "recoverable kernel error");
        self.error(kind, node, scope, err.to_string())
    }

    fn check_finite(&self, out: Tensor, node: &Node, scope: Option<&Graph>) -> Result<Tensor> {
        if self.config.check_numerics && out.to_vec().iter().any(|v| !v.is_finite()) {
            return Err(self.error(
                ErrorKind::NumericOverflow,
                node,
                scope,
                format!("{} produced a non-finite value", node.label()),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memoized_within_a_pass() {
        let c = Node::scalar(2.0);
        let sq = c.mul(&c);
        let y = sq.add(&sq);
        let session = Session::default();
        let out = session.run(&Graph::new("g", &y), &[]).unwrap();
        assert_eq!(out.to_vec(), vec![8.0]);
        // one pass: the shared node was stored once, under the same pass
        assert_eq!(sq.pass(), y.pass());
        assert_eq!(sq.result().unwrap().to_vec(), vec![4.0]);
        assert_eq!(sq.grad().unwrap().to_vec(), vec![0.0]);
    }

    #[test]
    fn test_new_run_new_pass() {
        let x = Node::variable("x");
        let y = x.exp();
        let g = Graph::new("g", &y);
        let session = Session::default();
        session.run(&g, &[(Node::scalar(0.0), "x")]).unwrap();
        let first = y.pass();
        let out = session.run(&g, &[(Node::scalar(1.0), "x")]).unwrap();
        assert!(y.pass() > first);
        assert!((out.to_vec()[0] - 1f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn test_detached_variable_is_missing_graph() {
        let err = Session::default()
            .run_node(&Node::variable("x").neg())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingGraph);
        assert_eq!(err.graph, DETACHED);
    }

    #[test]
    #[should_panic(expected = "no cycle through bindings")]
    fn test_binding_cycle_is_fatal() {
        let x = Node::variable("x");
        let y = x.add(&Node::scalar(1.0));
        let g = Graph::new("loop", &y);
        let _ = Session::default().run(&g, &[(y.clone(), "x")]);
    }

    #[test]
    fn test_in_flight_cleared_after_fatal_failure() {
        let x = Node::variable("x");
        let y = x.exp();
        let bad = y.sum(1);
        let g = Graph::new("g", &bad);
        let session = Session::default();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            session.run(&g, &[(Node::constant(Tensor::ones(2)), "x")])
        }));
        assert!(caught.is_err());
        assert!(!bad.in_flight());
        assert!(!y.in_flight());
        assert!(!x.in_flight());
        // the same nodes evaluate again without a phantom cycle
        let out = session
            .run(&g, &[(Node::constant(Tensor::alloc((2, 3))), "x")])
            .unwrap();
        assert_eq!(out.to_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_nested_instances_do_not_share_values() {
        let p = Node::variable("p");
        let square = Graph::new("square", &p.mul(&p));
        let a = Node::graph(&square, &[(Node::scalar(2.0), "p")]);
        let b = Node::graph(&square, &[(Node::scalar(5.0), "p")]);
        let session = Session::default();
        let out = session.run(&Graph::new("sum", &a.add(&b)), &[]).unwrap();
        assert_eq!(out.to_vec(), vec![29.0]);
        assert_eq!(a.result().unwrap().to_vec(), vec![4.0]);
        assert_eq!(b.result().unwrap().to_vec(), vec![25.0]);
    }
}
