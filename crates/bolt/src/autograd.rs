// Autograd - reverse-mode differentiation over an evaluated graph
//
// `Session::backward` walks the nodes of a graph in reverse topological
// order, starting from the root whose gradient is seeded with ones. For each
// node it looks at the tag and builds, per operand, a small expression out of
// Constant nodes holding the node's gradient and the stored operand values:
//
//   d(a * b) = g * b, g * a
//   d(exp x) = g * exp(x)      (exp(x) is the node's stored result)
//   ...
//
// The expression is evaluated with `run_node`, summed over the axes that
// broadcasting added relative to the operand, and added into the operand's
// gradient slot. Every node receives all of its contributions before it
// propagates its own, because the walk is topological.
//
// Stored results are never recomputed, with one exception. An inner graph
// may be embedded by several nested-graph nodes, and its result slots only
// hold the values of whichever instance ran last. So each nested-graph node
// re-runs its inner graph on stand-in constants holding its own parameter
// values, walks it backward seeded with the node's gradient and hands the
// stand-ins' gradients to the real parameter nodes. The synthesized nodes
// are dropped as soon as their value is taken.

use bolt_core::{AxisOp, BinaryOp, Shape, Tensor, TensorAccess, UnaryOp};

use crate::error::{ErrorKind, Result};
use crate::graph::{topo_order, Graph};
use crate::node::{Node, NodeKind};
use crate::session::{next_pass, Session};

fn constant(t: Tensor) -> Node {
    Node::constant(t)
}

impl Session {
    /// Differentiate `graph`'s root with respect to every node reached by
    /// its last run. Each run starts every reached node from a zeroed
    /// gradient slot, and contributions are added into it, so a second
    /// `backward` over the same run doubles the gradients.
    ///
    /// The graph must have been evaluated: a node without a stored result is
    /// a fatal error, as is an operation with no differentiation rule.
    pub fn backward(&self, graph: &Graph) -> Result<()> {
        let root = graph.root();
        let Some(shape) = root.result_shape() else {
            self.fail(
                "graph evaluated before backward",
                "backward",
                format!("root {} of graph `{}` has no result", root.label(), graph.name()),
            );
        };
        self.backward_from(graph, Tensor::ones(shape))
    }

    /// Seed the root's gradient with `seed` and propagate it through the
    /// graph, leaves last.
    fn backward_from(&self, graph: &Graph, seed: Tensor) -> Result<()> {
        graph.root().set_grad(seed);

        let order = topo_order(graph);
        tracing::debug!(graph = graph.name(), nodes = order.len(), "backward");
        for (node, scope) in order.iter().rev() {
            self.propagate(node, scope)?;
        }
        Ok(())
    }

    fn value_of(&self, node: &Node) -> Tensor {
        match node.result() {
            Some(value) => value,
            None => self.fail(
                "graph evaluated before backward",
                "backward",
                format!("{} has no result", node.label()),
            ),
        }
    }

    fn grad_of(&self, node: &Node) -> Tensor {
        match node.grad() {
            Some(grad) => grad,
            None => Tensor::alloc(self.value_of(node).shape().to_contiguous()),
        }
    }

    /// Push `node`'s gradient into its operands (or its binding).
    fn propagate(&self, node: &Node, scope: &Graph) -> Result<()> {
        let _span = tracing::info_span!("backward_rule", node = %node.id(), op = %node.label())
            .entered();

        match node.kind() {
            NodeKind::Constant { .. } => Ok(()),
            NodeKind::Variable { name } => match scope.var(name) {
                Some(bound) => self.accumulate(&bound, &constant(self.grad_of(node))),
                None => self.fail(
                    "variable bound during backward",
                    "backward",
                    format!(
                        "Graph `{}` runtime error, variable `{}` does not exist ({})",
                        scope.name(),
                        name,
                        ErrorKind::UnboundVariable
                    ),
                ),
            },
            NodeKind::Graph { graph, params } => self.nested_rule(node, graph, params),
            NodeKind::Binary { op, lhs, rhs } => self.binary_rule(node, *op, lhs, rhs),
            NodeKind::Unary { op, input } => self.unary_rule(node, *op, input),
            NodeKind::Axis { op, input, axis } => self.axis_rule(node, *op, input, *axis),
            NodeKind::Transpose {
                input,
                axis1,
                axis2,
            } => {
                let x = self.value_of(input);
                if x.rank() == 1 {
                    // the forward pass promoted (n) to (1, n); same element order
                    let g = self.reshape_or_fail(self.grad_of(node), x.shape().to_contiguous());
                    self.accumulate(input, &constant(g))
                } else {
                    let g = constant(self.grad_of(node));
                    self.accumulate(input, &g.transpose(*axis1, *axis2))
                }
            }
        }
    }

    fn nested_rule(&self, node: &Node, inner: &Graph, params: &[(Node, String)]) -> Result<()> {
        let g = self.grad_of(node);
        let stand_ins: Vec<Node> = params
            .iter()
            .map(|(param, _)| constant(self.value_of(param)))
            .collect();
        for ((_, name), stand_in) in params.iter().zip(&stand_ins) {
            inner.bind(name.as_str(), stand_in);
        }
        let walked = self
            .eval(inner.root(), Some(inner), next_pass())
            .and_then(|_| self.backward_from(inner, g));
        for (param, name) in params {
            inner.bind(name.as_str(), param);
        }
        walked?;

        for ((param, _), stand_in) in params.iter().zip(&stand_ins) {
            self.accumulate(param, &constant(self.grad_of(stand_in)))?;
        }
        Ok(())
    }

    fn binary_rule(&self, node: &Node, op: BinaryOp, lhs: &Node, rhs: &Node) -> Result<()> {
        let g = constant(self.grad_of(node));
        let l = constant(self.value_of(lhs));
        let r = constant(self.value_of(rhs));

        match op {
            BinaryOp::Add => {
                self.accumulate(lhs, &g)?;
                self.accumulate(rhs, &g)
            }
            BinaryOp::Sub => {
                self.accumulate(lhs, &g)?;
                self.accumulate(rhs, &g.neg())
            }
            BinaryOp::Mul => {
                self.accumulate(lhs, &g.mul(&r))?;
                self.accumulate(rhs, &g.mul(&l))
            }
            BinaryOp::Div => {
                self.accumulate(lhs, &g.div(&r))?;
                self.accumulate(rhs, &g.mul(&l).div(&r.mul(&r)).neg())
            }
            BinaryOp::Pow => {
                let one = Node::scalar(1.0);
                self.accumulate(lhs, &g.mul(&r).mul(&l.pow(&r.sub(&one))))?;
                // a constant exponent needs no gradient, and ln(lhs) is not
                // defined for negative bases
                if rhs.as_constant().is_some() {
                    return Ok(());
                }
                let y = constant(self.value_of(node));
                self.accumulate(rhs, &g.mul(&y).mul(&l.log()))
            }
            BinaryOp::Dot => self.dot_rule(node, lhs, rhs),
        }
    }

    /// `d(a . b) = g . bᵀ, aᵀ . g` on the 2-D forms of the operands. The
    /// contributions are reshaped back to the operands' own dims, which
    /// differ from the 2-D forms only for 1-D operands.
    fn dot_rule(&self, node: &Node, lhs: &Node, rhs: &Node) -> Result<()> {
        let a = self.value_of(lhs);
        let b = self.value_of(rhs);
        let (m, k) = match *a.dims() {
            [k] => (1, k),
            [m, k] => (m, k),
            _ => self.fail("rank <= 2", "backward dot", lhs.label()),
        };
        let n = match *b.dims() {
            [_] => 1,
            [_, n] => n,
            _ => self.fail("rank <= 2", "backward dot", rhs.label()),
        };

        let a_dims = a.shape().to_contiguous();
        let b_dims = b.shape().to_contiguous();
        let a2 = self.reshape_or_fail(a, Shape::from((m, k)));
        let b2 = self.reshape_or_fail(b, Shape::from((k, n)));
        let g2 = self.reshape_or_fail(self.grad_of(node), Shape::from((m, n)));

        let (a2, b2, g2) = (constant(a2), constant(b2), constant(g2));
        let da = self.run_node(&g2.dot(&b2.transpose(0, 1)))?;
        let db = self.run_node(&a2.transpose(0, 1).dot(&g2))?;
        self.accumulate(lhs, &constant(self.reshape_or_fail(da, a_dims)))?;
        self.accumulate(rhs, &constant(self.reshape_or_fail(db, b_dims)))
    }

    fn unary_rule(&self, node: &Node, op: UnaryOp, input: &Node) -> Result<()> {
        let g = constant(self.grad_of(node));
        let x = constant(self.value_of(input));
        let y = constant(self.value_of(node));
        let one = Node::scalar(1.0);

        let contribution = match op {
            UnaryOp::Neg => g.neg(),
            UnaryOp::Exp => g.mul(&y),
            UnaryOp::Log => g.div(&x),
            UnaryOp::Sin => g.mul(&x.cos()),
            UnaryOp::Cos => g.mul(&x.sin()).neg(),
            UnaryOp::Tan => {
                let c = x.cos();
                g.div(&c.mul(&c))
            }
            UnaryOp::Tanh => g.mul(&one.sub(&y.mul(&y))),
            UnaryOp::Relu => g.mul(&x.dx_relu()),
            UnaryOp::Softplus => g.mul(&x.sigmoid()),
            UnaryOp::Sigmoid => g.mul(&y).mul(&one.sub(&y)),
            UnaryOp::DxRelu => self.fail(
                "differentiable operation",
                "backward",
                format!("{} ({})", node.label(), ErrorKind::NotImplemented),
            ),
        };
        self.accumulate(input, &contribution)
    }

    /// Only `sum` has a rule: the gradient passes through unchanged to every
    /// element that was summed.
    fn axis_rule(&self, node: &Node, op: AxisOp, input: &Node, axis: usize) -> Result<()> {
        if op != AxisOp::Sum {
            self.fail(
                "differentiable operation",
                "backward",
                format!("{} ({})", node.label(), ErrorKind::NotImplemented),
            );
        }
        let x = self.value_of(input);
        let mut keep = x.dims().to_vec();
        keep[axis] = 1;
        let g = self.reshape_or_fail(self.grad_of(node), Shape::new(keep));
        let spread = constant(g).mul(&constant(Tensor::ones(x.shape().to_contiguous())));
        self.accumulate(input, &spread)
    }

    /// Evaluate `contribution`, sum it down to `operand`'s shape and add it
    /// into `operand`'s gradient slot.
    fn accumulate(&self, operand: &Node, contribution: &Node) -> Result<()> {
        let target = self.value_of(operand).shape().to_contiguous();
        let delta = self.run_node(contribution)?;

        let axes = delta.shape().broadcast_reduction_axes(&target);
        let delta = if axes.is_empty() {
            delta
        } else {
            // highest axis first so the remaining axis numbers stay valid
            let summed = axes
                .iter()
                .rev()
                .fold(constant(delta), |acc, &axis| acc.sum(axis));
            self.run_node(&summed)?
        };
        let delta = self.reshape_or_fail(delta, target.clone());

        let current = match operand.grad() {
            Some(grad) if grad.dims() == target.dims() => grad,
            _ => Tensor::alloc(target.clone()),
        };
        let updated = self.run_node(&constant(current).add(&constant(delta)))?;
        tracing::trace!(node = %operand.id(), shape = %target, "gradient contribution");
        operand.set_grad(self.reshape_or_fail(updated, target));
        Ok(())
    }

    fn reshape_or_fail(&self, t: Tensor, shape: Shape) -> Tensor {
        match t.reshaped(shape) {
            Ok(t) => t,
            Err(err) => self.fail("element count preserved", "reshape", err.to_string()),
        }
    }
}
