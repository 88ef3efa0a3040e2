// Node - one value or operation in an expression graph
//
// A Node is a cheap, reference-counted handle. Cloning it clones the handle,
// not the expression, so the same Node can feed several consumers and the
// expression forms a DAG:
//
//   let x = Node::variable("x");
//   let y = x.mul(&x).add(&Node::scalar(1.0));
//
// Besides its tag, every node carries two slots that the session fills in:
//
//   result  the value computed in the most recent evaluation pass
//   grad    the gradient accumulated by the autograd engine
//
// Both start empty. The first visit of a pass writes `result` and resets
// `grad` to zeros of the same shape; the autograd engine only reads `result`
// and only ever replaces `grad`. Handles are Rc-based and therefore !Send:
// a node can never be evaluated from two threads at once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use bolt_core::{AxisOp, BinaryOp, Shape, Tensor, TensorAccess, UnaryOp};

use crate::graph::Graph;

/// Unique identifier of a node, stable for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The tag of a node and its operands.
pub enum NodeKind {
    /// Resolved by name against the enclosing graph's bindings.
    Variable { name: String },
    Constant { value: Tensor },
    Binary { op: BinaryOp, lhs: Node, rhs: Node },
    Unary { op: UnaryOp, input: Node },
    Axis { op: AxisOp, input: Node, axis: usize },
    Transpose { input: Node, axis1: usize, axis2: usize },
    /// A sub-graph evaluated in place, with parameter bindings re-applied
    /// before every evaluation.
    Graph { graph: Graph, params: Vec<(Node, String)> },
}

struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    result: RefCell<Option<Tensor>>,
    grad: RefCell<Option<Tensor>>,
    /// Pass that produced `result`; 0 means never evaluated.
    pass: Cell<u64>,
    /// Set while the node's operands are being evaluated.
    in_flight: Cell<bool>,
}

/// Handle to an expression graph node.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

impl Node {
    fn from_kind(kind: NodeKind) -> Self {
        Node {
            inner: Rc::new(NodeInner {
                id: NodeId::new(),
                kind,
                result: RefCell::new(None),
                grad: RefCell::new(None),
                pass: Cell::new(0),
                in_flight: Cell::new(false),
            }),
        }
    }

    // Factories

    pub fn variable(name: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Variable { name: name.into() })
    }

    pub fn constant(value: Tensor) -> Self {
        Self::from_kind(NodeKind::Constant { value })
    }

    /// Rank-0 constant.
    pub fn scalar(value: f64) -> Self {
        Self::constant(Tensor::scalar(value))
    }

    pub fn binary(op: BinaryOp, lhs: &Node, rhs: &Node) -> Self {
        Self::from_kind(NodeKind::Binary {
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn unary(op: UnaryOp, input: &Node) -> Self {
        Self::from_kind(NodeKind::Unary {
            op,
            input: input.clone(),
        })
    }

    pub fn axis(op: AxisOp, input: &Node, axis: usize) -> Self {
        Self::from_kind(NodeKind::Axis {
            op,
            input: input.clone(),
            axis,
        })
    }

    /// Swap two axes of `input`. A 1-D operand is treated as `(1, n)`.
    pub fn transpose(&self, axis1: usize, axis2: usize) -> Self {
        Self::from_kind(NodeKind::Transpose {
            input: self.clone(),
            axis1,
            axis2,
        })
    }

    /// Embed `graph` as a node. Each `(node, name)` parameter is bound into
    /// `graph` right away, and again whenever the node is evaluated.
    pub fn graph(graph: &Graph, params: &[(Node, &str)]) -> Self {
        for (node, name) in params {
            graph.bind(*name, node);
        }
        Self::from_kind(NodeKind::Graph {
            graph: graph.clone(),
            params: params
                .iter()
                .map(|(node, name)| (node.clone(), (*name).to_string()))
                .collect(),
        })
    }

    // Binary helpers

    pub fn add(&self, rhs: &Node) -> Self {
        Self::binary(BinaryOp::Add, self, rhs)
    }

    pub fn sub(&self, rhs: &Node) -> Self {
        Self::binary(BinaryOp::Sub, self, rhs)
    }

    pub fn mul(&self, rhs: &Node) -> Self {
        Self::binary(BinaryOp::Mul, self, rhs)
    }

    pub fn div(&self, rhs: &Node) -> Self {
        Self::binary(BinaryOp::Div, self, rhs)
    }

    pub fn pow(&self, rhs: &Node) -> Self {
        Self::binary(BinaryOp::Pow, self, rhs)
    }

    pub fn dot(&self, rhs: &Node) -> Self {
        Self::binary(BinaryOp::Dot, self, rhs)
    }

    // Unary helpers

    pub fn neg(&self) -> Self {
        Self::unary(UnaryOp::Neg, self)
    }

    pub fn exp(&self) -> Self {
        Self::unary(UnaryOp::Exp, self)
    }

    pub fn log(&self) -> Self {
        Self::unary(UnaryOp::Log, self)
    }

    pub fn sin(&self) -> Self {
        Self::unary(UnaryOp::Sin, self)
    }

    pub fn cos(&self) -> Self {
        Self::unary(UnaryOp::Cos, self)
    }

    pub fn tan(&self) -> Self {
        Self::unary(UnaryOp::Tan, self)
    }

    pub fn tanh(&self) -> Self {
        Self::unary(UnaryOp::Tanh, self)
    }

    pub fn relu(&self) -> Self {
        Self::unary(UnaryOp::Relu, self)
    }

    pub fn softplus(&self) -> Self {
        Self::unary(UnaryOp::Softplus, self)
    }

    pub fn sigmoid(&self) -> Self {
        Self::unary(UnaryOp::Sigmoid, self)
    }

    pub fn dx_relu(&self) -> Self {
        Self::unary(UnaryOp::DxRelu, self)
    }

    // Axis helpers

    pub fn sum(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Sum, self, axis)
    }

    pub fn product(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Product, self, axis)
    }

    pub fn min(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Min, self, axis)
    }

    pub fn max(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Max, self, axis)
    }

    pub fn mean(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Mean, self, axis)
    }

    pub fn variance(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Variance, self, axis)
    }

    pub fn argmin(&self, axis: usize) -> Self {
        Self::axis(AxisOp::ArgMin, self, axis)
    }

    pub fn argmax(&self, axis: usize) -> Self {
        Self::axis(AxisOp::ArgMax, self, axis)
    }

    pub fn softmax(&self, axis: usize) -> Self {
        Self::axis(AxisOp::Softmax, self, axis)
    }

    // Accessors

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.inner.kind
    }

    /// Operand nodes. Variables and nested graphs have none of their own;
    /// they are resolved through bindings.
    pub fn inputs(&self) -> Vec<&Node> {
        match &self.inner.kind {
            NodeKind::Variable { .. } | NodeKind::Constant { .. } | NodeKind::Graph { .. } => {
                vec![]
            }
            NodeKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::Unary { input, .. }
            | NodeKind::Axis { input, .. }
            | NodeKind::Transpose { input, .. } => vec![input],
        }
    }

    /// The held tensor of a constant node.
    pub fn as_constant(&self) -> Option<&Tensor> {
        match &self.inner.kind {
            NodeKind::Constant { value } => Some(value),
            _ => None,
        }
    }

    /// Short human-readable description used in logs and errors.
    pub fn label(&self) -> String {
        match &self.inner.kind {
            NodeKind::Variable { name } => format!("variable `{name}`"),
            NodeKind::Constant { value } => format!("constant {}", value.shape()),
            NodeKind::Binary { op, .. } => format!("binary op `{op}`"),
            NodeKind::Unary { op, .. } => format!("unary op `{op}`"),
            NodeKind::Axis { op, axis, .. } => format!("axis op `{op}` (axis {axis})"),
            NodeKind::Transpose { axis1, axis2, .. } => format!("transpose ({axis1}, {axis2})"),
            NodeKind::Graph { graph, .. } => format!("graph `{}`", graph.name()),
        }
    }

    /// Copy of the value computed by the last evaluation, if any.
    pub fn result(&self) -> Option<Tensor> {
        self.inner.result.borrow().clone()
    }

    /// Copy of the accumulated gradient, if any.
    pub fn grad(&self) -> Option<Tensor> {
        self.inner.grad.borrow().clone()
    }

    pub fn result_shape(&self) -> Option<Shape> {
        self.inner
            .result
            .borrow()
            .as_ref()
            .map(|t| t.shape().to_contiguous())
    }

    // Slot bookkeeping, driven by the session and the autograd engine.

    pub(crate) fn pass(&self) -> u64 {
        self.inner.pass.get()
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.inner.in_flight.get()
    }

    pub(crate) fn set_in_flight(&self, flag: bool) {
        self.inner.in_flight.set(flag);
    }

    /// Record the value of `pass` and zero the gradient slot to its shape.
    pub(crate) fn store_result(&self, value: Tensor, pass: u64) {
        *self.inner.grad.borrow_mut() = Some(Tensor::alloc(value.shape().to_contiguous()));
        *self.inner.result.borrow_mut() = Some(value);
        self.inner.pass.set(pass);
    }

    /// Replace the gradient slot, dropping whatever it held.
    pub(crate) fn set_grad(&self, grad: Tensor) {
        *self.inner.grad.borrow_mut() = Some(grad);
    }

    /// Zero the gradient slot (to the result's dims), or empty it when the
    /// node has never been evaluated.
    pub(crate) fn zero_grad(&self) {
        let zeros = self.result_shape().map(Tensor::alloc);
        *self.inner.grad.borrow_mut() = zeros;
    }

    /// Drop both slots and forget the last pass.
    pub(crate) fn release(&self) {
        self.inner.result.borrow_mut().take();
        self.inner.grad.borrow_mut().take();
        self.inner.pass.set(0);
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({} {})", self.id(), self.label())
    }
}
