// Kernels - pure functions over concrete tensors
//
// One function per operation family:
//
//   elementwise  binary ops with broadcasting, unary maps
//   reduce       axis-bound ops (sum, product, min, max, mean, variance,
//                argmin, argmax, softmax)
//   linalg       transpose by stride swap, dot through the Blas trait
//
// Kernels never touch the expression graph. They take tensors, return a
// freshly owned tensor, and report shape problems as core errors; the
// graph layer decides which of those are recoverable.
//
// The op enums below are shared with the graph layer, which records them in
// nodes so the autograd engine knows which rule to apply.

mod elementwise;
mod linalg;
mod reduce;

use std::fmt;

pub use elementwise::{elementwise, unary};
pub use linalg::{dot, transpose};
pub use reduce::axis;

use crate::blas::Blas;
use crate::error::Result;
use crate::tensor::Tensor;

/// Binary operations. All but `Dot` are elementwise with broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Dot,
}

/// Elementwise unary maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Tanh,
    Relu,
    Softplus,
    Sigmoid,
    /// Derivative of relu: 1 where x > 0, else 0.
    DxRelu,
}

/// Operations bound to a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisOp {
    Sum,
    Product,
    Min,
    Max,
    Mean,
    Variance,
    ArgMin,
    ArgMax,
    /// Normalizes along the axis; the only shape-preserving axis op.
    Softmax,
}

impl BinaryOp {
    /// Scalar function of an elementwise op, `None` for `Dot`.
    pub fn scalar_fn(self) -> Option<fn(f64, f64) -> f64> {
        let f: fn(f64, f64) -> f64 = match self {
            BinaryOp::Add => |a, b| a + b,
            BinaryOp::Sub => |a, b| a - b,
            BinaryOp::Mul => |a, b| a * b,
            BinaryOp::Div => |a, b| a / b,
            BinaryOp::Pow => f64::powf,
            BinaryOp::Dot => return None,
        };
        Some(f)
    }
}

impl UnaryOp {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Softplus => softplus(x),
            UnaryOp::Sigmoid => sigmoid(x),
            UnaryOp::DxRelu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl AxisOp {
    /// True for ops that remove the axis they run along.
    pub fn reduces(self) -> bool {
        self != AxisOp::Softmax
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

// ln(1 + e^x) without overflow for large x
fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mult",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::Dot => "dot",
        };
        f.write_str(name)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnaryOp::Neg => "minus",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Relu => "relu",
            UnaryOp::Softplus => "softplus",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::DxRelu => "dx_relu",
        };
        f.write_str(name)
    }
}

impl fmt::Display for AxisOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AxisOp::Sum => "sum",
            AxisOp::Product => "product",
            AxisOp::Min => "min",
            AxisOp::Max => "max",
            AxisOp::Mean => "mean",
            AxisOp::Variance => "variance",
            AxisOp::ArgMin => "argmin",
            AxisOp::ArgMax => "argmax",
            AxisOp::Softmax => "softmax",
        };
        f.write_str(name)
    }
}

/// Run any binary op, routing `Dot` to the matrix product.
pub fn binary(op: BinaryOp, lhs: &Tensor, rhs: &Tensor, blas: &dyn Blas) -> Result<Tensor> {
    match op {
        BinaryOp::Dot => dot(lhs, rhs, blas),
        _ => elementwise(op, lhs, rhs),
    }
}
