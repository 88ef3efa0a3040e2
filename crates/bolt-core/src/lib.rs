//! # bolt-core
//!
//! Strided tensors and the kernels that operate on them.
//!
//! This crate provides:
//! - [`Shape`] / [`Layout`]: dims, stored strides, buffer offset, broadcasting
//! - [`Tensor`]: an owned `f64` buffer, plus [`TensorView`] / [`TensorViewMut`]
//!   slices that borrow it
//! - [`kernels`]: elementwise, axis-bound, transpose and dot kernels
//! - [`Blas`]: the gemm primitive used by `dot`, with a `faer` implementation

pub mod blas;
pub mod error;
pub mod kernels;
pub mod layout;
pub mod shape;
pub mod tensor;

pub use blas::{Blas, FaerBlas, ReferenceBlas};
pub use error::{Error, Result};
pub use kernels::{AxisOp, BinaryOp, UnaryOp};
pub use layout::Layout;
pub use shape::{Broadcast, Shape};
pub use tensor::{Tensor, TensorAccess, TensorView, TensorViewMut};
