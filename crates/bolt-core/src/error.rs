use crate::shape::Shape;

/// Errors raised by shapes, tensors and kernels.
///
/// The core crate never decides whether a failure is recoverable. It reports
/// what went wrong and lets the graph layer classify it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two operands cannot be broadcast against each other.
    #[error("cannot broadcast lhs {lhs} with rhs {rhs}")]
    BroadcastMismatch { lhs: Shape, rhs: Shape },

    /// Operation requires at most (or exactly) a given rank.
    #[error("rank mismatch: expected rank <= {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Axis index out of range for the tensor's rank.
    #[error("axis out of range: axis {axis} for tensor of rank {rank}")]
    DimOutOfRange { axis: usize, rank: usize },

    /// Element index out of range along one axis, or wrong index length.
    #[error("index out of range: index {index:?} for shape {shape}")]
    IndexOutOfRange { index: Vec<usize>, shape: Shape },

    /// Slice range is reversed or runs past the end of an axis.
    #[error("slice out of bounds: axis {axis}, range {start}..{end}, dim {dim}")]
    SliceOutOfBounds {
        axis: usize,
        start: usize,
        end: usize,
        dim: usize,
    },

    /// Element count mismatch when creating a tensor from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Inner dimensions of a matrix product disagree.
    #[error("dot shape mismatch: [{m}x{k1}] . [{k2}x{n}], inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error("cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements")]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted [`Error::Msg`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
