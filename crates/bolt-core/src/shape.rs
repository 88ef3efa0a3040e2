use std::fmt;

use crate::error::{Error, Result};

// Shape - dims, strides and element count of a tensor
//
// A Shape stores the extent of every axis together with the stride used to
// step along that axis in a flat row-major buffer:
//
//   Scalar: dims ()         strides ()        raw_len 1
//   Vector: dims (5)        strides (1)       raw_len 5
//   Matrix: dims (3, 4)     strides (4, 1)    raw_len 12
//   Batch:  dims (4,3,2,3)  strides (18,6,3,1) raw_len 72
//
// Strides are derived from dims when a shape is built, but they are stored,
// not recomputed: transposing a shape swaps dims and strides together, and
// the result no longer matches a fresh row-major derivation.
//
// Broadcasting follows the usual right-aligned rule. Two shapes are
// compatible if every aligned pair of dims is equal or one of them is 1.
// One of the two is declared dominant (larger element count, then larger
// rank, otherwise the right-hand side) and the virtual shape both operands
// are indexed against is built from it.

/// N-dimensional shape with stored strides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
    strides: Vec<usize>,
    raw_len: usize,
}

/// Outcome of [`Shape::can_broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    Incompatible,
    /// The left operand is the dominant (padded) shape.
    LhsDominant,
    /// The right operand is the dominant (padded) shape.
    RhsDominant,
}

impl Broadcast {
    pub fn is_compatible(self) -> bool {
        self != Broadcast::Incompatible
    }
}

impl Shape {
    /// Build a shape that takes ownership of `dims`, deriving row-major
    /// strides and the element count.
    pub fn new(dims: Vec<usize>) -> Self {
        let strides = stride_contiguous(&dims);
        let raw_len = dims.iter().product();
        Shape {
            dims,
            strides,
            raw_len,
        }
    }

    /// Build a shape from a borrowed dims slice (the slice is copied).
    pub fn from_slice(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }

    /// A rank-0 shape holding exactly one element.
    pub fn scalar() -> Self {
        Shape::new(Vec::new())
    }

    /// Build a shape with explicit strides. Used by transpose and views,
    /// where the strides do not follow from the dims.
    pub(crate) fn with_strides(dims: Vec<usize>, strides: Vec<usize>) -> Self {
        debug_assert_eq!(dims.len(), strides.len());
        let raw_len = dims.iter().product();
        Shape {
            dims,
            strides,
            raw_len,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (product of all dims, 1 for a scalar).
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Size of a single axis.
    pub fn dim(&self, axis: usize) -> Result<usize> {
        self.dims.get(axis).copied().ok_or(Error::DimOutOfRange {
            axis,
            rank: self.rank(),
        })
    }

    /// True when the stored strides are the row-major strides of the dims.
    pub fn is_contiguous(&self) -> bool {
        self.strides == stride_contiguous(&self.dims)
    }

    /// Same dims, fresh row-major strides.
    pub fn to_contiguous(&self) -> Shape {
        Shape::new(self.dims.clone())
    }

    /// Copy of this shape with axes `a1` and `a2` swapped, dims and strides
    /// alike.
    pub fn transpose(&self, a1: usize, a2: usize) -> Result<Shape> {
        let rank = self.rank();
        if a1 >= rank || a2 >= rank {
            return Err(Error::DimOutOfRange {
                axis: a1.max(a2),
                rank,
            });
        }
        let mut dims = self.dims.clone();
        let mut strides = self.strides.clone();
        dims.swap(a1, a2);
        strides.swap(a1, a2);
        Ok(Shape::with_strides(dims, strides))
    }

    /// Linear buffer offset of a multi-index: `sum(index[i] * strides[i])`.
    /// No bounds checks; see `Tensor::get` for the checked path.
    pub fn ravel(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(&self.strides)
            .map(|(&i, &s)| i * s)
            .sum()
    }

    /// Row-major multi-index of the `linear`-th logical element. Ignores the
    /// stored strides: the logical order of a shape is always row-major.
    pub fn unravel(&self, mut linear: usize) -> Vec<usize> {
        let mut index = vec![0; self.rank()];
        for axis in (0..self.rank()).rev() {
            let d = self.dims[axis];
            if d == 0 {
                return index;
            }
            index[axis] = linear % d;
            linear /= d;
        }
        index
    }

    // Broadcasting

    /// Check whether `a` and `b` broadcast, and which one dominates.
    ///
    /// Dims are right-aligned and compared from the trailing axis; a pair is
    /// compatible if equal or if either side is 1. Dominance goes to the
    /// larger element count, then to the larger rank; a full tie goes to `b`.
    pub fn can_broadcast(a: &Shape, b: &Shape) -> Broadcast {
        let compatible = a
            .dims
            .iter()
            .rev()
            .zip(b.dims.iter().rev())
            .all(|(&x, &y)| x == y || x == 1 || y == 1);
        if !compatible {
            return Broadcast::Incompatible;
        }
        if a.raw_len > b.raw_len || (a.raw_len == b.raw_len && a.rank() > b.rank()) {
            Broadcast::LhsDominant
        } else {
            Broadcast::RhsDominant
        }
    }

    /// The padded shape both operands are indexed against.
    ///
    /// Leading axes beyond the smaller rank are copied from the higher-rank
    /// shape; aligned axes take the larger extent (a size-1 axis stretches
    /// to the other side). When both ranks agree the dominant shape is the
    /// higher-rank one.
    pub fn virtual_shape(dominant: &Shape, other: &Shape) -> Shape {
        let (long, short) = if dominant.rank() >= other.rank() {
            (dominant, other)
        } else {
            (other, dominant)
        };
        let lead = long.rank() - short.rank();
        let mut dims = long.dims[..lead].to_vec();
        dims.extend(
            long.dims[lead..]
                .iter()
                .zip(&short.dims)
                .map(|(&l, &s)| if l == 1 { s } else { l }),
        );
        Shape::new(dims)
    }

    /// Axes of `self` (a broadcast result) that have to be summed away to
    /// get back to `target`: axes `target` lacks altogether, and axes where
    /// `target` has extent 1 but `self` does not. Ascending order.
    pub fn broadcast_reduction_axes(&self, target: &Shape) -> Vec<usize> {
        let rank = self.rank();
        let t_rank = target.rank();
        (0..rank)
            .filter(|&axis| {
                let from_right = rank - 1 - axis;
                let t = if from_right < t_rank {
                    target.dims[t_rank - 1 - from_right]
                } else {
                    1
                };
                t == 1 && self.dims[axis] != 1
            })
            .collect()
    }
}

/// Row-major strides for `dims`: `strides[rank-1] = 1`,
/// `strides[i-1] = dims[i] * strides[i]`.
pub fn stride_contiguous(dims: &[usize]) -> Vec<usize> {
    let rank = dims.len();
    let mut strides = vec![0usize; rank];
    if rank > 0 {
        strides[rank - 1] = 1;
        for i in (1..rank).rev() {
            strides[i - 1] = dims[i] * strides[i];
        }
    }
    strides
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(.rank = {}, ", self.rank())?;
        for (i, d) in self.dims.iter().enumerate() {
            write!(f, ".dims[{}] = {}, ", i, d)?;
        }
        write!(f, ")")
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape::scalar()
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape::new(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape::new(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape::new(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape::new(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape::new(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape::new(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape::from_slice(s)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(a: [usize; N]) -> Self {
        Shape::new(a.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.raw_len(), 1);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_4d_strides() {
        let s = Shape::from((4, 3, 2, 3));
        assert_eq!(s.strides(), &[18, 6, 3, 1]);
        assert_eq!(s.raw_len(), 72);
    }

    #[test]
    fn test_from_slice_copies() {
        let dims = vec![2, 5];
        let s = Shape::from_slice(&dims);
        assert_eq!(s.dims(), dims.as_slice());
        assert_eq!(s, Shape::new(dims));
    }

    #[test]
    fn test_zero_extent() {
        let s = Shape::from((3, 0, 2));
        assert_eq!(s.raw_len(), 0);
        assert_eq!(s.strides(), &[0, 2, 1]);
    }

    #[test]
    fn test_display() {
        let s = Shape::from((3, 1));
        assert_eq!(s.to_string(), "(.rank = 2, .dims[0] = 3, .dims[1] = 1, )");
    }

    #[test]
    fn test_transpose_keeps_strides() {
        let s = Shape::from((2, 3));
        let t = s.transpose(0, 1).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.strides(), &[1, 3]);
        assert!(!t.is_contiguous());
        // the original is untouched
        assert_eq!(s.strides(), &[3, 1]);
        assert!(s.transpose(0, 2).is_err());
    }

    #[test]
    fn test_unravel() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.unravel(23), vec![1, 2, 3]);
        assert_eq!(s.ravel(&[1, 2, 3]), 23);
    }

    #[test]
    fn test_can_broadcast_rules() {
        let a = Shape::from((1, 3));
        let b = Shape::from((3, 1));
        // equal element count and rank: rhs wins the tie
        assert_eq!(Shape::can_broadcast(&a, &b), Broadcast::RhsDominant);
        assert_eq!(Shape::can_broadcast(&b, &a), Broadcast::RhsDominant);

        let big = Shape::from((4, 3));
        let row = Shape::from(3);
        assert_eq!(Shape::can_broadcast(&big, &row), Broadcast::LhsDominant);
        assert_eq!(Shape::can_broadcast(&row, &big), Broadcast::RhsDominant);

        // equal element count, larger rank dominates
        let flat = Shape::from(3);
        let lifted = Shape::from((1, 3));
        assert_eq!(Shape::can_broadcast(&lifted, &flat), Broadcast::LhsDominant);
        assert_eq!(Shape::can_broadcast(&flat, &lifted), Broadcast::RhsDominant);

        let bad = Shape::from((2, 4));
        assert_eq!(Shape::can_broadcast(&big, &bad), Broadcast::Incompatible);
    }

    #[test]
    fn test_virtual_shape() {
        let a = Shape::from((1, 3));
        let b = Shape::from((3, 1));
        assert_eq!(Shape::virtual_shape(&b, &a).dims(), &[3, 3]);

        let batch = Shape::from((5, 3, 1));
        let mat = Shape::from((3, 4));
        assert_eq!(Shape::virtual_shape(&batch, &mat).dims(), &[5, 3, 4]);
        // dominance by element count with the lower rank still keeps the
        // leading axes of the higher-rank operand
        let wide = Shape::from((1, 8));
        let tall = Shape::from((2, 1, 1));
        assert_eq!(Shape::virtual_shape(&wide, &tall).dims(), &[2, 1, 8]);
    }

    #[test]
    fn test_broadcast_reduction_axes() {
        let out = Shape::from((4, 3, 5));
        assert_eq!(out.broadcast_reduction_axes(&Shape::from((3, 1))), vec![0, 2]);
        assert_eq!(out.broadcast_reduction_axes(&Shape::from((1, 3, 5))), vec![0]);
        assert!(out.broadcast_reduction_axes(&out).is_empty());
    }

    proptest! {
        #[test]
        fn prop_strides_are_row_major(dims in prop::collection::vec(0usize..6, 0..5)) {
            let s = Shape::new(dims.clone());
            prop_assert_eq!(s.raw_len(), dims.iter().product::<usize>());
            let rank = dims.len();
            if rank > 0 {
                prop_assert_eq!(s.strides()[rank - 1], 1);
                for i in 0..rank - 1 {
                    prop_assert_eq!(s.strides()[i], dims[i + 1] * s.strides()[i + 1]);
                }
            }
        }

        #[test]
        fn prop_broadcast_validity_is_symmetric(
            a in prop::collection::vec(1usize..4, 0..4),
            b in prop::collection::vec(1usize..4, 0..4),
        ) {
            let sa = Shape::new(a);
            let sb = Shape::new(b);
            prop_assert_eq!(
                Shape::can_broadcast(&sa, &sb).is_compatible(),
                Shape::can_broadcast(&sb, &sa).is_compatible()
            );
        }

        #[test]
        fn prop_unravel_inverts_ravel(dims in prop::collection::vec(1usize..5, 1..4), seed in 0usize..1000) {
            let s = Shape::new(dims);
            let linear = seed % s.raw_len();
            prop_assert_eq!(s.ravel(&s.unravel(linear)), linear);
        }
    }
}
