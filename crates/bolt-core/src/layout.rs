use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout - shape plus buffer offset
//
// An owned tensor always starts at offset 0 of its buffer. A slice view
// shares its parent's buffer and starts somewhere inside it, so its layout
// carries the parent's strides (restricted to the kept axes) and the linear
// offset of its first element.
//
// Slicing takes one (start, end) pair per axis:
//
//   (1, 3) keeps the axis with extent 2, starting at index 1
//   (2, 2) drops the axis and pins it to index 2
//
// so slicing a (4, 6) buffer with [(1, 1), (2, 5)] yields a 1-D view of
// extent 3 at offset 1*6 + 2 = 8 with stride 1.

/// Shape and starting offset of a tensor inside its buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    offset: usize,
}

impl Layout {
    /// Layout of an owned tensor: the shape as given, offset 0.
    pub fn new(shape: Shape) -> Self {
        Layout { shape, offset: 0 }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Checked buffer position of a multi-index: every entry must lie in
    /// its axis and the index length must equal the rank.
    pub fn checked_index(&self, index: &[usize]) -> Result<usize> {
        let dims = self.shape.dims();
        if index.len() != dims.len() || index.iter().zip(dims).any(|(&i, &d)| i >= d) {
            return Err(Error::IndexOutOfRange {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(self.offset + self.shape.ravel(index))
    }

    /// Buffer position of a multi-index taken against a broadcast shape
    /// `vshape`. Leading entries beyond this layout's rank are ignored; the
    /// rest wrap modulo this layout's own dims, so a size-1 axis always
    /// reads position 0.
    pub fn broadcast_index(&self, index: &[usize], vshape: &Shape) -> usize {
        let rank = self.shape.rank();
        let skip = vshape.rank().saturating_sub(rank);
        let dims = self.shape.dims();
        let strides = self.shape.strides();
        let mut pos = self.offset;
        for (axis, &i) in index.iter().skip(skip).enumerate().take(rank) {
            pos += (i % dims[axis]) * strides[axis];
        }
        pos
    }

    /// Layout of the sub-region selected by `ranges`. Axes with
    /// `end == start` are dropped and pinned at `start`.
    pub fn slice(&self, ranges: &[(usize, usize)]) -> Result<Layout> {
        let dims = self.shape.dims();
        let strides = self.shape.strides();
        if ranges.len() != dims.len() {
            return Err(Error::RankMismatch {
                expected: dims.len(),
                got: ranges.len(),
            });
        }
        let mut offset = self.offset;
        let mut new_dims = Vec::with_capacity(dims.len());
        let mut new_strides = Vec::with_capacity(dims.len());
        for (axis, &(start, end)) in ranges.iter().enumerate() {
            let dim = dims[axis];
            let dropped = end == start;
            let out_of_bounds = if dropped { start >= dim } else { end > dim };
            if end < start || out_of_bounds {
                return Err(Error::SliceOutOfBounds {
                    axis,
                    start,
                    end,
                    dim,
                });
            }
            offset += start * strides[axis];
            if !dropped {
                new_dims.push(end - start);
                new_strides.push(strides[axis]);
            }
        }
        Ok(Layout {
            shape: Shape::with_strides(new_dims, new_strides),
            offset,
        })
    }

    /// Buffer positions of every element, in logical row-major order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

/// Advance a row-major multi-index by one step. Returns `false` once the
/// index wraps around past the last element.
pub fn next_index(index: &mut [usize], dims: &[usize]) -> bool {
    for axis in (0..dims.len()).rev() {
        index[axis] += 1;
        if index[axis] < dims[axis] {
            return true;
        }
        index[axis] = 0;
    }
    false
}

// StridedIter - buffer positions in logical order
//
// For a contiguous layout this counts offset, offset+1, ... For a transposed
// shape or a slice view it jumps around the buffer following the strides.

/// Iterator over the buffer positions of a [`Layout`].
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        let shape = layout.shape();
        StridedIter {
            current: vec![0; shape.rank()],
            dims: shape.dims().to_vec(),
            strides: shape.strides().to_vec(),
            offset: layout.offset(),
            remaining: shape.raw_len(),
            started: false,
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            next_index(&mut self.current, &self.dims);
        }
        self.started = true;
        self.remaining -= 1;
        let pos = self
            .current
            .iter()
            .zip(&self.strides)
            .fold(self.offset, |acc, (&i, &s)| acc + i * s);
        Some(pos)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}
