use std::f64::consts::PI;
use std::fmt;

use rand::Rng;

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;

// Tensor - owned buffers and borrowed views
//
// A Tensor owns a flat Vec<f64> and a Layout describing how logical indices
// map into it. Cloning a Tensor is a deep copy: the clone never shares a
// buffer with its source.
//
// OWNERSHIP:
//
//   Tensor             owns its buffer and shape outright
//   TensorView<'a>     aliases a region of a parent buffer, read-only
//   TensorViewMut<'a>  aliases a region of a parent buffer, writes land in
//                      the parent
//
// Views are produced by `slice` / `slice_mut` and borrow the parent, so the
// borrow checker rejects any view that would outlive its parent or coexist
// with a conflicting mutable borrow. There is exactly one owner per buffer.
//
// STRIDES:
//
//   An owned tensor's shape is usually row-major, but the transpose kernel
//   produces owned tensors with swapped strides. Every accessor goes through
//   the stored strides, so such tensors read correctly; `contiguous()`
//   materializes them in row-major order when a caller needs a flat buffer.

/// Read access shared by owned tensors and views.
pub trait TensorAccess {
    fn layout(&self) -> &Layout;

    /// The whole underlying buffer (for a view: the parent's buffer).
    fn buffer(&self) -> &[f64];

    fn shape(&self) -> &Shape {
        self.layout().shape()
    }

    fn dims(&self) -> &[usize] {
        self.shape().dims()
    }

    fn rank(&self) -> usize {
        self.shape().rank()
    }

    fn raw_len(&self) -> usize {
        self.shape().raw_len()
    }

    /// Element at `index`. Fails if the index length differs from the rank
    /// or any entry is outside its axis.
    fn get(&self, index: &[usize]) -> Result<f64> {
        let pos = self.layout().checked_index(index)?;
        Ok(self.buffer()[pos])
    }

    /// Broadcast-aware element access against a virtual shape `vshape`.
    fn vget(&self, index: &[usize], vshape: &Shape) -> f64 {
        self.buffer()[self.layout().broadcast_index(index, vshape)]
    }

    /// Logical values in row-major order.
    fn to_vec(&self) -> Vec<f64> {
        let buf = self.buffer();
        self.layout().strided_indices().map(|i| buf[i]).collect()
    }

    /// Deep, contiguous copy owning its own buffer.
    fn to_tensor(&self) -> Tensor {
        Tensor {
            data: self.to_vec(),
            layout: Layout::new(self.shape().to_contiguous()),
        }
    }

    /// Read-only view over the region selected by `ranges`, one
    /// `(start, end)` pair per axis. `end == start` drops the axis.
    fn slice(&self, ranges: &[(usize, usize)]) -> Result<TensorView<'_>> {
        Ok(TensorView {
            data: self.buffer(),
            layout: self.layout().slice(ranges)?,
        })
    }
}

/// N-dimensional array owning its buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    data: Vec<f64>,
    layout: Layout,
}

impl Tensor {
    /// Zero-filled tensor.
    pub fn alloc(shape: impl Into<Shape>) -> Self {
        Self::fill(shape, 0.0)
    }

    /// Tensor with every element set to `value`.
    pub fn fill(shape: impl Into<Shape>, value: f64) -> Self {
        let shape = shape.into().to_contiguous();
        Tensor {
            data: vec![value; shape.raw_len()],
            layout: Layout::new(shape),
        }
    }

    pub fn ones(shape: impl Into<Shape>) -> Self {
        Self::fill(shape, 1.0)
    }

    /// Rank-0 tensor holding one value.
    pub fn scalar(value: f64) -> Self {
        Self::fill(Shape::scalar(), value)
    }

    /// Wrap row-major `data` in a tensor of the given shape.
    pub fn from_vec(data: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into().to_contiguous();
        if data.len() != shape.raw_len() {
            return Err(Error::ElementCountMismatch {
                expected: shape.raw_len(),
                got: data.len(),
                shape,
            });
        }
        Ok(Tensor {
            data,
            layout: Layout::new(shape),
        })
    }

    /// Owned tensor over `data` with an arbitrary (possibly permuted-stride)
    /// shape. `data.len()` must cover the shape.
    pub(crate) fn from_parts(data: Vec<f64>, shape: Shape) -> Self {
        debug_assert_eq!(data.len(), shape.raw_len());
        Tensor {
            data,
            layout: Layout::new(shape),
        }
    }

    /// 1-D tensor of `n` evenly spaced samples from `a` to `b` inclusive.
    ///
    /// ```ignore
    /// let t = Tensor::linspace(0.0, 1.0, 5)?;
    /// // => [0.0, 0.25, 0.5, 0.75, 1.0]
    /// ```
    pub fn linspace(a: f64, b: f64, n: usize) -> Result<Self> {
        if n < 2 {
            crate::bail!("linspace requires n >= 2, got {n}");
        }
        let step = (b - a) / (n as f64 - 1.0);
        let mut data: Vec<f64> = (0..n).map(|i| a + step * i as f64).collect();
        // pin the last sample so rounding never misses the end point
        data[n - 1] = b;
        Self::from_vec(data, n)
    }

    /// Normally distributed values with mean `mu` and standard deviation
    /// `sigma`, drawn with the Box-Muller transform from `rng`.
    pub fn random_normal<R: Rng + ?Sized>(
        shape: impl Into<Shape>,
        mu: f64,
        sigma: f64,
        rng: &mut R,
    ) -> Self {
        let shape = shape.into().to_contiguous();
        let len = shape.raw_len();
        let mut data = Vec::with_capacity(len + 1);
        while data.len() < len {
            // u1 in (0, 1] keeps ln(u1) finite
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen::<f64>();
            let radius = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * PI * u2;
            data.push(mu + sigma * radius * theta.cos());
            data.push(mu + sigma * radius * theta.sin());
        }
        data.truncate(len);
        Tensor {
            data,
            layout: Layout::new(shape),
        }
    }

    /// Raw buffer in storage order. Equal to logical order only when
    /// `is_contiguous()`.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn is_contiguous(&self) -> bool {
        self.layout.shape().is_contiguous()
    }

    /// The value of a single-element tensor, whatever its rank.
    pub fn scalar_value(&self) -> Option<f64> {
        (self.raw_len() == 1).then(|| self.data[0])
    }

    /// Row-major copy of this tensor. Already-contiguous tensors are cloned.
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            self.clone()
        } else {
            self.to_tensor()
        }
    }

    /// Replace the shape in place. The element count must match; a
    /// transposed tensor is first laid out row-major so the logical element
    /// order is preserved.
    pub fn reshape(&mut self, shape: impl Into<Shape>) -> Result<()> {
        let shape = shape.into().to_contiguous();
        if shape.raw_len() != self.raw_len() {
            return Err(Error::ReshapeElementMismatch {
                src: self.raw_len(),
                dst: shape.raw_len(),
                dst_shape: shape,
            });
        }
        if !self.is_contiguous() {
            self.data = self.to_vec();
        }
        self.layout = Layout::new(shape);
        Ok(())
    }

    /// Consuming variant of [`reshape`](Self::reshape).
    pub fn reshaped(mut self, shape: impl Into<Shape>) -> Result<Tensor> {
        self.reshape(shape)?;
        Ok(self)
    }

    /// Overwrite the element at `index`.
    pub fn set(&mut self, index: &[usize], value: f64) -> Result<()> {
        let pos = self.layout.checked_index(index)?;
        self.data[pos] = value;
        Ok(())
    }

    /// Mutable view over the region selected by `ranges`. Writes through the
    /// view land in this tensor.
    pub fn slice_mut(&mut self, ranges: &[(usize, usize)]) -> Result<TensorViewMut<'_>> {
        let layout = self.layout.slice(ranges)?;
        Ok(TensorViewMut {
            data: &mut self.data,
            layout,
        })
    }

    /// Apply `f` to every element, producing a contiguous tensor of the
    /// same dims.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        let data = self.to_vec().into_iter().map(f).collect();
        Tensor::from_parts(data, self.shape().to_contiguous())
    }
}

impl TensorAccess for Tensor {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn buffer(&self) -> &[f64] {
        &self.data
    }
}

/// Read-only alias of a region of another tensor's buffer.
#[derive(Debug, Clone)]
pub struct TensorView<'a> {
    data: &'a [f64],
    layout: Layout,
}

impl TensorAccess for TensorView<'_> {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn buffer(&self) -> &[f64] {
        self.data
    }
}

/// Mutable alias of a region of another tensor's buffer.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    data: &'a mut [f64],
    layout: Layout,
}

impl TensorViewMut<'_> {
    /// Overwrite the element at `index` (relative to this view).
    pub fn set(&mut self, index: &[usize], value: f64) -> Result<()> {
        let pos = self.layout.checked_index(index)?;
        self.data[pos] = value;
        Ok(())
    }

    /// Set every element of the view to `value`.
    pub fn fill(&mut self, value: f64) {
        for pos in self.layout.strided_indices() {
            self.data[pos] = value;
        }
    }

    /// Narrow this view further, keeping write access.
    pub fn slice_mut(&mut self, ranges: &[(usize, usize)]) -> Result<TensorViewMut<'_>> {
        let layout = self.layout.slice(ranges)?;
        Ok(TensorViewMut {
            data: &mut *self.data,
            layout,
        })
    }
}

impl TensorAccess for TensorViewMut<'_> {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn buffer(&self) -> &[f64] {
        self.data
    }
}

// Display: nested brackets, one row per innermost axis.

fn fmt_nested(t: &impl TensorAccess, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fn walk(
        t: &impl TensorAccess,
        index: &mut Vec<usize>,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let axis = index.len();
        if axis == t.rank() {
            let value = t.get(index).map_err(|_| fmt::Error)?;
            return write!(f, "{value:.4}");
        }
        write!(f, "[")?;
        for i in 0..t.dims()[axis] {
            if i > 0 {
                write!(f, ", ")?;
            }
            index.push(i);
            walk(t, index, f)?;
            index.pop();
        }
        write!(f, "]")
    }
    walk(t, &mut Vec::with_capacity(t.rank()), f)
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_nested(self, f)
    }
}

impl fmt::Display for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_nested(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_alloc_fill_ones() {
        let z = Tensor::alloc((2, 3));
        assert_eq!(z.to_vec(), vec![0.0; 6]);
        let f = Tensor::fill(4, 2.5);
        assert_eq!(f.to_vec(), vec![2.5; 4]);
        let o = Tensor::ones((1, 2));
        assert_eq!(o.dims(), &[1, 2]);
        assert_eq!(o.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_linspace_reshaped() {
        let mut t = Tensor::linspace(0.0, 1.0, 6).unwrap();
        t.reshape((2, 3)).unwrap();
        let expected = [[0.0, 0.2, 0.4], [0.6, 0.8, 1.0]];
        for (i, row) in expected.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                assert!(approx(t.get(&[i, j]).unwrap(), v, 1e-12));
            }
        }
        assert_eq!(t.get(&[1, 2]).unwrap(), 1.0);
    }

    #[test]
    fn test_linspace_needs_two_samples() {
        let err = Tensor::linspace(0.0, 1.0, 1).unwrap_err();
        assert_eq!(err.to_string(), "linspace requires n >= 2, got 1");
        assert!(Tensor::linspace(0.0, 1.0, 0).is_err());
    }

    #[test]
    fn test_random_normal_reproducible() {
        let a = Tensor::random_normal((3, 5), 1.0, 0.5, &mut StdRng::seed_from_u64(7));
        let b = Tensor::random_normal((3, 5), 1.0, 0.5, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.to_vec(), b.to_vec());
        assert_eq!(a.raw_len(), 15);

        let big = Tensor::random_normal(20_000, 1.0, 0.5, &mut StdRng::seed_from_u64(1));
        let values = big.to_vec();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        assert!(approx(mean, 1.0, 0.02));
        assert!(approx(var.sqrt(), 0.5, 0.02));
    }

    #[test]
    fn test_get_bounds() {
        let t = Tensor::alloc((2, 3));
        assert!(t.get(&[1, 2]).is_ok());
        assert!(t.get(&[2, 0]).is_err());
        assert!(t.get(&[0]).is_err());
    }

    #[test]
    fn test_reshape_rejects_count_mismatch() {
        let mut t = Tensor::alloc((2, 3));
        assert!(t.reshape((4, 2)).is_err());
        assert_eq!(t.dims(), &[2, 3]);
        t.reshape((3, 2)).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
    }

    #[test]
    fn test_copy_is_deep() {
        let x = Tensor::linspace(0.0, 1.0, 4).unwrap();
        let mut y = x.clone();
        y.set(&[0], 42.0).unwrap();
        assert_eq!(x.get(&[0]).unwrap(), 0.0);
        assert_eq!(y.get(&[0]).unwrap(), 42.0);
    }

    #[test]
    fn test_slice_aliases_parent() {
        let mut x = Tensor::from_vec((0..12).map(|v| v as f64).collect(), (3, 4)).unwrap();
        {
            let mut col = x.slice_mut(&[(0, 3), (2, 2)]).unwrap();
            assert_eq!(col.dims(), &[3]);
            assert_eq!(col.to_vec(), vec![2.0, 6.0, 10.0]);
            col.set(&[1], -1.0).unwrap();
        }
        assert_eq!(x.get(&[1, 2]).unwrap(), -1.0);

        {
            let mut block = x.slice_mut(&[(1, 3), (0, 2)]).unwrap();
            block.fill(9.0);
        }
        assert_eq!(x.get(&[2, 1]).unwrap(), 9.0);
        assert_eq!(x.get(&[0, 0]).unwrap(), 0.0);
    }

    #[test]
    fn test_slice_of_slice() {
        let x = Tensor::from_vec((0..24).map(|v| v as f64).collect(), (2, 3, 4)).unwrap();
        let plane = x.slice(&[(1, 1), (0, 3), (0, 4)]).unwrap();
        assert_eq!(plane.dims(), &[3, 4]);
        let cell = plane.slice(&[(2, 3), (1, 3)]).unwrap();
        assert_eq!(cell.to_vec(), vec![21.0, 22.0]);
        // bounds use the view's own shape
        assert!(cell.get(&[1, 0]).is_err());
        assert_eq!(cell.get(&[0, 1]).unwrap(), 22.0);
        assert!(x.slice(&[(0, 2), (2, 1), (0, 4)]).is_err());
    }

    #[test]
    fn test_reshape_transposed_preserves_logical_order() {
        let t = Tensor::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], (2, 3)).unwrap();
        let shape = t.shape().transpose(0, 1).unwrap();
        let mut tt = Tensor::from_parts(t.as_slice().to_vec(), shape);
        assert_eq!(tt.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        tt.reshape(6).unwrap();
        assert_eq!(tt.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert!(tt.is_contiguous());
    }

    #[test]
    fn test_display() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], (2, 2)).unwrap();
        assert_eq!(t.to_string(), "[[1.0000, 2.0000], [3.0000, 4.0000]]");
        assert_eq!(Tensor::scalar(0.5).to_string(), "0.5000");
    }

    proptest! {
        #[test]
        fn prop_reshape_preserves_row_major_order(
            dims in prop::collection::vec(1usize..4, 1..4),
            rows in 1usize..4,
        ) {
            let src = Shape::new(dims);
            let len = src.raw_len();
            prop_assume!(len % rows == 0);
            let data: Vec<f64> = (0..len).map(|v| v as f64).collect();
            let x = Tensor::from_vec(data, src.clone()).unwrap();
            let target = Shape::from((rows, len / rows));
            let y = x.clone().reshaped(target.clone()).unwrap();
            for linear in 0..len {
                let idx = target.unravel(linear);
                let back = src.unravel(target.ravel(&idx));
                prop_assert_eq!(y.get(&idx).unwrap(), x.get(&back).unwrap());
            }
        }
    }
}
