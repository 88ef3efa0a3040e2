use crate::blas::Blas;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorAccess};

/// Swap axes `a1` and `a2`.
///
/// The result owns a copy of the operand's data under a copy of its shape
/// with the two dim and stride entries swapped, so it reads transposed
/// without moving any element. A 1-D operand is first promoted to the row
/// vector `(1, n)`.
pub fn transpose(x: &Tensor, a1: usize, a2: usize) -> Result<Tensor> {
    let src = x.contiguous();
    let shape = if src.rank() == 1 {
        Shape::from((1, src.dims()[0]))
    } else {
        src.shape().clone()
    };
    let swapped = shape.transpose(a1, a2)?;
    Ok(Tensor::from_parts(src.as_slice().to_vec(), swapped))
}

/// Matrix product of two operands of rank at most 2.
///
/// A 1-D left operand is treated as a row `(1, k)` and a 1-D right operand
/// as a column `(k, 1)`. The result is 1-D when the left operand was 1-D
/// and 2-D otherwise. The multiply-accumulate runs through `blas` with
/// `alpha = 1, beta = 0`.
pub fn dot(lhs: &Tensor, rhs: &Tensor, blas: &dyn Blas) -> Result<Tensor> {
    let (m, k1) = match *lhs.dims() {
        [k] => (1, k),
        [m, k] => (m, k),
        _ => {
            return Err(Error::RankMismatch {
                expected: 2,
                got: lhs.rank(),
            })
        }
    };
    let (k2, n) = match *rhs.dims() {
        [k] => (k, 1),
        [k, n] => (k, n),
        _ => {
            return Err(Error::RankMismatch {
                expected: 2,
                got: rhs.rank(),
            })
        }
    };
    if k1 != k2 {
        return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
    }

    let a = lhs.contiguous();
    let b = rhs.contiguous();
    let mut c = vec![0.0; m * n];
    tracing::trace!(m, n, k = k1, "dot");
    blas.gemm(m, n, k1, 1.0, a.as_slice(), k1, b.as_slice(), n, 0.0, &mut c, n);

    let out_shape = if lhs.rank() == 1 {
        Shape::from(n)
    } else {
        Shape::from((m, n))
    };
    Tensor::from_vec(c, out_shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas::{FaerBlas, ReferenceBlas};

    #[test]
    fn test_outer_product_8x8() {
        let a = Tensor::linspace(0.0, 1.0, 8).unwrap().reshaped((8, 1)).unwrap();
        let b = Tensor::linspace(0.0, 1.0, 8).unwrap().reshaped((1, 8)).unwrap();
        let c = dot(&a, &b, &FaerBlas).unwrap();
        assert_eq!(c.dims(), &[8, 8]);
        for i in 0..8 {
            for j in 0..8 {
                let expected = (i as f64 / 7.0) * (j as f64 / 7.0);
                assert!((c.get(&[i, j]).unwrap() - expected).abs() < 1e-12);
            }
        }
        // spot-check a few cells of the table
        assert!((c.get(&[7, 7]).unwrap() - 1.0).abs() < 1e-12);
        assert!((c.get(&[1, 2]).unwrap() - 2.0 / 49.0).abs() < 1e-12);
    }

    #[test]
    fn test_vector_matrix_is_1d() {
        let v = Tensor::from_vec(vec![1.0, 2.0], 2).unwrap();
        let m = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
        let out = dot(&v, &m, &ReferenceBlas).unwrap();
        assert_eq!(out.dims(), &[3]);
        assert_eq!(out.to_vec(), vec![9.0, 12.0, 15.0]);
    }

    #[test]
    fn test_matrix_vector_is_column() {
        let m = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], (2, 2)).unwrap();
        let v = Tensor::from_vec(vec![1.0, 1.0], 2).unwrap();
        let out = dot(&m, &v, &FaerBlas).unwrap();
        assert_eq!(out.dims(), &[2, 1]);
        assert_eq!(out.to_vec(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_dot_errors() {
        let a = Tensor::alloc((2, 3));
        let b = Tensor::alloc((2, 3));
        assert!(matches!(
            dot(&a, &b, &FaerBlas),
            Err(Error::MatmulShapeMismatch { k1: 3, k2: 2, .. })
        ));
        let cube = Tensor::alloc((2, 2, 2));
        assert!(matches!(
            dot(&cube, &a, &FaerBlas),
            Err(Error::RankMismatch { got: 3, .. })
        ));
    }

    #[test]
    fn test_dot_of_transposed_operand() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
        let at = transpose(&a, 0, 1).unwrap();
        let gram = dot(&a, &at, &FaerBlas).unwrap();
        assert_eq!(gram.to_vec(), vec![14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn test_transpose_swaps_strides_on_a_copy() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
        let t = transpose(&a, 0, 1).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.shape().strides(), &[1, 3]);
        assert_eq!(t.get(&[2, 1]).unwrap(), 6.0);
        assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        // operand untouched
        assert_eq!(a.dims(), &[2, 3]);
        assert_eq!(a.shape().strides(), &[3, 1]);
    }

    #[test]
    fn test_transpose_promotes_vector() {
        let v = Tensor::from_vec(vec![1.0, 2.0, 3.0], 3).unwrap();
        let col = transpose(&v, 0, 1).unwrap();
        assert_eq!(col.dims(), &[3, 1]);
        assert_eq!(col.to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(transpose(&v, 0, 2).is_err());
    }
}
