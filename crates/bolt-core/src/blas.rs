use std::borrow::Cow;

use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};

// BLAS - general matrix multiply
//
// The dot kernel needs exactly one linear-algebra primitive:
//
//   C = alpha * A * B + beta * C
//
// with A (m x k), B (k x n), C (m x n), all row-major with explicit leading
// dimensions (the distance between consecutive rows). No transpose flags.
//
// FaerBlas runs the product through faer. faer prefers column-major output,
// so it computes C^T = B^T * A^T into a column-major (n x m) view, which is
// byte-for-byte the row-major (m x n) C. ReferenceBlas is the plain triple
// loop, kept for cross-checking.

/// Row-major general matrix multiply.
pub trait Blas {
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        beta: f64,
        c: &mut [f64],
        ldc: usize,
    );
}

/// gemm backed by `faer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerBlas;

/// Rows of a row-major matrix with leading dimension `ld`, packed densely.
fn pack(src: &[f64], rows: usize, cols: usize, ld: usize) -> Cow<'_, [f64]> {
    if ld == cols {
        return Cow::Borrowed(&src[..rows * cols]);
    }
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        out.extend_from_slice(&src[r * ld..r * ld + cols]);
    }
    Cow::Owned(out)
}

impl Blas for FaerBlas {
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        beta: f64,
        c: &mut [f64],
        ldc: usize,
    ) {
        if m == 0 || n == 0 {
            return;
        }
        let mut packed_c: Vec<f64> = pack(c, m, n, ldc).into_owned();
        if beta == 0.0 {
            packed_c.iter_mut().for_each(|v| *v = 0.0);
        } else if beta != 1.0 {
            packed_c.iter_mut().for_each(|v| *v *= beta);
        }

        if k > 0 {
            let a = pack(a, m, k, lda);
            let b = pack(b, k, n, ldb);
            let lhs_view = MatRef::from_row_major_slice(&*a, m, k);
            let rhs_view = MatRef::from_row_major_slice(&*b, k, n);
            let a_t = lhs_view.transpose();
            let b_t = rhs_view.transpose();
            let mut out_view = MatMut::from_column_major_slice_mut(packed_c.as_mut_slice(), n, m);
            let accum = if beta == 0.0 {
                Accum::Replace
            } else {
                Accum::Add
            };
            matmul(&mut out_view, accum, b_t, a_t, alpha, Par::Seq);
        }

        for r in 0..m {
            c[r * ldc..r * ldc + n].copy_from_slice(&packed_c[r * n..(r + 1) * n]);
        }
    }
}

/// Naive triple-loop gemm.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceBlas;

impl Blas for ReferenceBlas {
    fn gemm(
        &self,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        beta: f64,
        c: &mut [f64],
        ldc: usize,
    ) {
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for p in 0..k {
                    acc += a[i * lda + p] * b[p * ldb + j];
                }
                let prev = if beta == 0.0 { 0.0 } else { beta * c[i * ldc + j] };
                c[i * ldc + j] = alpha * acc + prev;
            }
        }
    }
}
