// Kernel tests - kernels over views, transposed layouts and both gemm paths

use bolt_core::kernels::{self, binary};
use bolt_core::{BinaryOp, Blas, FaerBlas, ReferenceBlas, Tensor, TensorAccess, UnaryOp};
use proptest::prelude::*;

fn seq(n: usize) -> Vec<f64> {
    (0..n).map(|v| v as f64).collect()
}

#[test]
fn test_kernels_read_views_through_copies() {
    let parent = Tensor::from_vec(seq(12), (3, 4)).unwrap();
    let block = parent.slice(&[(1, 3), (1, 3)]).unwrap().to_tensor();
    assert_eq!(block.to_vec(), vec![5.0, 6.0, 9.0, 10.0]);

    let doubled = binary(BinaryOp::Mul, &block, &Tensor::scalar(2.0), &FaerBlas).unwrap();
    assert_eq!(doubled.to_vec(), vec![10.0, 12.0, 18.0, 20.0]);
    // the parent is untouched
    assert_eq!(parent.get(&[1, 1]).unwrap(), 5.0);
}

#[test]
fn test_elementwise_on_transposed_operand() {
    let x = Tensor::from_vec(seq(6), (2, 3)).unwrap();
    let xt = kernels::transpose(&x, 0, 1).unwrap();
    assert!(!xt.is_contiguous());
    let y = kernels::elementwise(BinaryOp::Add, &xt, &Tensor::ones((3, 2))).unwrap();
    assert_eq!(y.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    let e = kernels::unary(UnaryOp::Neg, &xt);
    assert_eq!(e.dims(), &[3, 2]);
    assert_eq!(e.to_vec(), vec![0.0, -3.0, -1.0, -4.0, -2.0, -5.0]);
}

#[test]
fn test_dot_then_reduce() {
    let a = Tensor::from_vec(seq(6), (2, 3)).unwrap();
    let b = Tensor::ones((3, 4));
    let c = kernels::dot(&a, &b, &FaerBlas).unwrap();
    assert_eq!(c.dims(), &[2, 4]);
    let rows = kernels::axis(bolt_core::AxisOp::Max, &c, 1).unwrap();
    assert_eq!(rows.to_vec(), vec![3.0, 12.0]);
}

proptest! {
    #[test]
    fn prop_faer_matches_reference(m in 1usize..6, n in 1usize..6, k in 1usize..6, seed in 0u64..1000) {
        let a: Vec<f64> = (0..m * k).map(|i| ((i as u64 * 31 + seed) % 17) as f64 - 8.0).collect();
        let b: Vec<f64> = (0..k * n).map(|i| ((i as u64 * 13 + seed) % 11) as f64 - 5.0).collect();
        let mut fast = vec![1.0; m * n];
        let mut slow = vec![1.0; m * n];
        FaerBlas.gemm(m, n, k, 0.5, &a, k, &b, n, 2.0, &mut fast, n);
        ReferenceBlas.gemm(m, n, k, 0.5, &a, k, &b, n, 2.0, &mut slow, n);
        for (x, y) in fast.iter().zip(&slow) {
            prop_assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_transpose_twice_is_identity(rows in 1usize..5, cols in 1usize..5) {
        let x = Tensor::from_vec(seq(rows * cols), (rows, cols)).unwrap();
        let back = kernels::transpose(&kernels::transpose(&x, 0, 1).unwrap(), 0, 1).unwrap();
        prop_assert_eq!(back.dims(), x.dims());
        prop_assert_eq!(back.to_vec(), x.to_vec());
    }
}
