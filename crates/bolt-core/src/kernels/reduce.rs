use super::AxisOp;
use crate::error::Result;
use crate::layout::next_index;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorAccess};

/// Run an axis-bound op along `axis`.
///
/// Reducing ops drop the axis; a 1-D source reduces to shape `(1,)`.
/// Softmax keeps the operand's dims. Fails if `axis >= rank`.
pub fn axis(op: AxisOp, x: &Tensor, axis: usize) -> Result<Tensor> {
    let extent = x.shape().dim(axis)?;
    if op == AxisOp::Softmax {
        return softmax(x, axis);
    }

    let rank = x.rank();
    let dims = x.dims();
    let mut reduced: Vec<usize> = dims.to_vec();
    reduced.remove(axis);
    let out_shape = if reduced.is_empty() {
        Shape::from(1)
    } else {
        Shape::new(reduced.clone())
    };

    let mut data = Vec::with_capacity(out_shape.raw_len());
    let mut lane = Vec::with_capacity(extent);
    let mut out_index = vec![0usize; reduced.len()];
    let mut full_index = vec![0usize; rank];
    if out_shape.raw_len() > 0 {
        loop {
            // full index = reduced index with the reduced axis re-inserted
            full_index[..axis].copy_from_slice(&out_index[..axis]);
            full_index[axis + 1..].copy_from_slice(&out_index[axis..]);
            lane.clear();
            for k in 0..extent {
                full_index[axis] = k;
                lane.push(x.get(&full_index)?);
            }
            data.push(fold_lane(op, &lane));
            if !next_index(&mut out_index, &reduced) {
                break;
            }
        }
    }
    Tensor::from_vec(data, out_shape)
}

fn fold_lane(op: AxisOp, lane: &[f64]) -> f64 {
    let n = lane.len() as f64;
    match op {
        AxisOp::Sum => lane.iter().sum(),
        AxisOp::Product => lane.iter().product(),
        AxisOp::Min => lane.iter().copied().fold(f64::INFINITY, f64::min),
        AxisOp::Max => lane.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AxisOp::Mean => lane.iter().sum::<f64>() / n,
        AxisOp::Variance => {
            let mean = lane.iter().sum::<f64>() / n;
            lane.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
        }
        AxisOp::ArgMin => arg_best(lane, |candidate, best| candidate < best),
        AxisOp::ArgMax => arg_best(lane, |candidate, best| candidate > best),
        AxisOp::Softmax => unreachable!("softmax does not fold"),
    }
}

// first index wins on ties
fn arg_best(lane: &[f64], better: impl Fn(f64, f64) -> bool) -> f64 {
    let mut best = 0usize;
    for (i, &v) in lane.iter().enumerate().skip(1) {
        if better(v, lane[best]) {
            best = i;
        }
    }
    best as f64
}

// exp(x - max) / sum(exp(x - max)) along one axis
fn softmax(x: &Tensor, axis: usize) -> Result<Tensor> {
    let shape = x.shape().to_contiguous();
    let stride = shape.strides()[axis];
    let extent = shape.dims()[axis];
    let mut data = x.to_vec();
    let mut outer = shape.dims().to_vec();
    outer[axis] = 1;
    let outer = Shape::new(outer);
    for linear in 0..outer.raw_len() {
        let start = shape.ravel(&outer.unravel(linear));
        let lane = (0..extent).map(move |k| start + k * stride);
        let max = lane.clone().map(|p| data[p]).fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for p in lane.clone() {
            data[p] = (data[p] - max).exp();
            total += data[p];
        }
        for p in lane {
            data[p] /= total;
        }
    }
    Tensor::from_vec(data, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sum_axis1_of_4d() {
        let x = Tensor::from_vec((0..54).map(|v| v as f64).collect(), (3, 3, 3, 2)).unwrap();
        let s = axis(AxisOp::Sum, &x, 1).unwrap();
        assert_eq!(s.dims(), &[3, 3, 2]);
        for i in 0..3 {
            for k in 0..3 {
                for l in 0..2 {
                    let expected: f64 = (0..3).map(|j| x.get(&[i, j, k, l]).unwrap()).sum();
                    assert!(approx(s.get(&[i, k, l]).unwrap(), expected));
                }
            }
        }
    }

    #[test]
    fn test_reduce_1d_keeps_single_axis() {
        let x = Tensor::from_vec(vec![3.0, -1.0, 4.0, -1.0], 4).unwrap();
        let s = axis(AxisOp::Sum, &x, 0).unwrap();
        assert_eq!(s.dims(), &[1]);
        assert_eq!(s.to_vec(), vec![5.0]);
        assert_eq!(axis(AxisOp::Product, &x, 0).unwrap().to_vec(), vec![12.0]);
        assert_eq!(axis(AxisOp::Min, &x, 0).unwrap().to_vec(), vec![-1.0]);
        assert_eq!(axis(AxisOp::Max, &x, 0).unwrap().to_vec(), vec![4.0]);
        // first occurrence of the minimum
        assert_eq!(axis(AxisOp::ArgMin, &x, 0).unwrap().to_vec(), vec![1.0]);
        assert_eq!(axis(AxisOp::ArgMax, &x, 0).unwrap().to_vec(), vec![2.0]);
        assert!(approx(axis(AxisOp::Mean, &x, 0).unwrap().to_vec()[0], 1.25));
        assert!(approx(axis(AxisOp::Variance, &x, 0).unwrap().to_vec()[0], 5.1875));
    }

    #[test]
    fn test_reduce_last_axis_of_matrix() {
        let x = Tensor::from_vec(vec![1.0, 5.0, 2.0, 7.0, 0.0, 3.0], (2, 3)).unwrap();
        assert_eq!(axis(AxisOp::Max, &x, 1).unwrap().to_vec(), vec![5.0, 7.0]);
        assert_eq!(axis(AxisOp::ArgMax, &x, 1).unwrap().to_vec(), vec![1.0, 0.0]);
        assert_eq!(axis(AxisOp::Sum, &x, 0).unwrap().to_vec(), vec![8.0, 5.0, 5.0]);
    }

    #[test]
    fn test_axis_out_of_range() {
        let x = Tensor::alloc((2, 2));
        assert!(matches!(
            axis(AxisOp::Sum, &x, 2),
            Err(Error::DimOutOfRange { axis: 2, rank: 2 })
        ));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0], (2, 3)).unwrap();
        let s = axis(AxisOp::Softmax, &x, 1).unwrap();
        assert_eq!(s.dims(), &[2, 3]);
        let v = s.to_vec();
        assert!(approx(v[0] + v[1] + v[2], 1.0));
        assert!(approx(v[3], 1.0 / 3.0));
        assert!(v[2] > v[1] && v[1] > v[0]);

        let cols = axis(AxisOp::Softmax, &x, 0).unwrap();
        assert!(approx(cols.get(&[1, 0]).unwrap(), 1.0));
    }
}
