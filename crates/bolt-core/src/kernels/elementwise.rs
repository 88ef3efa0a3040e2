use super::{BinaryOp, UnaryOp};
use crate::error::{Error, Result};
use crate::layout::next_index;
use crate::shape::{Broadcast, Shape};
use crate::tensor::{Tensor, TensorAccess};

/// Elementwise binary op with broadcasting.
///
/// The operands are checked with [`Shape::can_broadcast`]; the output has
/// the virtual shape built from the dominant operand, and each cell reads
/// both operands through `vget` so size-1 and missing axes repeat.
pub fn elementwise(op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let Some(f) = op.scalar_fn() else {
        crate::bail!("{op} is not an elementwise op");
    };
    let (ls, rs) = (lhs.shape(), rhs.shape());
    let vshape = match Shape::can_broadcast(ls, rs) {
        Broadcast::Incompatible => {
            return Err(Error::BroadcastMismatch {
                lhs: ls.clone(),
                rhs: rs.clone(),
            })
        }
        Broadcast::LhsDominant => Shape::virtual_shape(ls, rs),
        Broadcast::RhsDominant => Shape::virtual_shape(rs, ls),
    };

    let len = vshape.raw_len();
    let mut data = Vec::with_capacity(len);
    if len > 0 {
        let mut index = vec![0usize; vshape.rank()];
        loop {
            data.push(f(lhs.vget(&index, &vshape), rhs.vget(&index, &vshape)));
            if !next_index(&mut index, vshape.dims()) {
                break;
            }
        }
    }
    Tensor::from_vec(data, vshape)
}

/// Elementwise unary map; the output keeps the operand's dims.
pub fn unary(op: UnaryOp, x: &Tensor) -> Tensor {
    x.map(|v| op.apply(v))
}
