//! Broadcast-reduce: undo a forward broadcast when propagating a cotangent
//! back to an operand's original shape (spec §4.G). `reduce_to_shape` and
//! `expand_to_shape` are each other's backward rule, so the reduction
//! itself is differentiable and higher-order gradients through a
//! broadcasted op keep working.

use crate::array::Array;
use crate::autograd::node::BackwardNode;
use crate::error::TensorResult;
use crate::tensor::Tensor;
use std::cell::RefCell;
use std::rc::Rc;

/// Sum away the axes a forward broadcast introduced, returning an array of
/// exactly `target_shape`: leading extra axes are summed out entirely,
/// and any axis that is `1` in `target_shape` but larger in `arr` is
/// summed with `keepdims`.
fn reduce_array_to_shape(arr: &Array, target_shape: &[usize]) -> TensorResult<Array> {
    let extra = arr.ndim() - target_shape.len();
    let mut cur = arr.clone();
    for _ in 0..extra {
        cur = cur.sum_dim(0, false)?;
    }
    for (axis, &want) in target_shape.iter().enumerate() {
        if want == 1 && cur.shape().dims()[axis] != 1 {
            cur = cur.sum_dim(axis, true)?;
        }
    }
    Ok(cur)
}

/// Broadcast `arr` (which must already broadcast-match) up to `target_shape`.
fn expand_array_to_shape(arr: &Array, target_shape: &[usize]) -> TensorResult<Array> {
    let zeros = Array::zeros(target_shape.to_vec(), arr.dtype())?;
    zeros.add(arr)
}

/// Reduce `grad`'s broadcasted shape down to `target_shape`, building a
/// backward node (`expand_to_shape`) so the reduction composes with
/// `create_graph`.
pub fn reduce_to_shape(grad: &Tensor, target_shape: &[usize]) -> TensorResult<Tensor> {
    if grad.shape().dims() == target_shape {
        return Ok(grad.clone());
    }
    let reduced = reduce_array_to_shape(&grad.data(), target_shape)?;
    let needs_grad = grad.requires_grad();
    let out = Tensor::tensor_init(reduced, needs_grad, None)?;
    if needs_grad {
        let grad_clone = grad.clone();
        let original_shape: Vec<usize> = grad.shape().dims().to_vec();
        let node = BackwardNode::new(
            "ReduceToShape",
            vec![Some(grad_clone)],
            Box::new(move |upstream: &Tensor| {
                let expanded = expand_to_shape(upstream, &original_shape)?;
                Ok(vec![Some(expanded)])
            }),
        );
        out.set_backward_fn(Rc::new(RefCell::new(node)));
    }
    Ok(out)
}

/// Inverse of [`reduce_to_shape`]: broadcast `grad` up to `target_shape`,
/// installing `reduce_to_shape` as its backward rule.
pub fn expand_to_shape(grad: &Tensor, target_shape: &[usize]) -> TensorResult<Tensor> {
    if grad.shape().dims() == target_shape {
        return Ok(grad.clone());
    }
    let expanded = expand_array_to_shape(&grad.data(), target_shape)?;
    let needs_grad = grad.requires_grad();
    let out = Tensor::tensor_init(expanded, needs_grad, None)?;
    if needs_grad {
        let grad_clone = grad.clone();
        let original_shape: Vec<usize> = grad.shape().dims().to_vec();
        let node = BackwardNode::new(
            "ExpandToShape",
            vec![Some(grad_clone)],
            Box::new(move |upstream: &Tensor| {
                let reduced = reduce_to_shape(upstream, &original_shape)?;
                Ok(vec![Some(reduced)])
            }),
        );
        out.set_backward_fn(Rc::new(RefCell::new(node)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn reduces_row_broadcast() {
        let a = Array::ones(vec![3, 4], DType::F32).unwrap();
        let t = Tensor::tensor_init(a, false, None).unwrap();
        let r = reduce_to_shape(&t, &[4]).unwrap();
        assert_eq!(r.shape().dims(), &[4]);
        assert_eq!(r.data().value_at(&[0]).unwrap().as_f64(), 3.0);
    }

    #[test]
    fn reduces_keepdim_broadcast() {
        let a = Array::ones(vec![3, 4], DType::F32).unwrap();
        let t = Tensor::tensor_init(a, false, None).unwrap();
        let r = reduce_to_shape(&t, &[3, 1]).unwrap();
        assert_eq!(r.shape().dims(), &[3, 1]);
        assert_eq!(r.data().value_at(&[0, 0]).unwrap().as_f64(), 4.0);
    }
}
