//! Forward operations that install a [`BackwardNode`] whenever an operand
//! requires grad (spec §4.E). Backward rules are expressed by calling back
//! into these same tensor-level functions rather than working on raw
//! arrays, so a gradient computed with `create_graph = true` builds its
//! own graph for free: the upstream gradient tensor simply carries
//! `requires_grad` through.

use crate::arena;
use crate::array::Array;
use crate::autograd::broadcast_reduce::reduce_to_shape;
use crate::autograd::node::BackwardNode;
use crate::error::{TensorError, TensorResult};
use crate::tensor::Tensor;
use std::cell::RefCell;
use std::rc::Rc;

fn operand_edge(t: &Tensor) -> Option<Tensor> {
    if t.requires_grad() {
        Some(t.clone())
    } else {
        None
    }
}

fn any_requires_grad(a: &Tensor, b: &Tensor) -> bool {
    a.requires_grad() || b.requires_grad()
}

fn install_binary_node(
    out: &Tensor,
    name: &'static str,
    a: &Tensor,
    b: &Tensor,
    grad_fn: impl Fn(&Tensor) -> TensorResult<(Option<Tensor>, Option<Tensor>)> + 'static,
) {
    let a_edge = operand_edge(a);
    let b_edge = operand_edge(b);
    let node = BackwardNode::new(
        name,
        vec![a_edge, b_edge],
        Box::new(move |g| {
            let (ga, gb) = grad_fn(g)?;
            Ok(vec![ga, gb])
        }),
    );
    out.set_backward_fn(Rc::new(RefCell::new(node)));
}

fn install_unary_node(
    out: &Tensor,
    name: &'static str,
    a: &Tensor,
    grad_fn: impl Fn(&Tensor) -> TensorResult<Option<Tensor>> + 'static,
) {
    let a_edge = operand_edge(a);
    let node = BackwardNode::new(
        name,
        vec![a_edge],
        Box::new(move |g| Ok(vec![grad_fn(g)?])),
    );
    out.set_backward_fn(Rc::new(RefCell::new(node)));
}

pub fn add(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().add(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Add", a, b, move |g| {
            Ok((Some(reduce_to_shape(g, &a_shape)?), Some(reduce_to_shape(g, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn sub(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().sub(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Sub", a, b, move |g| {
            let neg_g = neg(g)?;
            Ok((Some(reduce_to_shape(g, &a_shape)?), Some(reduce_to_shape(&neg_g, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn mul(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().mul(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_ref = a.clone();
        let b_ref = b.clone();
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Mul", a, b, move |g| {
            let ga = mul(g, &b_ref)?;
            let gb = mul(g, &a_ref)?;
            Ok((Some(reduce_to_shape(&ga, &a_shape)?), Some(reduce_to_shape(&gb, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn div(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().div(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_ref = a.clone();
        let b_ref = b.clone();
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Div", a, b, move |g| {
            let ga = div(g, &b_ref)?;
            let b_sq = mul(&b_ref, &b_ref)?;
            let a_over_bsq = div(&a_ref, &b_sq)?;
            let gb = neg(&mul(g, &a_over_bsq)?)?;
            Ok((Some(reduce_to_shape(&ga, &a_shape)?), Some(reduce_to_shape(&gb, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn max(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().max(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_ref = a.clone();
        let b_ref = b.clone();
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Max", a, b, move |g| {
            let mask_a = Tensor::tensor_init(a_ref.data().ge(&b_ref.data())?, false, None)?;
            let mask_b = Tensor::tensor_init(b_ref.data().gt(&a_ref.data())?, false, None)?;
            let ga = mul(g, &mask_a)?;
            let gb = mul(g, &mask_b)?;
            Ok((Some(reduce_to_shape(&ga, &a_shape)?), Some(reduce_to_shape(&gb, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn min(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().min(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_ref = a.clone();
        let b_ref = b.clone();
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Min", a, b, move |g| {
            let mask_a = Tensor::tensor_init(a_ref.data().le(&b_ref.data())?, false, None)?;
            let mask_b = Tensor::tensor_init(b_ref.data().lt(&a_ref.data())?, false, None)?;
            let ga = mul(g, &mask_a)?;
            let gb = mul(g, &mask_b)?;
            Ok((Some(reduce_to_shape(&ga, &a_shape)?), Some(reduce_to_shape(&gb, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn neg(a: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().neg()?;
    let needs_grad = a.requires_grad() && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, a.env().as_ref())?;
    if needs_grad {
        install_unary_node(&out, "Neg", a, |g| Ok(Some(neg(g)?)));
    }
    Ok(out)
}

pub fn inv(a: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().inv()?;
    let needs_grad = a.requires_grad() && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, a.env().as_ref())?;
    if needs_grad {
        let a_ref = a.clone();
        install_unary_node(&out, "Inv", a, move |g| {
            let a_sq = mul(&a_ref, &a_ref)?;
            let a_sq_inv = inv(&a_sq)?;
            Ok(Some(neg(&mul(g, &a_sq_inv)?)?))
        });
    }
    Ok(out)
}

fn invert_permutation(dims: &[usize]) -> Vec<usize> {
    let mut inv = vec![0usize; dims.len()];
    for (i, &d) in dims.iter().enumerate() {
        inv[d] = i;
    }
    inv
}

/// General-axis permutation. The backward rule applies the *inverse*
/// permutation to the upstream gradient, not `dims` itself.
pub fn transpose(a: &Tensor, dims: &[usize]) -> TensorResult<Tensor> {
    let data = a.data().transpose(dims)?;
    let needs_grad = a.requires_grad() && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, a.env().as_ref())?;
    if needs_grad {
        let inv_dims = invert_permutation(dims);
        install_unary_node(&out, "Transpose", a, move |g| Ok(Some(transpose(g, &inv_dims)?)));
    }
    Ok(out)
}

pub fn sum(a: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().sum()?;
    let needs_grad = a.requires_grad() && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, a.env().as_ref())?;
    if needs_grad {
        let a_shape = a.shape().dims().to_vec();
        install_unary_node(&out, "Sum", a, move |g| {
            let expanded = Array::zeros(a_shape.clone(), g.dtype())?.add(&g.data())?;
            Ok(Some(Tensor::tensor_init(expanded, g.requires_grad(), None)?))
        });
    }
    Ok(out)
}

pub fn sum_dim(a: &Tensor, dim: usize, keepdims: bool) -> TensorResult<Tensor> {
    let data = a.data().sum_dim(dim, keepdims)?;
    let needs_grad = a.requires_grad() && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, a.env().as_ref())?;
    if needs_grad {
        let a_shape = a.shape().dims().to_vec();
        install_unary_node(&out, "SumDim", a, move |g| {
            let g_kept = if keepdims {
                g.data()
            } else {
                let mut kept = a_shape.clone();
                kept[dim] = 1;
                g.data().reshape_contiguous(kept)?
            };
            let expanded = Array::zeros(a_shape.clone(), g_kept.dtype())?.add(&g_kept)?;
            Ok(Some(Tensor::tensor_init(expanded, g.requires_grad(), None)?))
        });
    }
    Ok(out)
}

/// Batched `(..., m, k) @ (..., k, n) -> (..., m, n)`.
pub fn matmul(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let data = a.data().matmul(&b.data())?;
    let env = arena::resolve(a.env().as_ref(), b.env().as_ref())?;
    let needs_grad = any_requires_grad(a, b) && data.dtype().is_float();
    let out = Tensor::tensor_init(data, needs_grad, env.as_ref())?;
    if needs_grad {
        let a_ref = a.clone();
        let b_ref = b.clone();
        let a_shape = a.shape().dims().to_vec();
        let b_shape = b.shape().dims().to_vec();
        install_binary_node(&out, "Matmul", a, b, move |g| {
            let last_two_swap = |ndim: usize| -> Vec<usize> {
                let mut perm: Vec<usize> = (0..ndim).collect();
                perm.swap(ndim - 2, ndim - 1);
                perm
            };
            let bt = transpose(&b_ref, &last_two_swap(b_ref.shape().rank()))?;
            let at = transpose(&a_ref, &last_two_swap(a_ref.shape().rank()))?;
            let ga = matmul(g, &bt)?;
            let gb = matmul(&at, g)?;
            Ok((Some(reduce_to_shape(&ga, &a_shape)?), Some(reduce_to_shape(&gb, &b_shape)?)))
        });
    }
    Ok(out)
}

pub fn check_same_num(got: usize, expected: usize, what: &str) -> TensorResult<()> {
    if got != expected {
        return Err(TensorError::InvalidNumInputsOutputs(format!(
            "{}: expected {}, got {}",
            what, expected, got
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    fn leaf(v: f32) -> Tensor {
        Tensor::scalar(v as f64, DType::F32, true).unwrap()
    }

    #[test]
    fn mul_forward_value() {
        let a = leaf(3.0);
        let b = leaf(4.0);
        let c = mul(&a, &b).unwrap();
        assert_eq!(c.item().unwrap().as_f64(), 12.0);
    }

    #[test]
    fn transpose_inverts_on_backward() {
        let mut a = Array::array_init(vec![2, 3], DType::F32).unwrap();
        for i in 0..2 {
            for j in 0..3 {
                a.set_value(&[i, j], crate::scalar::ScalarValue::F32((i * 3 + j) as f32)).unwrap();
            }
        }
        let t = Tensor::tensor_init(a, true, None).unwrap();
        let out = transpose(&t, &[1, 0]).unwrap();
        assert_eq!(out.shape().dims(), &[3, 2]);
        let node = out.backward_fn().unwrap();
        let seed = Tensor::tensor_init(Array::ones(vec![3, 2], DType::F32).unwrap(), false, None).unwrap();
        let grads = (node.borrow().grad_fn)(&seed).unwrap();
        assert_eq!(grads[0].as_ref().unwrap().shape().dims(), &[2, 3]);
    }
}
