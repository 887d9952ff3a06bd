//! Backward/gradient drivers (spec §4.F). The traversal is a plain
//! reverse-order stack walk with no dependency-count bookkeeping: a node
//! reachable from more than one path is simply visited, and contributes
//! its gradient, once per path. That is simpler than a topological sort
//! and gives the same accumulated result, at the cost of possibly
//! redoing some work when the graph reconverges.

use crate::error::{TensorError, TensorResult};
use crate::tensor::Tensor;
use std::collections::HashMap;

fn accumulate_leaf_grad(t: &Tensor, grad: &Tensor) -> TensorResult<()> {
    match t.grad() {
        None => t.set_grad(grad.clone()),
        Some(existing) => {
            let summed = crate::autograd::ops::add(&existing, grad)?;
            t.set_grad(summed);
        }
    }
    Ok(())
}

/// Walk the graph from `root` backward, seeding with `grad_output` (or an
/// all-ones array matching `root`'s shape if `None` — only legal when
/// `root` is a scalar). Accumulates into every reachable leaf's `.grad`.
/// `root` must have `requires_grad() == true`.
pub fn backward(root: &Tensor, grad_output: Option<Tensor>, create_graph: bool) -> TensorResult<()> {
    if !root.requires_grad() {
        return Err(TensorError::InvalidBackwardPass(
            "backward() requires root.requires_grad() == true".into(),
        ));
    }
    let seed = match grad_output {
        Some(g) => g,
        None => {
            if !root.shape().is_scalar() {
                return Err(TensorError::GradInitFailure(
                    "backward() with no seed requires a scalar root".into(),
                ));
            }
            Tensor::ones(vec![], root.dtype(), create_graph, None)?
        }
    };
    if seed.shape().dims() != root.shape().dims() {
        return Err(TensorError::GradInitFailure(
            "seed gradient shape does not match root tensor shape".into(),
        ));
    }
    // `create_graph` always wins: even a caller-supplied seed that doesn't
    // itself require grad must still drive graph-building backward rules.
    if create_graph {
        seed.set_requires_grad(true)?;
    }

    let mut stack: Vec<(Tensor, Tensor)> = vec![(root.clone(), seed)];
    while let Some((tensor, grad)) = stack.pop() {
        match tensor.backward_fn() {
            Some(node) => {
                let node_ref = node.borrow();
                let next_grads = (node_ref.grad_fn)(&grad)?;
                for (operand, g) in node_ref.next.iter().zip(next_grads) {
                    if let (Some(operand), Some(g)) = (operand, g) {
                        stack.push((operand.clone(), g));
                    }
                }
            }
            None => {
                if tensor.requires_grad() {
                    accumulate_leaf_grad(&tensor, &grad)?;
                }
            }
        }
    }
    Ok(())
}

/// Compute gradients of `outputs` (seeded by `grad_outputs`) with respect
/// to `inputs`, without requiring `inputs` to be graph leaves. Every
/// tensor in `inputs` and `outputs` must have `requires_grad() == true`,
/// else `InvalidBackwardPass`; every tensor in `inputs` must be reachable
/// from `outputs`, else `GradInitFailure`.
pub fn gradient(
    inputs: &[Tensor],
    outputs: &[Tensor],
    grad_outputs: &[Tensor],
    create_graph: bool,
) -> TensorResult<Vec<Tensor>> {
    crate::autograd::ops::check_same_num(grad_outputs.len(), outputs.len(), "gradient: grad_outputs/outputs")?;
    if inputs.iter().chain(outputs.iter()).any(|t| !t.requires_grad()) {
        return Err(TensorError::InvalidBackwardPass(
            "gradient() requires every input and output to have requires_grad() == true".into(),
        ));
    }

    let want: HashMap<usize, usize> = inputs.iter().enumerate().map(|(i, t)| (t.ptr_key(), i)).collect();
    let mut captured: Vec<Option<Tensor>> = vec![None; inputs.len()];

    // As in `backward`, `create_graph` forces every seed to carry grad
    // regardless of what the caller passed in, since it governs whether the
    // *rules run below* build a graph, not whether the seed already had one.
    if create_graph {
        for g in grad_outputs {
            g.set_requires_grad(true)?;
        }
    }

    let mut stack: Vec<(Tensor, Tensor)> = outputs
        .iter()
        .cloned()
        .zip(grad_outputs.iter().cloned())
        .collect();

    while let Some((tensor, grad)) = stack.pop() {
        if let Some(&idx) = want.get(&tensor.ptr_key()) {
            captured[idx] = Some(match captured[idx].take() {
                None => grad.clone(),
                Some(existing) => crate::autograd::ops::add(&existing, &grad)?,
            });
        }
        match tensor.backward_fn() {
            Some(node) => {
                let node_ref = node.borrow();
                let next_grads = (node_ref.grad_fn)(&grad)?;
                for (operand, g) in node_ref.next.iter().zip(next_grads) {
                    if let (Some(operand), Some(g)) = (operand, g) {
                        stack.push((operand.clone(), g));
                    }
                }
            }
            None => {
                if tensor.requires_grad() && !want.contains_key(&tensor.ptr_key()) {
                    accumulate_leaf_grad(&tensor, &grad)?;
                }
            }
        }
    }

    captured
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            c.ok_or_else(|| {
                TensorError::GradInitFailure(format!("input tensor #{} is not reachable from outputs", i))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::ops;
    use crate::dtype::DType;

    #[test]
    fn backward_accumulates_into_leaf() {
        let a = Tensor::scalar(3.0, DType::F32, true).unwrap();
        let b = Tensor::scalar(4.0, DType::F32, true).unwrap();
        let c = ops::mul(&a, &b).unwrap();
        backward(&c, None, false).unwrap();
        assert_eq!(a.grad().unwrap().item().unwrap().as_f64(), 4.0);
        assert_eq!(b.grad().unwrap().item().unwrap().as_f64(), 3.0);
    }

    #[test]
    fn gradient_reaches_intermediate_tensor() {
        let a = Tensor::scalar(2.0, DType::F32, true).unwrap();
        let b = ops::mul(&a, &a).unwrap();
        let c = ops::mul(&b, &a).unwrap();
        let seed = Tensor::ones(vec![], DType::F32, false, None).unwrap();
        let grads = gradient(&[b.clone()], &[c], &[seed], false).unwrap();
        assert_eq!(grads[0].item().unwrap().as_f64(), 2.0);
    }
}
