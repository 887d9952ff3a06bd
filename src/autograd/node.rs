//! BackwardNode: one node per op invocation in the reverse graph.
//!
//! `next` holds the operand tensors (spec's confusingly-named "outputs"
//! field — the op's own *inputs*) in parameter order; `grad_fn` maps an
//! upstream gradient tensor to one gradient per operand, in the same
//! order, with `None` where that operand doesn't need one. Gradients are
//! computed through the same tensor-level ops used for the forward pass,
//! so the backward computation builds its own graph whenever the upstream
//! gradient tensor has `requires_grad` set — which is exactly how
//! `create_graph` is threaded through without a second, Array-only code
//! path.

use crate::error::TensorResult;
use crate::tensor::Tensor;

pub struct BackwardNode {
    pub name: &'static str,
    pub next: Vec<Option<Tensor>>,
    pub grad_fn: Box<dyn Fn(&Tensor) -> TensorResult<Vec<Option<Tensor>>>>,
}

impl BackwardNode {
    pub fn new(
        name: &'static str,
        next: Vec<Option<Tensor>>,
        grad_fn: Box<dyn Fn(&Tensor) -> TensorResult<Vec<Option<Tensor>>>>,
    ) -> BackwardNode {
        BackwardNode { name, next, grad_fn }
    }
}
