//! Tensor: a cheaply cloneable handle over a shared, mutable array plus its
//! autograd bookkeeping (spec §4.C). The handle owns its backward node;
//! the node itself only references operand tensors, never the other way
//! around, which keeps the graph a DAG without needing weak pointers.

use crate::arena::Arena;
use crate::array::Array;
use crate::autograd::node::BackwardNode;
use crate::dtype::DType;
use crate::error::{TensorError, TensorResult};
use crate::shape::Shape;
use std::cell::RefCell;
use std::rc::Rc;

struct TensorInner {
    data: Array,
    grad: Option<Tensor>,
    backward_fn: Option<Rc<RefCell<BackwardNode>>>,
    env: Option<Arena>,
    requires_grad: bool,
}

/// A handle to a shared tensor. Clones are cheap and alias the same
/// underlying storage (`Rc<RefCell<_>>`), matching how the arena and
/// backward-node graph both need to reference the same tensor.
#[derive(Clone)]
pub struct Tensor(Rc<RefCell<TensorInner>>);

impl Tensor {
    /// `requires_grad` is only legal on float dtypes.
    pub fn tensor_init(data: Array, requires_grad: bool, env: Option<&Arena>) -> TensorResult<Tensor> {
        if requires_grad && !data.dtype().is_float() {
            return Err(TensorError::TensorInitFailure(
                "requires_grad is only valid for float dtypes".into(),
            ));
        }
        let t = Tensor(Rc::new(RefCell::new(TensorInner {
            data,
            grad: None,
            backward_fn: None,
            env: env.cloned(),
            requires_grad,
        })));
        if let Some(arena) = env {
            arena.push(t.clone())?;
        }
        Ok(t)
    }

    pub fn zeros(shape: Vec<usize>, dtype: DType, requires_grad: bool, env: Option<&Arena>) -> TensorResult<Tensor> {
        Tensor::tensor_init(Array::zeros(shape, dtype)?, requires_grad, env)
    }

    pub fn ones(shape: Vec<usize>, dtype: DType, requires_grad: bool, env: Option<&Arena>) -> TensorResult<Tensor> {
        Tensor::tensor_init(Array::ones(shape, dtype)?, requires_grad, env)
    }

    pub fn zeros_like(t: &Tensor) -> TensorResult<Tensor> {
        Tensor::tensor_init(Array::zeros(t.shape().dims().to_vec(), t.dtype())?, false, None)
    }

    pub fn ones_like(t: &Tensor) -> TensorResult<Tensor> {
        Tensor::tensor_init(Array::ones(t.shape().dims().to_vec(), t.dtype())?, false, None)
    }

    pub fn scalar(value: f64, dtype: DType, requires_grad: bool) -> TensorResult<Tensor> {
        let mut a = Array::array_init(vec![], dtype)?;
        let sv = match dtype {
            DType::I32 => crate::scalar::ScalarValue::I32(value as i32),
            DType::I64 => crate::scalar::ScalarValue::I64(value as i64),
            DType::F32 => crate::scalar::ScalarValue::F32(value as f32),
            DType::F64 => crate::scalar::ScalarValue::F64(value),
        };
        a.set_value(&[], sv)?;
        Tensor::tensor_init(a, requires_grad, None)
    }

    /// Rank-0 only.
    pub fn item(&self) -> TensorResult<crate::scalar::ScalarValue> {
        if !self.shape().is_scalar() {
            return Err(TensorError::InvalidDim("item() requires a rank-0 tensor".into()));
        }
        self.0.borrow().data.value_at(&[])
    }

    pub fn data(&self) -> Array {
        self.0.borrow().data.clone()
    }

    pub fn set_data(&self, data: Array) {
        self.0.borrow_mut().data = data;
    }

    pub fn shape(&self) -> Shape {
        self.0.borrow().data.shape().clone()
    }

    pub fn dtype(&self) -> DType {
        self.0.borrow().data.dtype()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.borrow().requires_grad
    }

    pub fn set_requires_grad(&self, value: bool) -> TensorResult<()> {
        if value && !self.dtype().is_float() {
            return Err(TensorError::TensorInitFailure(
                "requires_grad is only valid for float dtypes".into(),
            ));
        }
        self.0.borrow_mut().requires_grad = value;
        Ok(())
    }

    pub fn grad(&self) -> Option<Tensor> {
        self.0.borrow().grad.clone()
    }

    pub fn env(&self) -> Option<Arena> {
        self.0.borrow().env.clone()
    }

    pub fn backward_fn(&self) -> Option<Rc<RefCell<BackwardNode>>> {
        self.0.borrow().backward_fn.clone()
    }

    pub fn set_backward_fn(&self, node: Rc<RefCell<BackwardNode>>) {
        self.0.borrow_mut().backward_fn = Some(node);
    }

    /// Replace this tensor's gradient, releasing the previous one from
    /// whichever arena it belonged to.
    pub fn set_grad(&self, grad: Tensor) {
        let old = self.0.borrow_mut().grad.replace(grad);
        if let Some(old) = old {
            if let Some(arena) = old.env() {
                arena.remove_and_free(&old);
            }
        }
    }

    pub fn zero_grad(&self) -> TensorResult<()> {
        let arena = self.env();
        let was_locked = arena.as_ref().is_some_and(|a| a.is_locked());
        if was_locked {
            arena.as_ref().unwrap().open_lock();
        }
        let z = Tensor::zeros(self.shape().dims().to_vec(), self.dtype(), false, arena.as_ref())?;
        self.set_grad(z);
        if was_locked {
            arena.as_ref().unwrap().set_lock();
        }
        Ok(())
    }

    pub fn ptr_key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
