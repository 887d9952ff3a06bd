//! Arena: a scope-bounded container that owns tensors and frees them
//! together, plus the `locked` flag NN modules use to shield parameter
//! storage from forward-pass intermediates (spec §4.D).

use crate::error::{TensorError, TensorResult};
use crate::tensor::Tensor;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct ArenaInner {
    tensors: Vec<Tensor>,
    locked: bool,
}

/// Cheap-to-clone handle to a shared tensor arena.
#[derive(Clone)]
pub struct Arena(Rc<RefCell<ArenaInner>>);

impl Arena {
    pub fn new() -> Arena {
        Arena(Rc::new(RefCell::new(ArenaInner::default())))
    }

    pub fn is_locked(&self) -> bool {
        self.0.borrow().locked
    }

    pub fn set_lock(&self) {
        self.0.borrow_mut().locked = true;
    }

    pub fn open_lock(&self) {
        self.0.borrow_mut().locked = false;
    }

    /// Add `t` to this arena's ownership set. Fails if the arena is locked
    /// (a locked arena only accepts tensors placed there before the lock).
    pub fn push(&self, t: Tensor) -> TensorResult<()> {
        let mut inner = self.0.borrow_mut();
        if inner.locked {
            return Err(TensorError::EnvPushFailure(
                "cannot push into a locked arena".into(),
            ));
        }
        inner.tensors.push(t);
        Ok(())
    }

    pub fn pop(&self) -> Option<Tensor> {
        self.0.borrow_mut().tensors.pop()
    }

    /// Remove `t` from this arena's ownership set by identity, dropping the
    /// arena's reference to it. Used when a tensor's gradient is replaced
    /// and the old gradient tensor needs to be released.
    pub fn remove_and_free(&self, t: &Tensor) {
        let mut inner = self.0.borrow_mut();
        if let Some(pos) = inner.tensors.iter().position(|x| x.ptr_eq(t)) {
            inner.tensors.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.0.borrow().tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Arena) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new()
    }
}

/// Pick an arena to own a freshly computed tensor from two operand arenas:
/// prefer the one that isn't locked, since a locked arena is a parameter
/// store that must not absorb intermediate forward-pass results. Fails if
/// both are locked (or neither operand carries one).
pub fn resolve(a: Option<&Arena>, b: Option<&Arena>) -> TensorResult<Option<Arena>> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(x), None) => {
            if x.is_locked() {
                Err(TensorError::EnvResolveFailure(
                    "the only candidate arena is locked".into(),
                ))
            } else {
                Ok(Some(x.clone()))
            }
        }
        (None, Some(y)) => {
            if y.is_locked() {
                Err(TensorError::EnvResolveFailure(
                    "the only candidate arena is locked".into(),
                ))
            } else {
                Ok(Some(y.clone()))
            }
        }
        (Some(x), Some(y)) => {
            if !x.is_locked() {
                Ok(Some(x.clone()))
            } else if !y.is_locked() {
                Ok(Some(y.clone()))
            } else {
                Err(TensorError::EnvResolveFailure(
                    "both candidate arenas are locked".into(),
                ))
            }
        }
    }
}
