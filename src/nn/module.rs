//! `Module`: the composition-tree trait every layer implements (spec §4.H).

use crate::error::TensorResult;
use crate::tensor::Tensor;

pub trait Module {
    fn forward(&self, x: &Tensor) -> TensorResult<Tensor>;

    /// Every trainable/non-trainable tensor owned directly by this module
    /// (composite modules recurse into their children).
    fn parameters(&self) -> Vec<Tensor>;

    fn repr(&self) -> String;

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.shape().numel()).sum()
    }

    fn num_trainable_variables(&self) -> usize {
        self.parameters()
            .iter()
            .filter(|p| p.requires_grad())
            .map(|p| p.shape().numel())
            .sum()
    }

    fn num_non_trainable_variables(&self) -> usize {
        self.parameters()
            .iter()
            .filter(|p| !p.requires_grad())
            .map(|p| p.shape().numel())
            .sum()
    }
}

pub fn module_call(m: &dyn Module, x: &Tensor) -> TensorResult<Tensor> {
    m.forward(x)
}
