//! Parameterless rectified-linear activation.

use crate::array::Array;
use crate::autograd::ops;
use crate::error::TensorResult;
use crate::nn::module::Module;
use crate::tensor::Tensor;

pub struct ReLU;

impl ReLU {
    pub fn new() -> ReLU {
        ReLU
    }
}

impl Default for ReLU {
    fn default() -> Self {
        ReLU::new()
    }
}

impl Module for ReLU {
    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let zeros = Tensor::tensor_init(Array::zeros(x.shape().dims().to_vec(), x.dtype())?, false, None)?;
        ops::max(x, &zeros)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }

    fn repr(&self) -> String {
        "ReLU()".to_string()
    }
}
