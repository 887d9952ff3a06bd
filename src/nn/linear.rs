//! Fully connected layer with Kaiming-uniform initialization. Parameters
//! live in a dedicated arena that's locked right after construction, so a
//! forward pass's intermediate tensors can never be mistaken for
//! parameters (spec §4.D's arena lock, applied the way the teacher's
//! `nn::Linear` locks its own parameter storage after init).

use crate::arena::Arena;
use crate::array::Array;
use crate::autograd::ops;
use crate::dtype::DType;
use crate::error::TensorResult;
use crate::nn::module::Module;
use crate::random;
use crate::tensor::Tensor;

pub struct Linear {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
    environ: Arena,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool, dtype: DType) -> TensorResult<Linear> {
        let environ = Arena::new();
        let bound = (1.0 / in_features as f64).sqrt();

        let bound_arr = Array::from_scalar(bound, dtype)?;
        let raw_w = random::uniform(vec![in_features, out_features], dtype, 2.0 * bound)?;
        let weight = Tensor::tensor_init(raw_w.sub(&bound_arr)?, true, Some(&environ))?;

        let bias_tensor = if bias {
            let raw_b = random::uniform(vec![1, out_features], dtype, 2.0 * bound)?;
            Some(Tensor::tensor_init(raw_b.sub(&bound_arr)?, true, Some(&environ))?)
        } else {
            None
        };

        environ.set_lock();
        Ok(Linear { weight, bias: bias_tensor, environ, in_features, out_features })
    }

    pub fn environ(&self) -> &Arena {
        &self.environ
    }
}

impl Module for Linear {
    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let mut y = ops::matmul(x, &self.weight)?;
        if let Some(bias) = &self.bias {
            y = ops::add(&y, bias)?;
        }
        Ok(y)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut p = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            p.push(b.clone());
        }
        p
    }

    fn repr(&self) -> String {
        format!(
            "Linear(in_features={}, out_features={}, bias={})",
            self.in_features,
            self.out_features,
            self.bias.is_some()
        )
    }
}
