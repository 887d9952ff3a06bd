//! Chains a list of modules, feeding each one's output to the next.

use crate::error::TensorResult;
use crate::nn::module::{module_call, Module};
use crate::tensor::Tensor;

pub struct Sequential {
    modules: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new(modules: Vec<Box<dyn Module>>) -> Sequential {
        Sequential { modules }
    }

    pub fn add_module(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }
}

impl Module for Sequential {
    fn forward(&self, x: &Tensor) -> TensorResult<Tensor> {
        let mut current = x.clone();
        for m in &self.modules {
            current = module_call(m.as_ref(), &current)?;
        }
        Ok(current)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.modules.iter().flat_map(|m| m.parameters()).collect()
    }

    fn repr(&self) -> String {
        let mut out = String::from("Sequential(\n");
        for (i, m) in self.modules.iter().enumerate() {
            out.push_str(&format!("  ({}): {}\n", i, m.repr()));
        }
        out.push(')');
        out
    }
}
