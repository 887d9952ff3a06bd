//! tendril: a strided n-dimensional tensor library with reverse-mode
//! automatic differentiation.
//!
//! Layers: array (`Array`, `Shape`, dtype/scalar) -> tensor (`Tensor`,
//! `Arena`) -> autograd (graph nodes, ops, backward/gradient drivers) ->
//! nn (`Module` and friends).
//!
//! Determinism: call [`random::manual_seed`] before sampling for
//! reproducible initialization.

pub mod arena;
pub mod array;
pub mod autograd;
pub mod dtype;
pub mod error;
pub mod io;
pub mod nn;
pub mod random;
pub mod scalar;
pub mod shape;
pub mod tensor;

pub use arena::Arena;
pub use array::Array;
pub use autograd::driver::{backward, gradient};
pub use autograd::ops::{add, div, inv, matmul, max, min, mul, neg, sub, sum, sum_dim, transpose};
pub use dtype::DType;
pub use error::{TensorError, TensorResult};
pub use nn::linear::Linear;
pub use nn::module::{module_call, Module};
pub use nn::relu::ReLU;
pub use nn::sequential::Sequential;
pub use random::manual_seed;
pub use scalar::ScalarValue;
pub use shape::Shape;
pub use tensor::Tensor;
