//! Reverse-mode automatic differentiation: graph nodes, forward ops that
//! install them, broadcast-reduction, and the backward/gradient drivers.

pub mod broadcast_reduce;
pub mod driver;
pub mod node;
pub mod ops;
