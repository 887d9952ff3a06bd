//! Small neural-network module layer built on top of the autograd core.

pub mod linear;
pub mod module;
pub mod relu;
pub mod sequential;
