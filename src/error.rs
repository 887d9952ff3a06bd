//! Error taxonomy: one `thiserror` enum for every failure kind the crate can
//! surface. Precondition checks run before any allocation, so a failed
//! operation never partially mutates an operand (see spec §7).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("array init failure: {0}")]
    ArrayInitFailure(String),
    #[error("invalid index: {0}")]
    InvalidIdx(String),
    #[error("shapes not broadcast-compatible: {0}")]
    NonBroadcastable(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("dtype mismatch: {0}")]
    DtypeMismatch(String),
    #[error("invalid array: {0}")]
    InvalidArray(String),
    #[error("invalid dtype: {0}")]
    InvalidDtype(String),
    #[error("repeated dims in permutation: {0}")]
    RepeatedArrayDims(String),
    #[error("invalid dimension: {0}")]
    InvalidDim(String),
    #[error("tensor init failure: {0}")]
    TensorInitFailure(String),
    #[error("invalid grad access: {0}")]
    InvalidGrad(String),
    #[error("invalid backward pass: {0}")]
    InvalidBackwardPass(String),
    #[error("grad init failure: {0}")]
    GradInitFailure(String),
    #[error("grad rule contract violated: {0}")]
    InvalidNumInputsOutputs(String),
    #[error("arena push failure: {0}")]
    EnvPushFailure(String),
    #[error("arena resolve failure: {0}")]
    EnvResolveFailure(String),
    #[error("prng init failure: {0}")]
    PrngInitFailure(String),
    #[error("invalid low/high bound: {0}")]
    InvalidLowHigh(String),
    #[error("file read failure: {0}")]
    FileReadFailure(String),
    #[error("file write failure: {0}")]
    FileWriteFailure(String),
    #[error("file format error: {0}")]
    FileFormatError(String),
}

pub type TensorResult<T> = Result<T, TensorError>;
