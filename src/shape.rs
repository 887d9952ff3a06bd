//! Shape: ordered dimension sizes, plus the broadcasting rules shared by
//! every elementwise kernel and by matmul's batch dimensions (spec §4.B).

use crate::error::{TensorError, TensorResult};
use std::fmt;

/// Largest supported rank (spec §3).
pub const MAX_NDIM: usize = 32;

/// Shape of an array: an ordered list of non-negative dimension sizes.
/// A rank-0 shape (`dims` empty) denotes a scalar.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> TensorResult<Self> {
        if dims.len() > MAX_NDIM {
            return Err(TensorError::ArrayInitFailure(format!(
                "ndim {} exceeds MAX_NDIM {}",
                dims.len(),
                MAX_NDIM
            )));
        }
        Ok(Shape { dims })
    }

    /// Like [`Shape::new`] but panics on an oversized rank; for call sites
    /// that already know the rank is in bounds (e.g. derived shapes).
    pub fn from_dims(dims: Vec<usize>) -> Self {
        assert!(dims.len() <= MAX_NDIM, "ndim exceeds MAX_NDIM");
        Shape { dims }
    }

    pub fn scalar() -> Self {
        Shape { dims: vec![] }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn same_as(&self, other: &Shape) -> bool {
        self.dims == other.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Row-major (C-order) element strides for a freshly allocated array of
    /// this shape: `strides[i] = prod(shape[i+1..])`.
    pub fn contiguous_strides(&self) -> Vec<usize> {
        let n = self.dims.len();
        let mut strides = vec![0usize; n];
        let mut acc = 1usize;
        for i in (0..n).rev() {
            strides[i] = acc;
            acc *= self.dims[i];
        }
        strides
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::from_dims(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_dims(dims.to_vec())
    }
}

/// Two shapes are compatible when, right-aligned, each pair of dimensions is
/// equal or one of them is 1 (a missing leading dimension on the shorter
/// shape counts as 1). Returns the broadcast result shape.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> TensorResult<Vec<usize>> {
    let n = a.len().max(b.len());
    let mut out = vec![0usize; n];
    for i in 0..n {
        let da = *a.get(a.len().wrapping_sub(1).wrapping_sub(i)).unwrap_or(&1);
        let db = *b.get(b.len().wrapping_sub(1).wrapping_sub(i)).unwrap_or(&1);
        let d = if da == db {
            da
        } else if da == 1 {
            db
        } else if db == 1 {
            da
        } else {
            return Err(TensorError::NonBroadcastable(format!(
                "shapes {:?} and {:?} are not broadcast-compatible",
                a, b
            )));
        };
        out[n - 1 - i] = d;
    }
    Ok(out)
}

/// Element strides of an operand broadcast up to `out_shape`: a missing
/// leading axis or an axis of extent 1 gets stride 0, everything else keeps
/// its source element stride.
pub fn broadcast_strides(op_shape: &[usize], op_strides: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let n = out_shape.len();
    let rank = op_shape.len();
    let mut strides = vec![0usize; n];
    for i in 0..n {
        if i < n - rank {
            strides[i] = 0;
        } else {
            let op_axis = i - (n - rank);
            strides[i] = if op_shape[op_axis] == 1 { 0 } else { op_strides[op_axis] };
        }
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_numel() {
        let s = Shape::from_dims(vec![2, 3, 4]);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.rank(), 3);
    }

    #[test]
    fn broadcast_basic() {
        assert_eq!(broadcast_shapes(&[3, 1], &[3]).unwrap(), vec![3, 3]);
        assert_eq!(broadcast_shapes(&[2, 3, 4], &[3, 4]).unwrap(), vec![2, 3, 4]);
        assert!(broadcast_shapes(&[2, 3], &[2, 4]).is_err());
    }

    #[test]
    fn broadcast_associative() {
        let s1 = [2usize, 1, 4];
        let s2 = [3usize, 1];
        let s3 = [1usize];
        let lhs = broadcast_shapes(&broadcast_shapes(&s1, &s2).unwrap(), &s3).unwrap();
        let rhs = broadcast_shapes(&s1, &broadcast_shapes(&s2, &s3).unwrap()).unwrap();
        assert_eq!(lhs, rhs);
    }
}
