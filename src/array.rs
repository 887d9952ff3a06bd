//! Array: strided n-d buffer, shape/stride math, broadcasting, elementwise
//! and reduction kernels, and matmul (spec §4.B).
//!
//! Storage is a small tagged union of typed `Vec`s rather than an untyped
//! byte buffer with manual casts: it gives the same four-dtype model spec.md
//! describes without reaching for `unsafe`, while [`Array::to_le_bytes`] /
//! [`Array::from_le_bytes`] (used by [`crate::io`]) reproduce the exact wire
//! layout spec §6 requires. Strides are stored in elements, not bytes; byte
//! strides (as the file format wants) are `stride * itemsize`.

use crate::dtype::DType;
use crate::error::{TensorError, TensorResult};
use crate::scalar::ScalarValue;
use crate::shape::{broadcast_shapes, broadcast_strides, Shape};
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Sub};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A small tagged union of typed element buffers.
#[derive(Clone, Debug)]
pub enum Storage {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Storage {
    fn dtype(&self) -> DType {
        match self {
            Storage::I32(_) => DType::I32,
            Storage::I64(_) => DType::I64,
            Storage::F32(_) => DType::F32,
            Storage::F64(_) => DType::F64,
        }
    }

    fn len(&self) -> usize {
        match self {
            Storage::I32(v) => v.len(),
            Storage::I64(v) => v.len(),
            Storage::F32(v) => v.len(),
            Storage::F64(v) => v.len(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Array {
    storage: Storage,
    shape: Shape,
    /// Element strides (not bytes); length equals `shape.rank()`.
    strides: Vec<usize>,
}

impl Array {
    fn from_contiguous(storage: Storage, shape: Vec<usize>) -> TensorResult<Array> {
        let shape = Shape::new(shape)?;
        let strides = shape.contiguous_strides();
        Ok(Array { storage, shape, strides })
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn ndim(&self) -> usize {
        self.shape.rank()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Byte strides, as spec §3 defines them.
    pub fn byte_strides(&self) -> Vec<usize> {
        let isz = self.dtype().itemsize();
        self.strides.iter().map(|s| s * isz).collect()
    }

    pub fn itemsize(&self) -> usize {
        self.dtype().itemsize()
    }

    pub fn total_size(&self) -> usize {
        self.shape.numel()
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides()
    }

    /// Allocate a zero-filled array of `shape`/`dtype` (spec's `array_init`).
    pub fn array_init(shape: Vec<usize>, dtype: DType) -> TensorResult<Array> {
        let s = Shape::new(shape)?;
        let n = s.numel();
        let storage = match dtype {
            DType::I32 => Storage::I32(vec![0i32; n]),
            DType::I64 => Storage::I64(vec![0i64; n]),
            DType::F32 => Storage::F32(vec![0.0f32; n]),
            DType::F64 => Storage::F64(vec![0.0f64; n]),
        };
        let strides = s.contiguous_strides();
        Ok(Array { storage, shape: s, strides })
    }

    pub fn zeros(shape: Vec<usize>, dtype: DType) -> TensorResult<Array> {
        Array::array_init(shape, dtype)
    }

    pub fn ones(shape: Vec<usize>, dtype: DType) -> TensorResult<Array> {
        let mut a = Array::array_init(shape, dtype)?;
        a.fill(ScalarValue::one(dtype));
        Ok(a)
    }

    /// A rank-0 array holding a single value, cast to `dtype`. Convenient
    /// for broadcasting a constant against an arbitrarily shaped array.
    pub fn from_scalar(value: f64, dtype: DType) -> TensorResult<Array> {
        let mut a = Array::array_init(vec![], dtype)?;
        let sv = match dtype {
            DType::I32 => ScalarValue::I32(value as i32),
            DType::I64 => ScalarValue::I64(value as i64),
            DType::F32 => ScalarValue::F32(value as f32),
            DType::F64 => ScalarValue::F64(value),
        };
        a.set_value(&[], sv)?;
        Ok(a)
    }

    /// Two-dimensional identity-like matrix: 1 on `row == col`, 0 elsewhere.
    pub fn eye(m: usize, n: usize, dtype: DType) -> TensorResult<Array> {
        let mut a = Array::array_init(vec![m, n], dtype)?;
        for i in 0..m.min(n) {
            a.set_value(&[i, i], ScalarValue::one(dtype))?;
        }
        Ok(a)
    }

    /// Bulk-fill every element with the same value (used by `ones`/`array_init`
    /// helpers and by in-place zero-fill). dtype of `value` must match.
    pub fn fill(&mut self, value: ScalarValue) {
        match (&mut self.storage, value) {
            (Storage::I32(v), ScalarValue::I32(x)) => v.iter_mut().for_each(|e| *e = x),
            (Storage::I64(v), ScalarValue::I64(x)) => v.iter_mut().for_each(|e| *e = x),
            (Storage::F32(v), ScalarValue::F32(x)) => v.iter_mut().for_each(|e| *e = x),
            (Storage::F64(v), ScalarValue::F64(x)) => v.iter_mut().for_each(|e| *e = x),
            _ => panic!("Array::fill: dtype mismatch"),
        }
    }

    /// Bulk-replace the contiguous backing buffer (caller guarantees the
    /// array is contiguous and `values.len() == total_size()`).
    pub fn populate(&mut self, values: &[ScalarValue]) -> TensorResult<()> {
        if values.len() != self.total_size() {
            return Err(TensorError::InvalidArray(format!(
                "populate: expected {} values, got {}",
                self.total_size(),
                values.len()
            )));
        }
        for (i, v) in values.iter().enumerate() {
            let idx = unravel(i, self.shape.dims());
            self.set_value(&idx, *v)?;
        }
        Ok(())
    }

    fn offset_of(&self, indices: &[usize]) -> TensorResult<usize> {
        if indices.len() != self.ndim() {
            return Err(TensorError::InvalidIdx(format!(
                "expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let mut off = 0usize;
        for (i, &idx) in indices.iter().enumerate() {
            if idx >= self.shape.dims()[i] {
                return Err(TensorError::InvalidIdx(format!(
                    "index {} out of range for axis {} (size {})",
                    idx, i, self.shape.dims()[i]
                )));
            }
            off += idx * self.strides[i];
        }
        Ok(off)
    }

    pub fn value_at(&self, indices: &[usize]) -> TensorResult<ScalarValue> {
        let off = self.offset_of(indices)?;
        Ok(match &self.storage {
            Storage::I32(v) => ScalarValue::I32(v[off]),
            Storage::I64(v) => ScalarValue::I64(v[off]),
            Storage::F32(v) => ScalarValue::F32(v[off]),
            Storage::F64(v) => ScalarValue::F64(v[off]),
        })
    }

    pub fn set_value(&mut self, indices: &[usize], value: ScalarValue) -> TensorResult<()> {
        let off = self.offset_of(indices)?;
        match (&mut self.storage, value) {
            (Storage::I32(v), ScalarValue::I32(x)) => v[off] = x,
            (Storage::I64(v), ScalarValue::I64(x)) => v[off] = x,
            (Storage::F32(v), ScalarValue::F32(x)) => v[off] = x,
            (Storage::F64(v), ScalarValue::F64(x)) => v[off] = x,
            _ => {
                return Err(TensorError::DtypeMismatch(
                    "set_value: value dtype does not match array dtype".into(),
                ))
            }
        }
        Ok(())
    }

    /// A fresh, contiguous, row-major clone regardless of source strides.
    pub fn copy(&self) -> Array {
        let n = self.total_size();
        macro_rules! gather {
            ($v:expr) => {{
                let mut out = Vec::with_capacity(n);
                for lin in 0..n {
                    let idx = unravel(lin, self.shape.dims());
                    let off = idx
                        .iter()
                        .zip(self.strides.iter())
                        .map(|(i, s)| i * s)
                        .sum::<usize>();
                    out.push($v[off]);
                }
                out
            }};
        }
        let storage = match &self.storage {
            Storage::I32(v) => Storage::I32(gather!(v)),
            Storage::I64(v) => Storage::I64(gather!(v)),
            Storage::F32(v) => Storage::F32(gather!(v)),
            Storage::F64(v) => Storage::F64(gather!(v)),
        };
        Array {
            storage,
            strides: self.shape.contiguous_strides(),
            shape: self.shape.clone(),
        }
    }

    /// `dims` must be a permutation of `0..ndim`. Returns a new array with
    /// shape/strides permuted and the permuted values copied into a fresh
    /// contiguous buffer (spec does not require buffer aliasing).
    pub fn transpose(&self, dims: &[usize]) -> TensorResult<Array> {
        let n = self.ndim();
        if dims.len() != n {
            return Err(TensorError::InvalidDim(format!(
                "transpose: expected {} dims, got {}",
                n,
                dims.len()
            )));
        }
        let mut seen = vec![false; n];
        for &d in dims {
            if d >= n {
                return Err(TensorError::InvalidDim(format!("transpose: dim {} out of range", d)));
            }
            if seen[d] {
                return Err(TensorError::RepeatedArrayDims(format!(
                    "transpose: dim {} repeated in {:?}",
                    d, dims
                )));
            }
            seen[d] = true;
        }
        let new_shape: Vec<usize> = dims.iter().map(|&d| self.shape.dims()[d]).collect();
        let new_strides_logical: Vec<usize> = dims.iter().map(|&d| self.strides[d]).collect();
        let permuted = Array {
            storage: self.storage.clone(),
            shape: Shape::from_dims(new_shape),
            strides: new_strides_logical,
        };
        Ok(permuted.copy())
    }

    /// Reinterpret a contiguous array under a new shape with the same
    /// element count (used to insert/drop size-1 axes, e.g. for
    /// `sum_dim(keepdims = false)`'s backward rule).
    pub fn reshape_contiguous(&self, new_shape: Vec<usize>) -> TensorResult<Array> {
        if !self.is_contiguous() {
            return Err(TensorError::InvalidArray("reshape_contiguous requires a contiguous array".into()));
        }
        let shape = Shape::new(new_shape)?;
        if shape.numel() != self.total_size() {
            return Err(TensorError::ShapeMismatch(format!(
                "reshape_contiguous: {} elements does not match {}",
                shape.numel(),
                self.total_size()
            )));
        }
        let strides = shape.contiguous_strides();
        Ok(Array { storage: self.storage.clone(), shape, strides })
    }

    // ---- elementwise kernels ----

    pub fn add(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "add", op_add, op_add, op_add, op_add)
    }
    pub fn sub(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "sub", op_sub, op_sub, op_sub, op_sub)
    }
    pub fn mul(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "mul", op_mul, op_mul, op_mul, op_mul)
    }
    pub fn div(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "div", op_div, op_div, op_div, op_div)
    }
    pub fn max(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "max", op_max, op_max, op_max, op_max)
    }
    pub fn min(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "min", op_min, op_min, op_min, op_min)
    }

    pub fn gt(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "gt", op_gt, op_gt, op_gt, op_gt)
    }
    pub fn ge(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "ge", op_ge, op_ge, op_ge, op_ge)
    }
    pub fn lt(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "lt", op_lt, op_lt, op_lt, op_lt)
    }
    pub fn le(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "le", op_le, op_le, op_le, op_le)
    }
    pub fn eq(&self, other: &Array) -> TensorResult<Array> {
        binary_kernel(self, other, "eq", op_eq, op_eq, op_eq, op_eq)
    }

    pub fn neg(&self) -> TensorResult<Array> {
        unary_kernel(self, |a: i32| -a, |a: i64| -a, |a: f32| -a, |a: f64| -a)
    }

    /// Elementwise reciprocal `1/a`. Only meaningful for float dtypes, but
    /// defined for all four for symmetry with the other unary kernels.
    pub fn inv(&self) -> TensorResult<Array> {
        unary_kernel(
            self,
            |a: i32| if a == 0 { 0 } else { 1 / a },
            |a: i64| if a == 0 { 0 } else { 1 / a },
            |a: f32| 1.0 / a,
            |a: f64| 1.0 / a,
        )
    }

    // ---- in-place wrappers (spec: addi/subi/... are out-of-place + swap) ----

    pub fn addi(&mut self, other: &Array) -> TensorResult<()> {
        *self = self.add(other)?;
        Ok(())
    }
    pub fn subi(&mut self, other: &Array) -> TensorResult<()> {
        *self = self.sub(other)?;
        Ok(())
    }
    pub fn muli(&mut self, other: &Array) -> TensorResult<()> {
        *self = self.mul(other)?;
        Ok(())
    }
    pub fn divi(&mut self, other: &Array) -> TensorResult<()> {
        *self = self.div(other)?;
        Ok(())
    }
    pub fn negi(&mut self) -> TensorResult<()> {
        *self = self.neg()?;
        Ok(())
    }
    pub fn invi(&mut self) -> TensorResult<()> {
        *self = self.inv()?;
        Ok(())
    }
    pub fn sumi(&mut self) -> TensorResult<()> {
        *self = self.sum()?;
        Ok(())
    }
    pub fn sum_dimi(&mut self, dim: usize, keepdims: bool) -> TensorResult<()> {
        *self = self.sum_dim(dim, keepdims)?;
        Ok(())
    }

    // ---- reductions ----

    /// Sum of every element, as a rank-0 array of the same dtype.
    pub fn sum(&self) -> TensorResult<Array> {
        let n = self.total_size();
        macro_rules! reduce {
            ($v:expr, $zero:expr) => {{
                let mut acc = $zero;
                for lin in 0..n {
                    let idx = unravel(lin, self.shape.dims());
                    let off: usize = idx.iter().zip(self.strides.iter()).map(|(i, s)| i * s).sum();
                    acc = acc + $v[off];
                }
                acc
            }};
        }
        let storage = match &self.storage {
            Storage::I32(v) => Storage::I32(vec![reduce!(v, 0i32)]),
            Storage::I64(v) => Storage::I64(vec![reduce!(v, 0i64)]),
            Storage::F32(v) => Storage::F32(vec![reduce!(v, 0.0f32)]),
            Storage::F64(v) => Storage::F64(vec![reduce!(v, 0.0f64)]),
        };
        Array::from_contiguous(storage, vec![])
    }

    /// Collapse one axis. Output rank is `ndim` if `keepdims`, else `ndim - 1`.
    pub fn sum_dim(&self, dim: usize, keepdims: bool) -> TensorResult<Array> {
        let dims = self.shape.dims();
        if dim >= dims.len() {
            return Err(TensorError::InvalidDim(format!(
                "sum_dim: dim {} out of range for rank {}",
                dim,
                dims.len()
            )));
        }
        let mut kept_shape = dims.to_vec();
        kept_shape[dim] = 1;
        let out_total: usize = kept_shape.iter().product();
        let reduced_len = dims[dim];

        macro_rules! reduce_dim {
            ($v:expr, $zero:expr) => {{
                let mut out = vec![$zero; out_total];
                for out_lin in 0..out_total {
                    let mut idx = unravel(out_lin, &kept_shape);
                    let mut acc = $zero;
                    for k in 0..reduced_len {
                        idx[dim] = k;
                        let off: usize = idx.iter().zip(self.strides.iter()).map(|(i, s)| i * s).sum();
                        acc = acc + $v[off];
                    }
                    out[out_lin] = acc;
                }
                out
            }};
        }
        let storage = match &self.storage {
            Storage::I32(v) => Storage::I32(reduce_dim!(v, 0i32)),
            Storage::I64(v) => Storage::I64(reduce_dim!(v, 0i64)),
            Storage::F32(v) => Storage::F32(reduce_dim!(v, 0.0f32)),
            Storage::F64(v) => Storage::F64(reduce_dim!(v, 0.0f64)),
        };
        let final_shape = if keepdims {
            kept_shape
        } else {
            let mut s = dims.to_vec();
            s.remove(dim);
            s
        };
        Array::from_contiguous(storage, final_shape)
    }

    // ---- matmul ----

    /// Batched matmul: `(..., m, k) @ (..., k, n) -> (..., m, n)`. Requires
    /// both operands to have rank >= 2, matching float dtype, and `k == k'`.
    /// Leading batch dimensions broadcast. Dispatches to `cblas` sgemm/dgemm
    /// when built with the `blas` feature, else a naive O(mnk) loop.
    pub fn matmul(&self, other: &Array) -> TensorResult<Array> {
        if self.ndim() < 2 || other.ndim() < 2 {
            return Err(TensorError::InvalidArray("matmul requires rank >= 2".into()));
        }
        if self.dtype() != other.dtype() {
            return Err(TensorError::DtypeMismatch("matmul: dtype mismatch".into()));
        }
        if !self.dtype().is_float() {
            return Err(TensorError::InvalidDtype(
                "matmul: integer dtypes are not supported by the BLAS-backed path".into(),
            ));
        }
        let a_dims = self.shape.dims();
        let b_dims = other.shape.dims();
        let (m, k1) = (a_dims[a_dims.len() - 2], a_dims[a_dims.len() - 1]);
        let (k2, n) = (b_dims[b_dims.len() - 2], b_dims[b_dims.len() - 1]);
        if k1 != k2 {
            return Err(TensorError::ShapeMismatch(format!(
                "matmul: inner dims disagree ({} vs {})",
                k1, k2
            )));
        }
        let a_batch = &a_dims[..a_dims.len() - 2];
        let b_batch = &b_dims[..b_dims.len() - 2];
        let batch_shape = broadcast_shapes(a_batch, b_batch)?;
        let batch_count: usize = batch_shape.iter().product();
        let mut out_shape = batch_shape.clone();
        out_shape.push(m);
        out_shape.push(n);

        if batch_count == 0 || m == 0 || n == 0 {
            return match self.dtype() {
                DType::F32 => Array::from_contiguous(Storage::F32(vec![]), out_shape),
                DType::F64 => Array::from_contiguous(Storage::F64(vec![]), out_shape),
                _ => unreachable!(),
            };
        }

        let a_batch_strides = broadcast_strides(a_batch, &self.strides[..a_batch.len()], &batch_shape);
        let b_batch_strides = broadcast_strides(b_batch, &other.strides[..b_batch.len()], &batch_shape);

        match (&self.storage, &other.storage) {
            (Storage::F32(a), Storage::F32(b)) => {
                let mut out = vec![0.0f32; batch_count * m * n];
                run_batched_gemm_f32(
                    a, &self.strides[a_dims.len() - 2..], a_batch_strides.clone(),
                    b, &other.strides[b_dims.len() - 2..], b_batch_strides.clone(),
                    &mut out, &batch_shape, m, k1, n,
                );
                Array::from_contiguous(Storage::F32(out), out_shape)
            }
            (Storage::F64(a), Storage::F64(b)) => {
                let mut out = vec![0.0f64; batch_count * m * n];
                run_batched_gemm_f64(
                    a, &self.strides[a_dims.len() - 2..], a_batch_strides.clone(),
                    b, &other.strides[b_dims.len() - 2..], b_batch_strides.clone(),
                    &mut out, &batch_shape, m, k1, n,
                );
                Array::from_contiguous(Storage::F64(out), out_shape)
            }
            _ => unreachable!("dtype already checked to be float"),
        }
    }

    // ---- wire format (spec §6) ----

    pub fn raw_bytes(&self) -> Vec<u8> {
        match &self.storage {
            Storage::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Storage::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Storage::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Storage::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }

    pub fn from_parts(
        dtype: DType,
        shape: Vec<usize>,
        strides_elems: Vec<usize>,
        bytes: &[u8],
    ) -> TensorResult<Array> {
        let isz = dtype.itemsize();
        if bytes.len() % isz != 0 {
            return Err(TensorError::FileFormatError("buffer length not a multiple of itemsize".into()));
        }
        let n = bytes.len() / isz;
        let storage = match dtype {
            DType::I32 => Storage::I32(bytes.chunks_exact(4).map(|c| i32::from_le_bytes(c.try_into().unwrap())).collect()),
            DType::I64 => Storage::I64(bytes.chunks_exact(8).map(|c| i64::from_le_bytes(c.try_into().unwrap())).collect()),
            DType::F32 => Storage::F32(bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect()),
            DType::F64 => Storage::F64(bytes.chunks_exact(8).map(|c| f64::from_le_bytes(c.try_into().unwrap())).collect()),
        };
        if storage.len() != n {
            return Err(TensorError::FileFormatError("element count mismatch".into()));
        }
        let shape = Shape::new(shape)?;
        Ok(Array { storage, shape, strides: strides_elems })
    }

    /// Approximate equality, element by element (same tolerance as
    /// [`ScalarValue::approx_eq`]).
    pub fn approx_eq(&self, other: &Array) -> bool {
        if self.dtype() != other.dtype() || self.shape.dims() != other.shape.dims() {
            return false;
        }
        let n = self.total_size();
        for lin in 0..n {
            let idx = unravel(lin, self.shape.dims());
            let a = self.value_at(&idx).unwrap();
            let b = other.value_at(&idx).unwrap();
            if !a.approx_eq(b) {
                return false;
            }
        }
        true
    }

    pub fn to_vec_scalar(&self) -> Vec<ScalarValue> {
        (0..self.total_size())
            .map(|lin| self.value_at(&unravel(lin, self.shape.dims())).unwrap())
            .collect()
    }
}

/// Row-major index decomposition of a linear index (spec: "loop high-to-low,
/// `idx_d = tmp % shape[d]`").
fn unravel(linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0usize; shape.len()];
    let mut tmp = linear;
    for d in (0..shape.len()).rev() {
        let dim = shape[d].max(1);
        idx[d] = tmp % dim;
        tmp /= dim;
    }
    idx
}

fn op_add<T: Add<Output = T>>(a: T, b: T) -> T {
    a + b
}
fn op_sub<T: Sub<Output = T>>(a: T, b: T) -> T {
    a - b
}
fn op_mul<T: Mul<Output = T>>(a: T, b: T) -> T {
    a * b
}
fn op_div<T: Div<Output = T>>(a: T, b: T) -> T {
    a / b
}
fn op_max<T: PartialOrd>(a: T, b: T) -> T {
    if a >= b {
        a
    } else {
        b
    }
}
fn op_min<T: PartialOrd>(a: T, b: T) -> T {
    if a <= b {
        a
    } else {
        b
    }
}
fn op_gt<T: PartialOrd + Zero + One>(a: T, b: T) -> T {
    if a > b {
        T::one()
    } else {
        T::zero()
    }
}
fn op_ge<T: PartialOrd + Zero + One>(a: T, b: T) -> T {
    if a >= b {
        T::one()
    } else {
        T::zero()
    }
}
fn op_lt<T: PartialOrd + Zero + One>(a: T, b: T) -> T {
    if a < b {
        T::one()
    } else {
        T::zero()
    }
}
fn op_le<T: PartialOrd + Zero + One>(a: T, b: T) -> T {
    if a <= b {
        T::one()
    } else {
        T::zero()
    }
}
fn op_eq<T: PartialOrd + Zero + One>(a: T, b: T) -> T {
    if a == b {
        T::one()
    } else {
        T::zero()
    }
}

/// Shared broadcast + apply loop for a binary elementwise kernel (spec's
/// four-step elementwise algorithm).
fn broadcast_apply<T: Copy + Send + Sync>(
    a: &[T],
    ashape: &[usize],
    astrides: &[usize],
    b: &[T],
    bshape: &[usize],
    bstrides: &[usize],
    f: impl Fn(T, T) -> T + Sync,
) -> TensorResult<(Vec<T>, Vec<usize>)>
where
    T: Default,
{
    let out_shape = broadcast_shapes(ashape, bshape)?;
    let a_bs = broadcast_strides(ashape, astrides, &out_shape);
    let b_bs = broadcast_strides(bshape, bstrides, &out_shape);
    let total: usize = out_shape.iter().product();

    let compute = |lin: usize| -> T {
        let idx = unravel(lin, &out_shape);
        let aoff: usize = idx.iter().zip(a_bs.iter()).map(|(i, s)| i * s).sum();
        let boff: usize = idx.iter().zip(b_bs.iter()).map(|(i, s)| i * s).sum();
        f(a[aoff], b[boff])
    };

    #[cfg(feature = "rayon")]
    let out: Vec<T> = (0..total).into_par_iter().map(compute).collect();
    #[cfg(not(feature = "rayon"))]
    let out: Vec<T> = (0..total).map(compute).collect();

    Ok((out, out_shape))
}

fn binary_kernel(
    a: &Array,
    b: &Array,
    name: &str,
    fi32: fn(i32, i32) -> i32,
    fi64: fn(i64, i64) -> i64,
    ff32: fn(f32, f32) -> f32,
    ff64: fn(f64, f64) -> f64,
) -> TensorResult<Array> {
    match (&a.storage, &b.storage) {
        (Storage::I32(av), Storage::I32(bv)) => {
            let (data, shape) = broadcast_apply(av, a.shape.dims(), &a.strides, bv, b.shape.dims(), &b.strides, fi32)?;
            Array::from_contiguous(Storage::I32(data), shape)
        }
        (Storage::I64(av), Storage::I64(bv)) => {
            let (data, shape) = broadcast_apply(av, a.shape.dims(), &a.strides, bv, b.shape.dims(), &b.strides, fi64)?;
            Array::from_contiguous(Storage::I64(data), shape)
        }
        (Storage::F32(av), Storage::F32(bv)) => {
            let (data, shape) = broadcast_apply(av, a.shape.dims(), &a.strides, bv, b.shape.dims(), &b.strides, ff32)?;
            Array::from_contiguous(Storage::F32(data), shape)
        }
        (Storage::F64(av), Storage::F64(bv)) => {
            let (data, shape) = broadcast_apply(av, a.shape.dims(), &a.strides, bv, b.shape.dims(), &b.strides, ff64)?;
            Array::from_contiguous(Storage::F64(data), shape)
        }
        _ => Err(TensorError::DtypeMismatch(format!("{}: dtype mismatch", name))),
    }
}

fn unary_kernel(
    a: &Array,
    fi32: fn(i32) -> i32,
    fi64: fn(i64) -> i64,
    ff32: fn(f32) -> f32,
    ff64: fn(f64) -> f64,
) -> TensorResult<Array> {
    let n = a.total_size();
    macro_rules! apply {
        ($v:expr, $f:expr) => {{
            let mut out = Vec::with_capacity(n);
            for lin in 0..n {
                let idx = unravel(lin, a.shape.dims());
                let off: usize = idx.iter().zip(a.strides.iter()).map(|(i, s)| i * s).sum();
                out.push($f($v[off]));
            }
            out
        }};
    }
    let storage = match &a.storage {
        Storage::I32(v) => Storage::I32(apply!(v, fi32)),
        Storage::I64(v) => Storage::I64(apply!(v, fi64)),
        Storage::F32(v) => Storage::F32(apply!(v, ff32)),
        Storage::F64(v) => Storage::F64(apply!(v, ff64)),
    };
    Array::from_contiguous(storage, a.shape.dims().to_vec())
}

#[allow(clippy::too_many_arguments)]
fn run_batched_gemm_f32(
    a: &[f32],
    a_mat_strides: &[usize],
    a_batch_strides: Vec<usize>,
    b: &[f32],
    b_mat_strides: &[usize],
    b_batch_strides: Vec<usize>,
    out: &mut [f32],
    batch_shape: &[usize],
    m: usize,
    k: usize,
    n: usize,
) {
    let batch_count: usize = batch_shape.iter().product::<usize>().max(1);
    for batch in 0..batch_count {
        let idx = unravel(batch, batch_shape);
        let a_off: usize = idx.iter().zip(a_batch_strides.iter()).map(|(i, s)| i * s).sum();
        let b_off: usize = idx.iter().zip(b_batch_strides.iter()).map(|(i, s)| i * s).sum();
        let a_tile = gather_tile_f32(a, a_off, a_mat_strides, m, k);
        let b_tile = gather_tile_f32(b, b_off, b_mat_strides, k, n);
        let out_off = batch * m * n;
        gemm_f32(&a_tile, &b_tile, &mut out[out_off..out_off + m * n], m, k, n);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_batched_gemm_f64(
    a: &[f64],
    a_mat_strides: &[usize],
    a_batch_strides: Vec<usize>,
    b: &[f64],
    b_mat_strides: &[usize],
    b_batch_strides: Vec<usize>,
    out: &mut [f64],
    batch_shape: &[usize],
    m: usize,
    k: usize,
    n: usize,
) {
    let batch_count: usize = batch_shape.iter().product::<usize>().max(1);
    for batch in 0..batch_count {
        let idx = unravel(batch, batch_shape);
        let a_off: usize = idx.iter().zip(a_batch_strides.iter()).map(|(i, s)| i * s).sum();
        let b_off: usize = idx.iter().zip(b_batch_strides.iter()).map(|(i, s)| i * s).sum();
        let a_tile = gather_tile_f64(a, a_off, a_mat_strides, m, k);
        let b_tile = gather_tile_f64(b, b_off, b_mat_strides, k, n);
        let out_off = batch * m * n;
        gemm_f64(&a_tile, &b_tile, &mut out[out_off..out_off + m * n], m, k, n);
    }
}

fn gather_tile_f32(data: &[f32], base: usize, mat_strides: &[usize], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            out.push(data[base + i * mat_strides[0] + j * mat_strides[1]]);
        }
    }
    out
}

fn gather_tile_f64(data: &[f64], base: usize, mat_strides: &[usize], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            out.push(data[base + i * mat_strides[0] + j * mat_strides[1]]);
        }
    }
    out
}

/// Row-major GEMM on two already-contiguous tiles. Delegates to `cblas`
/// sgemm when built with the `blas` feature; otherwise a naive O(mnk) loop
/// (spec's design notes explicitly permit this when no BLAS is available).
fn gemm_f32(a: &[f32], b: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) {
    #[cfg(feature = "blas")]
    {
        use cblas::{sgemm, Layout, Transpose};
        unsafe {
            sgemm(
                Layout::RowMajor,
                Transpose::None,
                Transpose::None,
                m as i32,
                n as i32,
                k as i32,
                1.0,
                a,
                k as i32,
                b,
                n as i32,
                0.0,
                out,
                n as i32,
            );
        }
        return;
    }
    #[cfg(not(feature = "blas"))]
    {
        naive_gemm(a, b, out, m, k, n);
    }
}

fn gemm_f64(a: &[f64], b: &[f64], out: &mut [f64], m: usize, k: usize, n: usize) {
    #[cfg(feature = "blas")]
    {
        use cblas::{dgemm, Layout, Transpose};
        unsafe {
            dgemm(
                Layout::RowMajor,
                Transpose::None,
                Transpose::None,
                m as i32,
                n as i32,
                k as i32,
                1.0,
                a,
                k as i32,
                b,
                n as i32,
                0.0,
                out,
                n as i32,
            );
        }
        return;
    }
    #[cfg(not(feature = "blas"))]
    {
        naive_gemm(a, b, out, m, k, n);
    }
}

#[allow(dead_code)]
fn naive_gemm<T>(a: &[T], b: &[T], out: &mut [T], m: usize, k: usize, n: usize)
where
    T: Copy + Default + Add<Output = T> + Mul<Output = T>,
{
    for i in 0..m {
        for j in 0..n {
            let mut acc = T::default();
            for p in 0..k {
                acc = acc + a[i * k + p] * b[p * n + j];
            }
            out[i * n + j] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let a = Array::array_init(vec![2, 3], DType::F32).unwrap();
        assert_eq!(a.strides(), &[3, 1]);
    }

    #[test]
    fn eye_diagonal() {
        let a = Array::eye(3, 3, DType::F32).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let v = a.value_at(&[i, j]).unwrap();
                let expect = if i == j { 1.0 } else { 0.0 };
                assert_eq!(v, ScalarValue::F32(expect));
            }
        }
    }

    #[test]
    fn broadcast_add_row_vector() {
        let mut a = Array::eye(3, 3, DType::F32).unwrap();
        a.addi(&row_vec_f32(&[2.0, 3.0, 4.0])).unwrap();
        let expect = [[3.0, 3.0, 4.0], [2.0, 4.0, 4.0], [2.0, 3.0, 5.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(a.value_at(&[i, j]).unwrap(), ScalarValue::F32(expect[i][j]));
            }
        }
    }

    fn row_vec_f32(values: &[f32]) -> Array {
        let mut a = Array::array_init(vec![values.len()], DType::F32).unwrap();
        for (i, &v) in values.iter().enumerate() {
            a.set_value(&[i], ScalarValue::F32(v)).unwrap();
        }
        a
    }

    #[test]
    fn sum_dim_keepdims() {
        let mut a = Array::array_init(vec![2, 3], DType::F32).unwrap();
        for i in 0..2 {
            for j in 0..3 {
                a.set_value(&[i, j], ScalarValue::F32((i * 3 + j) as f32)).unwrap();
            }
        }
        let s = a.sum_dim(0, true).unwrap();
        assert_eq!(s.shape().dims(), &[1, 3]);
        assert_eq!(s.value_at(&[0, 0]).unwrap(), ScalarValue::F32(3.0));
        assert_eq!(s.value_at(&[0, 1]).unwrap(), ScalarValue::F32(5.0));
        assert_eq!(s.value_at(&[0, 2]).unwrap(), ScalarValue::F32(7.0));
    }

    #[test]
    fn transpose_permutation() {
        let mut a = Array::array_init(vec![2, 3, 3], DType::F32).unwrap();
        let mut c = 0.0f32;
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..3 {
                    a.set_value(&[i, j, k], ScalarValue::F32(c)).unwrap();
                    c += 1.0;
                }
            }
        }
        let t = a.transpose(&[1, 2, 0]).unwrap();
        assert_eq!(t.shape().dims(), &[3, 3, 2]);
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..3 {
                    assert_eq!(t.value_at(&[j, k, i]).unwrap(), a.value_at(&[i, j, k]).unwrap());
                }
            }
        }
    }

    #[test]
    fn matmul_batched() {
        let mut a = Array::array_init(vec![2, 2, 2], DType::F32).unwrap();
        let vals = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mut idx = 0;
        for b in 0..2 {
            for i in 0..2 {
                for j in 0..2 {
                    a.set_value(&[b, i, j], ScalarValue::F32(vals[idx])).unwrap();
                    idx += 1;
                }
            }
        }
        let mut ident = Array::eye(2, 2, DType::F32).unwrap();
        ident = ident.transpose(&[0, 1]).unwrap();
        let ident3d = ident.copy();
        let mut b3 = Array::array_init(vec![1, 2, 2], DType::F32).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                b3.set_value(&[0, i, j], ident3d.value_at(&[i, j]).unwrap()).unwrap();
            }
        }
        let out = a.matmul(&b3).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2, 2]);
        assert!(out.approx_eq(&a));
    }

    #[test]
    fn transpose_rejects_repeated_dims() {
        let a = Array::array_init(vec![2, 2], DType::F32).unwrap();
        assert!(a.transpose(&[0, 0]).is_err());
    }
}
