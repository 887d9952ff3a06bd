//! Scalar value: a single tagged numeric value with arithmetic and
//! approximate equality (spec §4.A). Used for indexed element access
//! (`Array::value_at` / `Array::set_value`) so callers never have to match
//! on [`crate::dtype::DType`] themselves.

use crate::dtype::DType;

/// A discriminated numeric value carrying one of the four supported dtypes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl ScalarValue {
    pub fn dtype(self) -> DType {
        match self {
            ScalarValue::I32(_) => DType::I32,
            ScalarValue::I64(_) => DType::I64,
            ScalarValue::F32(_) => DType::F32,
            ScalarValue::F64(_) => DType::F64,
        }
    }

    pub fn zero(dtype: DType) -> ScalarValue {
        match dtype {
            DType::I32 => ScalarValue::I32(0),
            DType::I64 => ScalarValue::I64(0),
            DType::F32 => ScalarValue::F32(0.0),
            DType::F64 => ScalarValue::F64(0.0),
        }
    }

    pub fn one(dtype: DType) -> ScalarValue {
        match dtype {
            DType::I32 => ScalarValue::I32(1),
            DType::I64 => ScalarValue::I64(1),
            DType::F32 => ScalarValue::F32(1.0),
            DType::F64 => ScalarValue::F64(1.0),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ScalarValue::I32(v) => v as f64,
            ScalarValue::I64(v) => v as f64,
            ScalarValue::F32(v) => v as f64,
            ScalarValue::F64(v) => v,
        }
    }

    pub fn add(self, other: ScalarValue) -> ScalarValue {
        match (self, other) {
            (ScalarValue::I32(a), ScalarValue::I32(b)) => ScalarValue::I32(a.wrapping_add(b)),
            (ScalarValue::I64(a), ScalarValue::I64(b)) => ScalarValue::I64(a.wrapping_add(b)),
            (ScalarValue::F32(a), ScalarValue::F32(b)) => ScalarValue::F32(a + b),
            (ScalarValue::F64(a), ScalarValue::F64(b)) => ScalarValue::F64(a + b),
            _ => panic!("ScalarValue::add: dtype mismatch"),
        }
    }

    pub fn sub(self, other: ScalarValue) -> ScalarValue {
        match (self, other) {
            (ScalarValue::I32(a), ScalarValue::I32(b)) => ScalarValue::I32(a.wrapping_sub(b)),
            (ScalarValue::I64(a), ScalarValue::I64(b)) => ScalarValue::I64(a.wrapping_sub(b)),
            (ScalarValue::F32(a), ScalarValue::F32(b)) => ScalarValue::F32(a - b),
            (ScalarValue::F64(a), ScalarValue::F64(b)) => ScalarValue::F64(a - b),
            _ => panic!("ScalarValue::sub: dtype mismatch"),
        }
    }

    pub fn mul(self, other: ScalarValue) -> ScalarValue {
        match (self, other) {
            (ScalarValue::I32(a), ScalarValue::I32(b)) => ScalarValue::I32(a.wrapping_mul(b)),
            (ScalarValue::I64(a), ScalarValue::I64(b)) => ScalarValue::I64(a.wrapping_mul(b)),
            (ScalarValue::F32(a), ScalarValue::F32(b)) => ScalarValue::F32(a * b),
            (ScalarValue::F64(a), ScalarValue::F64(b)) => ScalarValue::F64(a * b),
            _ => panic!("ScalarValue::mul: dtype mismatch"),
        }
    }

    /// Integer division truncates toward zero; division by zero follows
    /// platform behavior (panics for ints, inf/NaN for floats) per spec.
    pub fn div(self, other: ScalarValue) -> ScalarValue {
        match (self, other) {
            (ScalarValue::I32(a), ScalarValue::I32(b)) => ScalarValue::I32(a / b),
            (ScalarValue::I64(a), ScalarValue::I64(b)) => ScalarValue::I64(a / b),
            (ScalarValue::F32(a), ScalarValue::F32(b)) => ScalarValue::F32(a / b),
            (ScalarValue::F64(a), ScalarValue::F64(b)) => ScalarValue::F64(a / b),
            _ => panic!("ScalarValue::div: dtype mismatch"),
        }
    }

    pub fn neg(self) -> ScalarValue {
        match self {
            ScalarValue::I32(a) => ScalarValue::I32(a.wrapping_neg()),
            ScalarValue::I64(a) => ScalarValue::I64(a.wrapping_neg()),
            ScalarValue::F32(a) => ScalarValue::F32(-a),
            ScalarValue::F64(a) => ScalarValue::F64(-a),
        }
    }

    /// Exact for integers; absolute tolerance 1e-6 (F32) / 1e-9 (F64).
    /// NaN never compares equal to anything, including itself.
    pub fn approx_eq(self, other: ScalarValue) -> bool {
        match (self, other) {
            (ScalarValue::I32(a), ScalarValue::I32(b)) => a == b,
            (ScalarValue::I64(a), ScalarValue::I64(b)) => a == b,
            (ScalarValue::F32(a), ScalarValue::F32(b)) => {
                !a.is_nan() && !b.is_nan() && (a - b).abs() <= 1e-6
            }
            (ScalarValue::F64(a), ScalarValue::F64(b)) => {
                !a.is_nan() && !b.is_nan() && (a - b).abs() <= 1e-9
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_tolerance() {
        assert!(ScalarValue::F32(1.0).approx_eq(ScalarValue::F32(1.0 + 5e-7)));
        assert!(!ScalarValue::F32(1.0).approx_eq(ScalarValue::F32(1.1)));
        assert!(!ScalarValue::F32(f32::NAN).approx_eq(ScalarValue::F32(f32::NAN)));
    }

    #[test]
    fn int_exact() {
        assert!(ScalarValue::I32(3).approx_eq(ScalarValue::I32(3)));
        assert!(!ScalarValue::I32(3).approx_eq(ScalarValue::I32(4)));
    }

    #[test]
    fn truncating_division() {
        assert_eq!(ScalarValue::I32(-7).div(ScalarValue::I32(2)), ScalarValue::I32(-3));
    }
}
