//! Element type tag shared by [`crate::array::Array`] and [`crate::tensor::Tensor`].

/// Closed set of element types. `requires_grad` is only valid on `F32`/`F64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub fn itemsize(self) -> usize {
        match self {
            DType::I32 => 4,
            DType::I64 => 8,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn is_int(self) -> bool {
        matches!(self, DType::I32 | DType::I64)
    }

    /// File-format tag: 0=I32, 1=F32, 2=F64, 3=I64 (see spec §6).
    pub fn wire_tag(self) -> u32 {
        match self {
            DType::I32 => 0,
            DType::F32 => 1,
            DType::F64 => 2,
            DType::I64 => 3,
        }
    }

    pub fn from_wire_tag(tag: u32) -> Option<DType> {
        match tag {
            0 => Some(DType::I32),
            1 => Some(DType::F32),
            2 => Some(DType::F64),
            3 => Some(DType::I64),
            _ => None,
        }
    }
}
