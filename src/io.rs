//! Fixed binary tensor persistence (spec §6). Layout, little-endian
//! throughout:
//!
//! ```text
//! magic      8 bytes   b"C-TENSOR"
//! dtype      u32       wire tag (see dtype::DType::wire_tag)
//! ndim       u32
//! buffer_elems u64     total element count
//! shape      ndim * u64
//! strides    ndim * u64   byte strides
//! data       buffer_elems * itemsize bytes
//! ```

use crate::array::Array;
use crate::dtype::DType;
use crate::error::{TensorError, TensorResult};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: &[u8; 8] = b"C-TENSOR";

pub fn save(array: &Array, path: impl AsRef<Path>) -> TensorResult<()> {
    let mut file = File::create(path.as_ref())
        .map_err(|e| TensorError::FileWriteFailure(format!("{}: {}", path.as_ref().display(), e)))?;
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&array.dtype().wire_tag().to_le_bytes());
    buf.extend_from_slice(&(array.ndim() as u32).to_le_bytes());
    buf.extend_from_slice(&(array.total_size() as u64).to_le_bytes());
    for &d in array.shape().dims() {
        buf.extend_from_slice(&(d as u64).to_le_bytes());
    }
    // Data is always written out contiguous (via `copy()` below), so the
    // strides recorded here must be the contiguous ones, not `array`'s own
    // (which may describe a broadcasted or transposed view).
    let contiguous = array.copy();
    for &s in &contiguous.byte_strides() {
        buf.extend_from_slice(&(s as u64).to_le_bytes());
    }
    buf.extend_from_slice(&contiguous.raw_bytes());
    file.write_all(&buf)
        .map_err(|e| TensorError::FileWriteFailure(format!("{}: {}", path.as_ref().display(), e)))?;
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> TensorResult<Array> {
    let mut file = File::open(path.as_ref())
        .map_err(|e| TensorError::FileReadFailure(format!("{}: {}", path.as_ref().display(), e)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| TensorError::FileReadFailure(format!("{}: {}", path.as_ref().display(), e)))?;

    let mut cursor = 0usize;
    let take = |cursor: &mut usize, n: usize| -> TensorResult<&[u8]> {
        if *cursor + n > buf.len() {
            return Err(TensorError::FileFormatError("truncated header".into()));
        }
        let slice = &buf[*cursor..*cursor + n];
        *cursor += n;
        Ok(slice)
    };

    let magic = take(&mut cursor, 8)?;
    if magic != MAGIC {
        return Err(TensorError::FileFormatError("bad magic header".into()));
    }
    let dtype_tag = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
    let dtype = DType::from_wire_tag(dtype_tag)
        .ok_or_else(|| TensorError::FileFormatError(format!("unknown dtype tag {}", dtype_tag)))?;
    let ndim = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
    let buffer_elems = u64::from_le_bytes(take(&mut cursor, 8)?.try_into().unwrap()) as usize;

    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(u64::from_le_bytes(take(&mut cursor, 8)?.try_into().unwrap()) as usize);
    }
    let mut byte_strides = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        byte_strides.push(u64::from_le_bytes(take(&mut cursor, 8)?.try_into().unwrap()) as usize);
    }
    let itemsize = dtype.itemsize();
    let elem_strides: Vec<usize> = byte_strides.iter().map(|&s| s / itemsize).collect();

    let data_len = buffer_elems * itemsize;
    let data = take(&mut cursor, data_len)?;
    Array::from_parts(dtype, shape, elem_strides, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::ScalarValue;

    #[test]
    fn round_trips_through_a_temp_file() {
        let mut a = Array::array_init(vec![2, 2], DType::F32).unwrap();
        a.set_value(&[0, 0], ScalarValue::F32(1.0)).unwrap();
        a.set_value(&[0, 1], ScalarValue::F32(2.0)).unwrap();
        a.set_value(&[1, 0], ScalarValue::F32(3.0)).unwrap();
        a.set_value(&[1, 1], ScalarValue::F32(4.0)).unwrap();

        let path = std::env::temp_dir().join("tendril_io_roundtrip_test.bin");
        save(&a, &path).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(loaded.approx_eq(&a));
    }

    #[test]
    fn rejects_bad_magic() {
        let path = std::env::temp_dir().join("tendril_io_bad_magic_test.bin");
        std::fs::write(&path, b"NOTAMAGIC_and_some_trailing_bytes").unwrap();
        let result = load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
