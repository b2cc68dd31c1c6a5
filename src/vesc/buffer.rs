//! # Fixed-Point Field Reader
//!
//! Cursor over a response payload. VESC encodes floats as big-endian
//! integers scaled by a per-field factor.

use super::decoder::DecodeError;

/// Sequential big-endian reader over a payload
#[derive(Debug)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.index + N;
        let bytes = self.data.get(self.index..end).ok_or(DecodeError::PayloadTooShort {
            needed: end,
            actual: self.data.len(),
        })?;

        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.index = end;
        Ok(out)
    }

    /// Read one raw byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a big-endian i16
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    /// Read a big-endian i32
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    /// Read a big-endian i16 and divide by `scale`
    pub fn read_f16(&mut self, scale: f32) -> Result<f32, DecodeError> {
        Ok(self.read_i16()? as f32 / scale)
    }

    /// Read a big-endian i32 and divide by `scale`
    pub fn read_f32(&mut self, scale: f32) -> Result<f32, DecodeError> {
        Ok(self.read_i32()? as f32 / scale)
    }
}
