use bytes::{Bytes, BytesMut};

use crate::error::{ErrorCode, QuicheError, QuicheResult};

/// Little-endian typed writer over a fixed-capacity buffer.
///
/// Builders never grow automatically: a write that would exceed `capacity`
/// fails instead of reallocating. `write_at` patches bytes already emitted,
/// used for ack-frame truncation.
pub struct ByteBuilder {
    buf: BytesMut,
    capacity: usize,
}

fn overflow(field: &str) -> QuicheError {
    QuicheError::new(
        ErrorCode::InvalidFrameData,
        format!("{field} does not fit in remaining capacity"),
    )
}

impl ByteBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buf.len()
    }

    fn ensure_fits(&self, width: usize, field: &str) -> QuicheResult<()> {
        if self.remaining_capacity() < width {
            return Err(overflow(field));
        }
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> QuicheResult<()> {
        self.ensure_fits(1, "u8")?;
        self.buf.extend_from_slice(&[v]);
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> QuicheResult<()> {
        self.ensure_fits(2, "u16")?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> QuicheResult<()> {
        self.ensure_fits(4, "u32")?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    /// Writes the low 48 bits of `v`, little-endian.
    pub fn write_u48(&mut self, v: u64) -> QuicheResult<()> {
        self.ensure_fits(6, "u48")?;
        let bytes = v.to_le_bytes();
        self.buf.extend_from_slice(&bytes[..6]);
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> QuicheResult<()> {
        self.ensure_fits(8, "u64")?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> QuicheResult<()> {
        self.ensure_fits(4, "i32")?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    /// Writes a sequence number in the given wire width (1, 2, 4, or 6 bytes).
    pub fn write_uint(&mut self, width: usize, v: u64) -> QuicheResult<()> {
        match width {
            0 => Ok(()),
            1 => self.write_u8(v as u8),
            2 => self.write_u16(v as u16),
            4 => self.write_u32(v as u32),
            6 => self.write_u48(v),
            8 => self.write_u64(v),
            _ => Err(QuicheError::new(
                ErrorCode::InvalidFrameData,
                format!("unsupported integer width {width}"),
            )),
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> QuicheResult<()> {
        self.ensure_fits(data.len(), "raw bytes")?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Writes a u16 length-prefixed UTF-8 string.
    pub fn write_string16(&mut self, s: &str) -> QuicheResult<()> {
        if s.len() > u16::MAX as usize {
            return Err(QuicheError::new(
                ErrorCode::InvalidFrameData,
                "string exceeds 65535 bytes",
            ));
        }
        self.write_u16(s.len() as u16)?;
        self.write_bytes(s.as_bytes())
    }

    /// Fills the remaining capacity with zero bytes (PADDING frame body).
    pub fn write_padding(&mut self) {
        let n = self.remaining_capacity();
        self.buf.extend(std::iter::repeat(0u8).take(n));
    }

    /// Patches an already-written byte at `offset`.
    pub fn write_u8_at(&mut self, offset: usize, v: u8) {
        self.buf[offset] = v;
    }

    /// Patches an already-written 48-bit field at `offset`.
    pub fn write_u48_at(&mut self, offset: usize, v: u64) {
        let bytes = v.to_le_bytes();
        self.buf[offset..offset + 6].copy_from_slice(&bytes[..6]);
    }

    /// Patches an already-written 32-bit field at `offset`.
    pub fn write_u32_at(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_fails_without_growing_past_capacity() {
        let mut b = ByteBuilder::new(2);
        assert!(b.write_u8(1).is_ok());
        assert!(b.write_u16(2).is_err());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn write_at_patches_in_place() {
        let mut b = ByteBuilder::new(8);
        b.write_u8(0).unwrap();
        let offset = b.len();
        b.write_u48(1).unwrap();
        b.write_u48_at(offset, 0xFFFF_FFFF_FFFF);
        let frozen = b.freeze();
        assert_eq!(&frozen[offset..offset + 6], &[0xFF; 6]);
    }
}
