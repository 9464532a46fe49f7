use bytes::{Buf, Bytes};

use crate::error::{ErrorCode, QuicheError, QuicheResult};

/// Little-endian typed reader over a bounded buffer.
///
/// Every `read_*` either advances `position` by the field width or fails
/// without consuming anything — callers can always retry a failed read
/// against a cursor left exactly where it was.
pub struct ByteCursor {
    buf: Bytes,
    position: usize,
}

fn underrun(field: &str) -> QuicheError {
    QuicheError::new(
        ErrorCode::InvalidPacketHeader,
        format!("Unable to read {field}: buffer underrun"),
    )
}

impl ByteCursor {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total_len(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    fn slice(&self, n: usize) -> &[u8] {
        &self.buf[self.position..self.position + n]
    }

    pub fn read_u8(&mut self) -> QuicheResult<u8> {
        if self.remaining() < 1 {
            return Err(underrun("u8"));
        }
        let v = self.slice(1)[0];
        self.position += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> QuicheResult<u16> {
        if self.remaining() < 2 {
            return Err(underrun("u16"));
        }
        let v = u16::from_le_bytes(self.slice(2).try_into().unwrap());
        self.position += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> QuicheResult<u32> {
        if self.remaining() < 4 {
            return Err(underrun("u32"));
        }
        let v = u32::from_le_bytes(self.slice(4).try_into().unwrap());
        self.position += 4;
        Ok(v)
    }

    /// Reads a 48-bit little-endian value into the low 48 bits of a `u64`.
    pub fn read_u48(&mut self) -> QuicheResult<u64> {
        if self.remaining() < 6 {
            return Err(underrun("u48"));
        }
        let bytes = self.slice(6);
        let mut v: u64 = 0;
        for (i, b) in bytes.iter().enumerate() {
            v |= (*b as u64) << (8 * i);
        }
        self.position += 6;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> QuicheResult<u64> {
        if self.remaining() < 8 {
            return Err(underrun("u64"));
        }
        let v = u64::from_le_bytes(self.slice(8).try_into().unwrap());
        self.position += 8;
        Ok(v)
    }

    /// Reads a sequence number serialized in the given width (1, 2, 4, or 6 bytes).
    pub fn read_uint(&mut self, width: usize) -> QuicheResult<u64> {
        match width {
            0 => Ok(0),
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            6 => self.read_u48(),
            8 => self.read_u64(),
            _ => Err(QuicheError::new(
                ErrorCode::InvalidPacketHeader,
                format!("unsupported integer width {width}"),
            )),
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> QuicheResult<Bytes> {
        if self.remaining() < n {
            return Err(underrun("bytes"));
        }
        let v = self.buf.slice(self.position..self.position + n);
        self.position += n;
        Ok(v)
    }

    /// Reads a u16 length-prefixed UTF-8 string.
    pub fn read_string16(&mut self) -> QuicheResult<String> {
        let len = self.read_u16()? as usize;
        let raw = self.read_bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| QuicheError::new(ErrorCode::InvalidFrameData, "string is not valid UTF-8"))
    }

    /// Returns the unread tail without consuming it.
    pub fn peek_remaining(&self) -> Bytes {
        self.buf.slice(self.position..)
    }

    /// Consumes and returns the unread tail.
    pub fn read_remaining(&mut self) -> Bytes {
        let v = self.buf.slice(self.position..);
        self.position = self.buf.len();
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_advance_and_round_trip() {
        let mut cursor = ByteCursor::new(Bytes::from_static(&[
            0x01, 0x02, 0x03, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
        ]));
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u16().unwrap(), 0x0302);
        assert_eq!(cursor.read_u48().unwrap(), 0x00FF_EEDD_CCBB_AA);
        assert!(cursor.is_done());
    }

    #[test]
    fn underrun_does_not_partially_consume() {
        let mut cursor = ByteCursor::new(Bytes::from_static(&[0x01]));
        assert!(cursor.read_u32().is_err());
        // position unchanged — the byte is still there for a narrower read.
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn string16_round_trips() {
        let mut builder = bytes::BytesMut::new();
        builder.extend_from_slice(&2u16.to_le_bytes());
        builder.extend_from_slice(b"hi");
        let mut cursor = ByteCursor::new(builder.freeze());
        assert_eq!(cursor.read_string16().unwrap(), "hi");
    }

    proptest::proptest! {
        #[test]
        fn uint_round_trips_through_builder_and_cursor(
            width in proptest::prop_oneof![
                proptest::strategy::Just(1usize),
                proptest::strategy::Just(2usize),
                proptest::strategy::Just(4usize),
                proptest::strategy::Just(6usize),
                proptest::strategy::Just(8usize),
            ],
            value in 0u64..=u64::MAX,
        ) {
            let mask = if width == 8 { u64::MAX } else { (1u64 << (8 * width)) - 1 };
            let truncated = value & mask;

            let mut builder = crate::bytes::ByteBuilder::new(8);
            builder.write_uint(width, truncated).unwrap();
            let mut cursor = ByteCursor::new(builder.freeze());
            proptest::prop_assert_eq!(cursor.read_uint(width).unwrap(), truncated);
        }
    }
}
