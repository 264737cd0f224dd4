use byteorder::{BigEndian, ByteOrder, LittleEndian};
use relic_math::{DVec3, Vec2, Vec3};
use thiserror::Error;

/// Byte order of a [`ByteReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Errors raised by the byte layer.
///
/// Running out of data is deliberately its own variant so callers can
/// tell "stream ended" apart from "stream lied about a position": some
/// side files are allowed to end early and absorb the former, while the
/// latter is always corruption.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unexpected end of data at offset {offset}: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("position {target} is outside the buffer of {len} bytes")]
    OutOfBounds { target: usize, len: usize },
    #[error("string at offset {offset} is not terminated within {limit} bytes")]
    UnterminatedString { offset: usize, limit: usize },
}

pub type ReadResult<T> = Result<T, ReadError>;

/// Cursor over an in-memory buffer with a fixed byte order.
///
/// All multi-byte reads go through `byteorder` with the endianness chosen
/// at construction. Reads never panic and never run past the end of the
/// buffer; every failure is a [`ReadError`] carrying the offset.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Absolute seek. The end of the buffer is a valid position; anything
    /// past it is corruption and fails.
    pub fn set_position(&mut self, target: usize) -> ReadResult<()> {
        if target > self.buf.len() {
            return Err(ReadError::OutOfBounds {
                target,
                len: self.buf.len(),
            });
        }
        self.pos = target;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> ReadResult<()> {
        let target = self.pos.saturating_add(n);
        self.set_position(target)
    }

    /// Consume `n` bytes and return them. The single bounds check every
    /// other read funnels through.
    pub fn take(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ReadError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// A reader over the next `len` bytes, sharing this reader's byte
    /// order. The parent cursor advances past the carved region, so a
    /// nested unit can never read outside its declared extent.
    pub fn sub_reader(&mut self, len: usize) -> ReadResult<ByteReader<'a>> {
        let slice = self.take(len)?;
        Ok(ByteReader::new(slice, self.endian))
    }

    pub fn read_u8(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> ReadResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> ReadResult<u16> {
        let b = self.take(2)?;
        Ok(match self.endian {
            Endian::Big => BigEndian::read_u16(b),
            Endian::Little => LittleEndian::read_u16(b),
        })
    }

    pub fn read_i16(&mut self) -> ReadResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> ReadResult<u32> {
        let b = self.take(4)?;
        Ok(match self.endian {
            Endian::Big => BigEndian::read_u32(b),
            Endian::Little => LittleEndian::read_u32(b),
        })
    }

    pub fn read_i32(&mut self) -> ReadResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> ReadResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> ReadResult<f64> {
        let b = self.take(8)?;
        Ok(match self.endian {
            Endian::Big => BigEndian::read_f64(b),
            Endian::Little => LittleEndian::read_f64(b),
        })
    }

    /// Next u16 without advancing. Used for record lookahead.
    pub fn peek_u16(&self) -> ReadResult<u16> {
        if self.remaining() < 2 {
            return Err(ReadError::UnexpectedEof {
                offset: self.pos,
                needed: 2,
                available: self.remaining(),
            });
        }
        let b = &self.buf[self.pos..self.pos + 2];
        Ok(match self.endian {
            Endian::Big => BigEndian::read_u16(b),
            Endian::Little => LittleEndian::read_u16(b),
        })
    }

    pub fn read_vec2f(&mut self) -> ReadResult<Vec2> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec3f(&mut self) -> ReadResult<Vec3> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_vec3d(&mut self) -> ReadResult<DVec3> {
        Ok(DVec3::new(
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
        ))
    }

    /// Read exactly `n` bytes holding a NUL-padded string. The result is
    /// truncated at the first NUL; invalid UTF-8 is replaced, not fatal.
    pub fn read_string_fixed(&mut self, n: usize) -> ReadResult<String> {
        let raw = self.take(n)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Read a NUL-terminated string, consuming the terminator. A missing
    /// terminator fails instead of running to the end of the buffer.
    pub fn read_cstring(&mut self) -> ReadResult<String> {
        let start = self.pos;
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
                self.pos += nul + 1;
                Ok(s)
            }
            None => Err(ReadError::UnterminatedString {
                offset: start,
                limit: rest.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use proptest::prelude::*;

    #[test]
    fn test_primitive_reads_big_endian() {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(0x0102).unwrap();
        buf.write_i16::<BigEndian>(-2).unwrap();
        buf.write_u32::<BigEndian>(0xdead_beef).unwrap();
        buf.write_f32::<BigEndian>(1.5).unwrap();
        buf.write_f64::<BigEndian>(-0.25).unwrap();

        let mut r = ByteReader::new(&buf, Endian::Big);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), -0.25);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_primitive_reads_little_endian() {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(0x4d4d).unwrap();
        buf.write_u32::<LittleEndian>(0x0000_000a).unwrap();

        let mut r = ByteReader::new(&buf, Endian::Little);
        assert_eq!(r.read_u16().unwrap(), 0x4d4d);
        assert_eq!(r.read_u32().unwrap(), 10);
    }

    #[test]
    fn test_eof_is_distinguishable_and_carries_position() {
        let buf = [0u8; 3];
        let mut r = ByteReader::new(&buf, Endian::Big);
        r.read_u16().unwrap();

        match r.read_u32() {
            Err(ReadError::UnexpectedEof {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 4);
                assert_eq!(available, 1);
            }
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
        // A failed read does not move the cursor.
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let buf = [0x00, 0x0b, 0x00, 0x04];
        let mut r = ByteReader::new(&buf, Endian::Big);

        assert_eq!(r.peek_u16().unwrap(), 0x000b);
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u16().unwrap(), 0x000b);
        assert_eq!(r.read_u16().unwrap(), 0x0004);
    }

    #[test]
    fn test_set_position_bounds() {
        let buf = [0u8; 4];
        let mut r = ByteReader::new(&buf, Endian::Big);

        r.set_position(4).unwrap();
        assert_eq!(r.remaining(), 0);
        assert!(matches!(
            r.set_position(5),
            Err(ReadError::OutOfBounds { target: 5, len: 4 })
        ));
    }

    #[test]
    fn test_sub_reader_is_bounded() {
        let buf = [1u8, 2, 3, 4, 5, 6];
        let mut r = ByteReader::new(&buf, Endian::Big);
        let mut sub = r.sub_reader(4).unwrap();

        assert_eq!(r.position(), 4);
        assert_eq!(sub.len(), 4);
        sub.skip(3).unwrap();
        assert!(sub.read_u16().is_err());
    }

    #[test]
    fn test_fixed_string_truncates_at_nul() {
        let buf = b"abc\0defgh";
        let mut r = ByteReader::new(buf, Endian::Big);
        assert_eq!(r.read_string_fixed(8).unwrap(), "abc");
        // The cursor still consumed all 8 bytes.
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn test_cstring_and_unterminated_failure() {
        let buf = b"name\0tail";
        let mut r = ByteReader::new(buf, Endian::Big);
        assert_eq!(r.read_cstring().unwrap(), "name");
        assert!(matches!(
            r.read_cstring(),
            Err(ReadError::UnterminatedString { offset: 5, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_u32_roundtrip_both_endians(v: u32) {
            let mut be = Vec::new();
            be.write_u32::<BigEndian>(v).unwrap();
            let mut le = Vec::new();
            le.write_u32::<LittleEndian>(v).unwrap();

            prop_assert_eq!(ByteReader::new(&be, Endian::Big).read_u32().unwrap(), v);
            prop_assert_eq!(ByteReader::new(&le, Endian::Little).read_u32().unwrap(), v);
        }

        #[test]
        fn prop_f64_roundtrip(v: f64) {
            let mut be = Vec::new();
            be.write_f64::<BigEndian>(v).unwrap();
            let got = ByteReader::new(&be, Endian::Big).read_f64().unwrap();
            prop_assert_eq!(got.to_bits(), v.to_bits());
        }

        #[test]
        fn prop_take_never_overruns(len in 0usize..64, n in 0usize..128) {
            let buf = vec![0u8; len];
            let mut r = ByteReader::new(&buf, Endian::Big);
            match r.take(n) {
                Ok(slice) => prop_assert_eq!(slice.len(), n),
                Err(ReadError::UnexpectedEof { available, .. }) => {
                    prop_assert!(n > len);
                    prop_assert_eq!(available, len);
                }
                Err(e) => prop_assert!(false, "unexpected error {:?}", e),
            }
        }
    }
}
