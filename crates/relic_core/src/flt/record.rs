//! Record framing for the OpenFlight format.
//!
//! A record is a big-endian `u16` opcode followed by a `u16` total length
//! that includes the 4-byte header itself. The scanner owns the cursor:
//! it carves each body out of the stream before handing it to a handler,
//! so a handler that under-reads or over-reads its body can never shift
//! the framing of the records that follow.
//!
//! Two quirks of real files are absorbed here. Continuation records
//! (opcode 23) extend the preceding record past the 16-bit length limit
//! and are spliced into one body. One historical exporter wrote its final
//! pop-level record with both header fields byte-swapped; the scanner
//! recognizes the swapped opcode and rewrites it.

use super::opcodes;
use crate::io::{ByteReader, Endian, ReadError};
use log::debug;
use relic_math::{unpack_abgr, DVec3, Vec2, Vec3, Vec4};
use std::borrow::Cow;
use thiserror::Error;

pub const HEADER_SIZE: usize = 4;

/// Stream-level corruption. Unlike a malformed record body, which is
/// absorbed, any of these discards the parse.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("record {opcode} declares length {declared} but only {available} bytes remain")]
    Overrun {
        opcode: u16,
        declared: u16,
        available: usize,
    },
    #[error("record {opcode} declares length {declared}, smaller than the {HEADER_SIZE} byte header")]
    BadLength { opcode: u16, declared: u16 },
    #[error("pop level with no open level")]
    UnbalancedPop,
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// One framed record with continuations already spliced in.
pub struct Record<'a> {
    pub opcode: u16,
    data: Cow<'a, [u8]>,
}

impl Record<'_> {
    pub fn body(&self) -> RecordBody<'_> {
        RecordBody::new(&self.data)
    }

    /// Body length, header excluded.
    pub fn body_len(&self) -> usize {
        self.data.len()
    }
}

/// Walks the records of one file.
pub struct RecordScanner<'a> {
    reader: ByteReader<'a>,
}

impl<'a> RecordScanner<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(bytes, Endian::Big),
        }
    }

    pub fn position(&self) -> usize {
        self.reader.position()
    }

    /// Raw bytes following the current record. The vertex palette holds
    /// its entries this way, outside any record's declared length.
    pub fn take_raw(&mut self, n: usize) -> Result<&'a [u8], FramingError> {
        Ok(self.reader.take(n)?)
    }

    fn peek_opcode(&self) -> Option<u16> {
        self.reader.peek_u16().ok()
    }

    /// Opcode and declared total length of the next record, with the
    /// byte-swapped pop-level artifact already corrected. `None` means
    /// the stream ended (fewer than 4 bytes left counts as padding).
    fn next_header(&mut self) -> Result<Option<(u16, u16)>, FramingError> {
        if self.reader.remaining() < HEADER_SIZE {
            return Ok(None);
        }
        let opcode = self.reader.read_u16()?;
        let length = self.reader.read_u16()?;
        if opcode == opcodes::SWAPPED_POP_LEVEL {
            // The length field of the artifact is swapped too and cannot
            // be trusted; a pop level is known to be header-only.
            debug!("corrected byte-swapped pop-level record");
            return Ok(Some((opcodes::POP_LEVEL, HEADER_SIZE as u16)));
        }
        if opcode == 0 && length == 0 {
            // Zero-filled tail padding.
            return Ok(None);
        }
        Ok(Some((opcode, length)))
    }

    fn carve_body(&mut self, opcode: u16, length: u16) -> Result<&'a [u8], FramingError> {
        if (length as usize) < HEADER_SIZE {
            return Err(FramingError::BadLength {
                opcode,
                declared: length,
            });
        }
        let body_len = length as usize - HEADER_SIZE;
        if body_len > self.reader.remaining() {
            return Err(FramingError::Overrun {
                opcode,
                declared: length,
                available: self.reader.remaining() + HEADER_SIZE,
            });
        }
        Ok(self.reader.take(body_len)?)
    }

    /// The next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record<'a>>, FramingError> {
        let Some((opcode, length)) = self.next_header()? else {
            return Ok(None);
        };
        let mut data = Cow::Borrowed(self.carve_body(opcode, length)?);

        while self.peek_opcode() == Some(opcodes::CONTINUATION) {
            let Some((cont, cont_length)) = self.next_header()? else {
                break;
            };
            let extra = self.carve_body(cont, cont_length)?;
            data.to_mut().extend_from_slice(extra);
        }
        Ok(Some(Record { opcode, data }))
    }
}

/// Reader over one record body.
///
/// Fields past the end of the body yield caller-supplied defaults instead
/// of failing: newer format revisions append fields, and files written by
/// older tools simply end the record early.
pub struct RecordBody<'a> {
    reader: ByteReader<'a>,
}

impl<'a> RecordBody<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data, Endian::Big),
        }
    }

    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// Skip `n` bytes, clamped to the body end.
    pub fn forward(&mut self, n: usize) {
        let n = n.min(self.reader.remaining());
        let _ = self.reader.skip(n);
    }

    pub fn read_u8_or(&mut self, default: u8) -> u8 {
        self.reader.read_u8().unwrap_or(default)
    }

    pub fn read_i8_or(&mut self, default: i8) -> i8 {
        self.reader.read_i8().unwrap_or(default)
    }

    pub fn read_u16_or(&mut self, default: u16) -> u16 {
        self.reader.read_u16().unwrap_or(default)
    }

    pub fn read_i16_or(&mut self, default: i16) -> i16 {
        self.reader.read_i16().unwrap_or(default)
    }

    pub fn read_u32_or(&mut self, default: u32) -> u32 {
        self.reader.read_u32().unwrap_or(default)
    }

    pub fn read_i32_or(&mut self, default: i32) -> i32 {
        self.reader.read_i32().unwrap_or(default)
    }

    pub fn read_f32_or(&mut self, default: f32) -> f32 {
        self.reader.read_f32().unwrap_or(default)
    }

    pub fn read_f64_or(&mut self, default: f64) -> f64 {
        self.reader.read_f64().unwrap_or(default)
    }

    pub fn read_vec2f(&mut self) -> Vec2 {
        self.reader.read_vec2f().unwrap_or(Vec2::ZERO)
    }

    pub fn read_vec3f(&mut self) -> Vec3 {
        self.reader.read_vec3f().unwrap_or(Vec3::ZERO)
    }

    pub fn read_vec3d(&mut self) -> DVec3 {
        self.reader.read_vec3d().unwrap_or(DVec3::ZERO)
    }

    pub fn read_vec4f(&mut self) -> Vec4 {
        Vec4::new(
            self.read_f32_or(0.0),
            self.read_f32_or(0.0),
            self.read_f32_or(0.0),
            self.read_f32_or(1.0),
        )
    }

    /// A packed a,b,g,r color word; absent reads as opaque white.
    pub fn read_color32(&mut self) -> Vec4 {
        unpack_abgr(self.read_u32_or(0xffff_ffff))
    }

    /// NUL-padded string of at most `n` bytes. A body that ends inside
    /// the field yields whatever fit.
    pub fn read_string(&mut self, n: usize) -> String {
        let n = n.min(self.reader.remaining());
        self.reader.read_string_fixed(n).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flt::testing::*;

    #[test]
    fn test_scanner_walks_records() {
        let bytes = [rec(opcodes::GROUP, b"abcd"), rec(opcodes::POP_LEVEL, &[])].concat();
        let mut scanner = RecordScanner::new(&bytes);

        let first = scanner.next_record().unwrap().unwrap();
        assert_eq!(first.opcode, opcodes::GROUP);
        assert_eq!(first.body_len(), 4);

        let second = scanner.next_record().unwrap().unwrap();
        assert_eq!(second.opcode, opcodes::POP_LEVEL);
        assert_eq!(second.body_len(), 0);

        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn test_under_reading_a_body_does_not_shift_framing() {
        // The first body is 16 bytes that no one reads; the next record
        // must still come out aligned.
        let bytes = [rec(opcodes::COMMENT, &[0xaa; 16]), rec(opcodes::OBJECT, b"name")].concat();
        let mut scanner = RecordScanner::new(&bytes);

        let _ignored = scanner.next_record().unwrap().unwrap();
        let next = scanner.next_record().unwrap().unwrap();
        assert_eq!(next.opcode, opcodes::OBJECT);
    }

    #[test]
    fn test_continuations_are_spliced() {
        let bytes = [
            rec(opcodes::COMMENT, b"hello "),
            rec(opcodes::CONTINUATION, b"wor"),
            rec(opcodes::CONTINUATION, b"ld"),
            rec(opcodes::POP_LEVEL, &[]),
        ]
        .concat();
        let mut scanner = RecordScanner::new(&bytes);

        let comment = scanner.next_record().unwrap().unwrap();
        assert_eq!(comment.opcode, opcodes::COMMENT);
        assert_eq!(comment.body().read_string(11), "hello world");

        let next = scanner.next_record().unwrap().unwrap();
        assert_eq!(next.opcode, opcodes::POP_LEVEL);
    }

    #[test]
    fn test_swapped_pop_level_is_corrected() {
        // Opcode 11 with both header fields byte-swapped: 0x0b00, and a
        // garbage length field.
        let bytes = [&[0x0b, 0x00, 0x04, 0x00][..], &rec(opcodes::GROUP, b"after")[..]].concat();
        let mut scanner = RecordScanner::new(&bytes);

        let pop = scanner.next_record().unwrap().unwrap();
        assert_eq!(pop.opcode, opcodes::POP_LEVEL);
        assert_eq!(pop.body_len(), 0);

        let group = scanner.next_record().unwrap().unwrap();
        assert_eq!(group.opcode, opcodes::GROUP);
    }

    #[test]
    fn test_declared_length_past_end_is_corruption() {
        let mut bytes = rec(opcodes::GROUP, b"abcdef");
        bytes.truncate(bytes.len() - 2);
        let mut scanner = RecordScanner::new(&bytes);

        assert!(matches!(
            scanner.next_record(),
            Err(FramingError::Overrun { opcode, .. }) if opcode == opcodes::GROUP
        ));
    }

    #[test]
    fn test_length_smaller_than_header_is_corruption() {
        let bytes = [u16be(opcodes::GROUP), u16be(2)].concat();
        let mut scanner = RecordScanner::new(&bytes);

        assert!(matches!(
            scanner.next_record(),
            Err(FramingError::BadLength { declared: 2, .. })
        ));
    }

    #[test]
    fn test_zero_padding_ends_the_stream() {
        let bytes = [rec(opcodes::POP_LEVEL, &[]), vec![0u8; 8]].concat();
        let mut scanner = RecordScanner::new(&bytes);

        assert!(scanner.next_record().unwrap().is_some());
        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn test_body_reads_past_end_yield_defaults() {
        let data = [u16be(7)].concat();
        let mut body = RecordBody::new(&data);

        assert_eq!(body.read_i16_or(0), 7);
        assert_eq!(body.read_i16_or(-1), -1);
        assert_eq!(body.read_u32_or(42), 42);
        assert_eq!(body.read_f64_or(2.5), 2.5);
        assert_eq!(body.read_string(8), "");
        assert_eq!(body.read_color32(), Vec4::ONE);
    }

    #[test]
    fn test_forward_clamps_to_body_end() {
        let mut body = RecordBody::new(&[1, 2, 3]);
        body.forward(100);
        assert_eq!(body.remaining(), 0);
        assert_eq!(body.read_u8_or(9), 9);
    }
}
