//! Byte-level input for the format front ends.
//!
//! Both supported formats are sequences of length-prefixed units over a
//! flat byte stream, one little-endian and one big-endian. Everything
//! above this module reads through [`ByteReader`] so the endianness
//! decision is made exactly once, at construction.

mod reader;

pub use reader::{ByteReader, Endian, ReadError, ReadResult};
