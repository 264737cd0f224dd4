//! OpenFlight record format front end.
//!
//! OpenFlight files are a flat stream of big-endian records whose
//! hierarchy is expressed by explicit push/pop level records between the
//! primaries. The scanner in [`record`] restores framing (continuation
//! splicing, the byte-swapped pop-level artifact), the registry in
//! [`opcodes`] maps opcodes to handler kinds, and the loader walks the
//! stream against a [`Document`] of parse state: the level stacks, the
//! shared palettes, and the unit scale from the header.

pub mod attr;
pub mod document;
mod geometry;
mod light_point;
pub mod loader;
pub mod opcodes;
mod palette;
pub mod pools;
mod primary;
pub mod record;

#[cfg(test)]
pub(crate) mod testing;

pub use document::Document;
pub use loader::{load_flt, load_flt_bytes, load_flt_bytes_from, LoadError, LoadResult};
