//! 3D Studio chunk format front end.
//!
//! Covers `.3ds` model files, `.mli` material libraries, and `.prj`
//! project files, which share one chunk container format and differ only
//! in the top-level magic. Parsing is two-phase: [`parser`] walks the
//! chunk tree into an intermediate representation, [`loader`] resolves
//! names, hierarchy, and smoothing into the scene graph.

pub mod chunk;
pub mod loader;
pub mod parser;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{load_tds, load_tds_bytes, LoadError, LoadResult};
pub use parser::{parse_tds, ParseError};
