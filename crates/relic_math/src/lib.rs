//! Math foundation for the relic scene decoders.
//!
//! Re-exports all of `glam` so downstream crates use a single math
//! vocabulary, and adds the few domain types the decoders need on top:
//! bounding boxes, packed-color conversion, and matrix helpers.

pub use glam::*;

mod aabb;
mod color;
mod transform;

pub use aabb::Aabb;
pub use color::{pack_abgr, unpack_abgr};
pub use transform::Mat4Ext;
