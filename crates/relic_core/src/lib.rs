//! Core decoding engine for legacy binary scene formats.
//!
//! The crate is split into a format-independent layer and two format
//! front ends:
//!
//! - [`io`] - endian-aware cursor over an in-memory buffer
//! - [`registry`] - immutable tag-to-handler dispatch tables
//! - [`scene`] - the scene graph the loaders build into
//! - [`tds`] - 3D Studio `.3ds` / `.prj` / `.mli` chunk files
//! - [`flt`] - OpenFlight `.flt` record files and `.attr` side files
//!
//! # Example
//!
//! ```ignore
//! use relic_core::{format, ParseOptions};
//!
//! let scene = format::load_scene_file("terrain.flt".as_ref(), &ParseOptions::default())?;
//! println!("{} nodes", scene.node_count());
//! ```

pub mod flt;
pub mod format;
pub mod io;
pub mod options;
pub mod registry;
pub mod scene;
pub mod tds;
pub mod vertex;

pub use options::{ParseOptions, UnitSystem};
pub use scene::{Material, MetaValue, NodeId, SceneGraph, SceneSink, SceneStats, TextureRef};
pub use vertex::{PrimitiveKind, Vertex};
