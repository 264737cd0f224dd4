//! Top-level scan loop for OpenFlight files.
//!
//! The loader owns the record scanner and a [`Document`] of parse state,
//! dispatches each record through the shared opcode registry, and drives
//! a [`SceneSink`]. Handlers for the individual record families live in
//! the sibling modules; they are all methods on [`FltLoader`].

use super::document::Document;
use super::opcodes::{self, registry, RecordKind};
use super::pools::PoolSet;
use super::record::{FramingError, Record, RecordScanner};
use crate::options::ParseOptions;
use crate::registry::UnknownTags;
use crate::scene::{NodeId, SceneGraph, SceneSink};
use crate::vertex::{PrimitiveKind, Vertex};
use log::{debug, info, warn};
use relic_math::{Vec3, Vec4};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("not an OpenFlight file: first record has opcode {found}")]
    NotThisFormat { found: u16 },
    #[error("file too short to hold a record")]
    Empty,
}

pub type LoadResult<T> = Result<T, LoadError>;

/// External references nested deeper than this are reported and skipped.
pub(super) const MAX_REFERENCE_DEPTH: usize = 16;

/// Load an OpenFlight file. External references are resolved relative to
/// the file's directory.
pub fn load_flt<P: AsRef<Path>>(path: P, options: &ParseOptions) -> LoadResult<SceneGraph> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flt");
    load_flt_bytes_from(&bytes, name, path.parent(), options)
}

/// Load from memory. Without a base directory, external references stay
/// unresolved placeholder nodes.
pub fn load_flt_bytes(bytes: &[u8], name: &str, options: &ParseOptions) -> LoadResult<SceneGraph> {
    load_flt_bytes_from(bytes, name, None, options)
}

pub fn load_flt_bytes_from(
    bytes: &[u8],
    name: &str,
    base_dir: Option<&Path>,
    options: &ParseOptions,
) -> LoadResult<SceneGraph> {
    let mut scene = SceneGraph::new(name);
    let root = scene.root();
    parse_into(bytes, &mut scene, root, options, base_dir, PoolSet::default(), 0)?;
    let unresolved = scene.finish();
    info!(
        "loaded OpenFlight scene '{name}': {} nodes, {} primitives, {} vertices ({unresolved} unresolved instances)",
        scene.node_count(),
        scene.primitive_count(),
        scene.vertex_count(),
    );
    Ok(scene)
}

/// Parse one record stream into `sink`, attaching everything under
/// `attach_to`. Externally referenced files re-enter here with inherited
/// pool slots and an incremented depth.
pub(super) fn parse_into<S: SceneSink>(
    bytes: &[u8],
    sink: &mut S,
    attach_to: NodeId,
    options: &ParseOptions,
    base_dir: Option<&Path>,
    pools: PoolSet<'_>,
    depth: usize,
) -> LoadResult<()> {
    let mut scanner = RecordScanner::new(bytes);
    let mut loader = FltLoader {
        sink,
        options,
        base_dir,
        depth,
        doc: Document::new(attach_to, pools),
        unknown: UnknownTags::new(),
        contexts: HashMap::new(),
    };
    loader.run(&mut scanner)
}

/// Per-primary state a later vertex list or mesh primitive needs.
pub(super) struct GeometryContext {
    pub(super) kind_override: Option<PrimitiveKind>,
    /// Face color with the transparency already folded into alpha.
    pub(super) color: Vec4,
    pub(super) material: Option<Arc<crate::scene::Material>>,
    pub(super) lit: bool,
    pub(super) gouraud: bool,
    /// Filled by a local vertex pool record, meshes only.
    pub(super) local_pool: Vec<Vertex>,
}

pub(super) struct FltLoader<'p, 'o, S: SceneSink> {
    pub(super) sink: &'o mut S,
    pub(super) options: &'o ParseOptions,
    pub(super) base_dir: Option<&'o Path>,
    pub(super) depth: usize,
    pub(super) doc: Document<'p>,
    pub(super) unknown: UnknownTags,
    pub(super) contexts: HashMap<NodeId, GeometryContext>,
}

impl<S: SceneSink> FltLoader<'_, '_, S> {
    fn run(&mut self, scanner: &mut RecordScanner<'_>) -> LoadResult<()> {
        let first = scanner.next_record()?.ok_or(LoadError::Empty)?;
        if first.opcode != opcodes::HEADER {
            return Err(LoadError::NotThisFormat {
                found: first.opcode,
            });
        }
        self.read_header(&mut first.body());

        while !self.doc.is_done() {
            let Some(record) = scanner.next_record()? else {
                break;
            };
            self.dispatch(&record, scanner)?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        record: &Record<'_>,
        scanner: &mut RecordScanner<'_>,
    ) -> LoadResult<()> {
        let Some(kind) = registry().get(record.opcode) else {
            self.unknown.note(registry().name(), record.opcode);
            return Ok(());
        };
        let mut body = record.body();
        match kind {
            RecordKind::Header => warn!("second header record in stream, ignoring it"),
            RecordKind::PushLevel => self.doc.push_level(),
            RecordKind::PopLevel => self.doc.pop_level()?,
            RecordKind::PushSubface => self.doc.push_subface(),
            RecordKind::PopSubface => self.doc.pop_subface(),
            RecordKind::PushExtension => self.doc.push_extension(),
            RecordKind::PopExtension => self.doc.pop_extension(),
            RecordKind::Group => self.read_group(&mut body),
            RecordKind::Object => self.read_object(&mut body),
            RecordKind::Lod => self.read_lod(&mut body),
            RecordKind::OldLod => self.read_old_lod(&mut body),
            RecordKind::Dof => self.read_dof(&mut body),
            RecordKind::Switch => self.read_switch(&mut body),
            RecordKind::Extension => self.read_extension(&mut body),
            RecordKind::ExternalReference => self.read_external_reference(&mut body),
            RecordKind::InstanceDefinition => self.read_instance_definition(&mut body),
            RecordKind::InstanceReference => self.read_instance_reference(&mut body),
            RecordKind::Comment => self.read_comment(&mut body),
            RecordKind::LongId => self.read_long_id(&mut body),
            RecordKind::Matrix => self.read_matrix(&mut body),
            RecordKind::GeneralMatrix => self.read_general_matrix(&mut body),
            RecordKind::Replicate => self.read_replicate(&mut body),
            RecordKind::Face => self.read_face(&mut body),
            RecordKind::Mesh => self.read_mesh(&mut body),
            RecordKind::LocalVertexPool => self.read_local_vertex_pool(&mut body),
            RecordKind::MeshPrimitive => self.read_mesh_primitive(&mut body),
            RecordKind::VertexList => self.read_vertex_list(&mut body),
            RecordKind::MorphVertexList => self.read_morph_vertex_list(&mut body),
            RecordKind::VertexPalette => self.read_vertex_palette(&mut body, scanner)?,
            RecordKind::ColorPalette => self.read_color_palette(&mut body),
            RecordKind::MaterialPalette => self.read_material_palette(&mut body),
            RecordKind::OldMaterialPalette => self.read_old_material_palette(&mut body),
            RecordKind::TexturePalette => self.read_texture_palette(&mut body),
            RecordKind::LightSourcePalette => self.read_light_source_palette(&mut body),
            RecordKind::LightPointAppearancePalette => {
                self.read_light_point_appearance_palette(&mut body)
            }
            RecordKind::LightPointAnimationPalette => {
                self.read_light_point_animation_palette(&mut body)
            }
            RecordKind::ShaderPalette => self.read_shader_palette(&mut body),
            RecordKind::LightSource => self.read_light_source(&mut body),
            RecordKind::LightPoint => self.read_light_point(&mut body),
            RecordKind::IndexedLightPoint => self.read_indexed_light_point(&mut body),
            RecordKind::LightPointSystem => self.read_light_point_system(&mut body),
            RecordKind::Ignored => {
                debug!("skipping recognized record {} with no scene meaning", record.opcode)
            }
        }
        Ok(())
    }

    /// Create a container named `name`, attach it at the current level,
    /// and make it the current primary.
    pub(super) fn attach_new(&mut self, name: &str) -> NodeId {
        let node = self.sink.create_container(name);
        self.sink.attach_child(self.doc.attach_parent(), node);
        self.doc.set_current_primary(node);
        node
    }

    /// Node an arriving vertex list or mesh payload belongs to: the
    /// current primary if it is geometry, else the open level parent
    /// (the usual case, since geometry payloads come inside a push).
    pub(super) fn geometry_target(&self) -> Option<NodeId> {
        if let Some(node) = self.doc.current_primary() {
            if self.contexts.contains_key(&node) {
                return Some(node);
            }
        }
        let parent = self.doc.attach_parent();
        self.contexts.contains_key(&parent).then_some(parent)
    }

    /// Emit one primitive on `node`, applying the face's lighting rules:
    /// normals only when lit (carrying the last seen normal forward over
    /// gaps), vertex colors only under gouraud shading, the face color
    /// otherwise.
    pub(super) fn emit(&mut self, node: NodeId, kind: PrimitiveKind, vertices: Vec<Vertex>) {
        if vertices.is_empty() {
            return;
        }
        let (material, color, lit, gouraud) = match self.contexts.get(&node) {
            Some(ctx) => (ctx.material.clone(), ctx.color, ctx.lit, ctx.gouraud),
            None => return,
        };

        self.sink.begin_primitive(node, kind, material);
        let mut last_normal = Vec3::Z;
        for mut v in vertices {
            if lit {
                match v.normal {
                    Some(n) => last_normal = n,
                    None => v.normal = Some(last_normal),
                }
            } else {
                v.normal = None;
            }
            v.color = if gouraud {
                v.color.or(Some(color))
            } else {
                Some(color)
            };
            self.sink.add_vertex(v);
        }
        self.sink.end_primitive();
    }
}
