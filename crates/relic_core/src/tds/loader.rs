//! Scene assembly for 3D Studio files.
//!
//! The parser leaves us an intermediate representation; this module
//! resolves it into the scene graph. Resolution is whole-file work:
//! material groups bind by name, keyframe nodes bind meshes by object
//! name and parents by node id (which may be forward references), and
//! mesh points must be re-localized because the file stores them in
//! world space with the placement matrix baked in.

use super::parser::{parse_tds, ParseError};
use super::types::*;
use crate::options::ParseOptions;
use crate::scene::{Material, MetaValue, NodeId, SceneGraph, SceneSink, TextureRef};
use crate::vertex::{PrimitiveKind, Vertex};
use log::{debug, info, warn};
use relic_math::{Mat4, Mat4Ext, Vec3, Vec4};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading a 3D Studio file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub type LoadResult<T> = Result<T, LoadError>;

const IDENTITY_EPSILON: f32 = 1e-5;

/// Load a 3D Studio file from disk.
pub fn load_tds<P: AsRef<Path>>(path: P, options: &ParseOptions) -> LoadResult<SceneGraph> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scene");
    load_tds_bytes(&bytes, name, options)
}

/// Load a 3D Studio file already in memory.
pub fn load_tds_bytes(bytes: &[u8], name: &str, options: &ParseOptions) -> LoadResult<SceneGraph> {
    let file = parse_tds(bytes)?;
    let mut scene = SceneGraph::new(name);
    let root = scene.root();
    build_into(&file, options, &mut scene, root);
    let unresolved = scene.finish();
    info!(
        "loaded 3ds '{}': {} nodes, {} primitives, {} vertices{}",
        name,
        scene.node_count(),
        scene.primitive_count(),
        scene.vertex_count(),
        if unresolved > 0 {
            " (with unresolved instances)"
        } else {
            ""
        }
    );
    Ok(scene)
}

/// Build the parsed file into any sink, attached under `attach_to`.
pub fn build_into<S: SceneSink>(
    file: &TdsFile,
    options: &ParseOptions,
    sink: &mut S,
    attach_to: NodeId,
) {
    if let Some(version) = file.format_version {
        sink.set_metadata(attach_to, "format_version", MetaValue::Int(version as i64));
    }
    if let Some(ambient) = file.ambient {
        sink.set_metadata(attach_to, "ambient_light", vec3_meta(ambient));
    }

    // The global scale rides on its own container so the root transform
    // stays free for callers.
    let top = match file.master_scale {
        Some(s) if (s - 1.0).abs() > f32::EPSILON => {
            let scaled = sink.create_container("master_scale");
            sink.set_local_transform(scaled, Mat4::from_scale(Vec3::splat(s)));
            sink.attach_child(attach_to, scaled);
            scaled
        }
        _ => attach_to,
    };

    let materials = resolve_materials(file, options);
    let mut builder = SceneBuilder {
        file,
        materials,
        prototypes: HashMap::new(),
    };

    if file.nodes.is_empty() {
        builder.build_flat(sink, top);
    } else {
        builder.build_hierarchy(sink, top);
    }
}

fn vec3_meta(v: Vec3) -> MetaValue {
    MetaValue::Text(format!("{} {} {}", v.x, v.y, v.z))
}

fn resolve_materials(file: &TdsFile, _options: &ParseOptions) -> HashMap<String, Arc<Material>> {
    let mut out = HashMap::new();
    for m in &file.materials {
        if out.contains_key(&m.name) {
            warn!("material '{}' defined twice, keeping the first", m.name);
            continue;
        }

        let mut material = Material {
            name: m.name.clone(),
            ..Material::default()
        };
        if let Some(c) = m.ambient {
            material.ambient = c.extend(1.0);
        }
        if let Some(c) = m.diffuse {
            material.diffuse = c.extend(1.0);
        }
        if let Some(c) = m.specular {
            material.specular = c.extend(1.0);
        }
        if let Some(s) = m.shininess {
            material.shininess = (s * 128.0).clamp(0.0, 128.0);
        }
        if let Some(si) = m.self_illumination {
            material.emissive = (material.diffuse.truncate() * si).extend(1.0);
        }
        if let Some(t) = m.transparency {
            let alpha = (1.0 - t).clamp(0.0, 1.0);
            material.ambient.w = alpha;
            material.diffuse.w = alpha;
            material.specular.w = alpha;
            material.emissive.w = alpha;
        }
        material.two_sided = m.two_sided;
        if let Some(map) = &m.texture {
            let mut tex = TextureRef::new(map.name.clone());
            let wrap = map.wrap_mode();
            tex.wrap_u = wrap;
            tex.wrap_v = wrap;
            tex.uv_scale = map.scale;
            tex.uv_offset = map.offset;
            tex.uv_rotation = map.rotation.to_radians();
            material.texture = Some(tex);
        }

        out.insert(m.name.clone(), Arc::new(material));
    }
    out
}

struct SceneBuilder<'a> {
    file: &'a TdsFile,
    materials: HashMap<String, Arc<Material>>,
    /// Geometry container per object name, shared by every hierarchy
    /// node that instances the object.
    prototypes: HashMap<&'a str, NodeId>,
}

impl<'a> SceneBuilder<'a> {
    /// No keyframe section: one container per object, straight under the
    /// top. Points are already in world space, so no transforms either.
    fn build_flat<S: SceneSink>(&mut self, sink: &mut S, top: NodeId) {
        for obj in &self.file.objects {
            let node = sink.create_container(&obj.name);
            sink.attach_child(top, node);
            self.fill_object_node(sink, node, obj, None);
        }
    }

    fn build_hierarchy<S: SceneSink>(&mut self, sink: &mut S, top: NodeId) {
        // Pass 1: a container per hierarchy node.
        let mut created: Vec<NodeId> = Vec::with_capacity(self.file.nodes.len());
        let mut by_id: HashMap<u16, NodeId> = HashMap::new();
        for node in &self.file.nodes {
            let container = sink.create_container(node.display_name());
            let local = node.local_matrix();
            if !local.is_near_identity(IDENTITY_EPSILON) {
                sink.set_local_transform(container, local);
            }
            self.fill_hierarchy_node(sink, container, node);
            created.push(container);
            if let Some(id) = node.node_id {
                if by_id.insert(id, container).is_some() {
                    warn!("hierarchy node id {id} used twice, later node wins for parenting");
                }
            }
        }

        // Pass 2: parent links, which may point forward in the file.
        for (node, &container) in self.file.nodes.iter().zip(&created) {
            let parent = if node.parent_id == NO_PARENT {
                top
            } else {
                match by_id.get(&node.parent_id) {
                    Some(&p) if p != container => p,
                    Some(_) => {
                        warn!("node '{}' is its own parent, attaching to top", node.name);
                        top
                    }
                    None => {
                        warn!(
                            "node '{}' references missing parent id {}, attaching to top",
                            node.name, node.parent_id
                        );
                        top
                    }
                }
            };
            sink.attach_child(parent, container);
        }

        let referenced: Vec<&str> = self
            .file
            .nodes
            .iter()
            .filter(|n| !n.is_dummy())
            .map(|n| n.name.as_str())
            .collect();
        let orphans = self
            .file
            .objects
            .iter()
            .filter(|o| !referenced.contains(&o.name.as_str()))
            .count();
        if orphans > 0 {
            debug!("{orphans} objects are not referenced by the keyframe hierarchy");
        }
    }

    fn fill_hierarchy_node<S: SceneSink>(&mut self, sink: &mut S, container: NodeId, node: &TdsNode) {
        match node.kind {
            TdsNodeKind::Object => {
                if node.is_dummy() {
                    sink.set_metadata(container, "kind", MetaValue::from("group"));
                    return;
                }
                match self.file.object_by_name(&node.name) {
                    Some(obj) => self.fill_object_node(sink, container, obj, Some(node)),
                    None => warn!("hierarchy references unknown object '{}'", node.name),
                }
            }
            TdsNodeKind::Camera | TdsNodeKind::Spotlight => {
                // The camera/light objects carry the data; the node only
                // places them.
                if let Some(obj) = self.file.object_by_name(&node.name) {
                    self.fill_object_node(sink, container, obj, Some(node));
                }
            }
            TdsNodeKind::Target | TdsNodeKind::LightTarget => {
                sink.set_metadata(container, "kind", MetaValue::from("target"));
                if let Some(p) = node.position {
                    sink.set_metadata(container, "target_position", vec3_meta(p));
                }
            }
            TdsNodeKind::Light => {
                if let Some(obj) = self.file.object_by_name(&node.name) {
                    self.fill_object_node(sink, container, obj, Some(node));
                }
            }
            TdsNodeKind::Ambient => {
                sink.set_metadata(container, "kind", MetaValue::from("ambient"));
            }
        }
    }

    /// Attach an object's content to `container`. For meshes under a
    /// hierarchy node this re-localizes the world-space points through
    /// the inverse placement matrix and the node pivot.
    fn fill_object_node<S: SceneSink>(
        &mut self,
        sink: &mut S,
        container: NodeId,
        obj: &'a TdsObject,
        node: Option<&TdsNode>,
    ) {
        if obj.hidden {
            sink.set_metadata(container, "hidden", MetaValue::Bool(true));
        }
        match &obj.body {
            TdsObjectBody::Mesh(mesh) => {
                if obj.hidden {
                    return;
                }
                let proto = self.mesh_prototype(sink, obj, mesh);
                let correction = mesh_correction(mesh, node.and_then(|n| n.pivot));
                match correction {
                    Some(m) => {
                        let wrapper = sink.create_container(&obj.name);
                        sink.set_local_transform(wrapper, m);
                        sink.attach_child(wrapper, proto);
                        sink.attach_child(container, wrapper);
                    }
                    None => sink.attach_child(container, proto),
                }
            }
            TdsObjectBody::Camera(cam) => {
                sink.set_metadata(container, "kind", MetaValue::from("camera"));
                sink.set_metadata(container, "position", vec3_meta(cam.position));
                sink.set_metadata(container, "target", vec3_meta(cam.target));
                sink.set_metadata(container, "lens_mm", MetaValue::Float(cam.lens as f64));
                sink.set_metadata(container, "roll", MetaValue::Float(cam.roll as f64));
            }
            TdsObjectBody::Light(light) => {
                sink.set_metadata(container, "kind", MetaValue::from("light"));
                sink.set_metadata(container, "position", vec3_meta(light.position));
                if let Some(c) = light.color {
                    sink.set_metadata(container, "color", vec3_meta(c));
                }
                if light.off {
                    sink.set_metadata(container, "enabled", MetaValue::Bool(false));
                }
                if let Some(spot) = &light.spot {
                    sink.set_metadata(container, "spot_target", vec3_meta(spot.target));
                    sink.set_metadata(container, "hotspot_deg", MetaValue::Float(spot.hotspot as f64));
                    sink.set_metadata(container, "falloff_deg", MetaValue::Float(spot.falloff as f64));
                }
            }
        }
    }

    /// Geometry container for an object, built once and shared.
    fn mesh_prototype<S: SceneSink>(
        &mut self,
        sink: &mut S,
        obj: &'a TdsObject,
        mesh: &TdsMesh,
    ) -> NodeId {
        if let Some(&proto) = self.prototypes.get(obj.name.as_str()) {
            return proto;
        }
        let proto = sink.create_container(&obj.name);
        emit_mesh(sink, proto, mesh, &self.materials);
        self.prototypes.insert(&obj.name, proto);
        proto
    }
}

/// Matrix undoing the baked-in world placement: back through the
/// inverse of the mesh matrix, then to the node's pivot.
fn mesh_correction(mesh: &TdsMesh, pivot: Option<Vec3>) -> Option<Mat4> {
    let inverse = match mesh.matrix {
        Some(m) => {
            if m.determinant().abs() < 1e-10 {
                warn!("mesh placement matrix is singular, leaving points in place");
                None
            } else {
                Some(m.inverse())
            }
        }
        None => None,
    };
    let correction = match (inverse, pivot) {
        (Some(inv), Some(p)) => Mat4::from_translation(-p) * inv,
        (Some(inv), None) => inv,
        (None, Some(p)) => Mat4::from_translation(-p),
        (None, None) => return None,
    };
    if correction.is_near_identity(IDENTITY_EPSILON) {
        None
    } else {
        Some(correction)
    }
}

/// Emit a mesh's faces as triangle primitives, one primitive per
/// material bucket and smoothing group.
///
/// Vertex normals are shared only inside a smoothing group: the face
/// normals (unnormalized, so larger faces weigh more) are accumulated
/// per point and normalized at emission. Faces with a zero mask get
/// flat per-face normals.
fn emit_mesh<S: SceneSink>(
    sink: &mut S,
    node: NodeId,
    mesh: &TdsMesh,
    materials: &HashMap<String, Arc<Material>>,
) {
    let mut buckets: Vec<(Option<Arc<Material>>, Vec<u16>)> = Vec::new();
    for (name, faces) in &mesh.face_materials {
        let material = match materials.get(name) {
            Some(m) => Some(m.clone()),
            None => {
                warn!("face group references unknown material '{name}'");
                None
            }
        };
        buckets.push((material, faces.clone()));
    }
    let unassigned = mesh.unassigned_faces();
    if !unassigned.is_empty() {
        buckets.push((None, unassigned));
    }

    let mut bad_faces = 0usize;
    for (material, face_indices) in buckets {
        // Smoothing groups within the bucket, in first-seen order.
        let mut groups: Vec<(u32, Vec<&TdsFace>)> = Vec::new();
        for &fi in &face_indices {
            let Some(face) = mesh.faces.get(fi as usize) else {
                bad_faces += 1;
                continue;
            };
            if face
                .indices
                .iter()
                .any(|&i| i as usize >= mesh.points.len())
            {
                bad_faces += 1;
                continue;
            }
            match groups.iter_mut().find(|(mask, _)| *mask == face.smoothing) {
                Some((_, list)) => list.push(face),
                None => groups.push((face.smoothing, vec![face])),
            }
        }

        for (mask, faces) in groups {
            let mut accumulated: HashMap<u16, Vec3> = HashMap::new();
            if mask != 0 {
                for face in &faces {
                    let n = face_normal(mesh, face);
                    for &i in &face.indices {
                        *accumulated.entry(i).or_insert(Vec3::ZERO) += n;
                    }
                }
            }

            sink.begin_primitive(node, PrimitiveKind::Triangles, material.clone());
            for face in faces {
                let flat = face_normal(mesh, face)
                    .try_normalize()
                    .unwrap_or(Vec3::Z);
                for &i in &face.indices {
                    let normal = if mask == 0 {
                        flat
                    } else {
                        accumulated
                            .get(&i)
                            .and_then(|n| n.try_normalize())
                            .unwrap_or(flat)
                    };
                    let mut vertex = Vertex::at(mesh.points[i as usize]).with_normal(normal);
                    if let Some(&uv) = mesh.tex_coords.get(i as usize) {
                        vertex = vertex.with_uv(uv);
                    }
                    sink.add_vertex(vertex);
                }
            }
            sink.end_primitive();
        }
    }

    if bad_faces > 0 {
        warn!("skipped {bad_faces} faces with out-of-range indices");
    }
}

fn face_normal(mesh: &TdsMesh, face: &TdsFace) -> Vec3 {
    let p0 = mesh.points[face.indices[0] as usize];
    let p1 = mesh.points[face.indices[1] as usize];
    let p2 = mesh.points[face.indices[2] as usize];
    (p1 - p0).cross(p2 - p0)
}
