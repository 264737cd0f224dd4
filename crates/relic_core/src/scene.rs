//! Scene graph built by the format front ends.
//!
//! Loaders never manipulate nodes directly; they drive the [`SceneSink`]
//! trait, and [`SceneGraph`] is its arena-backed implementation. Nodes
//! are addressed by [`NodeId`] handles into the arena and hold child
//! lists only, no owning back-references, so an instanced subtree can
//! hang under several parents without reference cycles.
//!
//! Instance definitions and references may arrive in either order;
//! references to a number that never gets defined are reported as
//! warnings by [`SceneGraph::finish`], never as errors.

use crate::vertex::{PrimitiveKind, Vertex};
use log::{debug, warn};
use relic_math::{Aabb, Mat4, Mat4Ext, Vec2, Vec4};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Handle to a node in a [`SceneGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Loosely typed metadata attached to nodes (comments, ids, animation
/// parameters, projection origins).
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
    MirroredRepeat,
}

/// Minification filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    #[default]
    LinearMipmapLinear,
}

/// Magnification filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MagFilter {
    Nearest,
    #[default]
    Linear,
}

/// How texel color combines with the lit fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexEnvMode {
    #[default]
    Modulate,
    Blend,
    Decal,
    Replace,
    Add,
}

/// Reference to an image file plus its sampling state. Pixel data is
/// never loaded here; the path is kept as the source file spelled it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRef {
    pub path: String,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub env_mode: TexEnvMode,
    pub uv_scale: Vec2,
    pub uv_offset: Vec2,
    /// Rotation of the coordinates around the map center, radians.
    pub uv_rotation: f32,
    /// The image's alpha channel should mark the geometry transparent.
    pub transparent: bool,
}

impl TextureRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            wrap_u: WrapMode::default(),
            wrap_v: WrapMode::default(),
            min_filter: MinFilter::default(),
            mag_filter: MagFilter::default(),
            env_mode: TexEnvMode::default(),
            uv_scale: Vec2::ONE,
            uv_offset: Vec2::ZERO,
            uv_rotation: 0.0,
            transparent: false,
        }
    }
}

/// Fixed-function surface description.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub shininess: f32,
    pub two_sided: bool,
    pub texture: Option<TextureRef>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            emissive: Vec4::new(0.0, 0.0, 0.0, 1.0),
            shininess: 0.0,
            two_sided: false,
            texture: None,
        }
    }
}

impl Material {
    /// Transparent either by diffuse alpha or by a texture whose alpha
    /// channel was flagged meaningful.
    pub fn is_transparent(&self) -> bool {
        self.diffuse.w < 1.0 - f32::EPSILON
            || self.texture.as_ref().is_some_and(|t| t.transparent)
    }
}

/// One run of vertices with a single assembly and material.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub material: Option<Arc<Material>>,
    pub vertices: Vec<Vertex>,
}

impl Primitive {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Bounds of the vertices in node-local space.
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }
}

/// A named container in the graph.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    pub local_transform: Option<Mat4>,
    pub metadata: Vec<(String, MetaValue)>,
    pub children: Vec<NodeId>,
    pub primitives: Vec<Primitive>,
}

impl Node {
    /// Last value set for `key`, if any.
    pub fn metadata(&self, key: &str) -> Option<&MetaValue> {
        self.metadata
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// The operations a loader performs while decoding a file.
///
/// `begin_primitive` / `add_vertex` / `end_primitive` bracket one
/// primitive; vertices added outside a bracket are dropped with a
/// warning rather than failing the parse.
pub trait SceneSink {
    fn create_container(&mut self, name: &str) -> NodeId;
    fn attach_child(&mut self, parent: NodeId, child: NodeId);
    fn set_local_transform(&mut self, node: NodeId, transform: Mat4);
    fn set_metadata(&mut self, node: NodeId, key: &str, value: MetaValue);
    fn begin_primitive(&mut self, node: NodeId, kind: PrimitiveKind, material: Option<Arc<Material>>);
    fn add_vertex(&mut self, vertex: Vertex);
    fn end_primitive(&mut self);
    /// Make `node` available to later (or earlier) `resolve_instance`
    /// calls under `number`.
    fn register_instance_definition(&mut self, number: u16, node: NodeId);
    /// Attach the subtree defined under `number` to `parent`. May be
    /// called before the definition arrives.
    fn resolve_instance(&mut self, parent: NodeId, number: u16);
}

struct PrimitiveBuilder {
    node: NodeId,
    primitive: Primitive,
}

/// Arena-backed scene, the default [`SceneSink`] implementation.
pub struct SceneGraph {
    nodes: Vec<Node>,
    root: NodeId,
    instance_definitions: HashMap<u16, NodeId>,
    pending_instances: Vec<(NodeId, u16)>,
    building: Option<PrimitiveBuilder>,
    unresolved_instances: usize,
}

// Instancing makes the graph a DAG; a malformed file could even tie a
// cycle through it. Traversals carry a depth and give up past this.
const MAX_TRAVERSAL_DEPTH: usize = 1024;

impl SceneGraph {
    pub fn new(root_name: &str) -> Self {
        let root_node = Node {
            name: root_name.to_owned(),
            ..Node::default()
        };
        Self {
            nodes: vec![root_node],
            root: NodeId(0),
            instance_definitions: HashMap::new(),
            pending_instances: Vec::new(),
            building: None,
            unresolved_instances: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// First node with the given name, in creation order.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(NodeId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.nodes.iter().map(|n| n.primitives.len()).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.primitives.iter())
            .map(Primitive::vertex_count)
            .sum()
    }

    /// Settle order-independent bookkeeping: attach instance references
    /// whose definitions arrived later, close a dangling primitive.
    /// Returns the number of references that never found a definition.
    pub fn finish(&mut self) -> usize {
        if self.building.is_some() {
            warn!("primitive left open at end of parse, closing it");
            self.end_primitive();
        }

        let pending = std::mem::take(&mut self.pending_instances);
        for (parent, number) in pending {
            match self.instance_definitions.get(&number) {
                Some(&def) => self.nodes[parent.0].children.push(def),
                None => {
                    warn!("instance {number} referenced but never defined");
                    self.unresolved_instances += 1;
                }
            }
        }
        self.unresolved_instances
    }

    /// Bounds of everything reachable from the root, in world space.
    /// Instanced subtrees contribute once per instancing parent.
    pub fn world_bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        let mut stack = vec![(self.root, Mat4::IDENTITY, 0usize)];
        while let Some((id, world, depth)) = stack.pop() {
            if depth > MAX_TRAVERSAL_DEPTH {
                warn!("scene deeper than {MAX_TRAVERSAL_DEPTH} levels, truncating bounds walk");
                continue;
            }
            let node = &self.nodes[id.0];
            let world = match node.local_transform {
                Some(local) => world * local,
                None => world,
            };
            for prim in &node.primitives {
                bounds = bounds.union(&world.transform_aabb(&prim.local_bounds()));
            }
            for &child in &node.children {
                stack.push((child, world, depth + 1));
            }
        }
        bounds
    }

    pub fn stats(&self) -> SceneStats {
        let mut materials: HashSet<*const Material> = HashSet::new();
        let mut textures: HashSet<&str> = HashSet::new();
        let mut triangles = 0usize;
        for node in &self.nodes {
            for prim in &node.primitives {
                triangles += prim.kind.triangle_estimate(prim.vertices.len());
                if let Some(mat) = &prim.material {
                    materials.insert(Arc::as_ptr(mat));
                    if let Some(tex) = &mat.texture {
                        textures.insert(tex.path.as_str());
                    }
                }
            }
        }

        let bounds = self.world_bounds();
        let (bounds_min, bounds_max) = if bounds.is_empty() {
            (None, None)
        } else {
            (Some(bounds.min.to_array()), Some(bounds.max.to_array()))
        };

        SceneStats {
            nodes: self.node_count(),
            primitives: self.primitive_count(),
            vertices: self.vertex_count(),
            triangles,
            materials: materials.len(),
            textures: textures.len(),
            unresolved_instances: self.unresolved_instances,
            bounds_min,
            bounds_max,
        }
    }
}

impl SceneSink for SceneGraph {
    fn create_container(&mut self, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_owned(),
            ..Node::default()
        });
        id
    }

    fn attach_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            warn!("refusing to attach node {:?} to itself", parent);
            return;
        }
        self.nodes[parent.0].children.push(child);
    }

    fn set_local_transform(&mut self, node: NodeId, transform: Mat4) {
        self.nodes[node.0].local_transform = Some(transform);
    }

    fn set_metadata(&mut self, node: NodeId, key: &str, value: MetaValue) {
        self.nodes[node.0].metadata.push((key.to_owned(), value));
    }

    fn begin_primitive(&mut self, node: NodeId, kind: PrimitiveKind, material: Option<Arc<Material>>) {
        if self.building.is_some() {
            warn!("primitive begun while another is open, closing the first");
            self.end_primitive();
        }
        self.building = Some(PrimitiveBuilder {
            node,
            primitive: Primitive {
                kind,
                material,
                vertices: Vec::new(),
            },
        });
    }

    fn add_vertex(&mut self, vertex: Vertex) {
        match &mut self.building {
            Some(b) => b.primitive.vertices.push(vertex),
            None => warn!("vertex added outside a primitive, dropping it"),
        }
    }

    fn end_primitive(&mut self) {
        match self.building.take() {
            Some(b) => {
                if b.primitive.vertices.is_empty() {
                    debug!("discarding empty primitive on node {:?}", b.node);
                } else {
                    self.nodes[b.node.0].primitives.push(b.primitive);
                }
            }
            None => warn!("primitive ended but none was open"),
        }
    }

    fn register_instance_definition(&mut self, number: u16, node: NodeId) {
        if self.instance_definitions.contains_key(&number) {
            warn!("instance {number} defined twice, keeping the first definition");
            return;
        }
        self.instance_definitions.insert(number, node);
    }

    fn resolve_instance(&mut self, parent: NodeId, number: u16) {
        match self.instance_definitions.get(&number) {
            Some(&def) => self.nodes[parent.0].children.push(def),
            // Definition may still be ahead of us in the stream.
            None => self.pending_instances.push((parent, number)),
        }
    }
}

/// Flat summary of a decoded scene, serializable for tool output.
#[derive(Debug, Clone, Serialize)]
pub struct SceneStats {
    pub nodes: usize,
    pub primitives: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
    pub unresolved_instances: usize,
    pub bounds_min: Option<[f32; 3]>,
    pub bounds_max: Option<[f32; 3]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relic_math::Vec3;

    #[test]
    fn test_create_and_attach() {
        let mut scene = SceneGraph::new("db");
        let a = scene.create_container("a");
        let b = scene.create_container("b");
        scene.attach_child(scene.root(), a);
        scene.attach_child(a, b);

        assert_eq!(scene.node_count(), 3);
        assert_eq!(scene.node(scene.root()).children, vec![a]);
        assert_eq!(scene.node(a).children, vec![b]);
    }

    #[test]
    fn test_primitive_accumulation() {
        let mut scene = SceneGraph::new("db");
        let geo = scene.create_container("geo");
        scene.attach_child(scene.root(), geo);

        scene.begin_primitive(geo, PrimitiveKind::Triangles, None);
        scene.add_vertex(Vertex::at(Vec3::new(0.0, 0.0, 0.0)));
        scene.add_vertex(Vertex::at(Vec3::new(1.0, 0.0, 0.0)));
        scene.add_vertex(Vertex::at(Vec3::new(0.0, 1.0, 0.0)));
        scene.end_primitive();

        assert_eq!(scene.primitive_count(), 1);
        assert_eq!(scene.vertex_count(), 3);
        let prim = &scene.node(geo).primitives[0];
        assert_eq!(prim.kind, PrimitiveKind::Triangles);
    }

    #[test]
    fn test_empty_primitive_is_discarded() {
        let mut scene = SceneGraph::new("db");
        let geo = scene.create_container("geo");
        scene.begin_primitive(geo, PrimitiveKind::Points, None);
        scene.end_primitive();

        assert_eq!(scene.primitive_count(), 0);
    }

    #[test]
    fn test_instance_reference_before_definition() {
        let mut scene = SceneGraph::new("db");
        let parent = scene.create_container("parent");
        scene.attach_child(scene.root(), parent);

        // Reference arrives first, definition later in the stream.
        scene.resolve_instance(parent, 42);
        assert!(scene.node(parent).children.is_empty());

        let def = scene.create_container("def");
        scene.register_instance_definition(42, def);

        assert_eq!(scene.finish(), 0);
        assert_eq!(scene.node(parent).children, vec![def]);
    }

    #[test]
    fn test_unresolved_instance_is_reported_not_fatal() {
        let mut scene = SceneGraph::new("db");
        let parent = scene.create_container("parent");
        scene.resolve_instance(parent, 7);

        assert_eq!(scene.finish(), 1);
        assert!(scene.node(parent).children.is_empty());
        assert_eq!(scene.stats().unresolved_instances, 1);
    }

    #[test]
    fn test_world_bounds_applies_transforms() {
        let mut scene = SceneGraph::new("db");
        let geo = scene.create_container("geo");
        scene.attach_child(scene.root(), geo);
        scene.set_local_transform(geo, Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));

        scene.begin_primitive(geo, PrimitiveKind::Points, None);
        scene.add_vertex(Vertex::at(Vec3::ZERO));
        scene.add_vertex(Vertex::at(Vec3::ONE));
        scene.end_primitive();

        let bounds = scene.world_bounds();
        assert!((bounds.min - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-4);
        assert!((bounds.max - Vec3::new(11.0, 1.0, 1.0)).length() < 1e-4);
    }

    #[test]
    fn test_materials_deduplicate_by_identity() {
        let mut scene = SceneGraph::new("db");
        let geo = scene.create_container("geo");
        let mat = Arc::new(Material::default());

        for _ in 0..3 {
            scene.begin_primitive(geo, PrimitiveKind::Triangles, Some(mat.clone()));
            scene.add_vertex(Vertex::at(Vec3::ZERO));
            scene.add_vertex(Vertex::at(Vec3::X));
            scene.add_vertex(Vertex::at(Vec3::Y));
            scene.end_primitive();
        }

        let stats = scene.stats();
        assert_eq!(stats.primitives, 3);
        assert_eq!(stats.materials, 1);
        assert_eq!(stats.triangles, 3);
    }

    #[test]
    fn test_metadata_last_write_wins() {
        let mut scene = SceneGraph::new("db");
        let n = scene.create_container("n");
        scene.set_metadata(n, "comment", MetaValue::from("first"));
        scene.set_metadata(n, "comment", MetaValue::from("second"));

        assert_eq!(
            scene.node(n).metadata("comment"),
            Some(&MetaValue::Text("second".into()))
        );
        assert_eq!(scene.node(n).metadata.len(), 2);
    }
}
