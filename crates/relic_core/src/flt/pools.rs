//! Resource pools filled by palette records and consumed by geometry.
//!
//! Pools are sparse index tables; geometry may reference an index the
//! palette never filled, which resolves to a sensible fallback rather
//! than failing. A pool may also be read before it is fully populated.

use crate::io::{ByteReader, Endian, ReadResult};
use crate::scene::{Material, TextureRef};
use crate::vertex::Vertex;
use log::warn;
use relic_math::{unpack_abgr, Vec3, Vec4};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Color palette.
///
/// Records address colors with a packed value combining a 7-bit intensity
/// fraction and a base-color index; the bit split depends on the format
/// generation. Negative or unfilled indices decode to opaque white.
pub struct ColorPool {
    old_layout: bool,
    colors: HashMap<i32, Vec4>,
}

impl ColorPool {
    pub fn new(old_layout: bool) -> Self {
        Self {
            old_layout,
            colors: HashMap::new(),
        }
    }

    pub fn set(&mut self, index: i32, color: Vec4) {
        self.colors.insert(index, color);
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Decode a packed color index. Intensity scales the base color's
    /// rgb; alpha comes through from the palette entry unscaled.
    pub fn get_color(&self, packed: i32) -> Vec4 {
        if packed < 0 {
            return Vec4::ONE;
        }
        let intensity = (packed & 0x7f) as f32 / 127.0;
        let base = if self.old_layout {
            // 32 variable entries in bits 7..12; bit 12 selects the
            // fixed-intensity table stored after them.
            let index = (packed >> 7) & 0x1f;
            if packed & 0x1000 != 0 {
                index + 32
            } else {
                index
            }
        } else {
            packed >> 7
        };
        match self.colors.get(&base) {
            Some(c) => Vec4::new(c.x * intensity, c.y * intensity, c.z * intensity, c.w),
            None => Vec4::ONE,
        }
    }
}

impl Default for ColorPool {
    fn default() -> Self {
        Self::new(false)
    }
}

/// One material palette entry before face-color modulation.
#[derive(Debug, Clone)]
pub struct MaterialEntry {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub alpha: f32,
}

impl Default for MaterialEntry {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            ambient: Vec3::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::ZERO,
            emissive: Vec3::ZERO,
            shininess: 0.0,
            alpha: 1.0,
        }
    }
}

type FinalKey = (i32, [u32; 4], i32);

/// Material palette plus the memo of face-modulated final materials.
///
/// Faces do not use palette entries directly: the entry's ambient and
/// diffuse are multiplied by the face color, and the final alpha is the
/// product of face and entry alpha. Identical (index, color, texture)
/// combinations share one `Arc<Material>`, so a file with thousands of
/// faces in a handful of colors allocates a handful of materials.
#[derive(Default)]
pub struct MaterialPool {
    entries: HashMap<i32, MaterialEntry>,
    // Interior mutability so the cache can grow while the pool is shared
    // read-only with an externally referenced child file.
    finals: RefCell<HashMap<FinalKey, Arc<Material>>>,
}

impl MaterialPool {
    pub fn set(&mut self, index: i32, entry: MaterialEntry) {
        self.entries.insert(index, entry);
    }

    pub fn get(&self, index: i32) -> Option<&MaterialEntry> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Final material for `index` modulated by `face_color`. A missing
    /// palette index falls back to a fixed default entry.
    pub fn get_or_create(&self, index: i32, face_color: Vec4) -> Arc<Material> {
        self.get_or_create_textured(index, face_color, None)
    }

    /// As [`get_or_create`](Self::get_or_create), carrying the face's
    /// texture into the final material.
    pub fn get_or_create_textured(
        &self,
        index: i32,
        face_color: Vec4,
        texture: Option<(i32, &TextureRef)>,
    ) -> Arc<Material> {
        let texture_key = texture.map_or(-1, |(i, _)| i);
        let key = (index, face_color.to_array().map(f32::to_bits), texture_key);
        if let Some(hit) = self.finals.borrow().get(&key) {
            return hit.clone();
        }

        let base = self.entries.get(&index).cloned().unwrap_or_default();
        let rgb = face_color.truncate();
        let alpha = face_color.w * base.alpha;
        let material = Arc::new(Material {
            name: base.name,
            ambient: (base.ambient * rgb).extend(alpha),
            diffuse: (base.diffuse * rgb).extend(alpha),
            specular: base.specular.extend(alpha),
            emissive: base.emissive.extend(alpha),
            shininess: base.shininess,
            two_sided: false,
            texture: texture.map(|(_, t)| t.clone()),
        });
        self.finals.borrow_mut().insert(key, material.clone());
        material
    }
}

/// Sparse index table for palette kinds with no extra semantics.
pub struct IndexPool<T> {
    entries: HashMap<i32, T>,
}

impl<T> Default for IndexPool<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> IndexPool<T> {
    pub fn set(&mut self, index: i32, value: T) {
        if self.entries.insert(index, value).is_some() {
            warn!("palette index {index} filled twice, keeping the later entry");
        }
    }

    pub fn get(&self, index: i32) -> Option<&T> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type TexturePool = IndexPool<TextureRef>;
pub type LightSourcePool = IndexPool<LightSourceEntry>;
pub type LightPointAppearancePool = IndexPool<LightPointAppearance>;
pub type LightPointAnimationPool = IndexPool<LightPointAnimation>;
pub type ShaderPool = IndexPool<ShaderProgram>;

/// Light source palette entry, referenced by light source nodes.
#[derive(Debug, Clone)]
pub struct LightSourceEntry {
    pub name: String,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    /// 0 infinite, 1 local, 2 spot.
    pub kind: i32,
    pub spot_exponent: f32,
    pub spot_cutoff: f32,
    pub attenuation: [f32; 3],
}

/// Light point appearance palette entry.
#[derive(Debug, Clone)]
pub struct LightPointAppearance {
    pub name: String,
    pub back_color: Vec4,
    pub display_mode: i32,
    pub intensity_front: f32,
    pub intensity_back: f32,
    pub min_pixel_size: f32,
    pub max_pixel_size: f32,
    pub actual_size: f32,
    pub directional: bool,
    pub flags: u32,
    pub visibility_range: f32,
    pub fade_in_duration: f32,
    pub fade_out_duration: f32,
    pub texture_pattern: i16,
}

/// One pulse of a light point animation sequence.
#[derive(Debug, Clone)]
pub struct AnimationPulse {
    pub state: u32,
    pub duration: f32,
    pub color: Vec4,
}

/// Light point animation palette entry.
#[derive(Debug, Clone)]
pub struct LightPointAnimation {
    pub name: String,
    pub period: f32,
    pub phase_delay: f32,
    pub enabled_period: f32,
    pub axis: Vec3,
    pub flags: u32,
    pub animation_type: i32,
    pub morse_code: String,
    pub pulses: Vec<AnimationPulse>,
}

/// Shader palette entry. Only the program file names are carried; the
/// sources are never opened here.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub name: String,
    /// 0 Cg, 1 CgFX, 2 GLSL.
    pub kind: i32,
    pub vertex_files: Vec<String>,
    pub fragment_files: Vec<String>,
}

/// Raw copy of the vertex palette, addressed by byte offset.
///
/// Geometry references vertices by their absolute byte offset into the
/// palette record, counted from the record header, and the entry at that
/// offset is itself a framed vertex record. The quirk is preserved as the
/// wire format defines it rather than renumbered into indices; the first
/// 8 bytes (record header plus total-size word) stay as zeroed padding so
/// file offsets index the buffer directly.
#[derive(Default)]
pub struct VertexPool {
    data: Vec<u8>,
}

// Vertex record flag word, counted from the high bit.
const VERTEX_FLAG_NO_COLOR: u16 = 0x2000;
const VERTEX_FLAG_PACKED_COLOR: u16 = 0x1000;

impl VertexPool {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the vertex record at `offset`. An offset outside the pool,
    /// a truncated entry, or an unknown vertex opcode is absorbed with a
    /// warning and yields `None`.
    pub fn decode_vertex_at(
        &self,
        offset: usize,
        unit_scale: f64,
        colors: &ColorPool,
    ) -> Option<Vertex> {
        match self.try_decode(offset, unit_scale, colors) {
            Ok(vertex) => vertex,
            Err(e) => {
                warn!("bad vertex reference at pool offset {offset}: {e}");
                None
            }
        }
    }

    fn try_decode(
        &self,
        offset: usize,
        unit_scale: f64,
        colors: &ColorPool,
    ) -> ReadResult<Option<Vertex>> {
        use super::opcodes::{VERTEX_C, VERTEX_CN, VERTEX_CNT, VERTEX_CT};

        let mut r = ByteReader::new(&self.data, Endian::Big);
        r.set_position(offset)?;
        let opcode = r.read_u16()?;
        let _length = r.read_u16()?;
        if !matches!(opcode, VERTEX_C | VERTEX_CN | VERTEX_CNT | VERTEX_CT) {
            warn!("pool offset {offset} does not hold a vertex record (opcode {opcode})");
            return Ok(None);
        }

        let _color_name = r.read_u16()?;
        let flags = r.read_u16()?;
        let position = r.read_vec3d()? * unit_scale;
        if !position.is_finite() {
            warn!("non-finite vertex position at pool offset {offset}");
        }
        let mut vertex = Vertex::at(position.as_vec3());

        if matches!(opcode, VERTEX_CN | VERTEX_CNT) {
            vertex = vertex.with_normal(r.read_vec3f()?);
        }
        if matches!(opcode, VERTEX_CNT | VERTEX_CT) {
            vertex = vertex.with_uv(r.read_vec2f()?);
        }

        let packed = r.read_u32()?;
        let color_index = r.read_i32()?;
        if flags & VERTEX_FLAG_NO_COLOR == 0 {
            let color = if flags & VERTEX_FLAG_PACKED_COLOR != 0 {
                unpack_abgr(packed)
            } else {
                colors.get_color(color_index)
            };
            vertex = vertex.with_color(color);
        }
        Ok(Some(vertex))
    }
}

/// Owned-or-inherited pool slot.
///
/// An externally referenced file reuses the including file's palettes
/// unless its reference record overrides them. The child must never
/// write through an inherited slot; palette records probe `owned_mut`
/// and skip themselves when it refuses.
pub enum PoolSlot<'p, T> {
    Owned(T),
    Inherited(&'p T),
}

impl<T: Default> Default for PoolSlot<'_, T> {
    fn default() -> Self {
        PoolSlot::Owned(T::default())
    }
}

impl<'p, T> PoolSlot<'p, T> {
    pub fn get(&self) -> &T {
        match self {
            PoolSlot::Owned(t) => t,
            PoolSlot::Inherited(t) => t,
        }
    }

    pub fn owned_mut(&mut self) -> Option<&mut T> {
        match self {
            PoolSlot::Owned(t) => Some(t),
            PoolSlot::Inherited(_) => None,
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, PoolSlot::Inherited(_))
    }
}

/// Every pool one parse carries.
#[derive(Default)]
pub struct PoolSet<'p> {
    pub color: PoolSlot<'p, ColorPool>,
    pub material: PoolSlot<'p, MaterialPool>,
    pub texture: PoolSlot<'p, TexturePool>,
    pub light_source: PoolSlot<'p, LightSourcePool>,
    pub light_point_appearance: PoolSlot<'p, LightPointAppearancePool>,
    pub light_point_animation: PoolSlot<'p, LightPointAnimationPool>,
    pub shader: PoolSlot<'p, ShaderPool>,
    /// Never inherited; every file carries its own.
    pub vertex: VertexPool,
}
