//! Faces, meshes, and the vertex payloads that fill them.
//!
//! A face (or mesh) record opens a geometry context holding its color,
//! material, and lighting rules; the vertex list or mesh payload records
//! that follow inside its push/pop turn into primitives on that node.

use super::document::VERSION_15_1;
use super::loader::{FltLoader, GeometryContext};
use super::record::RecordBody;
use crate::scene::{MetaValue, SceneSink};
use crate::vertex::{PrimitiveKind, Vertex};
use log::warn;
use relic_math::{Vec3, Vec4};

// Face flag word, counted from the high bit.
const FACE_FLAG_NO_COLOR: u32 = 0x4000_0000;
const FACE_FLAG_PACKED_COLOR: u32 = 0x1000_0000;
const FACE_FLAG_HIDDEN: u32 = 0x0400_0000;

// Local vertex pool attribute mask; the seven extra texture layers
// follow the base layer in descending bits.
const LVP_HAS_POSITION: u32 = 0x8000_0000;
const LVP_HAS_COLOR_INDEX: u32 = 0x4000_0000;
const LVP_HAS_RGBA_COLOR: u32 = 0x2000_0000;
const LVP_HAS_NORMAL: u32 = 0x1000_0000;
const LVP_HAS_BASE_UV: u32 = 0x0800_0000;

fn local_vertex_stride(mask: u32) -> usize {
    let mut stride = 0;
    if mask & LVP_HAS_POSITION != 0 {
        stride += 24;
    }
    if mask & LVP_HAS_COLOR_INDEX != 0 {
        stride += 4;
    }
    if mask & LVP_HAS_RGBA_COLOR != 0 {
        stride += 4;
    }
    if mask & LVP_HAS_NORMAL != 0 {
        stride += 12;
    }
    for layer in 0..8 {
        if mask & (LVP_HAS_BASE_UV >> layer) != 0 {
            stride += 8;
        }
    }
    stride
}

impl<S: SceneSink> FltLoader<'_, '_, S> {
    pub(super) fn read_face(&mut self, body: &mut RecordBody<'_>) {
        self.read_face_like(body, false);
    }

    pub(super) fn read_mesh(&mut self, body: &mut RecordBody<'_>) {
        self.read_face_like(body, true);
    }

    fn read_face_like(&mut self, body: &mut RecordBody<'_>, is_mesh: bool) {
        let id = body.read_string(8);
        if is_mesh {
            body.forward(4); // reserved
        }
        let _ir_color = body.read_i32_or(0);
        let _priority = body.read_i16_or(0);
        let draw_mode = body.read_u8_or(0);
        let textured_white = body.read_u8_or(0) != 0;
        let primary_name_index = body.read_i16_or(-1);
        let _alternate_name_index = body.read_i16_or(-1);
        body.forward(1);
        let template = body.read_u8_or(0);
        let _detail_texture_index = body.read_i16_or(-1);
        let texture_index = i32::from(body.read_i16_or(-1));
        let material_index = i32::from(body.read_i16_or(-1));
        let _surface_code = body.read_i16_or(0);
        let _feature_id = body.read_i16_or(0);
        let _ir_material = body.read_i32_or(0);
        let transparency = body.read_u16_or(0);
        let _lod_generation_control = body.read_u8_or(0);
        let _line_style = body.read_u8_or(0);
        let flags = body.read_u32_or(0);
        let light_mode = body.read_u8_or(0);
        body.forward(7);
        let packed_color = body.read_color32();
        let _alternate_packed_color = body.read_color32();
        let _texture_mapping_index = body.read_i16_or(-1);
        body.forward(2);
        let primary_color_index = body.read_i32_or(-1);
        let _alternate_color_index = body.read_i32_or(-1);
        body.forward(2);
        let _shader_index = body.read_i16_or(-1);

        let lit = matches!(light_mode, 2 | 3);
        let gouraud = matches!(light_mode, 1 | 3);
        let textured = texture_index >= 0;

        // Face color. The textured-white shortcut beats everything; then
        // the packed word; then the palette, addressed by the old narrow
        // field before 15.1.
        let mut color = if (textured_white && textured) || flags & FACE_FLAG_NO_COLOR != 0 {
            Vec4::ONE
        } else if flags & FACE_FLAG_PACKED_COLOR != 0 {
            packed_color
        } else if self.doc.version < VERSION_15_1 {
            self.doc
                .pools
                .color
                .get()
                .get_color(i32::from(primary_name_index))
        } else {
            self.doc.pools.color.get().get_color(primary_color_index)
        };
        color.w *= 1.0 - f32::from(transparency) / 65535.0;

        let node = self.attach_new(&id);
        if flags & FACE_FLAG_HIDDEN != 0 {
            self.sink.set_metadata(node, "hidden", MetaValue::Bool(true));
        }
        match template {
            2 => self
                .sink
                .set_metadata(node, "billboard", MetaValue::from("axial")),
            4 => self
                .sink
                .set_metadata(node, "billboard", MetaValue::from("point")),
            _ => {}
        }
        if self.doc.subface_depth() > 0 {
            self.sink.set_metadata(
                node,
                "subface_level",
                MetaValue::Int(i64::from(self.doc.subface_depth())),
            );
        }

        let texture = if textured {
            self.doc
                .pools
                .texture
                .get()
                .get(texture_index)
                .map(|t| (texture_index, t))
        } else {
            None
        };
        let material = if lit || material_index >= 0 || texture.is_some() {
            Some(
                self.doc
                    .pools
                    .material
                    .get()
                    .get_or_create_textured(material_index, color, texture),
            )
        } else {
            None
        };

        let kind_override = match draw_mode {
            2 | 4 => Some(PrimitiveKind::LineLoop),
            3 => Some(PrimitiveKind::LineStrip),
            8..=10 => Some(PrimitiveKind::Points),
            _ => None,
        };
        self.contexts.insert(
            node,
            GeometryContext {
                kind_override,
                color,
                material,
                lit,
                gouraud,
                local_pool: Vec::new(),
            },
        );
    }

    pub(super) fn read_vertex_list(&mut self, body: &mut RecordBody<'_>) {
        let Some(node) = self.geometry_target() else {
            warn!("vertex list outside a face or light point, dropping it");
            return;
        };
        let count = body.remaining() / 4;
        let mut vertices = Vec::with_capacity(count);
        {
            let pools = &self.doc.pools;
            let colors = pools.color.get();
            for _ in 0..count {
                let offset = body.read_u32_or(0) as usize;
                if let Some(v) = pools.vertex.decode_vertex_at(offset, self.doc.unit_scale, colors)
                {
                    vertices.push(v);
                }
            }
        }
        let kind = self.contexts[&node]
            .kind_override
            .unwrap_or_else(|| PrimitiveKind::for_face_vertex_count(vertices.len()));
        self.emit(node, kind, vertices);
    }

    /// Morph vertex lists carry pairs of pool offsets (0% and 100%
    /// morph); only the settled 0% shape is emitted.
    pub(super) fn read_morph_vertex_list(&mut self, body: &mut RecordBody<'_>) {
        let Some(node) = self.geometry_target() else {
            warn!("morph vertex list outside a face, dropping it");
            return;
        };
        let count = body.remaining() / 8;
        let mut vertices = Vec::with_capacity(count);
        {
            let pools = &self.doc.pools;
            let colors = pools.color.get();
            for _ in 0..count {
                let offset = body.read_u32_or(0) as usize;
                body.forward(4);
                if let Some(v) = pools.vertex.decode_vertex_at(offset, self.doc.unit_scale, colors)
                {
                    vertices.push(v);
                }
            }
        }
        let kind = self.contexts[&node]
            .kind_override
            .unwrap_or_else(|| PrimitiveKind::for_face_vertex_count(vertices.len()));
        self.emit(node, kind, vertices);
    }

    pub(super) fn read_local_vertex_pool(&mut self, body: &mut RecordBody<'_>) {
        let Some(node) = self.geometry_target() else {
            warn!("local vertex pool outside a mesh, dropping it");
            return;
        };
        let declared = body.read_u32_or(0) as usize;
        let mask = body.read_u32_or(0);
        let stride = local_vertex_stride(mask);
        if stride == 0 {
            warn!("local vertex pool with empty attribute mask");
            return;
        }
        let count = declared.min(body.remaining() / stride);
        if count < declared {
            warn!("local vertex pool declares {declared} vertices, body holds {count}");
        }

        let mut pool = Vec::with_capacity(count);
        let colors = self.doc.pools.color.get();
        let unit_scale = self.doc.unit_scale;
        for _ in 0..count {
            let position = if mask & LVP_HAS_POSITION != 0 {
                (body.read_vec3d() * unit_scale).as_vec3()
            } else {
                Vec3::ZERO
            };
            if !position.is_finite() {
                warn!("non-finite position in local vertex pool");
            }
            let mut v = Vertex::at(position);
            if mask & LVP_HAS_COLOR_INDEX != 0 {
                // Palette index in the low 24 bits, alpha in the top byte.
                let word = body.read_u32_or(0);
                let mut c = colors.get_color((word & 0x00ff_ffff) as i32);
                c.w = (word >> 24) as f32 / 255.0;
                v = v.with_color(c);
            }
            if mask & LVP_HAS_RGBA_COLOR != 0 {
                v = v.with_color(body.read_color32());
            }
            if mask & LVP_HAS_NORMAL != 0 {
                v = v.with_normal(body.read_vec3f());
            }
            for layer in 0..8 {
                if mask & (LVP_HAS_BASE_UV >> layer) != 0 {
                    let uv = body.read_vec2f();
                    if layer == 0 {
                        v = v.with_uv(uv);
                    }
                }
            }
            pool.push(v);
        }
        if let Some(ctx) = self.contexts.get_mut(&node) {
            ctx.local_pool = pool;
        }
    }

    pub(super) fn read_mesh_primitive(&mut self, body: &mut RecordBody<'_>) {
        let Some(node) = self.geometry_target() else {
            warn!("mesh primitive outside a mesh, dropping it");
            return;
        };
        let primitive_type = body.read_i16_or(0);
        let index_size = body.read_u16_or(4);
        let declared = body.read_u32_or(0) as usize;

        let kind = match primitive_type {
            1 => PrimitiveKind::TriangleStrip,
            2 => PrimitiveKind::TriangleFan,
            3 => PrimitiveKind::QuadStrip,
            4 => PrimitiveKind::Polygon,
            other => {
                warn!("unknown mesh primitive type {other}, dropping it");
                return;
            }
        };
        let width = match index_size {
            1 | 2 | 4 => usize::from(index_size),
            other => {
                warn!("mesh primitive index size {other}, assuming 4");
                4
            }
        };
        let count = declared.min(body.remaining() / width);

        let mut vertices = Vec::with_capacity(count);
        let mut skipped = 0usize;
        {
            let Some(ctx) = self.contexts.get(&node) else {
                return;
            };
            for _ in 0..count {
                let index = match width {
                    1 => usize::from(body.read_u8_or(0)),
                    2 => usize::from(body.read_u16_or(0)),
                    _ => body.read_u32_or(0) as usize,
                };
                match ctx.local_pool.get(index) {
                    Some(v) => vertices.push(*v),
                    None => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            warn!("mesh primitive skipped {skipped} indices outside the local pool");
        }
        self.emit(node, kind, vertices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_vertex_stride_follows_mask() {
        assert_eq!(local_vertex_stride(0), 0);
        assert_eq!(local_vertex_stride(LVP_HAS_POSITION), 24);
        assert_eq!(
            local_vertex_stride(LVP_HAS_POSITION | LVP_HAS_NORMAL | LVP_HAS_BASE_UV),
            44
        );
        // Two texture layers.
        assert_eq!(
            local_vertex_stride(LVP_HAS_POSITION | LVP_HAS_BASE_UV | (LVP_HAS_BASE_UV >> 1)),
            40
        );
    }
}
