//! Palette records, filling the pools of the current document.
//!
//! A palette record found while its pool slot is inherited from an
//! including file is skipped: the parent's palette wins by design, and
//! overwriting through the shared slot is not possible anyway.

use super::document::{VERSION_14, VERSION_15_1, VERSION_15_8, VERSION_16_1, VERSION_LEGACY_COLOR};
use super::loader::FltLoader;
use super::pools::{
    AnimationPulse, ColorPool, LightPointAnimation, LightPointAppearance, LightSourceEntry,
    MaterialEntry, ShaderProgram, VertexPool,
};
use super::record::{FramingError, RecordBody, RecordScanner};
use crate::scene::{SceneSink, TextureRef};
use log::{debug, warn};
use relic_math::Vec4;

// Color palette bodies longer than this carry a trailing name section;
// the entry count is then fixed instead of derived from the body size.
const COLOR_PALETTE_PLAIN_BODY_MAX: usize = 4224;

impl<S: SceneSink> FltLoader<'_, '_, S> {
    /// The vertex palette declares a total size and then holds that many
    /// bytes of vertex records outside its own framed body, which is why
    /// this handler alone gets the scanner.
    pub(super) fn read_vertex_palette(
        &mut self,
        body: &mut RecordBody<'_>,
        scanner: &mut RecordScanner<'_>,
    ) -> Result<(), FramingError> {
        let declared = body.read_u32_or(8) as usize;
        let payload = scanner.take_raw(declared.saturating_sub(8))?;

        // Offset 0 addresses the palette record header, so the buffer
        // keeps 8 bytes of padding in front of the payload.
        let mut data = vec![0u8; 8];
        data.extend_from_slice(payload);
        debug!("vertex palette of {} bytes", data.len());
        self.doc.pools.vertex = VertexPool::new(data);
        Ok(())
    }

    pub(super) fn read_color_palette(&mut self, body: &mut RecordBody<'_>) {
        let old_layout = self.doc.version <= VERSION_LEGACY_COLOR;
        let Some(pool) = self.doc.pools.color.owned_mut() else {
            debug!("color palette inherited from parent file, skipping record");
            return;
        };
        *pool = ColorPool::new(old_layout);

        if old_layout {
            // 32 variable entries then 56 fixed-intensity entries, each
            // three u16 channels holding 0..255.
            for index in 0..88 {
                if body.remaining() == 0 {
                    break;
                }
                let r = f32::from(body.read_u16_or(0)) / 255.0;
                let g = f32::from(body.read_u16_or(0)) / 255.0;
                let b = f32::from(body.read_u16_or(0)) / 255.0;
                pool.set(index, Vec4::new(r, g, b, 1.0));
            }
            return;
        }

        let body_len = body.remaining();
        let mut max_entries = if self.doc.version >= VERSION_15_1 {
            1024
        } else {
            512
        };
        if body_len <= COLOR_PALETTE_PLAIN_BODY_MAX {
            max_entries = max_entries.min(body_len.saturating_sub(128) / 4);
        }
        body.forward(128); // reserved block
        for index in 0..max_entries as i32 {
            let a = f32::from(body.read_u8_or(255)) / 255.0;
            let b = f32::from(body.read_u8_or(255)) / 255.0;
            let g = f32::from(body.read_u8_or(255)) / 255.0;
            let r = f32::from(body.read_u8_or(255)) / 255.0;
            pool.set(index, Vec4::new(r, g, b, a));
        }
    }

    pub(super) fn read_material_palette(&mut self, body: &mut RecordBody<'_>) {
        let index = body.read_i32_or(0);
        let name = body.read_string(12);
        let _flags = body.read_u32_or(0);
        let ambient = body.read_vec3f();
        let diffuse = body.read_vec3f();
        let specular = body.read_vec3f();
        let emissive = body.read_vec3f();
        let shininess = body.read_f32_or(0.0);
        let alpha = body.read_f32_or(1.0);

        let Some(pool) = self.doc.pools.material.owned_mut() else {
            debug!("material palette inherited from parent file, skipping record");
            return;
        };
        pool.set(
            index,
            MaterialEntry {
                name,
                ambient,
                diffuse,
                specular,
                emissive,
                shininess,
                alpha,
            },
        );
    }

    /// Pre-15.1 material palette: one record with 64 fixed slots.
    pub(super) fn read_old_material_palette(&mut self, body: &mut RecordBody<'_>) {
        let Some(pool) = self.doc.pools.material.owned_mut() else {
            debug!("material palette inherited from parent file, skipping record");
            return;
        };
        for index in 0..64 {
            if body.remaining() == 0 {
                break;
            }
            let ambient = body.read_vec3f();
            let diffuse = body.read_vec3f();
            let specular = body.read_vec3f();
            let emissive = body.read_vec3f();
            let shininess = body.read_f32_or(0.0);
            let alpha = body.read_f32_or(1.0);
            let _flags = body.read_u32_or(0);
            let name = body.read_string(12);
            body.forward(4 * 28); // spare
            pool.set(
                index,
                MaterialEntry {
                    name,
                    ambient,
                    diffuse,
                    specular,
                    emissive,
                    shininess,
                    alpha,
                },
            );
        }
    }

    pub(super) fn read_texture_palette(&mut self, body: &mut RecordBody<'_>) {
        let filename_len = if self.doc.version < VERSION_14 { 80 } else { 200 };
        let filename = body.read_string(filename_len);
        let index = body.read_i32_or(0);

        if self.doc.pools.texture.is_inherited() {
            debug!("texture palette inherited from parent file, skipping record");
            return;
        }

        let mut texture = TextureRef::new(filename.clone());
        if let Some(dir) = self.base_dir {
            let attr_path = dir.join(format!("{filename}.attr"));
            if let Some(attr) = super::attr::load_attr(&attr_path) {
                attr.apply_to(&mut texture);
                texture.transparent =
                    self.options.use_texture_alpha_for_transparency && attr.has_alpha();
            }
        }
        if let Some(pool) = self.doc.pools.texture.owned_mut() {
            pool.set(index, texture);
        }
    }

    pub(super) fn read_light_source_palette(&mut self, body: &mut RecordBody<'_>) {
        let index = body.read_i32_or(0);
        body.forward(2 * 4);
        let name = body.read_string(20);
        body.forward(4);
        let ambient = body.read_vec4f();
        let diffuse = body.read_vec4f();
        let specular = body.read_vec4f();
        let kind = body.read_i32_or(0);
        body.forward(4 * 10);
        let spot_exponent = body.read_f32_or(0.0);
        let spot_cutoff = body.read_f32_or(180.0);
        let _yaw = body.read_f32_or(0.0);
        let _pitch = body.read_f32_or(0.0);
        let attenuation = [
            body.read_f32_or(1.0),
            body.read_f32_or(0.0),
            body.read_f32_or(0.0),
        ];

        let Some(pool) = self.doc.pools.light_source.owned_mut() else {
            debug!("light source palette inherited from parent file, skipping record");
            return;
        };
        pool.set(
            index,
            LightSourceEntry {
                name,
                ambient,
                diffuse,
                specular,
                kind,
                spot_exponent,
                spot_cutoff,
                attenuation,
            },
        );
    }

    pub(super) fn read_light_point_appearance_palette(&mut self, body: &mut RecordBody<'_>) {
        body.forward(4);
        let name = body.read_string(256);
        let index = body.read_i32_or(0);
        let _material_code = body.read_i16_or(0);
        let _feature_id = body.read_i16_or(0);
        let back_color_index = body.read_i32_or(-1);
        let back_color = self.doc.pools.color.get().get_color(back_color_index);
        let display_mode = body.read_i32_or(0);
        let intensity_front = body.read_f32_or(1.0);
        let intensity_back = body.read_f32_or(0.0);
        let _min_defocus = body.read_f32_or(0.0);
        let _max_defocus = body.read_f32_or(0.0);
        let _fading_mode = body.read_i32_or(0);
        let _fog_punch_mode = body.read_i32_or(0);
        let _directional_mode = body.read_i32_or(0);
        let _range_mode = body.read_i32_or(0);
        let min_pixel_size = body.read_f32_or(0.0);
        let max_pixel_size = body.read_f32_or(0.0);
        let actual_size = body.read_f32_or(0.0);
        let _transparent_falloff_pixel_size = body.read_f32_or(0.0);
        let _transparent_falloff_exponent = body.read_f32_or(1.0);
        let _transparent_falloff_scalar = body.read_f32_or(1.0);
        let _transparent_falloff_clamp = body.read_f32_or(1.0);
        let _fog_scalar = body.read_f32_or(0.0);
        body.forward(4); // reserved
        let _size_difference_threshold = body.read_f32_or(0.0);
        let directional = body.read_i32_or(0) != 0;
        let _horizontal_lobe_angle = body.read_f32_or(0.0);
        let _vertical_lobe_angle = body.read_f32_or(0.0);
        let _lobe_roll_angle = body.read_f32_or(0.0);
        let _directional_falloff_exponent = body.read_f32_or(1.0);
        let _directional_ambient_intensity = body.read_f32_or(0.0);
        let _significance = body.read_f32_or(0.0);
        let flags = body.read_u32_or(0);
        let visibility_range = body.read_f32_or(0.0);
        let fade_in_duration = body.read_f32_or(0.0);
        let fade_out_duration = body.read_f32_or(0.0);
        let _lod_range_ratio = body.read_f32_or(0.0);
        let _lod_scale = body.read_f32_or(1.0);
        let texture_pattern = if self.doc.version > VERSION_15_8 {
            body.read_i16_or(-1)
        } else {
            -1
        };

        let Some(pool) = self.doc.pools.light_point_appearance.owned_mut() else {
            debug!("light point appearance palette inherited from parent file, skipping record");
            return;
        };
        pool.set(
            index,
            LightPointAppearance {
                name,
                back_color,
                display_mode,
                intensity_front,
                intensity_back,
                min_pixel_size,
                max_pixel_size,
                actual_size,
                directional,
                flags,
                visibility_range,
                fade_in_duration,
                fade_out_duration,
                texture_pattern,
            },
        );
    }

    pub(super) fn read_light_point_animation_palette(&mut self, body: &mut RecordBody<'_>) {
        body.forward(4);
        let name = body.read_string(256);
        let index = body.read_i32_or(0);
        let period = body.read_f32_or(0.0);
        let phase_delay = body.read_f32_or(0.0);
        let enabled_period = body.read_f32_or(0.0);
        let axis = body.read_vec3f();
        let flags = body.read_u32_or(0);
        let animation_type = body.read_i32_or(0);
        let _morse_timing = body.read_i32_or(0);
        let _word_rate = body.read_i32_or(0);
        let _character_rate = body.read_i32_or(0);
        let morse_code = body.read_string(1024);
        let declared = body.read_i32_or(0).max(0) as usize;

        // Pulse entries are 12 bytes; never trust the count past the body.
        let count = declared.min(body.remaining() / 12);
        if count < declared {
            warn!("animation sequence declares {declared} pulses, body holds {count}");
        }
        let mut pulses = Vec::with_capacity(count);
        for _ in 0..count {
            pulses.push(AnimationPulse {
                state: body.read_u32_or(0),
                duration: body.read_f32_or(0.0),
                color: body.read_color32(),
            });
        }

        let Some(pool) = self.doc.pools.light_point_animation.owned_mut() else {
            debug!("light point animation palette inherited from parent file, skipping record");
            return;
        };
        pool.set(
            index,
            LightPointAnimation {
                name,
                period,
                phase_delay,
                enabled_period,
                axis,
                flags,
                animation_type,
                morse_code,
                pulses,
            },
        );
    }

    pub(super) fn read_shader_palette(&mut self, body: &mut RecordBody<'_>) {
        let index = body.read_i32_or(0);
        let kind = body.read_i32_or(0);
        let name = body.read_string(1024);

        let mut vertex_files = Vec::new();
        let mut fragment_files = Vec::new();
        match kind {
            // Cg: one program file per stage plus entry point names.
            0 => {
                vertex_files.push(body.read_string(1024));
                fragment_files.push(body.read_string(1024));
            }
            // CgFX: the palette name is the effect file.
            1 => {}
            // GLSL: counted file lists; a single pair before 16.1.
            2 => {
                let (vertex_count, fragment_count) = if self.doc.version >= VERSION_16_1 {
                    (
                        body.read_i32_or(1).max(0) as usize,
                        body.read_i32_or(1).max(0) as usize,
                    )
                } else {
                    (1, 1)
                };
                for _ in 0..vertex_count {
                    if body.remaining() == 0 {
                        break;
                    }
                    vertex_files.push(body.read_string(1024));
                }
                for _ in 0..fragment_count {
                    if body.remaining() == 0 {
                        break;
                    }
                    fragment_files.push(body.read_string(1024));
                }
            }
            other => {
                warn!("unknown shader type {other} in palette entry {index}");
                return;
            }
        }

        let Some(pool) = self.doc.pools.shader.owned_mut() else {
            debug!("shader palette inherited from parent file, skipping record");
            return;
        };
        pool.set(
            index,
            ShaderProgram {
                name,
                kind,
                vertex_files,
                fragment_files,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::flt::loader::load_flt_bytes;
    use crate::flt::testing::*;
    use crate::flt::{opcodes, pools::ColorPool};
    use crate::options::ParseOptions;
    use crate::scene::MetaValue;
    use relic_math::Vec4;

    fn options() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn test_color_palette_resolves_face_colors() {
        // Entry 2 is pure green; the face indexes it at full intensity.
        let mut palette_body = vec![0u8; 128];
        for entry in 0..3u32 {
            let (r, g, b) = if entry == 2 { (0, 255, 0) } else { (255, 255, 255) };
            palette_body.extend([255, b as u8, g as u8, r as u8]); // a,b,g,r
        }

        let mut verts = VertexPaletteBuilder::new();
        let offsets = [
            verts.add_vertex_c([0.0, 0.0, 0.0], 0, false),
            verts.add_vertex_c([1.0, 0.0, 0.0], 0, false),
            verts.add_vertex_c([0.0, 1.0, 0.0], 0, false),
        ];

        let face = FaceBuilder::new("tri").color_index((2 << 7) | 127).build();
        let bytes = [
            header_record(1560, 0),
            rec(opcodes::COLOR_PALETTE, &palette_body),
            verts.records(),
            push(),
            face,
            push(),
            vertex_list(&offsets),
            pop(),
            pop(),
        ]
        .concat();

        let scene = load_flt_bytes(&bytes, "db", &options()).unwrap();
        let tri = scene.find_node("tri").unwrap();
        let prim = &scene.node(tri).primitives[0];
        let color = prim.vertices[0].color.unwrap();
        assert!(color.y > 0.99 && color.x < 0.01);
    }

    #[test]
    fn test_old_color_palette_layout() {
        // Version 12 file: u16-channel entries, no reserved block.
        let mut palette_body = Vec::new();
        for entry in 0..40 {
            let v: u16 = if entry == 1 { 255 } else { 0 };
            palette_body.extend([u16be(v), u16be(0), u16be(v)].concat());
        }

        let mut verts = VertexPaletteBuilder::new();
        let offsets = [verts.add_vertex_c([0.0; 3], 0, false)];
        let face = FaceBuilder::new("dot").color_name((1 << 7) | 127).build();
        let bytes = [
            header_record(12, 0),
            rec(opcodes::COLOR_PALETTE, &palette_body),
            verts.records(),
            push(),
            face,
            push(),
            vertex_list(&offsets),
            pop(),
            pop(),
        ]
        .concat();

        let scene = load_flt_bytes(&bytes, "db", &options()).unwrap();
        let dot = scene.find_node("dot").unwrap();
        let color = scene.node(dot).primitives[0].vertices[0].color.unwrap();
        assert!(color.x > 0.99 && color.y < 0.01 && color.z > 0.99);
    }

    #[test]
    fn test_material_palette_modulates_face_color() {
        let mut mat_body = i32be(3);
        mat_body.extend(fixed_str("shiny", 12));
        mat_body.extend(u32be(0));
        for c in [
            [0.5f32, 0.5, 0.5], // ambient
            [1.0, 0.5, 0.25],   // diffuse
            [0.0, 0.0, 0.0],    // specular
            [0.0, 0.0, 0.0],    // emissive
        ] {
            for v in c {
                mat_body.extend(f32be(v));
            }
        }
        mat_body.extend(f32be(32.0));
        mat_body.extend(f32be(1.0));

        let mut verts = VertexPaletteBuilder::new();
        let offsets = [
            verts.add_vertex_c([0.0, 0.0, 0.0], 0, false),
            verts.add_vertex_c([1.0, 0.0, 0.0], 0, false),
            verts.add_vertex_c([0.0, 1.0, 0.0], 0, false),
        ];
        // Lit face, white face color.
        let face = FaceBuilder::new("lit")
            .material(3)
            .light_mode(2)
            .build();
        let bytes = [
            header_record(1560, 0),
            rec(opcodes::MATERIAL_PALETTE, &mat_body),
            verts.records(),
            push(),
            face,
            push(),
            vertex_list(&offsets),
            pop(),
            pop(),
        ]
        .concat();

        let scene = load_flt_bytes(&bytes, "db", &options()).unwrap();
        let lit = scene.find_node("lit").unwrap();
        let prim = &scene.node(lit).primitives[0];
        let mat = prim.material.as_ref().unwrap();
        assert_eq!(mat.name, "shiny");
        assert!((mat.diffuse.x - 1.0).abs() < 1e-6);
        assert!((mat.diffuse.z - 0.25).abs() < 1e-6);
        assert_eq!(mat.shininess, 32.0);
    }

    #[test]
    fn test_texture_palette_records_path() {
        let mut tex_body = fixed_str("textures/brick.rgb", 200);
        tex_body.extend(i32be(5));

        let mut verts = VertexPaletteBuilder::new();
        let offsets = [
            verts.add_vertex_ct([0.0, 0.0, 0.0], [0.0, 0.0], 0, false),
            verts.add_vertex_ct([1.0, 0.0, 0.0], [1.0, 0.0], 0, false),
            verts.add_vertex_ct([0.0, 1.0, 0.0], [0.0, 1.0], 0, false),
        ];
        let face = FaceBuilder::new("wall").texture(5).build();
        let bytes = [
            header_record(1560, 0),
            rec(opcodes::TEXTURE_PALETTE, &tex_body),
            verts.records(),
            push(),
            face,
            push(),
            vertex_list(&offsets),
            pop(),
            pop(),
        ]
        .concat();

        let scene = load_flt_bytes(&bytes, "db", &options()).unwrap();
        let wall = scene.find_node("wall").unwrap();
        let prim = &scene.node(wall).primitives[0];
        let tex = prim.material.as_ref().unwrap().texture.as_ref().unwrap();
        assert_eq!(tex.path, "textures/brick.rgb");
        assert_eq!(prim.vertices[2].uv, Some(relic_math::Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn test_texture_palette_filename_is_short_before_version_14() {
        let mut tex_body = fixed_str("old.rgb", 80);
        tex_body.extend(i32be(0));
        let bytes = [
            header_record(12, 0),
            rec(opcodes::TEXTURE_PALETTE, &tex_body),
            push(),
            rec(opcodes::GROUP, &fixed_str("g", 8)),
            pop(),
        ]
        .concat();

        // Nothing to assert on the scene shape; the short field must not
        // desynchronize the index that follows it.
        let scene = load_flt_bytes(&bytes, "db", &options()).unwrap();
        assert!(scene.find_node("g").is_some());
    }

    #[test]
    fn test_zero_intensity_packed_color_is_black() {
        let pool = {
            let mut p = ColorPool::new(false);
            p.set(0, Vec4::ONE);
            p
        };
        assert_eq!(pool.get_color(0), Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_header_metadata_recorded() {
        let bytes = [
            header_record(1560, 0),
            push(),
            rec(opcodes::GROUP, &fixed_str("g", 8)),
            pop(),
        ]
        .concat();
        let scene = load_flt_bytes(&bytes, "db", &options()).unwrap();
        let header = scene.find_node("db").map(|_| ()).and(scene.find_node("hdr"));
        let header = header.unwrap();
        assert_eq!(
            scene.node(header).metadata("format_version"),
            Some(&MetaValue::Int(1560))
        );
    }
}
