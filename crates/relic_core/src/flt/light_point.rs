//! Light point records.
//!
//! Light points are emissive markers rendered as points, not lit
//! geometry. All three record families open a geometry context with a
//! point-kind override so the vertex lists that follow come out as point
//! primitives; the photometric parameters ride along as metadata.

use super::loader::{FltLoader, GeometryContext};
use super::record::RecordBody;
use crate::scene::{MetaValue, NodeId, SceneSink};
use crate::vertex::PrimitiveKind;
use relic_math::Vec4;

// Light point flag word, counted from the high bit.
const LP_FLAG_NO_BACK_COLOR: u32 = 0x8000_0000 >> 1;
const LP_FLAG_FLASHING: u32 = 0x8000_0000 >> 9;
const LP_FLAG_ROTATING: u32 = 0x8000_0000 >> 10;

impl<S: SceneSink> FltLoader<'_, '_, S> {
    fn light_point_context(&mut self, node: NodeId) {
        self.contexts.insert(
            node,
            GeometryContext {
                kind_override: Some(PrimitiveKind::Points),
                color: Vec4::ONE,
                material: None,
                // Point colors come from the vertices, unshaded.
                lit: false,
                gouraud: true,
                local_pool: Vec::new(),
            },
        );
    }

    pub(super) fn read_light_point(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let _material = body.read_i16_or(-1);
        let _feature = body.read_i16_or(-1);
        let back_color_index = body.read_i32_or(-1);
        let back_color = self.doc.pools.color.get().get_color(back_color_index);
        let _display_mode = body.read_i32_or(0);
        let intensity_front = body.read_f32_or(1.0);
        let intensity_back = body.read_f32_or(1.0);
        body.forward(8); // defocus range
        let _fade_mode = body.read_i32_or(0);
        let _fog_punch_mode = body.read_i32_or(0);
        let _directional_mode = body.read_i32_or(0);
        let _range_mode = body.read_i32_or(0);
        let min_pixel_size = body.read_f32_or(0.0);
        let max_pixel_size = body.read_f32_or(0.0);
        let actual_size = body.read_f32_or(0.0);
        body.forward(5 * 4); // transparent falloff block, fog
        body.forward(4); // reserved
        let _size_difference_threshold = body.read_f32_or(0.0);
        let directionality = body.read_i32_or(0);
        body.forward(3 * 4); // lobe angles
        body.forward(2 * 4); // falloff, ambient intensity
        let animation_period = body.read_f32_or(0.0);
        let _animation_phase_delay = body.read_f32_or(0.0);
        let _animation_enabled_period = body.read_f32_or(0.0);
        let _significance = body.read_f32_or(0.0);
        let _draw_order = body.read_i32_or(0);
        let flags = body.read_u32_or(0);

        let node = self.attach_new(&id);
        self.sink
            .set_metadata(node, "light_point", MetaValue::Bool(true));
        self.sink.set_metadata(
            node,
            "intensity",
            MetaValue::Float(f64::from(intensity_front)),
        );
        self.sink.set_metadata(
            node,
            "pixel_size_range",
            MetaValue::from(format!(
                "{min_pixel_size} {max_pixel_size} {actual_size}"
            )),
        );
        if directionality != 0 {
            self.sink.set_metadata(
                node,
                "directionality",
                MetaValue::Int(i64::from(directionality)),
            );
            self.sink.set_metadata(
                node,
                "back_intensity",
                MetaValue::Float(f64::from(intensity_back)),
            );
            if flags & LP_FLAG_NO_BACK_COLOR == 0 {
                self.sink.set_metadata(
                    node,
                    "back_color",
                    MetaValue::from(format!(
                        "{} {} {} {}",
                        back_color.x, back_color.y, back_color.z, back_color.w
                    )),
                );
            }
        }
        if flags & (LP_FLAG_FLASHING | LP_FLAG_ROTATING) != 0 {
            self.sink.set_metadata(
                node,
                "animation_period",
                MetaValue::Float(f64::from(animation_period)),
            );
        }
        self.light_point_context(node);
    }

    pub(super) fn read_indexed_light_point(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let appearance_index = body.read_i32_or(-1);
        let animation_index = body.read_i32_or(-1);
        let _draw_order = body.read_i32_or(0); // calligraphic lights

        let node = self.attach_new(&id);
        self.sink
            .set_metadata(node, "light_point", MetaValue::Bool(true));
        if let Some(appearance) = self
            .doc
            .pools
            .light_point_appearance
            .get()
            .get(appearance_index)
        {
            self.sink.set_metadata(
                node,
                "appearance",
                MetaValue::from(appearance.name.clone()),
            );
            self.sink.set_metadata(
                node,
                "intensity",
                MetaValue::Float(f64::from(appearance.intensity_front)),
            );
            self.sink.set_metadata(
                node,
                "pixel_size_range",
                MetaValue::from(format!(
                    "{} {} {}",
                    appearance.min_pixel_size, appearance.max_pixel_size, appearance.actual_size
                )),
            );
            if appearance.texture_pattern >= 0 {
                self.sink.set_metadata(
                    node,
                    "point_sprite_texture",
                    MetaValue::Int(i64::from(appearance.texture_pattern)),
                );
            }
        }
        if let Some(animation) = self
            .doc
            .pools
            .light_point_animation
            .get()
            .get(animation_index)
        {
            self.sink
                .set_metadata(node, "animation", MetaValue::from(animation.name.clone()));
        }
        self.light_point_context(node);
    }

    pub(super) fn read_light_point_system(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let intensity = body.read_f32_or(1.0);
        let animation_state = body.read_i32_or(0);
        let flags = body.read_i32_or(0);

        let node = self.attach_new(&id);
        self.sink
            .set_metadata(node, "light_point_system", MetaValue::Bool(true));
        self.sink
            .set_metadata(node, "intensity", MetaValue::Float(f64::from(intensity)));
        self.sink.set_metadata(
            node,
            "animation_state",
            MetaValue::Int(i64::from(animation_state)),
        );
        if flags != 0 {
            self.sink
                .set_metadata(node, "system_flags", MetaValue::Int(i64::from(flags)));
        }
    }
}
