//! Container records: header, groups, objects, levels of detail,
//! switches, articulations, references, and the ancillary records that
//! modify the current primary.

use super::document::{
    VERSION_14_2, VERSION_15_1, VERSION_15_8, VERSION_16_0, VERSION_BROKEN_OVERRIDE_MASK,
    VERSION_LEGACY_UNITS,
};
use super::loader::{parse_into, FltLoader, MAX_REFERENCE_DEPTH};
use super::pools::{PoolSet, PoolSlot};
use super::record::RecordBody;
use crate::options::UnitSystem;
use crate::scene::{MetaValue, SceneSink};
use log::{debug, warn};
use relic_math::{DVec3, Mat4};

// Group flag word, counted from the high bit.
const GROUP_FLAG_FORWARD_ANIMATION: u32 = 0x4000_0000;
const GROUP_FLAG_SWING_ANIMATION: u32 = 0x2000_0000;
const GROUP_FLAG_BACKWARD_ANIMATION: u32 = 0x0200_0000;

// External reference pool override mask, counted from the high bit.
// A set bit means the referenced file keeps its own pool.
const OVERRIDE_COLOR: u32 = 0x8000_0000;
const OVERRIDE_MATERIAL: u32 = 0x4000_0000;
const OVERRIDE_TEXTURE: u32 = 0x2000_0000;
const OVERRIDE_LIGHT_SOURCE: u32 = 0x0400_0000;
const OVERRIDE_LIGHT_POINT: u32 = 0x0200_0000;
const OVERRIDE_SHADER: u32 = 0x0100_0000;

fn source_units(code: u8) -> UnitSystem {
    match code {
        0 => UnitSystem::Meters,
        1 => UnitSystem::Kilometers,
        4 => UnitSystem::Feet,
        5 => UnitSystem::Inches,
        8 => UnitSystem::NauticalMiles,
        other => {
            warn!("unknown unit code {other} in header, assuming meters");
            UnitSystem::Meters
        }
    }
}

impl<S: SceneSink> FltLoader<'_, '_, S> {
    pub(super) fn read_header(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let version = body.read_u32_or(0);
        let _revision = body.read_u32_or(0);
        let revision_time = body.read_string(32);
        body.forward(2 * 4); // next bead ids
        let units_mult_div = body.read_i16_or(0);
        let units_code = body.read_u8_or(0);
        body.forward(1); // textured-white default
        let _flags = body.read_u32_or(0);
        body.forward(4 * 6);
        let projection = body.read_i32_or(0);
        body.forward(4 * 7);
        body.forward(2 * 2); // next DOF id, vertex storage type
        let _origin_code = body.read_i32_or(0);
        body.forward(8 * 4); // southwest corner, extents
        body.forward(2 * 2 + 8 + 2 * 4 + 4); // next ids, reserved
        body.forward(8 * 4); // bounding corners
        let origin_lat = body.read_f64_or(0.0);
        let origin_lon = body.read_f64_or(0.0);

        self.doc.version = version;
        self.doc.unit_scale = if self.options.convert_units {
            let mut scale = source_units(units_code).scale_to(self.options.target_units);
            if version < VERSION_LEGACY_UNITS {
                // Old revisions carried an extra integer factor: positive
                // multiplies, negative divides by its magnitude.
                if units_mult_div > 0 {
                    scale *= f64::from(units_mult_div);
                } else if units_mult_div < 0 {
                    scale /= f64::from(-units_mult_div);
                }
            }
            scale
        } else {
            1.0
        };
        debug!("header '{id}': format version {version}, unit scale {}", self.doc.unit_scale);

        let node = self.sink.create_container(&id);
        self.sink.attach_child(self.doc.root(), node);
        self.sink
            .set_metadata(node, "format_version", MetaValue::Int(i64::from(version)));
        if !revision_time.is_empty() {
            self.sink
                .set_metadata(node, "revision_time", MetaValue::from(revision_time));
        }
        self.sink
            .set_metadata(node, "projection", MetaValue::Int(i64::from(projection)));
        if origin_lat != 0.0 || origin_lon != 0.0 {
            self.sink
                .set_metadata(node, "origin_lat", MetaValue::Float(origin_lat));
            self.sink
                .set_metadata(node, "origin_lon", MetaValue::Float(origin_lon));
        }
        self.doc.set_current_primary(node);
    }

    pub(super) fn read_group(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let _priority = body.read_i16_or(0);
        body.forward(2);
        let flags = body.read_u32_or(0);
        body.forward(2 * 3 + 1 + 5); // special ids, significance, layer, reserved
        let loop_count = body.read_i32_or(0);
        let loop_duration = body.read_f32_or(0.0);
        let _last_frame_duration = body.read_f32_or(0.0);

        let node = self.attach_new(&id);

        let mut forward = flags & GROUP_FLAG_FORWARD_ANIMATION != 0;
        let mut backward = false;
        if self.doc.version >= VERSION_15_8 {
            backward = flags & GROUP_FLAG_BACKWARD_ANIMATION != 0;
        } else if flags & GROUP_FLAG_SWING_ANIMATION != 0 {
            // Before 15.8 the swing bit implied an animated group.
            forward = true;
        }
        if forward || backward {
            self.sink.set_metadata(
                node,
                "animation",
                MetaValue::from(if backward { "backward" } else { "forward" }),
            );
            if flags & GROUP_FLAG_SWING_ANIMATION != 0 {
                self.sink
                    .set_metadata(node, "animation_swing", MetaValue::Bool(true));
            }
            if self.doc.version >= VERSION_15_8 && loop_count > 0 {
                self.sink.set_metadata(
                    node,
                    "animation_loop_count",
                    MetaValue::Int(i64::from(loop_count)),
                );
                self.sink.set_metadata(
                    node,
                    "animation_loop_duration",
                    MetaValue::Float(f64::from(loop_duration)),
                );
            }
        }
    }

    pub(super) fn read_object(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let _flags = body.read_u32_or(0);
        let _priority = body.read_i16_or(0);
        let transparency = body.read_u16_or(0);

        if !self.options.keep_object_nodes {
            // Splice: children of the object land directly in its parent.
            let parent = self.doc.attach_parent();
            self.doc.set_current_primary(parent);
            return;
        }

        let node = self.attach_new(&id);
        if transparency > 0 {
            self.sink.set_metadata(
                node,
                "transparency",
                MetaValue::Float(f64::from(transparency) / 65535.0),
            );
        }
    }

    pub(super) fn read_lod(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        body.forward(4);
        let switch_in = body.read_f64_or(0.0);
        let switch_out = body.read_f64_or(0.0);
        body.forward(2 * 2); // special effect ids
        let _flags = body.read_u32_or(0);
        let center = body.read_vec3d() * self.doc.unit_scale;

        let node = self.attach_new(&id);
        let scale = self.doc.unit_scale;
        self.sink
            .set_metadata(node, "lod_switch_in", MetaValue::Float(switch_in * scale));
        self.sink
            .set_metadata(node, "lod_switch_out", MetaValue::Float(switch_out * scale));
        self.sink.set_metadata(
            node,
            "lod_center",
            MetaValue::from(format!("{} {} {}", center.x, center.y, center.z)),
        );
    }

    pub(super) fn read_old_lod(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        body.forward(4);
        let switch_in = f64::from(body.read_u32_or(0));
        let switch_out = f64::from(body.read_u32_or(0));
        body.forward(2 * 2 + 4);
        let center = DVec3::new(
            f64::from(body.read_i32_or(0)),
            f64::from(body.read_i32_or(0)),
            f64::from(body.read_i32_or(0)),
        ) * self.doc.unit_scale;

        let node = self.attach_new(&id);
        let scale = self.doc.unit_scale;
        self.sink
            .set_metadata(node, "lod_switch_in", MetaValue::Float(switch_in * scale));
        self.sink
            .set_metadata(node, "lod_switch_out", MetaValue::Float(switch_out * scale));
        self.sink.set_metadata(
            node,
            "lod_center",
            MetaValue::from(format!("{} {} {}", center.x, center.y, center.z)),
        );
    }

    pub(super) fn read_dof(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        body.forward(4);
        let origin = body.read_vec3d();
        let point_on_x = body.read_vec3d();
        let point_in_xy = body.read_vec3d();
        // Nine articulation ranges follow (translate z,y,x; rotate
        // pitch,roll,yaw; scale z,y,x), four f64 each; only the frame is
        // baked into the node.
        body.forward(9 * 4 * 8);
        let flags = body.read_u32_or(0);

        let node = self.attach_new(&id);
        self.sink
            .set_metadata(node, "dof_flags", MetaValue::Int(i64::from(flags)));

        let frame = dof_frame(origin, point_on_x, point_in_xy);
        let Some((x, y, z)) = frame else {
            debug!("degenerate articulation frame on '{id}', leaving identity");
            return;
        };
        let translation = (origin * self.doc.unit_scale).as_vec3();
        let matrix = Mat4::from_cols(
            x.as_vec3().extend(0.0),
            y.as_vec3().extend(0.0),
            z.as_vec3().extend(0.0),
            translation.extend(1.0),
        );
        self.sink.set_local_transform(node, matrix);
    }

    pub(super) fn read_switch(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        body.forward(4);
        let current_mask = body.read_i32_or(0);
        let mask_count = body.read_i32_or(0);
        let _words_per_mask = body.read_i32_or(0);

        let node = self.attach_new(&id);
        self.sink.set_metadata(
            node,
            "switch_current_mask",
            MetaValue::Int(i64::from(current_mask)),
        );
        self.sink
            .set_metadata(node, "switch_mask_count", MetaValue::Int(i64::from(mask_count)));
    }

    pub(super) fn read_extension(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        let site = body.read_string(8);

        let node = self.attach_new(&id);
        if !site.is_empty() {
            self.sink
                .set_metadata(node, "extension_site", MetaValue::from(site));
        }
    }

    pub(super) fn read_instance_definition(&mut self, body: &mut RecordBody<'_>) {
        body.forward(2);
        let number = body.read_u16_or(0);

        // Deliberately not attached anywhere; references pull it in.
        let node = self.sink.create_container(&format!("instance_{number}"));
        self.sink.register_instance_definition(number, node);
        self.doc.set_current_primary(node);
    }

    pub(super) fn read_instance_reference(&mut self, body: &mut RecordBody<'_>) {
        body.forward(2);
        let number = body.read_u16_or(0);
        self.sink.resolve_instance(self.doc.attach_parent(), number);
    }

    pub(super) fn read_light_source(&mut self, body: &mut RecordBody<'_>) {
        let id = body.read_string(8);
        body.forward(4);
        let palette_index = body.read_i32_or(-1);
        body.forward(4);
        let _flags = body.read_u32_or(0);
        body.forward(4);
        let position = body.read_vec3d() * self.doc.unit_scale;

        let node = self.attach_new(&id);
        self.sink.set_metadata(
            node,
            "light_source_index",
            MetaValue::Int(i64::from(palette_index)),
        );
        self.sink.set_metadata(
            node,
            "light_source_position",
            MetaValue::from(format!("{} {} {}", position.x, position.y, position.z)),
        );
        if let Some(entry) = self.doc.pools.light_source.get().get(palette_index) {
            self.sink
                .set_metadata(node, "light_source_name", MetaValue::from(entry.name.clone()));
        }
    }

    pub(super) fn read_external_reference(&mut self, body: &mut RecordBody<'_>) {
        let path = body.read_string(200);
        let mask = if self.doc.version >= VERSION_14_2 {
            body.forward(4);
            let mut mask = body.read_u32_or(!0);
            if self.doc.version == VERSION_BROKEN_OVERRIDE_MASK {
                // This exporter release wrote garbage here.
                mask = !0;
            }
            mask
        } else {
            // No mask on the wire yet; everything inherits.
            0
        };

        let node = self.attach_new(&path);
        self.sink
            .set_metadata(node, "external_reference", MetaValue::from(path.clone()));

        if self.depth >= MAX_REFERENCE_DEPTH {
            warn!("external references nested deeper than {MAX_REFERENCE_DEPTH}, not following '{path}'");
            return;
        }
        let Some(dir) = self.base_dir else {
            debug!("no base directory; external reference '{path}' left unresolved");
            return;
        };
        let full = dir.join(&path);
        let bytes = match std::fs::read(&full) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot read external reference '{}': {e}", full.display());
                return;
            }
        };

        let pools = inherited_pools(&self.doc.pools, self.doc.version, mask);
        let result = parse_into(
            &bytes,
            &mut *self.sink,
            node,
            self.options,
            full.parent(),
            pools,
            self.depth + 1,
        );
        if let Err(e) = result {
            // A broken referenced file costs its own subtree, nothing more.
            warn!("external reference '{path}' failed to parse: {e}");
        }
    }

    pub(super) fn read_comment(&mut self, body: &mut RecordBody<'_>) {
        let text = body.read_string(body.remaining());
        if let Some(node) = self.doc.current_primary() {
            self.sink.set_metadata(node, "comment", MetaValue::from(text));
        }
    }

    pub(super) fn read_long_id(&mut self, body: &mut RecordBody<'_>) {
        let text = body.read_string(body.remaining());
        if let Some(node) = self.doc.current_primary() {
            self.sink.set_metadata(node, "long_id", MetaValue::from(text));
        }
    }

    pub(super) fn read_matrix(&mut self, body: &mut RecordBody<'_>) {
        let mut m = [0.0f32; 16];
        for slot in &mut m {
            *slot = body.read_f32_or(0.0);
        }
        // Translation lives in the last row and is in file units.
        let scale = self.doc.unit_scale as f32;
        m[12] *= scale;
        m[13] *= scale;
        m[14] *= scale;

        if let Some(node) = self.doc.current_primary() {
            self.sink
                .set_local_transform(node, Mat4::from_cols_array(&m));
        }
    }

    pub(super) fn read_general_matrix(&mut self, body: &mut RecordBody<'_>) {
        let mut m = [0.0f32; 16];
        for slot in &mut m {
            *slot = body.read_f32_or(0.0);
        }
        if let Some(node) = self.doc.current_primary() {
            self.sink
                .set_local_transform(node, Mat4::from_cols_array(&m));
        }
    }

    pub(super) fn read_replicate(&mut self, body: &mut RecordBody<'_>) {
        let count = body.read_i16_or(0);
        if count <= 0 {
            return;
        }
        if let Some(node) = self.doc.current_primary() {
            self.sink
                .set_metadata(node, "replications", MetaValue::Int(i64::from(count)));
        }
    }
}

/// Orthonormal frame of an articulation: x toward the reference point,
/// z normal to the stated plane. `None` when the points are degenerate.
fn dof_frame(origin: DVec3, point_on_x: DVec3, point_in_xy: DVec3) -> Option<(DVec3, DVec3, DVec3)> {
    let x = (point_on_x - origin).try_normalize()?;
    let z = x.cross(point_in_xy - origin).try_normalize()?;
    let y = z.cross(x);
    Some((x, y, z))
}

/// Pool slots for an externally referenced file.
///
/// A pool inherits from the including file unless the reference record's
/// override bit asks for a fresh one. Palette kinds that predate the
/// override mask ignore their bit below the version that introduced it
/// and always inherit.
fn inherited_pools<'p>(parent: &'p PoolSet<'_>, version: u32, mask: u32) -> PoolSet<'p> {
    let mut pools = PoolSet::default();
    if mask & OVERRIDE_COLOR == 0 {
        pools.color = PoolSlot::Inherited(parent.color.get());
    }
    if mask & OVERRIDE_MATERIAL == 0 {
        pools.material = PoolSlot::Inherited(parent.material.get());
    }
    if mask & OVERRIDE_TEXTURE == 0 {
        pools.texture = PoolSlot::Inherited(parent.texture.get());
    }
    if version < VERSION_15_1 || mask & OVERRIDE_LIGHT_SOURCE == 0 {
        pools.light_source = PoolSlot::Inherited(parent.light_source.get());
    }
    if version < VERSION_15_8 || mask & OVERRIDE_LIGHT_POINT == 0 {
        pools.light_point_appearance = PoolSlot::Inherited(parent.light_point_appearance.get());
        pools.light_point_animation = PoolSlot::Inherited(parent.light_point_animation.get());
    }
    if version < VERSION_16_0 || mask & OVERRIDE_SHADER == 0 {
        pools.shader = PoolSlot::Inherited(parent.shader.get());
    }
    pools
}
