//! Chunk-tree parser for 3D Studio files.
//!
//! Walks the nested chunk structure and fills the intermediate
//! representation in `types`. Unknown chunk tags are logged once and
//! skipped; framing violations abort the parse.

use super::chunk::{tags, Chunk, ChunkWalker, FramingError};
use super::types::*;
use crate::io::{ByteReader, Endian, ReadError};
use crate::registry::UnknownTags;
use log::{debug, warn};
use relic_math::{Affine3A, Mat4, Quat, Vec2, Vec3};
use thiserror::Error;

/// Errors that abort a 3D Studio parse.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("not a 3D Studio file: top-level chunk tag is {found:#06x}")]
    NotThisFormat { found: u16 },
    #[error("file too short to hold a chunk header")]
    Empty,
}

pub type ParseResult<T> = Result<T, ParseError>;

const REGISTRY_NAME: &str = "3ds";

/// Parse an in-memory 3D Studio file into its intermediate form.
///
/// Accepts model files, material libraries, and project files; they
/// differ only in the top-level magic and which sections appear.
pub fn parse_tds(bytes: &[u8]) -> ParseResult<TdsFile> {
    let reader = ByteReader::new(bytes, Endian::Little);
    let mut walker = ChunkWalker::new(reader);
    let top = walker.next_chunk()?.ok_or(ParseError::Empty)?;
    match top.tag {
        tags::M3DMAGIC | tags::MLIBMAGIC | tags::CMAGIC => {}
        found => return Err(ParseError::NotThisFormat { found }),
    }

    let mut parser = TdsParser::default();
    parser.read_top(top)?;
    debug!(
        "3ds parse: {} materials, {} objects, {} hierarchy nodes",
        parser.file.materials.len(),
        parser.file.objects.len(),
        parser.file.nodes.len()
    );
    Ok(parser.file)
}

#[derive(Default)]
struct TdsParser {
    file: TdsFile,
    unknown: UnknownTags,
}

impl TdsParser {
    fn read_top(&mut self, top: Chunk<'_>) -> ParseResult<()> {
        let mut w = top.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::M3D_VERSION => self.file.format_version = Some(c.body.read_u32()?),
                tags::MDATA => self.read_mdata(c)?,
                tags::KFDATA => self.read_kfdata(c)?,
                // Material libraries carry materials at the top level.
                tags::MAT_ENTRY => {
                    let material = self.read_material(c)?;
                    self.file.materials.push(material);
                }
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(())
    }

    fn read_mdata(&mut self, chunk: Chunk<'_>) -> ParseResult<()> {
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::MESH_VERSION => self.file.mesh_version = Some(c.body.read_u32()?),
                tags::MASTER_SCALE => self.file.master_scale = Some(c.body.read_f32()?),
                tags::AMBIENT_LIGHT => self.file.ambient = self.read_color(c)?,
                tags::MAT_ENTRY => {
                    let material = self.read_material(c)?;
                    self.file.materials.push(material);
                }
                tags::NAMED_OBJECT => self.read_named_object(c)?,
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(())
    }

    fn read_material(&mut self, chunk: Chunk<'_>) -> ParseResult<TdsMaterial> {
        let mut material = TdsMaterial::default();
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::MAT_NAME => material.name = c.body.read_cstring()?,
                tags::MAT_AMBIENT => material.ambient = self.read_color(c)?,
                tags::MAT_DIFFUSE => material.diffuse = self.read_color(c)?,
                tags::MAT_SPECULAR => material.specular = self.read_color(c)?,
                tags::MAT_SHININESS => material.shininess = self.read_percentage(c)?,
                tags::MAT_TRANSPARENCY => material.transparency = self.read_percentage(c)?,
                tags::MAT_SELF_ILPCT => material.self_illumination = self.read_percentage(c)?,
                tags::MAT_TWO_SIDE => material.two_sided = true,
                tags::MAT_SHADING => material.shading = Some(c.body.read_i16()?),
                tags::MAT_TEXMAP => material.texture = Some(self.read_texture_map(c)?),
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(material)
    }

    fn read_texture_map(&mut self, chunk: Chunk<'_>) -> ParseResult<TdsTextureMap> {
        let mut map = TdsTextureMap::default();
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::INT_PERCENTAGE => map.percent = c.body.read_i16()? as f32 / 100.0,
                tags::FLOAT_PERCENTAGE => map.percent = c.body.read_f32()? / 100.0,
                tags::MAT_MAPNAME => map.name = c.body.read_cstring()?,
                tags::MAT_MAP_TILING => map.tiling = c.body.read_u16()?,
                tags::MAT_MAP_USCALE => map.scale.x = c.body.read_f32()?,
                tags::MAT_MAP_VSCALE => map.scale.y = c.body.read_f32()?,
                tags::MAT_MAP_UOFFSET => map.offset.x = c.body.read_f32()?,
                tags::MAT_MAP_VOFFSET => map.offset.y = c.body.read_f32()?,
                tags::MAT_MAP_ANG => map.rotation = c.body.read_f32()?,
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(map)
    }

    /// Read a color container. Gamma-corrected ("linear") variants take
    /// precedence over the plain ones once seen, whatever the order.
    fn read_color(&mut self, chunk: Chunk<'_>) -> ParseResult<Option<Vec3>> {
        let mut color = None;
        let mut have_lin = false;
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            if !apply_color_subchunk(&mut c, &mut color, &mut have_lin)? {
                self.unknown.note(REGISTRY_NAME, c.tag);
            }
        }
        Ok(color)
    }

    fn read_percentage(&mut self, chunk: Chunk<'_>) -> ParseResult<Option<f32>> {
        let mut value = None;
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::INT_PERCENTAGE => value = Some(c.body.read_i16()? as f32 / 100.0),
                tags::FLOAT_PERCENTAGE => value = Some(c.body.read_f32()? / 100.0),
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(value)
    }

    fn read_named_object(&mut self, mut chunk: Chunk<'_>) -> ParseResult<()> {
        let name = chunk.body.read_cstring()?;
        let mut hidden = false;
        let mut body: Option<TdsObjectBody> = None;

        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::OBJ_HIDDEN => hidden = true,
                tags::N_TRI_OBJECT => {
                    let mesh = self.read_tri_mesh(c)?;
                    store_object_body(&name, &mut body, TdsObjectBody::Mesh(mesh));
                }
                tags::N_CAMERA => {
                    let camera = read_camera(&mut c.body)?;
                    store_object_body(&name, &mut body, TdsObjectBody::Camera(camera));
                }
                tags::N_DIRECT_LIGHT => {
                    let light = self.read_light(c)?;
                    store_object_body(&name, &mut body, TdsObjectBody::Light(light));
                }
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }

        match body {
            Some(body) => self.file.objects.push(TdsObject { name, hidden, body }),
            None => debug!("named object '{name}' carries no mesh, camera, or light"),
        }
        Ok(())
    }

    fn read_tri_mesh(&mut self, chunk: Chunk<'_>) -> ParseResult<TdsMesh> {
        let mut mesh = TdsMesh::default();
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::POINT_ARRAY => {
                    let count = c.body.read_u16()? as usize;
                    mesh.points.reserve(count);
                    for _ in 0..count {
                        mesh.points.push(c.body.read_vec3f()?);
                    }
                }
                tags::TEX_VERTS => {
                    let count = c.body.read_u16()? as usize;
                    mesh.tex_coords.reserve(count);
                    for _ in 0..count {
                        mesh.tex_coords.push(c.body.read_vec2f()?);
                    }
                }
                tags::FACE_ARRAY => self.read_face_array(c, &mut mesh)?,
                tags::MESH_MATRIX => {
                    let mut m = [0.0f32; 12];
                    for v in m.iter_mut() {
                        *v = c.body.read_f32()?;
                    }
                    mesh.matrix = Some(Mat4::from(Affine3A::from_cols_array(&m)));
                }
                tags::MESH_COLOR => mesh.color_index = Some(c.body.read_u8()?),
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(mesh)
    }

    fn read_face_array(&mut self, mut chunk: Chunk<'_>, mesh: &mut TdsMesh) -> ParseResult<()> {
        let count = chunk.body.read_u16()? as usize;
        mesh.faces.reserve(count);
        for _ in 0..count {
            mesh.faces.push(TdsFace {
                indices: [
                    chunk.body.read_u16()?,
                    chunk.body.read_u16()?,
                    chunk.body.read_u16()?,
                ],
                flags: chunk.body.read_u16()?,
                smoothing: 0,
            });
        }

        // What remains of the body is subchunks.
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::MSH_MAT_GROUP => {
                    let name = c.body.read_cstring()?;
                    let n = c.body.read_u16()? as usize;
                    let mut faces = Vec::with_capacity(n);
                    for _ in 0..n {
                        faces.push(c.body.read_u16()?);
                    }
                    mesh.face_materials.push((name, faces));
                }
                tags::SMOOTH_GROUP => {
                    // Some exporters write fewer masks than faces; take
                    // what is there and leave the rest at zero.
                    let mut short = false;
                    for face in mesh.faces.iter_mut() {
                        if c.body.remaining() >= 4 {
                            face.smoothing = c.body.read_u32()?;
                        } else {
                            short = true;
                            break;
                        }
                    }
                    if short {
                        warn!("smoothing chunk shorter than face count, padding with zero masks");
                    }
                }
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(())
    }

    fn read_light(&mut self, mut chunk: Chunk<'_>) -> ParseResult<TdsLight> {
        let mut light = TdsLight {
            position: chunk.body.read_vec3f()?,
            ..TdsLight::default()
        };
        let mut have_lin = false;
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            if apply_color_subchunk(&mut c, &mut light.color, &mut have_lin)? {
                continue;
            }
            match c.tag {
                tags::DL_SPOTLIGHT => {
                    light.spot = Some(TdsSpotlight {
                        target: c.body.read_vec3f()?,
                        hotspot: c.body.read_f32()?,
                        falloff: c.body.read_f32()?,
                    });
                }
                tags::DL_OFF => light.off = true,
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(light)
    }

    fn read_kfdata(&mut self, chunk: Chunk<'_>) -> ParseResult<()> {
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::KFHDR => {
                    let revision = c.body.read_u16()?;
                    let _name = c.body.read_cstring()?;
                    let frames = c.body.read_i32()?;
                    let header = self.file.keyframes.get_or_insert_with(KeyframeHeader::default);
                    header.revision = revision;
                    header.frames = frames;
                }
                tags::KFCURTIME => {
                    let current = c.body.read_i32()?;
                    let header = self.file.keyframes.get_or_insert_with(KeyframeHeader::default);
                    header.current_frame = Some(current);
                }
                tags::KFSEG => {} // segment bounds, nothing kept
                tags::AMBIENT_NODE_TAG => self.read_node(TdsNodeKind::Ambient, c)?,
                tags::OBJECT_NODE_TAG => self.read_node(TdsNodeKind::Object, c)?,
                tags::CAMERA_NODE_TAG => self.read_node(TdsNodeKind::Camera, c)?,
                tags::TARGET_NODE_TAG => self.read_node(TdsNodeKind::Target, c)?,
                tags::LIGHT_NODE_TAG => self.read_node(TdsNodeKind::Light, c)?,
                tags::L_TARGET_NODE_TAG => self.read_node(TdsNodeKind::LightTarget, c)?,
                tags::SPOTLIGHT_NODE_TAG => self.read_node(TdsNodeKind::Spotlight, c)?,
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        Ok(())
    }

    fn read_node(&mut self, kind: TdsNodeKind, chunk: Chunk<'_>) -> ParseResult<()> {
        let mut node = TdsNode::new(kind);
        let mut w = chunk.into_walker();
        while let Some(mut c) = w.next_chunk()? {
            match c.tag {
                tags::NODE_ID => node.node_id = Some(c.body.read_u16()?),
                tags::NODE_HDR => {
                    node.name = c.body.read_cstring()?;
                    node.flags = (c.body.read_u16()?, c.body.read_u16()?);
                    node.parent_id = c.body.read_u16()?;
                }
                tags::INSTANCE_NAME => node.instance_name = Some(c.body.read_cstring()?),
                tags::PIVOT => node.pivot = Some(c.body.read_vec3f()?),
                tags::POS_TRACK_TAG => node.position = read_track_vec3(&mut c.body)?,
                tags::ROT_TRACK_TAG => node.rotation = read_track_rotation(&mut c.body)?,
                tags::SCL_TRACK_TAG => node.scale = read_track_vec3(&mut c.body)?,
                tags::BOUNDBOX
                | tags::MORPH_SMOOTH
                | tags::FOV_TRACK_TAG
                | tags::ROLL_TRACK_TAG
                | tags::COL_TRACK_TAG
                | tags::HIDE_TRACK_TAG => {
                    debug!("skipping animation-only chunk {:#06x}", c.tag);
                }
                _ => {
                    self.unknown.note(REGISTRY_NAME, c.tag);
                }
            }
        }
        self.file.nodes.push(node);
        Ok(())
    }
}

fn store_object_body(name: &str, slot: &mut Option<TdsObjectBody>, body: TdsObjectBody) {
    if slot.is_some() {
        warn!("named object '{name}' has more than one body, keeping the first");
    } else {
        *slot = Some(body);
    }
}

fn read_rgb24(body: &mut ByteReader<'_>) -> ParseResult<Vec3> {
    let r = body.read_u8()? as f32;
    let g = body.read_u8()? as f32;
    let b = body.read_u8()? as f32;
    Ok(Vec3::new(r, g, b) / 255.0)
}

fn read_rgbf(body: &mut ByteReader<'_>) -> ParseResult<Vec3> {
    Ok(body.read_vec3f()?)
}

/// Apply one color subchunk if `chunk` is one, honoring the rule that
/// linear variants override plain ones. Returns whether it was consumed.
fn apply_color_subchunk(
    chunk: &mut Chunk<'_>,
    color: &mut Option<Vec3>,
    have_lin: &mut bool,
) -> ParseResult<bool> {
    match chunk.tag {
        tags::LIN_COLOR_24 => {
            *color = Some(read_rgb24(&mut chunk.body)?);
            *have_lin = true;
        }
        tags::LIN_COLOR_F => {
            *color = Some(read_rgbf(&mut chunk.body)?);
            *have_lin = true;
        }
        tags::COLOR_24 => {
            if !*have_lin {
                *color = Some(read_rgb24(&mut chunk.body)?);
            }
        }
        tags::COLOR_F => {
            if !*have_lin {
                *color = Some(read_rgbf(&mut chunk.body)?);
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn read_camera(body: &mut ByteReader<'_>) -> ParseResult<TdsCamera> {
    Ok(TdsCamera {
        position: body.read_vec3f()?,
        target: body.read_vec3f()?,
        roll: body.read_f32()?,
        lens: body.read_f32()?,
    })
}

/// Track header: flags, two reserved words, then the key count.
fn read_track_key_count(body: &mut ByteReader<'_>) -> ParseResult<u32> {
    let _flags = body.read_u16()?;
    let _reserved = (body.read_u32()?, body.read_u32()?);
    Ok(body.read_u32()?)
}

/// Key header: frame number plus optional spline parameters selected by
/// the flag word (tension, continuity, bias, ease to, ease from).
fn read_key_header(body: &mut ByteReader<'_>) -> ParseResult<()> {
    let _frame = body.read_i32()?;
    let flags = body.read_u16()?;
    for bit in 0..5 {
        if flags & (1 << bit) != 0 {
            let _spline = body.read_f32()?;
        }
    }
    Ok(())
}

/// First key of a vector track. Later keys are animation and are left
/// for the enclosing chunk's framing to skip.
fn read_track_vec3(body: &mut ByteReader<'_>) -> ParseResult<Option<Vec3>> {
    if read_track_key_count(body)? == 0 {
        return Ok(None);
    }
    read_key_header(body)?;
    Ok(Some(body.read_vec3f()?))
}

/// First key of a rotation track. The file stores angle-axis with the
/// angle wound clockwise, hence the negation.
fn read_track_rotation(body: &mut ByteReader<'_>) -> ParseResult<Option<Quat>> {
    if read_track_key_count(body)? == 0 {
        return Ok(None);
    }
    read_key_header(body)?;
    let angle = body.read_f32()?;
    let axis = body.read_vec3f()?;
    if axis.length_squared() < 1e-12 {
        return Ok(Some(Quat::IDENTITY));
    }
    Ok(Some(Quat::from_axis_angle(axis.normalize(), -angle)))
}
