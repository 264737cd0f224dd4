//! Intermediate representation of a parsed 3D Studio file.
//!
//! The parser fills these types chunk by chunk; scene assembly happens
//! afterwards in the loader, once material names, object names, and
//! keyframe parent ids can all be resolved against the whole file.

use crate::scene::WrapMode;
use relic_math::{Mat4, Quat, Vec2, Vec3};

/// Parent id meaning "top of the hierarchy".
pub const NO_PARENT: u16 = 0xffff;

/// Name given to hierarchy nodes that are pure containers.
pub const DUMMY_OBJECT_NAME: &str = "$$$DUMMY";

/// Everything decoded from one file.
#[derive(Debug, Default)]
pub struct TdsFile {
    /// From the version chunk directly under the top-level magic.
    pub format_version: Option<u32>,
    pub mesh_version: Option<u32>,
    /// Global scale applied to the whole scene. 1.0 when absent.
    pub master_scale: Option<f32>,
    pub ambient: Option<Vec3>,
    pub materials: Vec<TdsMaterial>,
    pub objects: Vec<TdsObject>,
    /// Keyframe hierarchy nodes in file order. Empty when the file has
    /// no keyframe section.
    pub nodes: Vec<TdsNode>,
    pub keyframes: Option<KeyframeHeader>,
}

impl TdsFile {
    pub fn material_by_name(&self, name: &str) -> Option<&TdsMaterial> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn object_by_name(&self, name: &str) -> Option<&TdsObject> {
        self.objects.iter().find(|o| o.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeHeader {
    pub revision: u16,
    pub frames: i32,
    pub current_frame: Option<i32>,
}

#[derive(Debug, Default)]
pub struct TdsMaterial {
    pub name: String,
    pub ambient: Option<Vec3>,
    pub diffuse: Option<Vec3>,
    pub specular: Option<Vec3>,
    /// Fractions in `[0, 1]`, already divided down from percentages.
    pub shininess: Option<f32>,
    pub transparency: Option<f32>,
    pub self_illumination: Option<f32>,
    pub two_sided: bool,
    pub shading: Option<i16>,
    pub texture: Option<TdsTextureMap>,
}

/// Flag bits of the texture tiling word.
const TILING_MIRROR: u16 = 0x0002;
const TILING_NO_TILE: u16 = 0x0010;

#[derive(Debug, Clone)]
pub struct TdsTextureMap {
    pub name: String,
    pub percent: f32,
    pub tiling: u16,
    pub scale: Vec2,
    pub offset: Vec2,
    pub rotation: f32,
}

impl Default for TdsTextureMap {
    fn default() -> Self {
        Self {
            name: String::new(),
            percent: 1.0,
            tiling: 0,
            scale: Vec2::ONE,
            offset: Vec2::ZERO,
            rotation: 0.0,
        }
    }
}

impl TdsTextureMap {
    /// Wrap mode implied by the tiling flags, same on both axes.
    pub fn wrap_mode(&self) -> WrapMode {
        if self.tiling & TILING_NO_TILE != 0 {
            WrapMode::Clamp
        } else if self.tiling & TILING_MIRROR != 0 {
            WrapMode::MirroredRepeat
        } else {
            WrapMode::Repeat
        }
    }
}

#[derive(Debug)]
pub struct TdsObject {
    pub name: String,
    pub hidden: bool,
    pub body: TdsObjectBody,
}

#[derive(Debug)]
pub enum TdsObjectBody {
    Mesh(TdsMesh),
    Camera(TdsCamera),
    Light(TdsLight),
}

#[derive(Debug, Clone, Copy)]
pub struct TdsFace {
    pub indices: [u16; 3],
    pub flags: u16,
    /// Bitmask from the smoothing chunk; 0 when the mesh has none.
    pub smoothing: u32,
}

#[derive(Debug, Default)]
pub struct TdsMesh {
    pub points: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub faces: Vec<TdsFace>,
    /// Material name to face-index list; faces in no group render with
    /// the default material.
    pub face_materials: Vec<(String, Vec<u16>)>,
    /// Local placement the points were exported through. Points in the
    /// file are already in world space.
    pub matrix: Option<Mat4>,
    pub color_index: Option<u8>,
}

impl TdsMesh {
    /// Face indices not claimed by any material group.
    pub fn unassigned_faces(&self) -> Vec<u16> {
        let mut claimed = vec![false; self.faces.len()];
        for (_, faces) in &self.face_materials {
            for &f in faces {
                if let Some(slot) = claimed.get_mut(f as usize) {
                    *slot = true;
                }
            }
        }
        claimed
            .iter()
            .enumerate()
            .filter(|(_, c)| !**c)
            .map(|(i, _)| i as u16)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TdsCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub roll: f32,
    pub lens: f32,
}

#[derive(Debug, Clone, Default)]
pub struct TdsLight {
    pub position: Vec3,
    pub color: Option<Vec3>,
    pub off: bool,
    pub spot: Option<TdsSpotlight>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TdsSpotlight {
    pub target: Vec3,
    pub hotspot: f32,
    pub falloff: f32,
}

/// Which hierarchy chunk a node came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdsNodeKind {
    Ambient,
    Object,
    Camera,
    Target,
    Light,
    LightTarget,
    Spotlight,
}

/// One keyframe hierarchy node with its first-frame transform.
///
/// Tracks are decoded to their frame-0 key only; the scene built here is
/// the static pose.
#[derive(Debug, Clone)]
pub struct TdsNode {
    pub kind: TdsNodeKind,
    pub node_id: Option<u16>,
    pub name: String,
    pub parent_id: u16,
    pub flags: (u16, u16),
    pub instance_name: Option<String>,
    pub pivot: Option<Vec3>,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
}

impl TdsNode {
    pub fn new(kind: TdsNodeKind) -> Self {
        Self {
            kind,
            node_id: None,
            name: String::new(),
            parent_id: NO_PARENT,
            flags: (0, 0),
            instance_name: None,
            pivot: None,
            position: None,
            rotation: None,
            scale: None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.name == DUMMY_OBJECT_NAME
    }

    /// Display name: dummies are named by their instance string.
    pub fn display_name(&self) -> &str {
        if self.is_dummy() {
            self.instance_name.as_deref().unwrap_or(&self.name)
        } else {
            &self.name
        }
    }

    /// Frame-0 local matrix, translation * rotation * scale.
    pub fn local_matrix(&self) -> Mat4 {
        let t = self.position.unwrap_or(Vec3::ZERO);
        let r = self.rotation.unwrap_or(Quat::IDENTITY);
        let s = self.scale.unwrap_or(Vec3::ONE);
        Mat4::from_scale_rotation_translation(s, r, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_faces() {
        let mesh = TdsMesh {
            faces: vec![
                TdsFace {
                    indices: [0, 1, 2],
                    flags: 0,
                    smoothing: 0,
                };
                4
            ],
            face_materials: vec![("red".into(), vec![0, 2])],
            ..TdsMesh::default()
        };

        assert_eq!(mesh.unassigned_faces(), vec![1, 3]);
    }

    #[test]
    fn test_texture_wrap_from_tiling() {
        let mut map = TdsTextureMap::default();
        assert_eq!(map.wrap_mode(), WrapMode::Repeat);

        map.tiling = TILING_MIRROR;
        assert_eq!(map.wrap_mode(), WrapMode::MirroredRepeat);

        map.tiling = TILING_NO_TILE | TILING_MIRROR;
        assert_eq!(map.wrap_mode(), WrapMode::Clamp);
    }

    #[test]
    fn test_node_display_name_for_dummies() {
        let mut node = TdsNode::new(TdsNodeKind::Object);
        node.name = DUMMY_OBJECT_NAME.into();
        node.instance_name = Some("wheel_group".into());

        assert!(node.is_dummy());
        assert_eq!(node.display_name(), "wheel_group");
    }

    #[test]
    fn test_local_matrix_composition() {
        let mut node = TdsNode::new(TdsNodeKind::Object);
        node.position = Some(Vec3::new(1.0, 2.0, 3.0));
        node.scale = Some(Vec3::splat(2.0));

        let m = node.local_matrix();
        // Scale applies before translation.
        let p = m.transform_point3(Vec3::ONE);
        assert!((p - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-5);
    }
}
