//! Opcode space of the OpenFlight record format.

use crate::registry::{Registry, RegistryBuilder};
use std::sync::OnceLock;

pub const HEADER: u16 = 1;
pub const GROUP: u16 = 2;
pub const OLD_LOD: u16 = 3;
pub const OBJECT: u16 = 4;
pub const FACE: u16 = 5;
pub const PUSH_LEVEL: u16 = 10;
pub const POP_LEVEL: u16 = 11;
pub const DOF: u16 = 14;
pub const PUSH_SUBFACE: u16 = 19;
pub const POP_SUBFACE: u16 = 20;
pub const PUSH_EXTENSION: u16 = 21;
pub const POP_EXTENSION: u16 = 22;
pub const CONTINUATION: u16 = 23;
pub const COMMENT: u16 = 31;
pub const COLOR_PALETTE: u16 = 32;
pub const LONG_ID: u16 = 33;
pub const MATRIX: u16 = 49;
pub const VECTOR: u16 = 50;
pub const MULTITEXTURE: u16 = 52;
pub const UV_LIST: u16 = 53;
pub const REPLICATE: u16 = 60;
pub const INSTANCE_REFERENCE: u16 = 61;
pub const INSTANCE_DEFINITION: u16 = 62;
pub const EXTERNAL_REFERENCE: u16 = 63;
pub const TEXTURE_PALETTE: u16 = 64;
pub const OLD_MATERIAL_PALETTE: u16 = 66;
pub const VERTEX_PALETTE: u16 = 67;
pub const VERTEX_C: u16 = 68;
pub const VERTEX_CN: u16 = 69;
pub const VERTEX_CNT: u16 = 70;
pub const VERTEX_CT: u16 = 71;
pub const VERTEX_LIST: u16 = 72;
pub const LOD: u16 = 73;
pub const BOUNDING_BOX: u16 = 74;
pub const EYEPOINT_PALETTE: u16 = 83;
pub const MESH: u16 = 84;
pub const LOCAL_VERTEX_POOL: u16 = 85;
pub const MESH_PRIMITIVE: u16 = 86;
pub const MORPH_VERTEX_LIST: u16 = 89;
pub const LINKAGE_PALETTE: u16 = 90;
pub const SOUND_PALETTE: u16 = 93;
pub const GENERAL_MATRIX: u16 = 94;
pub const SWITCH: u16 = 96;
pub const LINE_STYLE_PALETTE: u16 = 97;
pub const CLIP_REGION: u16 = 98;
pub const EXTENSION: u16 = 100;
pub const LIGHT_SOURCE: u16 = 101;
pub const LIGHT_SOURCE_PALETTE: u16 = 102;
pub const BOUNDING_SPHERE: u16 = 105;
pub const BOUNDING_CYLINDER: u16 = 106;
pub const BOUNDING_VOLUME_CENTER: u16 = 108;
pub const BOUNDING_VOLUME_ORIENTATION: u16 = 109;
pub const LIGHT_POINT: u16 = 111;
pub const TEXTURE_MAPPING_PALETTE: u16 = 112;
pub const MATERIAL_PALETTE: u16 = 113;
pub const NAME_TABLE: u16 = 114;
pub const LIGHT_POINT_APPEARANCE_PALETTE: u16 = 128;
pub const LIGHT_POINT_ANIMATION_PALETTE: u16 = 129;
pub const INDEXED_LIGHT_POINT: u16 = 130;
pub const LIGHT_POINT_SYSTEM: u16 = 131;
pub const SHADER_PALETTE: u16 = 133;

/// The pop-level record as written by one historical exporter with both
/// header fields byte-swapped.
pub const SWAPPED_POP_LEVEL: u16 = 0x0b00;

/// Handler classes the record scanner dispatches into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Header,
    Group,
    Object,
    Face,
    Mesh,
    LocalVertexPool,
    MeshPrimitive,
    PushLevel,
    PopLevel,
    PushSubface,
    PopSubface,
    PushExtension,
    PopExtension,
    Comment,
    LongId,
    Matrix,
    GeneralMatrix,
    Replicate,
    InstanceReference,
    InstanceDefinition,
    ExternalReference,
    Extension,
    VertexPalette,
    VertexList,
    MorphVertexList,
    ColorPalette,
    MaterialPalette,
    OldMaterialPalette,
    TexturePalette,
    LightSourcePalette,
    LightPointAppearancePalette,
    LightPointAnimationPalette,
    ShaderPalette,
    LightSource,
    LightPoint,
    IndexedLightPoint,
    LightPointSystem,
    Lod,
    OldLod,
    Dof,
    Switch,
    /// Recognized but deliberately not interpreted.
    Ignored,
}

/// The shared dispatch table, built on first use.
pub fn registry() -> &'static Registry<RecordKind> {
    static REGISTRY: OnceLock<Registry<RecordKind>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut b = RegistryBuilder::new("flt");
        b.register(HEADER, RecordKind::Header)
            .register(GROUP, RecordKind::Group)
            .register(OLD_LOD, RecordKind::OldLod)
            .register(OBJECT, RecordKind::Object)
            .register(FACE, RecordKind::Face)
            .register(PUSH_LEVEL, RecordKind::PushLevel)
            .register(POP_LEVEL, RecordKind::PopLevel)
            .register(DOF, RecordKind::Dof)
            .register(PUSH_SUBFACE, RecordKind::PushSubface)
            .register(POP_SUBFACE, RecordKind::PopSubface)
            .register(PUSH_EXTENSION, RecordKind::PushExtension)
            .register(POP_EXTENSION, RecordKind::PopExtension)
            .register(COMMENT, RecordKind::Comment)
            .register(COLOR_PALETTE, RecordKind::ColorPalette)
            .register(LONG_ID, RecordKind::LongId)
            .register(MATRIX, RecordKind::Matrix)
            .register(REPLICATE, RecordKind::Replicate)
            .register(INSTANCE_REFERENCE, RecordKind::InstanceReference)
            .register(INSTANCE_DEFINITION, RecordKind::InstanceDefinition)
            .register(EXTERNAL_REFERENCE, RecordKind::ExternalReference)
            .register(TEXTURE_PALETTE, RecordKind::TexturePalette)
            .register(OLD_MATERIAL_PALETTE, RecordKind::OldMaterialPalette)
            .register(VERTEX_PALETTE, RecordKind::VertexPalette)
            .register(VERTEX_LIST, RecordKind::VertexList)
            .register(LOD, RecordKind::Lod)
            .register(MESH, RecordKind::Mesh)
            .register(LOCAL_VERTEX_POOL, RecordKind::LocalVertexPool)
            .register(MESH_PRIMITIVE, RecordKind::MeshPrimitive)
            .register(MORPH_VERTEX_LIST, RecordKind::MorphVertexList)
            .register(GENERAL_MATRIX, RecordKind::GeneralMatrix)
            .register(SWITCH, RecordKind::Switch)
            .register(EXTENSION, RecordKind::Extension)
            .register(LIGHT_SOURCE, RecordKind::LightSource)
            .register(LIGHT_SOURCE_PALETTE, RecordKind::LightSourcePalette)
            .register(LIGHT_POINT, RecordKind::LightPoint)
            .register(MATERIAL_PALETTE, RecordKind::MaterialPalette)
            .register(
                LIGHT_POINT_APPEARANCE_PALETTE,
                RecordKind::LightPointAppearancePalette,
            )
            .register(
                LIGHT_POINT_ANIMATION_PALETTE,
                RecordKind::LightPointAnimationPalette,
            )
            .register(INDEXED_LIGHT_POINT, RecordKind::IndexedLightPoint)
            .register(LIGHT_POINT_SYSTEM, RecordKind::LightPointSystem)
            .register(SHADER_PALETTE, RecordKind::ShaderPalette);

        // Recognized records with no scene-side meaning here. Registering
        // them keeps the unknown-tag report for genuinely foreign opcodes.
        for tag in [
            VECTOR,
            MULTITEXTURE,
            UV_LIST,
            BOUNDING_BOX,
            EYEPOINT_PALETTE,
            LINKAGE_PALETTE,
            SOUND_PALETTE,
            LINE_STYLE_PALETTE,
            CLIP_REGION,
            BOUNDING_SPHERE,
            BOUNDING_CYLINDER,
            BOUNDING_VOLUME_CENTER,
            BOUNDING_VOLUME_ORIENTATION,
            TEXTURE_MAPPING_PALETTE,
            NAME_TABLE,
        ] {
            b.register(tag, RecordKind::Ignored);
        }
        b.build()
    })
}
