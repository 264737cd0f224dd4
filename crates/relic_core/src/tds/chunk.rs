//! Chunk framing for the 3D Studio container format.
//!
//! A chunk is a little-endian u16 tag followed by a u32 byte length that
//! counts the 6-byte header itself, then the body. Container chunks nest
//! further chunks in their body, usually after a few leading fields.
//!
//! Framing is enforced structurally: a chunk's body is carved out of the
//! parent reader as a bounded sub-reader, so the walk continues at the
//! declared end of a chunk no matter how much of the body its handler
//! consumed, and a nested walk can never leave its container.

use crate::io::{ByteReader, ReadError};
use thiserror::Error;

/// Bytes occupied by the tag and length fields.
pub const HEADER_SIZE: u32 = 6;

/// Chunk tags, named as the 3D Studio tool chain documents them.
pub mod tags {
    pub const M3DMAGIC: u16 = 0x4D4D;
    pub const MLIBMAGIC: u16 = 0x3DAA;
    pub const CMAGIC: u16 = 0xC23D;
    pub const M3D_VERSION: u16 = 0x0002;

    pub const COLOR_F: u16 = 0x0010;
    pub const COLOR_24: u16 = 0x0011;
    pub const LIN_COLOR_24: u16 = 0x0012;
    pub const LIN_COLOR_F: u16 = 0x0013;
    pub const INT_PERCENTAGE: u16 = 0x0030;
    pub const FLOAT_PERCENTAGE: u16 = 0x0031;

    pub const MDATA: u16 = 0x3D3D;
    pub const MESH_VERSION: u16 = 0x3D3E;
    pub const MASTER_SCALE: u16 = 0x0100;
    pub const AMBIENT_LIGHT: u16 = 0x2100;

    pub const NAMED_OBJECT: u16 = 0x4000;
    pub const OBJ_HIDDEN: u16 = 0x4010;
    pub const N_TRI_OBJECT: u16 = 0x4100;
    pub const POINT_ARRAY: u16 = 0x4110;
    pub const FACE_ARRAY: u16 = 0x4120;
    pub const MSH_MAT_GROUP: u16 = 0x4130;
    pub const TEX_VERTS: u16 = 0x4140;
    pub const SMOOTH_GROUP: u16 = 0x4150;
    pub const MESH_MATRIX: u16 = 0x4160;
    pub const MESH_COLOR: u16 = 0x4165;
    pub const N_DIRECT_LIGHT: u16 = 0x4600;
    pub const DL_SPOTLIGHT: u16 = 0x4610;
    pub const DL_OFF: u16 = 0x4620;
    pub const N_CAMERA: u16 = 0x4700;

    pub const MAT_ENTRY: u16 = 0xAFFF;
    pub const MAT_NAME: u16 = 0xA000;
    pub const MAT_AMBIENT: u16 = 0xA010;
    pub const MAT_DIFFUSE: u16 = 0xA020;
    pub const MAT_SPECULAR: u16 = 0xA030;
    pub const MAT_SHININESS: u16 = 0xA040;
    pub const MAT_TRANSPARENCY: u16 = 0xA050;
    pub const MAT_TWO_SIDE: u16 = 0xA081;
    pub const MAT_SELF_ILPCT: u16 = 0xA084;
    pub const MAT_SHADING: u16 = 0xA100;
    pub const MAT_TEXMAP: u16 = 0xA200;
    pub const MAT_MAPNAME: u16 = 0xA300;
    pub const MAT_MAP_TILING: u16 = 0xA351;
    pub const MAT_MAP_USCALE: u16 = 0xA354;
    pub const MAT_MAP_VSCALE: u16 = 0xA356;
    pub const MAT_MAP_UOFFSET: u16 = 0xA358;
    pub const MAT_MAP_VOFFSET: u16 = 0xA35A;
    pub const MAT_MAP_ANG: u16 = 0xA35C;

    pub const KFDATA: u16 = 0xB000;
    pub const AMBIENT_NODE_TAG: u16 = 0xB001;
    pub const OBJECT_NODE_TAG: u16 = 0xB002;
    pub const CAMERA_NODE_TAG: u16 = 0xB003;
    pub const TARGET_NODE_TAG: u16 = 0xB004;
    pub const LIGHT_NODE_TAG: u16 = 0xB005;
    pub const L_TARGET_NODE_TAG: u16 = 0xB006;
    pub const SPOTLIGHT_NODE_TAG: u16 = 0xB007;
    pub const KFSEG: u16 = 0xB008;
    pub const KFCURTIME: u16 = 0xB009;
    pub const KFHDR: u16 = 0xB00A;
    pub const NODE_HDR: u16 = 0xB010;
    pub const INSTANCE_NAME: u16 = 0xB011;
    pub const PIVOT: u16 = 0xB013;
    pub const BOUNDBOX: u16 = 0xB014;
    pub const MORPH_SMOOTH: u16 = 0xB015;
    pub const POS_TRACK_TAG: u16 = 0xB020;
    pub const ROT_TRACK_TAG: u16 = 0xB021;
    pub const SCL_TRACK_TAG: u16 = 0xB022;
    pub const FOV_TRACK_TAG: u16 = 0xB023;
    pub const ROLL_TRACK_TAG: u16 = 0xB024;
    pub const COL_TRACK_TAG: u16 = 0xB025;
    pub const HIDE_TRACK_TAG: u16 = 0xB029;
    pub const NODE_ID: u16 = 0xB030;
}

/// Corruption in the chunk structure itself. Unlike unknown tags or odd
/// field values, these are always fatal to the parse.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("chunk {tag:#06x} declares length {declared} but its container has {available} bytes left")]
    Overrun {
        tag: u16,
        declared: u32,
        available: usize,
    },
    #[error("chunk {tag:#06x} declares length {declared}, smaller than the {HEADER_SIZE} byte header")]
    BadLength { tag: u16, declared: u32 },
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// One decoded chunk: its tag and a reader confined to its body.
pub struct Chunk<'a> {
    pub tag: u16,
    pub body: ByteReader<'a>,
}

impl<'a> Chunk<'a> {
    /// Walk the chunks nested in whatever is left of this body. Container
    /// chunks call this after consuming their leading fields.
    pub fn into_walker(self) -> ChunkWalker<'a> {
        ChunkWalker::new(self.body)
    }
}

/// Sequential reader of sibling chunks within one container.
pub struct ChunkWalker<'a> {
    reader: ByteReader<'a>,
}

impl<'a> ChunkWalker<'a> {
    pub fn new(reader: ByteReader<'a>) -> Self {
        Self { reader }
    }

    /// Next sibling chunk, or `None` when fewer than a header's worth of
    /// bytes remain. Trailing slack smaller than a header is tolerated;
    /// a header whose declared length cannot fit is not.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>, FramingError> {
        if self.reader.remaining() < HEADER_SIZE as usize {
            return Ok(None);
        }
        let tag = self.reader.read_u16()?;
        let declared = self.reader.read_u32()?;
        if declared < HEADER_SIZE {
            return Err(FramingError::BadLength { tag, declared });
        }
        let body_len = (declared - HEADER_SIZE) as usize;
        if body_len > self.reader.remaining() {
            return Err(FramingError::Overrun {
                tag,
                declared,
                available: self.reader.remaining() + HEADER_SIZE as usize,
            });
        }
        let body = self.reader.sub_reader(body_len)?;
        Ok(Some(Chunk { tag, body }))
    }
}
