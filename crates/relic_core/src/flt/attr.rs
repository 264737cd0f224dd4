//! Texture attribute side files.
//!
//! Each texture palette entry may be accompanied by `<filename>.attr`
//! next to the image, a flat big-endian field sequence describing the
//! sampler state. A missing side file is routine and only logged at
//! debug level. A truncated one keeps defaults from the truncation point
//! on; files written by old tools legitimately end early.

use crate::io::{ByteReader, Endian};
use crate::scene::{MagFilter, MinFilter, TexEnvMode, TextureRef, WrapMode};
use log::debug;
use std::path::Path;

const WRAP_REPEAT: i32 = 0;
const WRAP_CLAMP: i32 = 1;
const WRAP_MIRROR: i32 = 2;

/// Decoded side file contents, raw codes as stored.
#[derive(Debug, Clone)]
pub struct TextureAttributes {
    pub texels_u: i32,
    pub texels_v: i32,
    pub min_filter: i32,
    pub mag_filter: i32,
    /// File-level wrap mode; the per-axis fields fall back to it.
    pub wrap: i32,
    pub wrap_u: i32,
    pub wrap_v: i32,
    pub tex_env: i32,
    pub internal_format: i32,
}

impl Default for TextureAttributes {
    fn default() -> Self {
        Self {
            texels_u: 0,
            texels_v: 0,
            min_filter: -1,
            mag_filter: -1,
            wrap: WRAP_REPEAT,
            // Unset; resolves to the file-level mode.
            wrap_u: -1,
            wrap_v: -1,
            tex_env: 0,
            internal_format: 0,
        }
    }
}

struct FieldReader<'a> {
    reader: ByteReader<'a>,
}

impl FieldReader<'_> {
    /// Overwrite `slot` with the next i32 if the file still has one.
    fn read(&mut self, slot: &mut i32) {
        if let Ok(v) = self.reader.read_i32() {
            *slot = v;
        }
    }

    fn skip(&mut self, n: usize) {
        let n = n.min(self.reader.remaining());
        let _ = self.reader.skip(n);
    }
}

/// Decode a side file. Never fails: whatever was present overrides the
/// defaults, the rest stays.
pub fn parse_attr(bytes: &[u8]) -> TextureAttributes {
    let mut attr = TextureAttributes::default();
    let mut r = FieldReader {
        reader: ByteReader::new(bytes, Endian::Big),
    };

    r.read(&mut attr.texels_u);
    r.read(&mut attr.texels_v);
    r.skip(4 * 5); // real-world directions, up vector, file format
    r.read(&mut attr.min_filter);
    r.read(&mut attr.mag_filter);
    r.read(&mut attr.wrap);
    r.read(&mut attr.wrap_u);
    r.read(&mut attr.wrap_v);
    r.skip(4 * 3); // modify flag, pivot point
    r.read(&mut attr.tex_env);
    r.skip(4); // intensity-as-alpha
    r.skip(4 * 8); // spare
    r.skip(8 * 2); // real-world texel sizes
    r.skip(4 * 2); // origin code, kernel version
    r.read(&mut attr.internal_format);
    attr
}

/// Read and decode `path`; `None` when the file is absent or unreadable.
pub fn load_attr(path: &Path) -> Option<TextureAttributes> {
    match std::fs::read(path) {
        Ok(bytes) => Some(parse_attr(&bytes)),
        Err(e) => {
            debug!("no attribute file at {}: {e}", path.display());
            None
        }
    }
}

fn wrap_mode(code: i32) -> Option<WrapMode> {
    match code {
        WRAP_REPEAT => Some(WrapMode::Repeat),
        WRAP_CLAMP => Some(WrapMode::Clamp),
        WRAP_MIRROR => Some(WrapMode::MirroredRepeat),
        _ => None,
    }
}

impl TextureAttributes {
    /// Whether the stored internal format carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        // Intensity-alpha and the rgba variants.
        matches!(self.internal_format, 1 | 2 | 4 | 6 | 7)
    }

    /// Apply the decoded state to a texture reference.
    pub fn apply_to(&self, texture: &mut TextureRef) {
        let file_wrap = wrap_mode(self.wrap).unwrap_or(WrapMode::Repeat);
        texture.wrap_u = wrap_mode(self.wrap_u).unwrap_or(file_wrap);
        texture.wrap_v = wrap_mode(self.wrap_v).unwrap_or(file_wrap);

        // Legacy minification codes; the gap at 2 and 7 is "obsolete"
        // and "none", both collapsing onto the trilinear default.
        texture.min_filter = match self.min_filter {
            0 => MinFilter::Nearest,
            1 => MinFilter::Linear,
            3 => MinFilter::NearestMipmapNearest,
            4 => MinFilter::NearestMipmapLinear,
            5 | 8..=12 => MinFilter::LinearMipmapNearest,
            _ => MinFilter::LinearMipmapLinear,
        };
        texture.mag_filter = if self.mag_filter == 0 {
            MagFilter::Nearest
        } else {
            MagFilter::Linear
        };
        texture.env_mode = match self.tex_env {
            1 => TexEnvMode::Blend,
            2 => TexEnvMode::Decal,
            3 => TexEnvMode::Replace,
            4 => TexEnvMode::Add,
            _ => TexEnvMode::Modulate,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    fn attr_bytes(fields: &[i32]) -> Vec<u8> {
        let mut out = Vec::new();
        for f in fields {
            out.write_i32::<BigEndian>(*f).unwrap();
        }
        out
    }

    /// Fields 0..13: texels, directions/up/format, filters, wraps.
    fn header_fields(min: i32, mag: i32, wrap: i32, wrap_u: i32, wrap_v: i32) -> Vec<i32> {
        vec![64, 64, 0, 0, 0, 0, 0, min, mag, wrap, wrap_u, wrap_v]
    }

    #[test]
    fn test_full_header_decodes() {
        let bytes = attr_bytes(&header_fields(0, 0, WRAP_CLAMP, -9, WRAP_MIRROR));
        let attr = parse_attr(&bytes);
        assert_eq!(attr.texels_u, 64);
        assert_eq!(attr.min_filter, 0);
        assert_eq!(attr.wrap, WRAP_CLAMP);
        assert_eq!(attr.wrap_v, WRAP_MIRROR);
    }

    #[test]
    fn test_truncated_file_keeps_defaults_from_there_on() {
        // Only the first three fields present.
        let bytes = attr_bytes(&[128, 256, 1]);
        let attr = parse_attr(&bytes);
        assert_eq!(attr.texels_u, 128);
        assert_eq!(attr.texels_v, 256);
        assert_eq!(attr.min_filter, -1);
        assert_eq!(attr.wrap, WRAP_REPEAT);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let attr = parse_attr(&[]);
        let mut tex = TextureRef::new("t.rgb");
        attr.apply_to(&mut tex);
        assert_eq!(tex.wrap_u, WrapMode::Repeat);
        assert_eq!(tex.min_filter, MinFilter::LinearMipmapLinear);
        assert_eq!(tex.mag_filter, MagFilter::Linear);
    }

    #[test]
    fn test_per_axis_wrap_falls_back_to_file_level() {
        let bytes = attr_bytes(&header_fields(1, 1, WRAP_CLAMP, 99, WRAP_REPEAT));
        let attr = parse_attr(&bytes);
        let mut tex = TextureRef::new("t.rgb");
        attr.apply_to(&mut tex);

        // u holds an unknown code and inherits the file-level clamp;
        // v stated repeat explicitly and keeps it.
        assert_eq!(tex.wrap_u, WrapMode::Clamp);
        assert_eq!(tex.wrap_v, WrapMode::Repeat);
    }

    #[test]
    fn test_filter_code_mapping() {
        let mut tex = TextureRef::new("t.rgb");

        let attr = parse_attr(&attr_bytes(&header_fields(0, 0, 0, 0, 0)));
        attr.apply_to(&mut tex);
        assert_eq!(tex.min_filter, MinFilter::Nearest);
        assert_eq!(tex.mag_filter, MagFilter::Nearest);

        let attr = parse_attr(&attr_bytes(&header_fields(4, 1, 0, 0, 0)));
        attr.apply_to(&mut tex);
        assert_eq!(tex.min_filter, MinFilter::NearestMipmapLinear);
        assert_eq!(tex.mag_filter, MagFilter::Linear);

        // The 8..12 block of legacy mipmap variants.
        let attr = parse_attr(&attr_bytes(&header_fields(10, 1, 0, 0, 0)));
        attr.apply_to(&mut tex);
        assert_eq!(tex.min_filter, MinFilter::LinearMipmapNearest);
    }

    #[test]
    fn test_env_mode_mapping() {
        let mut fields = header_fields(1, 1, 0, 0, 0);
        fields.extend([0, 0, 0, 3]); // modify flag, pivot, env = replace
        let attr = parse_attr(&attr_bytes(&fields));
        assert_eq!(attr.tex_env, 3);

        let mut tex = TextureRef::new("t.rgb");
        attr.apply_to(&mut tex);
        assert_eq!(tex.env_mode, TexEnvMode::Replace);
    }
}
