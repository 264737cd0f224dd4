//! Format detection and the single-call file entry point.

use crate::flt;
use crate::options::ParseOptions;
use crate::scene::SceneGraph;
use crate::tds;
use log::debug;
use std::path::Path;
use thiserror::Error;

/// The formats the engine decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    /// 3D Studio chunk files: `.3ds`, `.prj`, `.mli`.
    Tds,
    /// OpenFlight record files: `.flt`.
    Flt,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tds(#[from] tds::LoadError),
    #[error(transparent)]
    Flt(#[from] flt::LoadError),
    #[error("unrecognized scene format")]
    Unrecognized,
}

/// Decide the format from the file extension, falling back to the magic
/// bytes when the extension says nothing.
pub fn detect_format(path: &Path, bytes: &[u8]) -> Option<SceneFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("3ds" | "prj" | "mli") => return Some(SceneFormat::Tds),
        Some("flt") => return Some(SceneFormat::Flt),
        _ => {}
    }
    sniff_format(bytes)
}

/// Magic sniff alone: the 3ds top-level chunk tags are little-endian,
/// the OpenFlight header opcode is big-endian 1.
pub fn sniff_format(bytes: &[u8]) -> Option<SceneFormat> {
    let word = bytes.get(..2)?;
    match u16::from_le_bytes([word[0], word[1]]) {
        tds::chunk::tags::M3DMAGIC | tds::chunk::tags::MLIBMAGIC | tds::chunk::tags::CMAGIC => {
            return Some(SceneFormat::Tds)
        }
        _ => {}
    }
    if u16::from_be_bytes([word[0], word[1]]) == flt::opcodes::HEADER {
        return Some(SceneFormat::Flt);
    }
    None
}

/// Load a scene file of either format.
pub fn load_scene_file(path: &Path, options: &ParseOptions) -> Result<SceneGraph, FormatError> {
    let bytes = std::fs::read(path)?;
    let format = detect_format(path, &bytes).ok_or(FormatError::Unrecognized)?;
    debug!("detected {:?} for {}", format, path.display());
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scene");
    match format {
        SceneFormat::Tds => Ok(tds::load_tds_bytes(&bytes, name, options)?),
        SceneFormat::Flt => Ok(flt::load_flt_bytes_from(
            &bytes,
            name,
            path.parent(),
            options,
        )?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins_over_content() {
        assert_eq!(
            detect_format(Path::new("model.3DS"), &[]),
            Some(SceneFormat::Tds)
        );
        assert_eq!(
            detect_format(Path::new("terrain.flt"), &[]),
            Some(SceneFormat::Flt)
        );
    }

    #[test]
    fn test_magic_sniff() {
        // Little-endian 0x4d4d.
        assert_eq!(sniff_format(&[0x4d, 0x4d, 0, 0]), Some(SceneFormat::Tds));
        // Big-endian opcode 1.
        assert_eq!(sniff_format(&[0x00, 0x01, 0x00, 0x08]), Some(SceneFormat::Flt));
        assert_eq!(sniff_format(&[0xde, 0xad]), None);
        assert_eq!(sniff_format(&[]), None);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_sniff() {
        assert_eq!(
            detect_format(Path::new("backup.dat"), &[0xaa, 0x3d]),
            Some(SceneFormat::Tds)
        );
        assert_eq!(detect_format(Path::new("backup.dat"), &[1, 2]), None);
    }
}
