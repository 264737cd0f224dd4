// Packed-color conversion.
//
// Several legacy scene formats store colors as a 32-bit word whose bytes
// are alpha, blue, green, red from most to least significant. Reading the
// word big-endian therefore yields red in the low byte.

use crate::Vec4;

/// Unpack an `a b g r` color word into linear RGBA in `[0, 1]`.
pub fn unpack_abgr(packed: u32) -> Vec4 {
    let r = (packed & 0xff) as f32;
    let g = ((packed >> 8) & 0xff) as f32;
    let b = ((packed >> 16) & 0xff) as f32;
    let a = ((packed >> 24) & 0xff) as f32;
    Vec4::new(r, g, b, a) / 255.0
}

/// Pack RGBA in `[0, 1]` back into an `a b g r` word. Components are
/// clamped, so out-of-range inputs cannot wrap.
pub fn pack_abgr(color: Vec4) -> u32 {
    let c = color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0;
    (c.x as u32) | ((c.y as u32) << 8) | ((c.z as u32) << 16) | ((c.w as u32) << 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_channel_order() {
        // alpha ff, blue 00, green 80, red ff
        let c = unpack_abgr(0xff00_80ff);
        assert!((c.x - 1.0).abs() < 1e-6);
        assert!((c.y - 128.0 / 255.0).abs() < 1e-6);
        assert!((c.z - 0.0).abs() < 1e-6);
        assert!((c.w - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        for packed in [0u32, 0xffff_ffff, 0xff00_80ff, 0x1234_5678] {
            assert_eq!(pack_abgr(unpack_abgr(packed)), packed);
        }
    }

    #[test]
    fn test_pack_clamps() {
        let c = Vec4::new(2.0, -1.0, 0.5, 1.0);
        let packed = pack_abgr(c);
        assert_eq!(packed & 0xff, 255);
        assert_eq!((packed >> 8) & 0xff, 0);
    }
}
