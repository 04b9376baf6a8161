//! formats: pixel formats understood by the overlay pipes, stereoscopic packing flags, and the
//! tile alignment rules the pipes impose on macro-tiled sources.

use std::convert::TryFrom;
use std::fmt;

use crate::checked_arithmetic;
use crate::overlay_utils::*;

/// Width of one macro tile in pixels.
pub const TILE_WIDTH: u32 = 64;
/// Height of one macro tile in lines.
pub const TILE_HEIGHT: u32 = 32;

/// Formats are numbered like the gralloc HAL numbers them, so buffer handles can carry the raw
/// code unchanged.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgba8888 = 0x1,
    Rgbx8888 = 0x2,
    Rgb888 = 0x3,
    Rgb565 = 0x4,
    Bgra8888 = 0x5,
    YCbCr422SemiPlanar = 0x10,
    YCrCb420SemiPlanar = 0x11,
    YCbCr420SemiPlanar = 0x109,
    YCbCr420SemiPlanarUbwc = 0x10a,
    Rgba8888Ubwc = 0x10b,
    YCbCr420SemiPlanarTiled = 0x7fa3_0c03,
    Yv12 = 0x3231_5659,
}

impl PixelFormat {
    fn from_code(value: u32) -> Option<PixelFormat> {
        Some(match value {
            0x1 => PixelFormat::Rgba8888,
            0x2 => PixelFormat::Rgbx8888,
            0x3 => PixelFormat::Rgb888,
            0x4 => PixelFormat::Rgb565,
            0x5 => PixelFormat::Bgra8888,
            0x10 => PixelFormat::YCbCr422SemiPlanar,
            0x11 => PixelFormat::YCrCb420SemiPlanar,
            0x109 => PixelFormat::YCbCr420SemiPlanar,
            0x10a => PixelFormat::YCbCr420SemiPlanarUbwc,
            0x10b => PixelFormat::Rgba8888Ubwc,
            0x7fa3_0c03 => PixelFormat::YCbCr420SemiPlanarTiled,
            0x3231_5659 => PixelFormat::Yv12,
            _ => return None,
        })
    }
}

impl TryFrom<u32> for PixelFormat {
    type Error = OverlayError;

    fn try_from(value: u32) -> OverlayResult<Self> {
        // Vendor codes overlap the stereoscopic bits, so only strip them when the raw code is
        // not already a format of its own.
        PixelFormat::from_code(value)
            .or_else(|| PixelFormat::from_code(value & !Format3D::all().bits()))
            .ok_or(OverlayError::InvalidFormat(value))
    }
}

// MDP source format codes, matching the enum order of the msm_mdp uapi header.
pub const MDP_RGB_565: u32 = 0;
pub const MDP_Y_CBCR_H2V2: u32 = 2;
pub const MDP_RGB_888: u32 = 4;
pub const MDP_Y_CRCB_H2V2: u32 = 5;
pub const MDP_RGBA_8888: u32 = 8;
pub const MDP_BGRA_8888: u32 = 9;
pub const MDP_RGBX_8888: u32 = 10;
pub const MDP_Y_CBCR_H2V2_TILE: u32 = 12;
pub const MDP_Y_CBCR_H2V1: u32 = 15;
pub const MDP_Y_CR_CB_GH2V2: u32 = 20;
pub const MDP_Y_CBCR_H2V2_UBWC: u32 = 36;
pub const MDP_RGBA_8888_UBWC: u32 = 37;

impl PixelFormat {
    pub fn is_yuv(self) -> bool {
        !matches!(
            self,
            PixelFormat::Rgba8888
                | PixelFormat::Rgbx8888
                | PixelFormat::Rgb888
                | PixelFormat::Rgb565
                | PixelFormat::Bgra8888
                | PixelFormat::Rgba8888Ubwc
        )
    }

    pub fn is_tiled(self) -> bool {
        self == PixelFormat::YCbCr420SemiPlanarTiled
    }

    pub fn is_ubwc(self) -> bool {
        matches!(
            self,
            PixelFormat::YCbCr420SemiPlanarUbwc | PixelFormat::Rgba8888Ubwc
        )
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 | PixelFormat::Rgba8888Ubwc
        )
    }

    /// The MDP source format programmed into a pipe for this pixel format.
    pub fn mdp_format(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 => MDP_RGBA_8888,
            PixelFormat::Rgbx8888 => MDP_RGBX_8888,
            PixelFormat::Rgb888 => MDP_RGB_888,
            PixelFormat::Rgb565 => MDP_RGB_565,
            PixelFormat::Bgra8888 => MDP_BGRA_8888,
            PixelFormat::YCbCr422SemiPlanar => MDP_Y_CBCR_H2V1,
            PixelFormat::YCrCb420SemiPlanar => MDP_Y_CRCB_H2V2,
            PixelFormat::YCbCr420SemiPlanar => MDP_Y_CBCR_H2V2,
            PixelFormat::YCbCr420SemiPlanarUbwc => MDP_Y_CBCR_H2V2_UBWC,
            PixelFormat::Rgba8888Ubwc => MDP_RGBA_8888_UBWC,
            PixelFormat::YCbCr420SemiPlanarTiled => MDP_Y_CBCR_H2V2_TILE,
            PixelFormat::Yv12 => MDP_Y_CR_CB_GH2V2,
        }
    }

    /// Inverse of `mdp_format`.
    pub fn from_mdp_format(code: u32) -> Option<PixelFormat> {
        Some(match code {
            MDP_RGBA_8888 => PixelFormat::Rgba8888,
            MDP_RGBX_8888 => PixelFormat::Rgbx8888,
            MDP_RGB_888 => PixelFormat::Rgb888,
            MDP_RGB_565 => PixelFormat::Rgb565,
            MDP_BGRA_8888 => PixelFormat::Bgra8888,
            MDP_Y_CBCR_H2V1 => PixelFormat::YCbCr422SemiPlanar,
            MDP_Y_CRCB_H2V2 => PixelFormat::YCrCb420SemiPlanar,
            MDP_Y_CBCR_H2V2 => PixelFormat::YCbCr420SemiPlanar,
            MDP_Y_CBCR_H2V2_UBWC => PixelFormat::YCbCr420SemiPlanarUbwc,
            MDP_RGBA_8888_UBWC => PixelFormat::Rgba8888Ubwc,
            MDP_Y_CBCR_H2V2_TILE => PixelFormat::YCbCr420SemiPlanarTiled,
            MDP_Y_CR_CB_GH2V2 => PixelFormat::Yv12,
            _ => return None,
        })
    }

    /// The format the rotator emits when it consumes this format. The rotator always writes
    /// linear output, so tiled and compressed inputs come back as their linear counterpart.
    pub fn rotator_output(self) -> PixelFormat {
        match self {
            PixelFormat::YCbCr420SemiPlanarTiled | PixelFormat::YCbCr420SemiPlanarUbwc => {
                PixelFormat::YCbCr420SemiPlanar
            }
            PixelFormat::Rgba8888Ubwc => PixelFormat::Rgba8888,
            other => other,
        }
    }

    /// Bits used per pixel across all planes.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8888
            | PixelFormat::Rgbx8888
            | PixelFormat::Bgra8888
            | PixelFormat::Rgba8888Ubwc => 32,
            PixelFormat::Rgb888 => 24,
            PixelFormat::Rgb565 | PixelFormat::YCbCr422SemiPlanar => 16,
            PixelFormat::YCrCb420SemiPlanar
            | PixelFormat::YCbCr420SemiPlanar
            | PixelFormat::YCbCr420SemiPlanarUbwc
            | PixelFormat::YCbCr420SemiPlanarTiled
            | PixelFormat::Yv12 => 12,
        }
    }

    /// Block size a source of this format must be padded to, if any.
    pub fn tile_dimensions(self) -> Option<(u32, u32)> {
        if self.is_tiled() || self.is_ubwc() {
            Some((TILE_WIDTH, TILE_HEIGHT))
        } else {
            None
        }
    }

    /// Source dimensions as the pipe must see them: tiled formats are padded up to whole tiles,
    /// every other format is returned unchanged.
    pub fn aligned_dimensions(self, width: u32, height: u32) -> OverlayResult<(u32, u32)> {
        match self.tile_dimensions() {
            Some((tile_w, tile_h)) => {
                let pad_w = tile_w - 1;
                let pad_h = tile_h - 1;
                let w = checked_arithmetic!(width + pad_w)? & !pad_w;
                let h = checked_arithmetic!(height + pad_h)? & !pad_h;
                Ok((w, h))
            }
            None => Ok((width, height)),
        }
    }

    /// Bytes occupied by one frame of `width` x `height` in this format, including tile padding.
    pub fn frame_size(self, width: u32, height: u32) -> OverlayResult<usize> {
        let (w, h) = self.aligned_dimensions(width, height)?;
        let bpp = self.bits_per_pixel();
        let pixels = checked_arithmetic!(w * h)?;
        let bits = checked_arithmetic!(pixels * bpp)?;
        Ok((bits / 8) as usize)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({:#x})", self, *self as u32)
    }
}

bitflags! {
    /// Stereoscopic packing carried in the upper bits of a raw buffer format.
    pub struct Format3D: u32 {
        const IN_SIDE_BY_SIDE_L_R = 0x0001_0000;
        const IN_SIDE_BY_SIDE_R_L = 0x0002_0000;
        const IN_TOP_BOTTOM = 0x0004_0000;
        const OUT_SIDE_BY_SIDE = 0x0000_1000;
        const OUT_TOP_BOTTOM = 0x0000_2000;
        const OUT_INTERLEAVE = 0x0000_4000;
        const OUT_MONOSCOPIC = 0x0000_8000;
        const IN_MASK = Self::IN_SIDE_BY_SIDE_L_R.bits
            | Self::IN_SIDE_BY_SIDE_R_L.bits
            | Self::IN_TOP_BOTTOM.bits;
        const OUT_MASK = Self::OUT_SIDE_BY_SIDE.bits
            | Self::OUT_TOP_BOTTOM.bits
            | Self::OUT_INTERLEAVE.bits
            | Self::OUT_MONOSCOPIC.bits;
    }
}

/// Which half of a packed stereoscopic frame a pipe should sample.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Eye {
    Left,
    Right,
}

impl Format3D {
    /// Extracts the stereoscopic bits from a raw buffer format code.
    pub fn from_raw_format(raw: u32) -> Format3D {
        if PixelFormat::from_code(raw).is_some() {
            return Format3D::empty();
        }
        Format3D::from_bits_truncate(raw)
    }

    pub fn input(self) -> Format3D {
        self & Format3D::IN_MASK
    }

    pub fn output(self) -> Format3D {
        self & Format3D::OUT_MASK
    }

    pub fn is_3d(self) -> bool {
        !self.input().is_empty()
    }

    pub fn is_side_by_side(self) -> bool {
        self.intersects(Format3D::IN_SIDE_BY_SIDE_L_R | Format3D::IN_SIDE_BY_SIDE_R_L)
    }

    /// The region of a `width` x `height` frame holding the given eye. Monoscopic content
    /// returns the full frame.
    pub fn eye_region(self, eye: Eye, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let input = self.input();
        if input.contains(Format3D::IN_TOP_BOTTOM) {
            let half = height / 2;
            match eye {
                Eye::Left => (0, 0, width, half),
                Eye::Right => (0, half, width, half),
            }
        } else if input.is_side_by_side() {
            let half = width / 2;
            let left_first = input.contains(Format3D::IN_SIDE_BY_SIDE_L_R);
            match (eye, left_first) {
                (Eye::Left, true) | (Eye::Right, false) => (0, 0, half, height),
                (Eye::Left, false) | (Eye::Right, true) => (half, 0, half, height),
            }
        } else {
            (0, 0, width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes() {
        assert_eq!(
            PixelFormat::try_from(0x109).unwrap(),
            PixelFormat::YCbCr420SemiPlanar
        );
        assert_eq!(
            PixelFormat::try_from(0x109 | Format3D::IN_SIDE_BY_SIDE_L_R.bits()).unwrap(),
            PixelFormat::YCbCr420SemiPlanar
        );
        assert_eq!(
            PixelFormat::try_from(0x3231_5659).unwrap(),
            PixelFormat::Yv12
        );
        assert!(Format3D::from_raw_format(0x3231_5659).is_empty());
        assert!(PixelFormat::try_from(0x42).is_err());
    }

    #[test]
    fn classification() {
        assert!(PixelFormat::YCbCr420SemiPlanar.is_yuv());
        assert!(PixelFormat::Yv12.is_yuv());
        assert!(!PixelFormat::Rgba8888.is_yuv());
        assert!(!PixelFormat::Rgba8888Ubwc.is_yuv());
        assert!(PixelFormat::Rgba8888Ubwc.is_ubwc());
        assert!(PixelFormat::YCbCr420SemiPlanarTiled.is_tiled());
        assert!(PixelFormat::Bgra8888.has_alpha());
        assert!(!PixelFormat::Rgbx8888.has_alpha());
    }

    #[test]
    fn tile_alignment_never_shrinks() {
        let fmt = PixelFormat::YCbCr420SemiPlanarTiled;
        for &(w, h) in &[(1, 1), (63, 31), (64, 32), (65, 33), (1280, 720), (1920, 1080)] {
            let (aw, ah) = fmt.aligned_dimensions(w, h).unwrap();
            assert!(aw >= w && ah >= h);
            assert_eq!(aw % TILE_WIDTH, 0);
            assert_eq!(ah % TILE_HEIGHT, 0);
            assert!(aw - w < TILE_WIDTH && ah - h < TILE_HEIGHT);
        }
        assert_eq!(fmt.aligned_dimensions(1920, 1080).unwrap(), (1920, 1088));
        assert_eq!(
            PixelFormat::YCbCr420SemiPlanar
                .aligned_dimensions(1920, 1080)
                .unwrap(),
            (1920, 1080)
        );
        assert!(fmt.aligned_dimensions(u32::MAX, 8).is_err());
    }

    #[test]
    fn frame_sizes() {
        assert_eq!(
            PixelFormat::YCbCr420SemiPlanar.frame_size(1280, 720).unwrap(),
            1280 * 720 * 3 / 2
        );
        assert_eq!(
            PixelFormat::Rgba8888.frame_size(1920, 1080).unwrap(),
            1920 * 1080 * 4
        );
        assert_eq!(
            PixelFormat::YCbCr420SemiPlanarTiled
                .frame_size(1920, 1080)
                .unwrap(),
            1920 * 1088 * 3 / 2
        );
    }

    #[test]
    fn mdp_codes_round_trip() {
        for fmt in [
            PixelFormat::Rgba8888,
            PixelFormat::Rgb565,
            PixelFormat::YCbCr420SemiPlanar,
            PixelFormat::YCbCr420SemiPlanarTiled,
            PixelFormat::Yv12,
        ] {
            assert_eq!(PixelFormat::from_mdp_format(fmt.mdp_format()), Some(fmt));
        }
        assert_eq!(PixelFormat::from_mdp_format(99), None);
    }

    #[test]
    fn rotator_untiles() {
        assert_eq!(
            PixelFormat::YCbCr420SemiPlanarTiled.rotator_output(),
            PixelFormat::YCbCr420SemiPlanar
        );
        assert_eq!(PixelFormat::Rgb565.rotator_output(), PixelFormat::Rgb565);
    }

    #[test]
    fn stereo_regions() {
        let sbs = Format3D::from_raw_format(0x109 | 0x0001_0000 | 0x0000_1000);
        assert!(sbs.is_3d());
        assert_eq!(sbs.output(), Format3D::OUT_SIDE_BY_SIDE);
        assert_eq!(sbs.eye_region(Eye::Left, 1920, 1080), (0, 0, 960, 1080));
        assert_eq!(sbs.eye_region(Eye::Right, 1920, 1080), (960, 0, 960, 1080));

        let rl = Format3D::IN_SIDE_BY_SIDE_R_L;
        assert_eq!(rl.eye_region(Eye::Left, 1920, 1080), (960, 0, 960, 1080));

        let tb = Format3D::IN_TOP_BOTTOM;
        assert_eq!(tb.eye_region(Eye::Right, 1920, 1080), (0, 540, 1920, 540));

        let mono = Format3D::empty();
        assert!(!mono.is_3d());
        assert_eq!(mono.eye_region(Eye::Right, 640, 480), (0, 0, 640, 480));
    }
}
