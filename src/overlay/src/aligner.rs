//! aligner: how producers padded the surfaces they hand to the pipes.
//!
//! GPU-rendered buffers are laid out with a stride wider than the visible width. Pipes must be
//! programmed with the padded size and then crop the padding back out, so the scheduler asks a
//! `SurfaceAligner` for the padded size. Platforms that know their GPU's rules inject their own
//! implementation at startup; everything else uses `NoopAligner`.

use crate::formats::PixelFormat;

pub trait SurfaceAligner: Send + Sync {
    /// Returns the padded width and height of a `width` x `height` surface of `format`.
    fn aligned_dimensions(&self, width: u32, height: u32, format: PixelFormat) -> (u32, u32);
}

/// Reports every surface as unpadded.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopAligner;

impl SurfaceAligner for NoopAligner {
    fn aligned_dimensions(&self, width: u32, height: u32, _format: PixelFormat) -> (u32, u32) {
        (width, height)
    }
}

/// Pads RGB surfaces to fixed power-of-two pixel granularities. YUV surfaces come from video
/// producers that already size their buffers and are left alone.
#[derive(Copy, Clone, Debug)]
pub struct StrideAligner {
    width_align: u32,
    height_align: u32,
}

impl StrideAligner {
    /// Alignments that are not powers of two are rounded up to the next one.
    pub fn new(width_align: u32, height_align: u32) -> StrideAligner {
        StrideAligner {
            width_align: width_align.max(1).next_power_of_two(),
            height_align: height_align.max(1).next_power_of_two(),
        }
    }
}

impl SurfaceAligner for StrideAligner {
    fn aligned_dimensions(&self, width: u32, height: u32, format: PixelFormat) -> (u32, u32) {
        if format.is_yuv() {
            return (width, height);
        }
        let align = |v: u32, a: u32| v.checked_add(a - 1).map_or(v, |v| v & !(a - 1));
        (
            align(width, self.width_align),
            align(height, self.height_align),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_keeps_dimensions() {
        assert_eq!(
            NoopAligner.aligned_dimensions(1366, 768, PixelFormat::Rgba8888),
            (1366, 768)
        );
    }

    #[test]
    fn stride_pads_rgb_only() {
        let aligner = StrideAligner::new(32, 1);
        assert_eq!(
            aligner.aligned_dimensions(1366, 768, PixelFormat::Rgba8888),
            (1376, 768)
        );
        assert_eq!(
            aligner.aligned_dimensions(1366, 768, PixelFormat::YCbCr420SemiPlanar),
            (1366, 768)
        );
        let odd = StrideAligner::new(24, 3);
        assert_eq!(
            odd.aligned_dimensions(100, 30, PixelFormat::Rgb565),
            (128, 32)
        );
    }
}
