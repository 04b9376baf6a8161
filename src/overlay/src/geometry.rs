//! geometry: the rectangle vocabulary of the scheduler and the `PipeGeometry` value that
//! describes one pipe's configuration independently of the kernel structure layout.

use std::fmt;

use crate::formats::Format3D;
use crate::formats::PixelFormat;
use crate::zorder::ZOrder;

/// The largest magnification or minification a pipe can apply along one axis.
pub const MAX_SCALE_FACTOR: u32 = 8;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Rect {
        Rect { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Whether this rectangle lies entirely inside a `width` x `height` area anchored at 0,0.
    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        match (self.x.checked_add(self.w), self.y.checked_add(self.h)) {
            (Some(r), Some(b)) => r <= width && b <= height,
            _ => false,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{},{} {}x{}]", self.x, self.y, self.w, self.h)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Dimension {
        Dimension { width, height }
    }

    pub fn swapped(self) -> Dimension {
        Dimension::new(self.height, self.width)
    }
}

bitflags! {
    /// Transform applied to a source on its way to the display, in the HAL encoding.
    #[derive(Default)]
    pub struct Transform: u32 {
        const FLIP_H = 0x01;
        const FLIP_V = 0x02;
        const ROT_90 = 0x04;
        const ROT_180 = Self::FLIP_H.bits | Self::FLIP_V.bits;
        const ROT_270 = Self::ROT_180.bits | Self::ROT_90.bits;
    }
}

/// Clockwise quarter turns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rotation {
    None,
    Rot90,
    Rot180,
    Rot270,
}

impl Rotation {
    pub fn quarter_turns(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rot90 => 1,
            Rotation::Rot180 => 2,
            Rotation::Rot270 => 3,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Rot90 | Rotation::Rot270)
    }
}

impl Transform {
    /// The rotation part of the transform. A lone horizontal or vertical flip counts as no
    /// rotation.
    pub fn rotation(self) -> Rotation {
        if self.contains(Transform::ROT_270) {
            Rotation::Rot270
        } else if self.contains(Transform::ROT_90) {
            Rotation::Rot90
        } else if self.contains(Transform::ROT_180) {
            Rotation::Rot180
        } else {
            Rotation::None
        }
    }
}

bitflags! {
    /// Per-pipe configuration flags.
    #[derive(Default)]
    pub struct PipeFlags: u32 {
        /// Content is protected and must only be scanned out through a secure session.
        const SECURE = 0x0001;
        /// Source is field-interleaved.
        const INTERLACED = 0x0002;
        /// Pipe is opaque and may skip blending with the stage below.
        const FG = 0x0004;
        /// Deinterlace in the pipe backend rather than by cropping fields.
        const BACKEND_DEINTERLACE = 0x0008;
        const SHARPENING = 0x0010;
        /// Do not attach a rotator; transforms are ignored.
        const NO_ROT = 0x0020;
        /// Pipe mirrors primary content onto another mixer.
        const MIRROR = 0x0040;
        /// Source is the rotator's output, already in the rotated frame. The transform only
        /// describes how the crop was carried there.
        const PREROTATED = 0x0080;
    }
}

/// Lane type of a hardware pipe.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PipeType {
    /// UI only: RGB formats, no scaling of YUV.
    Rgb,
    /// Video capable: YUV, scaling and post processing.
    Vg,
    /// Low latency lane without scaling.
    Dma,
}

impl PipeType {
    /// The lane a source of `format` needs.
    pub fn for_format(format: PixelFormat) -> PipeType {
        if format.is_yuv() {
            PipeType::Vg
        } else {
            PipeType::Rgb
        }
    }
}

/// Source buffer description handed to a pipe.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SourceBuffer {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub format_3d: Format3D,
    pub size: usize,
}

/// Everything a pipe is configured with, before translation to the kernel structure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PipeGeometry {
    /// Source dimensions after tile padding.
    pub src: Dimension,
    pub format: PixelFormat,
    /// Crop in the rotated frame of `src`.
    pub crop: Rect,
    pub dst: Rect,
    pub transform: Transform,
    pub z_order: ZOrder,
    pub flags: PipeFlags,
    pub pipe_type: PipeType,
}

impl PipeGeometry {
    pub fn new(src: Dimension, format: PixelFormat) -> PipeGeometry {
        PipeGeometry {
            src,
            format,
            crop: Rect::new(0, 0, src.width, src.height),
            dst: Rect::default(),
            transform: Transform::empty(),
            z_order: 0,
            flags: PipeFlags::empty(),
            pipe_type: PipeType::for_format(format),
        }
    }

    /// `src` as seen after the current rotation.
    pub fn rotated_src(&self) -> Dimension {
        if !self.flags.contains(PipeFlags::PREROTATED) && self.transform.rotation().swaps_axes() {
            self.src.swapped()
        } else {
            self.src
        }
    }

    /// Whether scaling `crop` to `dst` stays within `MAX_SCALE_FACTOR` on both axes.
    pub fn scale_in_range(crop: &Rect, dst: &Rect) -> bool {
        let within = |s: u32, d: u32| {
            let (s, d) = (s as u64, d as u64);
            d <= s * MAX_SCALE_FACTOR as u64 && s <= d * MAX_SCALE_FACTOR as u64
        };
        within(crop.w, dst.w) && within(crop.h, dst.h)
    }
}

/// Turns `rect`, expressed inside a `frame`, one quarter turn. Returns the new rectangle and
/// the frame it now lives in.
fn quarter_turn(rect: Rect, frame: Dimension) -> (Rect, Dimension) {
    let turned = Rect {
        x: rect.y,
        y: frame.width.saturating_sub(rect.x + rect.w),
        w: rect.h,
        h: rect.w,
    };
    (turned, frame.swapped())
}

/// Re-expresses a crop taken in the frame of rotation `from` in the frame of rotation `to`.
/// `src` is the unrotated source size. Applying the turns in sequence keeps the cropped
/// content identical, so turning back restores the original crop.
pub fn remap_crop(crop: Rect, src: Dimension, from: Rotation, to: Rotation) -> Rect {
    let mut frame = if from.swaps_axes() {
        src.swapped()
    } else {
        src
    };
    let turns = (to.quarter_turns() + 4 - from.quarter_turns()) % 4;
    let mut rect = crop;
    for _ in 0..turns {
        let (r, f) = quarter_turn(rect, frame);
        rect = r;
        frame = f;
    }
    rect
}

/// Moves an odd start up to the next even line and trims the length so the end stays put or
/// becomes even. Chroma subsampled pipes need even offsets and lengths.
pub fn normalize_crop(start: &mut u32, len: &mut u32) {
    if *start & 1 == 1 {
        *start += 1;
        if *len & 1 == 1 {
            *len -= 1;
        } else {
            *len = len.saturating_sub(2);
        }
    } else {
        *len &= !1;
    }
}

/// Largest rectangle with the aspect ratio of `src` that fits centred inside `fb`, bounded by
/// the pipe magnification limit and shrunk by the action-safe percentages.
pub fn aspect_ratio_fit(src: Dimension, fb: Dimension, action_safe: (f32, f32)) -> Rect {
    if src.width == 0 || src.height == 0 {
        return Rect::default();
    }
    let (sw, sh) = (src.width as u64, src.height as u64);
    let (fw, fh) = (fb.width as u64, fb.height as u64);

    let (mut width, mut height) = if sw * fh > fw * sh {
        (fw, (fw * sh / sw) & !1)
    } else if sw * fh < fw * sh {
        ((fh * sw / sh) & !1, fh)
    } else {
        (fw, fh)
    };

    let limit = MAX_SCALE_FACTOR as u64;
    width = width.min(sw * limit).min(fw);
    height = height.min(sh * limit).min(fh);

    let safe_w = action_safe.0.clamp(0.0, 100.0);
    let safe_h = action_safe.1.clamp(0.0, 100.0);
    let width = (width as f64 * (100.0 - safe_w as f64) / 100.0) as u32;
    let height = (height as f64 * (100.0 - safe_h as f64) / 100.0) as u32;

    Rect {
        x: (fb.width - width) / 2,
        y: (fb.height - height) / 2,
        w: width,
        h: height,
    }
}

/// Maps a destination rectangle chosen on the primary panel onto an external display so the
/// external picture keeps the panel's aspect ratio instead of being stretched.
///
/// `rotation` is the current rotation of the primary panel. For 90 and 270 degrees the
/// rectangle is first moved into the unrotated panel frame, which swaps its width and height,
/// and the panel itself is treated as `height` x `width` before it is letterboxed into the
/// external frame.
pub fn aspect_ratio_position(
    primary: Dimension,
    external: Dimension,
    rotation: Rotation,
    in_rect: Rect,
    action_safe: (f32, f32),
) -> Rect {
    let mut rect = in_rect;
    let mut panel = primary;
    match rotation {
        Rotation::None => {}
        Rotation::Rot180 => {
            rect.x = primary.width.saturating_sub(rect.x + rect.w);
            rect.y = primary.height.saturating_sub(rect.y + rect.h);
        }
        Rotation::Rot90 => {
            let x = rect.y;
            rect.y = primary.width.saturating_sub(rect.x + rect.w);
            rect.x = x;
            std::mem::swap(&mut rect.w, &mut rect.h);
            panel = primary.swapped();
        }
        Rotation::Rot270 => {
            let y = rect.x;
            rect.x = primary.height.saturating_sub(rect.y + rect.h);
            rect.y = y;
            std::mem::swap(&mut rect.w, &mut rect.h);
            panel = primary.swapped();
        }
    }

    let letterbox = aspect_ratio_fit(panel, external, action_safe);
    if panel.width == 0 || panel.height == 0 {
        return letterbox;
    }

    let pw = panel.width as f32;
    let ph = panel.height as f32;
    let bw = letterbox.w as f32;
    let bh = letterbox.h as f32;
    Rect {
        x: (rect.x as f32 / pw * bw) as u32 + letterbox.x,
        y: (rect.y as f32 / ph * bh) as u32 + letterbox.y,
        w: (rect.w as f32 / pw * bw) as u32,
        h: (rect.h as f32 / ph * bh) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Dimension = Dimension::new(1280, 720);

    #[test]
    fn transform_rotation() {
        assert_eq!(Transform::empty().rotation(), Rotation::None);
        assert_eq!(Transform::FLIP_H.rotation(), Rotation::None);
        assert_eq!(Transform::ROT_90.rotation(), Rotation::Rot90);
        assert_eq!(
            (Transform::ROT_90 | Transform::FLIP_H).rotation(),
            Rotation::Rot90
        );
        assert_eq!(Transform::ROT_180.rotation(), Rotation::Rot180);
        assert_eq!(Transform::ROT_270.rotation(), Rotation::Rot270);
    }

    #[test]
    fn remap_crop_quarter_turns() {
        let crop = Rect::new(100, 50, 400, 300);
        assert_eq!(
            remap_crop(crop, SRC, Rotation::None, Rotation::Rot90),
            Rect::new(50, 780, 300, 400)
        );
        assert_eq!(
            remap_crop(crop, SRC, Rotation::None, Rotation::Rot180),
            Rect::new(780, 370, 400, 300)
        );
        assert_eq!(
            remap_crop(crop, SRC, Rotation::None, Rotation::Rot270),
            Rect::new(370, 100, 300, 400)
        );
        assert_eq!(remap_crop(crop, SRC, Rotation::Rot90, Rotation::Rot90), crop);
    }

    #[test]
    fn remap_crop_round_trips() {
        let crop = Rect::new(16, 8, 640, 360);
        let all = [
            Rotation::None,
            Rotation::Rot90,
            Rotation::Rot180,
            Rotation::Rot270,
        ];
        for &from in &all {
            for &to in &all {
                let there = remap_crop(crop, SRC, from, to);
                assert_eq!(remap_crop(there, SRC, to, from), crop);
            }
        }
    }

    #[test]
    fn normalize_odd_start() {
        let (mut x, mut w) = (3, 101);
        normalize_crop(&mut x, &mut w);
        assert_eq!((x, w), (4, 100));

        let (mut x, mut w) = (3, 100);
        normalize_crop(&mut x, &mut w);
        assert_eq!((x, w), (4, 98));

        let (mut x, mut w) = (2, 101);
        normalize_crop(&mut x, &mut w);
        assert_eq!((x, w), (2, 100));

        let (mut x, mut w) = (0, 1280);
        normalize_crop(&mut x, &mut w);
        assert_eq!((x, w), (0, 1280));
    }

    #[test]
    fn scale_limits() {
        let crop = Rect::new(0, 0, 160, 90);
        assert!(PipeGeometry::scale_in_range(&crop, &Rect::new(0, 0, 1280, 720)));
        assert!(!PipeGeometry::scale_in_range(&crop, &Rect::new(0, 0, 1281, 720)));
        let big = Rect::new(0, 0, 1920, 1080);
        assert!(PipeGeometry::scale_in_range(&big, &Rect::new(0, 0, 240, 135)));
        assert!(!PipeGeometry::scale_in_range(&big, &Rect::new(0, 0, 239, 135)));
    }

    #[test]
    fn fit_letterboxes_and_pillarboxes() {
        // 16:9 into 4:3: bars above and below.
        let r = aspect_ratio_fit(Dimension::new(1920, 1080), Dimension::new(640, 480), (0.0, 0.0));
        assert_eq!(r, Rect::new(0, 60, 640, 360));
        // 4:3 into 16:9: bars left and right.
        let r = aspect_ratio_fit(Dimension::new(640, 480), Dimension::new(1920, 1080), (0.0, 0.0));
        assert_eq!(r, Rect::new(240, 0, 1440, 1080));
        // Same ratio fills the frame.
        let r = aspect_ratio_fit(Dimension::new(1280, 720), Dimension::new(1920, 1080), (0.0, 0.0));
        assert_eq!(r, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn fit_respects_action_safe() {
        let r = aspect_ratio_fit(
            Dimension::new(1920, 1080),
            Dimension::new(1920, 1080),
            (10.0, 10.0),
        );
        assert_eq!(r, Rect::new(96, 54, 1728, 972));
    }

    #[test]
    fn fit_clamps_action_safe() {
        let fb = Dimension::new(1920, 1080);
        let r = aspect_ratio_fit(fb, fb, (-10.0, -5.0));
        assert_eq!(r, Rect::new(0, 0, 1920, 1080));
        let r = aspect_ratio_fit(fb, fb, (150.0, 100.0));
        assert_eq!(r, Rect::new(960, 540, 0, 0));
    }

    #[test]
    fn fit_caps_magnification() {
        let r = aspect_ratio_fit(Dimension::new(100, 100), Dimension::new(1920, 1080), (0.0, 0.0));
        assert_eq!(r, Rect::new(560, 140, 800, 800));
    }

    #[test]
    fn position_unrotated() {
        // A 5:3 panel is narrower than the 16:9 TV, so the TV pillarboxes.
        let panel = Dimension::new(800, 480);
        let tv = Dimension::new(1920, 1080);
        let r = aspect_ratio_position(panel, tv, Rotation::None, Rect::new(0, 0, 800, 480), (0.0, 0.0));
        assert_eq!(r, Rect::new(60, 0, 1800, 1080));
        let half = aspect_ratio_position(panel, tv, Rotation::None, Rect::new(400, 0, 400, 480), (0.0, 0.0));
        assert_eq!(half, Rect::new(960, 0, 900, 1080));
    }

    #[test]
    fn position_rotated_swaps_the_panel() {
        let panel = Dimension::new(480, 800);
        let tv = Dimension::new(1920, 1080);
        // Full-screen video on a panel turned 90 degrees: the panel acts as 800x480.
        let r = aspect_ratio_position(panel, tv, Rotation::Rot90, Rect::new(0, 0, 480, 800), (0.0, 0.0));
        assert_eq!(r, Rect::new(60, 0, 1800, 1080));
        let r = aspect_ratio_position(panel, tv, Rotation::Rot270, Rect::new(0, 0, 480, 800), (0.0, 0.0));
        assert_eq!(r, Rect::new(60, 0, 1800, 1080));
    }

    #[test]
    fn position_rotated_moves_the_origin() {
        let panel = Dimension::new(480, 800);
        let tv = Dimension::new(800, 480);
        let quarter = Rect::new(0, 0, 240, 400);
        let r = aspect_ratio_position(panel, tv, Rotation::Rot90, quarter, (0.0, 0.0));
        assert_eq!(r, Rect::new(0, 240, 400, 240));
        let r = aspect_ratio_position(panel, tv, Rotation::Rot270, quarter, (0.0, 0.0));
        assert_eq!(r, Rect::new(400, 0, 400, 240));
        let r = aspect_ratio_position(
            Dimension::new(800, 480),
            tv,
            Rotation::Rot180,
            Rect::new(0, 0, 200, 100),
            (0.0, 0.0),
        );
        assert_eq!(r, Rect::new(600, 380, 200, 100));
    }
}
