//! layer: the per-frame layer list handed over by the display server.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use overlay::geometry::Rect;
use overlay::geometry::Transform;

use crate::buffer::BufferHandle;

/// Rectangle in signed edge coordinates, as layers describe themselves. Display frames may
/// hang off the screen.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HwcRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl HwcRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> HwcRect {
        HwcRect {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn contains(&self, other: &HwcRect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// The pipe rectangle for this one, if it is non-empty and has no negative edge.
    pub fn to_rect(&self) -> Option<Rect> {
        if self.is_empty() || self.left < 0 || self.top < 0 {
            return None;
        }
        Some(Rect::new(
            self.left as u32,
            self.top as u32,
            self.width() as u32,
            self.height() as u32,
        ))
    }
}

bitflags! {
    #[derive(Default)]
    pub struct LayerFlags: u32 {
        /// The layer is animating and must go through the GPU this frame.
        const SKIP = 0x0001;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct ListFlags: u32 {
        const GEOMETRY_CHANGED = 0x0001;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Composition {
    /// Composited by the GPU into the framebuffer target.
    Framebuffer,
    /// Scanned out by a hardware pipe.
    Overlay,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Blending {
    None,
    Premultiplied,
    Coverage,
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub handle: Option<Arc<BufferHandle>>,
    pub transform: Transform,
    pub blending: Blending,
    pub plane_alpha: u8,
    pub source_crop: HwcRect,
    pub display_frame: HwcRect,
    pub flags: LayerFlags,
    pub composition: Composition,
    pub acquire_fence: Option<RawFd>,
    pub release_fence: Option<RawFd>,
}

impl Layer {
    /// An opaque layer showing all of `handle` at `display_frame`.
    pub fn new(handle: Arc<BufferHandle>, display_frame: HwcRect) -> Layer {
        let source_crop = HwcRect::new(0, 0, handle.width as i32, handle.height as i32);
        Layer {
            handle: Some(handle),
            transform: Transform::empty(),
            blending: Blending::None,
            plane_alpha: 0xff,
            source_crop,
            display_frame,
            flags: LayerFlags::empty(),
            composition: Composition::Framebuffer,
            acquire_fence: None,
            release_fence: None,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.flags.contains(LayerFlags::SKIP)
    }

    pub fn is_yuv(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| h.is_yuv())
    }
}

#[derive(Clone, Debug, Default)]
pub struct LayerList {
    pub flags: ListFlags,
    pub layers: Vec<Layer>,
    /// Where the GPU composes every `Framebuffer` layer.
    pub framebuffer_target: Option<Arc<BufferHandle>>,
}

impl LayerList {
    pub fn new(layers: Vec<Layer>) -> LayerList {
        LayerList {
            flags: ListFlags::GEOMETRY_CHANGED,
            layers,
            framebuffer_target: None,
        }
    }

    /// Indices of layers a pipe scans out this frame.
    pub fn overlay_indices(&self) -> Vec<usize> {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.composition == Composition::Overlay)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn needs_gpu(&self) -> bool {
        self.layers
            .iter()
            .any(|l| l.composition == Composition::Framebuffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_conversion() {
        assert_eq!(
            HwcRect::new(10, 20, 110, 70).to_rect(),
            Some(Rect::new(10, 20, 100, 50))
        );
        assert_eq!(HwcRect::new(-1, 0, 10, 10).to_rect(), None);
        assert_eq!(HwcRect::new(10, 0, 10, 10).to_rect(), None);
        assert!(HwcRect::new(0, 0, 100, 100).contains(&HwcRect::new(10, 10, 100, 20)));
    }
}
