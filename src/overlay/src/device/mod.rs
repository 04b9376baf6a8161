//! device: the operations the scheduler needs from the kernel display driver and from the
//! rotator block. Pipes only ever talk to these traits; kernel structure layouts stay inside
//! the `msm` implementation.

#[cfg(any(test, feature = "fake"))]
pub mod fake;
#[cfg(unix)]
pub mod msm;

use std::fmt;
use std::os::unix::io::RawFd;

use crate::formats::PixelFormat;
use crate::geometry::Dimension;
use crate::geometry::PipeGeometry;
use crate::geometry::Rect;
use crate::geometry::Transform;
use crate::overlay_utils::*;
use crate::zorder::Mixer;

/// Kernel handle of an allocated pipe.
pub type PipeId = u32;

/// Resolution and depth of a mixer's framebuffer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub bits_per_pixel: u32,
}

impl ScreenInfo {
    pub fn dimension(&self) -> Dimension {
        Dimension::new(self.xres, self.yres)
    }
}

/// One buffer submission to a pipe.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PlayRequest {
    pub id: PipeId,
    pub fd: RawFd,
    pub offset: u32,
}

/// Post-processing knobs a video pipe exposes independently of its geometry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum VisualParam {
    Sharpness,
    Hue,
    Saturation,
    Intensity,
    Contrast,
}

impl VisualParam {
    pub const MIN: i32 = -128;
    pub const MAX: i32 = 127;

    pub fn validate(value: i32) -> OverlayResult<i32> {
        if (VisualParam::MIN..=VisualParam::MAX).contains(&value) {
            Ok(value)
        } else {
            Err(OverlayError::InvalidVisualParam(value))
        }
    }
}

impl fmt::Display for VisualParam {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            VisualParam::Sharpness => "sharpness",
            VisualParam::Hue => "hue",
            VisualParam::Saturation => "saturation",
            VisualParam::Intensity => "intensity",
            VisualParam::Contrast => "contrast",
        };
        f.write_str(name)
    }
}

/// Geometry of a rotator session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RotatorSessionInfo {
    pub src: Dimension,
    pub src_format: PixelFormat,
    pub src_rect: Rect,
    pub dst: Dimension,
    pub dst_format: PixelFormat,
    pub transform: Transform,
    pub secure: bool,
}

/// One rotation request within a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RotatorJob {
    pub session: u32,
    pub src_fd: RawFd,
    pub src_offset: u32,
    pub dst_fd: RawFd,
    pub dst_offset: u32,
}

/// A contiguous allocation split into `count` equally sized output slots.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RotatorMemory {
    /// Allocator-private handle used to free the memory.
    pub handle: u32,
    pub fd: RawFd,
    pub slot_size: usize,
    pub count: usize,
}

impl RotatorMemory {
    pub fn slot_offset(&self, index: usize) -> OverlayResult<u32> {
        let offset = index
            .checked_mul(self.slot_size)
            .ok_or(OverlayError::RotatorMemory {
                size: self.slot_size,
                count: self.count,
            })?;
        Ok(u32::try_from(offset)?)
    }
}

/// The framebuffer node of one mixer.
pub trait MdpDevice: Send {
    fn screen_info(&self) -> OverlayResult<ScreenInfo>;
    /// Creates a pipe when `id` is `None`, otherwise updates it. Returns the pipe's id.
    fn overlay_set(&mut self, id: Option<PipeId>, geometry: &PipeGeometry) -> OverlayResult<PipeId>;
    /// Reads back the geometry the driver currently holds for `id`.
    fn overlay_get(&self, id: PipeId) -> OverlayResult<PipeGeometry>;
    fn overlay_unset(&mut self, id: PipeId) -> OverlayResult<()>;
    fn overlay_play(&mut self, play: &PlayRequest) -> OverlayResult<()>;
    fn set_visual_param(&mut self, id: PipeId, param: VisualParam, value: i32) -> OverlayResult<()>;
    /// Hands the producers' acquire fences to the driver and returns the release fence that
    /// signals when this frame's buffers may be reused.
    fn buffer_sync(&mut self, acquire_fences: &[RawFd]) -> OverlayResult<Option<RawFd>>;
    /// Blocks until the next vertical blank of this mixer.
    fn wait_for_vsync(&mut self) -> OverlayResult<()>;
}

/// The pre-rotation block.
pub trait RotatorDevice: Send {
    fn start(&mut self, info: &RotatorSessionInfo) -> OverlayResult<u32>;
    fn rotate(&mut self, job: &RotatorJob) -> OverlayResult<()>;
    fn finish(&mut self, session: u32) -> OverlayResult<()>;
    fn alloc_buffers(&mut self, slot_size: usize, count: usize, secure: bool)
        -> OverlayResult<RotatorMemory>;
    fn free_buffers(&mut self, memory: &RotatorMemory);
}

/// Opens the device nodes a pipe needs.
pub trait DeviceFactory: Send + Sync {
    fn open_mdp(&self, mixer: Mixer) -> OverlayResult<Box<dyn MdpDevice>>;
    fn open_rotator(&self) -> OverlayResult<Box<dyn RotatorDevice>>;
}
