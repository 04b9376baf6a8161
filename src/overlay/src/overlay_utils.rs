//! overlay_utils: error type and result alias shared by the whole crate.

use std::io::Error as IoError;
use std::num::TryFromIntError;

#[cfg(unix)]
use nix::Error as NixError;
use remain::sorted;
use thiserror::Error;

use crate::zorder::Mixer;

/// An error generated while scheduling or driving overlay pipes.
#[sorted]
#[derive(Error, Debug)]
pub enum OverlayError {
    /// The pipe was asked to do something that requires a started pipe.
    #[error("pipe on mixer {0} is not up")]
    ChannelDown(Mixer),
    /// Checked Arithmetic error
    #[error("arithmetic failed: {}({}) {op} {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedArithmetic {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
        op: &'static str,
    },
    /// A device node could not be opened or reported an unusable configuration.
    #[error("display device {0} is unavailable")]
    DeviceUnavailable(String),
    /// The driver refused a request.
    #[error("driver rejected {op}: {reason}")]
    DriverRejected { op: &'static str, reason: String },
    /// The requested channel does not exist in the active overlay state.
    #[error("channel {channel} is not addressable in state {state}")]
    InvalidChannel { channel: usize, state: &'static str },
    /// A crop rectangle falls outside of the source buffer.
    #[error("crop {x},{y} {w}x{h} exceeds source {src_w}x{src_h}")]
    InvalidCrop {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        src_w: u32,
        src_h: u32,
    },
    /// A pixel format code is not understood by the pipes.
    #[error("invalid pixel format {0:#x}")]
    InvalidFormat(u32),
    /// A destination rectangle is empty or falls outside of the mixer.
    #[error("position {x},{y} {w}x{h} is outside of the {fb_w}x{fb_h} mixer")]
    InvalidPosition {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        fb_w: u32,
        fb_h: u32,
    },
    /// A source buffer description is unusable.
    #[error("invalid source buffer: {0}")]
    InvalidSource(&'static str),
    /// A visual parameter value is out of range.
    #[error("visual parameter {0} out of range")]
    InvalidVisualParam(i32),
    /// An input/output error occurred.
    #[error("an input/output error occurred: {0}")]
    IoError(IoError),
    /// A system call through nix failed.
    #[cfg(unix)]
    #[error("the errno is {0}")]
    NixError(NixError),
    /// Every pipe of the mixer is already allocated.
    #[error("no free pipe on mixer {0}")]
    NoPipe(Mixer),
    /// A buffer was queued before a source descriptor was attached.
    #[error("no source fd set on pipe")]
    NoSourceFd,
    /// The rotator could not provide output memory.
    #[error("rotator memory allocation of {count}x{size} bytes failed")]
    RotatorMemory { size: usize, count: usize },
    /// The destination implies a scale factor beyond what the pipe supports.
    #[error("scaling {src_w}x{src_h} to {dst_w}x{dst_h} exceeds the pipe limit")]
    ScaleOutOfRange {
        src_w: u32,
        src_h: u32,
        dst_w: u32,
        dst_h: u32,
    },
    /// int conversion failed.
    #[error("int conversion failed: {0}")]
    TryFromIntError(TryFromIntError),
}

impl OverlayError {
    /// True when the failure only means "no hardware left this frame".
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            OverlayError::NoPipe(_) | OverlayError::RotatorMemory { .. }
        )
    }

    /// True when the failure means the device will not come back this session.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, OverlayError::DeviceUnavailable(_))
    }
}

#[cfg(unix)]
impl From<NixError> for OverlayError {
    fn from(e: NixError) -> OverlayError {
        OverlayError::NixError(e)
    }
}

impl From<IoError> for OverlayError {
    fn from(e: IoError) -> OverlayError {
        OverlayError::IoError(e)
    }
}

impl From<TryFromIntError> for OverlayError {
    fn from(e: TryFromIntError) -> OverlayError {
        OverlayError::TryFromIntError(e)
    }
}

/// The result of an overlay operation.
pub type OverlayResult<T> = std::result::Result<T, OverlayError>;
