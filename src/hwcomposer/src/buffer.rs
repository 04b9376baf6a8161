//! buffer: the allocator's buffer handle as the composition layer sees it. Handles are
//! immutable once created; the composition layer only reads them to derive pipe sources.

use std::convert::TryFrom;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use overlay::formats::Format3D;
use overlay::formats::PixelFormat;
use overlay::geometry::SourceBuffer;

use crate::hwc_utils::*;
use crate::lock::BufferLock;

/// Magic number every valid handle carries, "gmsm".
pub const BUFFER_HANDLE_MAGIC: u32 = 0x676d_736d;

bitflags! {
    #[derive(Default)]
    pub struct BufferFlags: u32 {
        /// Protected content.
        const SECURE = 0x0001;
        /// Produced by a video decoder or camera.
        const VIDEO = 0x0002;
        /// Only the external display may show this buffer.
        const EXTERNAL_ONLY = 0x0004;
        /// Field-interleaved video.
        const INTERLACED = 0x0008;
    }
}

#[derive(Debug)]
pub struct BufferHandle {
    pub magic: u32,
    pub fd: RawFd,
    pub offset: u32,
    pub size: usize,
    pub base: u64,
    pub width: u32,
    pub height: u32,
    /// Gralloc format code, possibly carrying stereoscopic bits.
    pub format: u32,
    pub flags: BufferFlags,
    pub lock: Arc<BufferLock>,
}

impl BufferHandle {
    /// A handle sized for one frame of `format`. Unknown formats get a zero size and fail
    /// validation.
    pub fn new(fd: RawFd, width: u32, height: u32, format: u32, flags: BufferFlags) -> BufferHandle {
        let size = PixelFormat::try_from(format)
            .and_then(|f| f.frame_size(width, height))
            .unwrap_or(0);
        BufferHandle {
            magic: BUFFER_HANDLE_MAGIC,
            fd,
            offset: 0,
            size,
            base: 0,
            width,
            height,
            format,
            flags,
            lock: Arc::new(BufferLock::new()),
        }
    }

    /// Checks the magic number, descriptor, dimensions, format and size.
    pub fn validate(&self) -> HwcResult<()> {
        if self.magic != BUFFER_HANDLE_MAGIC {
            return Err(HwcError::InvalidBufferHandle("bad magic"));
        }
        if self.fd < 0 {
            return Err(HwcError::InvalidBufferHandle("negative fd"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(HwcError::InvalidBufferHandle("empty buffer"));
        }
        let format = self.pixel_format()?;
        let needed = format.frame_size(self.width, self.height)?;
        if self.size < needed {
            return Err(HwcError::InvalidBufferHandle("buffer smaller than one frame"));
        }
        Ok(())
    }

    pub fn pixel_format(&self) -> HwcResult<PixelFormat> {
        Ok(PixelFormat::try_from(self.format)?)
    }

    pub fn format_3d(&self) -> Format3D {
        Format3D::from_raw_format(self.format)
    }

    pub fn is_yuv(&self) -> bool {
        self.pixel_format().map_or(false, |f| f.is_yuv())
    }

    pub fn is_secure(&self) -> bool {
        self.flags.contains(BufferFlags::SECURE)
    }

    /// The pipe source for this buffer. Fails for handles that do not validate.
    pub fn source_buffer(&self) -> HwcResult<SourceBuffer> {
        if let Err(e) = self.validate() {
            error!("buffer fd {}: {}", self.fd, e);
            return Err(e);
        }
        Ok(SourceBuffer {
            width: self.width,
            height: self.height,
            format: self.pixel_format()?,
            format_3d: self.format_3d(),
            size: self.size,
        })
    }
}
