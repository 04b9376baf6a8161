//! rotator: a pre-rotation session paired with one pipe. The session owns a small ring of
//! output slots that the rotator writes into round-robin, so the pipe can scan out slot `n`
//! while slot `n + 1` is being filled.

use std::os::unix::io::RawFd;

use crate::device::RotatorDevice;
use crate::device::RotatorJob;
use crate::device::RotatorMemory;
use crate::device::RotatorSessionInfo;
use crate::formats::PixelFormat;
use crate::geometry::Dimension;
use crate::geometry::Rect;
use crate::geometry::Transform;
use crate::overlay_utils::*;

/// Output slots for ordinary content.
pub const ROTATOR_SLOTS: usize = 2;
/// Output slots when the consuming pipe plays on a second display in the same frame.
pub const ROTATOR_SLOTS_MIRRORED: usize = 3;

/// The rotated buffer a pipe should scan out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RotatedBuffer {
    pub fd: RawFd,
    pub offset: u32,
}

pub struct RotatorSession {
    device: Box<dyn RotatorDevice>,
    info: Option<RotatorSessionInfo>,
    session: Option<u32>,
    memory: Option<RotatorMemory>,
    slots: usize,
    index: usize,
}

impl RotatorSession {
    pub fn new(device: Box<dyn RotatorDevice>, slots: usize) -> RotatorSession {
        RotatorSession {
            device,
            info: None,
            session: None,
            memory: None,
            slots: slots.clamp(ROTATOR_SLOTS, ROTATOR_SLOTS_MIRRORED),
            index: 0,
        }
    }

    /// Builds the session geometry for rotating a `src` sized source by `transform`.
    pub fn session_info(
        src: Dimension,
        format: PixelFormat,
        crop: Rect,
        transform: Transform,
        secure: bool,
    ) -> RotatorSessionInfo {
        let dst = if transform.rotation().swaps_axes() {
            src.swapped()
        } else {
            src
        };
        RotatorSessionInfo {
            src,
            src_format: format,
            src_rect: crop,
            dst,
            dst_format: format.rotator_output(),
            transform,
            secure,
        }
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    pub fn info(&self) -> Option<&RotatorSessionInfo> {
        self.info.as_ref()
    }

    pub fn memory(&self) -> Option<&RotatorMemory> {
        self.memory.as_ref()
    }

    /// Starts the session, or restarts it when the geometry changed. An unchanged geometry is
    /// a no-op. The output ring is reallocated only when a frame no longer fits a slot.
    pub fn configure(&mut self, info: RotatorSessionInfo) -> OverlayResult<()> {
        if self.is_started() && self.info.as_ref() == Some(&info) {
            return Ok(());
        }

        let slot_size = info.dst_format.frame_size(info.dst.width, info.dst.height)?;
        let fits = match &self.memory {
            Some(memory) => memory.slot_size >= slot_size,
            None => false,
        };
        self.finish_session();
        if !fits {
            self.free_memory();
            let slots = self.slots;
            let memory = self
                .device
                .alloc_buffers(slot_size, slots, info.secure)
                .map_err(|e| {
                    error!("rotator: no memory for {} x {} bytes: {}", slots, slot_size, e);
                    e
                })?;
            self.memory = Some(memory);
        }

        match self.device.start(&info) {
            Ok(session) => {
                debug!(
                    "rotator: session {} {}x{} -> {}x{} {:?}",
                    session,
                    info.src.width,
                    info.src.height,
                    info.dst.width,
                    info.dst.height,
                    info.transform
                );
                self.session = Some(session);
                self.info = Some(info);
                self.index = 0;
                Ok(())
            }
            Err(e) => {
                error!("rotator: failed to start session: {}", e);
                self.close();
                Err(e)
            }
        }
    }

    /// Rotates one source buffer into the next ring slot.
    pub fn rotate(&mut self, src_fd: RawFd, src_offset: u32) -> OverlayResult<RotatedBuffer> {
        let (session, memory) = match (self.session, self.memory.as_ref()) {
            (Some(session), Some(memory)) => (session, *memory),
            _ => {
                return Err(OverlayError::InvalidSource("rotator session not started"));
            }
        };
        let dst_offset = memory.slot_offset(self.index)?;
        self.device.rotate(&RotatorJob {
            session,
            src_fd,
            src_offset,
            dst_fd: memory.fd,
            dst_offset,
        })?;
        self.index = (self.index + 1) % memory.count;
        Ok(RotatedBuffer {
            fd: memory.fd,
            offset: dst_offset,
        })
    }

    fn finish_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.device.finish(session) {
                warn!("rotator: failed to finish session {}: {}", session, e);
            }
        }
        self.info = None;
    }

    fn free_memory(&mut self) {
        if let Some(memory) = self.memory.take() {
            self.device.free_buffers(&memory);
        }
    }

    /// Ends the session and frees the ring. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.finish_session();
        self.free_memory();
        self.index = 0;
    }
}

impl Drop for RotatorSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::DeviceCall;
    use crate::device::fake::FakeDevices;
    use crate::device::DeviceFactory;

    fn info(transform: Transform) -> RotatorSessionInfo {
        RotatorSession::session_info(
            Dimension::new(1280, 720),
            PixelFormat::YCbCr420SemiPlanarTiled,
            Rect::new(0, 0, 1280, 720),
            transform,
            false,
        )
    }

    #[test]
    fn rotation_swaps_output_and_untiles() {
        let i = info(Transform::ROT_90);
        assert_eq!(i.dst, Dimension::new(720, 1280));
        assert_eq!(i.dst_format, PixelFormat::YCbCr420SemiPlanar);
        assert_eq!(info(Transform::ROT_180).dst, Dimension::new(1280, 720));
    }

    #[test]
    fn ring_is_round_robin() {
        let devices = FakeDevices::new(1920, 1080);
        let mut session = RotatorSession::new(devices.open_rotator().unwrap(), ROTATOR_SLOTS);
        session.configure(info(Transform::ROT_90)).unwrap();
        let slot = session.memory().unwrap().slot_size as u32;

        let offsets: Vec<u32> = (0..5)
            .map(|_| session.rotate(42, 0).unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![0, slot, 0, slot, 0]);
    }

    #[test]
    fn unchanged_geometry_keeps_the_session() {
        let devices = FakeDevices::new(1920, 1080);
        let mut session = RotatorSession::new(devices.open_rotator().unwrap(), ROTATOR_SLOTS);
        session.configure(info(Transform::ROT_90)).unwrap();
        session.configure(info(Transform::ROT_90)).unwrap();
        assert_eq!(
            devices.count(|c| matches!(c, DeviceCall::RotatorStart { .. })),
            1
        );

        // A new rotation restarts the session but reuses the ring, which still fits.
        session.configure(info(Transform::ROT_270)).unwrap();
        assert_eq!(
            devices.count(|c| matches!(c, DeviceCall::RotatorStart { .. })),
            2
        );
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::RotatorFinish(_))), 1);
        assert_eq!(
            devices.count(|c| matches!(c, DeviceCall::RotatorAlloc { .. })),
            1
        );
    }

    #[test]
    fn close_is_idempotent() {
        let devices = FakeDevices::new(1920, 1080);
        let mut session = RotatorSession::new(devices.open_rotator().unwrap(), ROTATOR_SLOTS);
        session.configure(info(Transform::ROT_90)).unwrap();
        session.close();
        session.close();
        drop(session);
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::RotatorFinish(_))), 1);
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::RotatorFree(_))), 1);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let devices = FakeDevices::new(1920, 1080);
        devices.set_rotator_alloc_fails(true);
        let mut session = RotatorSession::new(devices.open_rotator().unwrap(), ROTATOR_SLOTS);
        let err = session.configure(info(Transform::ROT_90)).unwrap_err();
        assert!(err.is_resource_exhaustion());
        assert!(!session.is_started());
        assert!(session.rotate(42, 0).is_err());
    }
}
