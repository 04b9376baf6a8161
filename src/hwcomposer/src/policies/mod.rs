//! policies: the composition features tried on every frame. Each one decides in `prepare`
//! whether it can take the frame, configures pipes through the context's overlay and marks
//! the layers it claims; `draw` then queues those layers' buffers.

mod extonly;
mod mdpcomp;
mod pip;
mod uimirror;
mod video;

use std::sync::Arc;

use overlay::geometry::PipeFlags;

use crate::buffer::BufferFlags;
use crate::buffer::BufferHandle;
use crate::config::HwcConfig;
use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::Layer;
use crate::layer::LayerList;
use crate::stats::FrameStats;
use crate::utils::calculate_crop_rects;

pub use self::extonly::ExtOnly;
pub use self::mdpcomp::MdpComp;
pub use self::mdpcomp::MIN_MDP_REVISION;
pub use self::pip::VideoPip;
pub use self::uimirror::UiMirror;
pub use self::video::VideoOverlay;

pub trait CompositionPolicy: Send {
    fn name(&self) -> &'static str;

    /// Whether the policy is switched on for this session.
    fn enabled(&self, config: &HwcConfig) -> bool;

    /// Takes the frame if the policy can. Returns true when it configured the overlay.
    fn prepare(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        list: &mut LayerList,
        stats: &FrameStats,
    ) -> bool;

    /// Queues the buffers of the layers claimed in the last `prepare`.
    fn draw(&mut self, ctx: &mut DisplayPipelineContext, list: &LayerList) -> HwcResult<()>;

    /// Forgets the claims of the previous frame.
    fn reset(&mut self);

    /// Layer indices claimed in the last `prepare`.
    fn claimed(&self) -> &[usize];

    /// Drops the buffer locks still held from the last frame this policy drew.
    fn release_buffers(&mut self);
}

/// Every policy in the order they are offered a frame. Video policies claim their layers
/// before generic MDP composition sees them.
pub fn default_policies() -> Vec<Box<dyn CompositionPolicy>> {
    vec![
        Box::new(VideoPip::new()),
        Box::new(VideoOverlay::new()),
        Box::new(ExtOnly::new()),
        Box::new(UiMirror::new()),
        Box::new(MdpComp::new()),
    ]
}

pub(crate) fn pipe_flags(handle: &BufferHandle) -> PipeFlags {
    let mut flags = PipeFlags::empty();
    if handle.flags.contains(BufferFlags::SECURE) {
        flags |= PipeFlags::SECURE;
    }
    if handle.flags.contains(BufferFlags::INTERLACED) {
        flags |= PipeFlags::INTERLACED;
    }
    flags
}

pub(crate) fn layer_handle(layer: &Layer) -> HwcResult<&Arc<BufferHandle>> {
    layer
        .handle
        .as_ref()
        .ok_or(HwcError::InvalidBufferHandle("layer without buffer"))
}

/// Configures the pipes behind `channel` for `layer`: crop clipped against the panel, then
/// transform, then position, then commit. Returns false if the layer is entirely offscreen.
pub(crate) fn configure_layer(
    ctx: &mut DisplayPipelineContext,
    channel: usize,
    layer: &Layer,
) -> HwcResult<bool> {
    let mut crop = layer.source_crop;
    let mut dst = layer.display_frame;
    let scissor = ctx.panel_rect();
    if !calculate_crop_rects(&mut crop, &mut dst, &scissor, layer.transform) {
        debug!("policy: layer at {:?} is offscreen", layer.display_frame);
        return Ok(false);
    }
    let (crop, dst) = match (crop.to_rect(), dst.to_rect()) {
        (Some(crop), Some(dst)) => (crop, dst),
        _ => return Ok(false),
    };
    ctx.overlay.set_crop(channel, crop)?;
    ctx.overlay.set_transform(channel, layer.transform)?;
    ctx.overlay.set_position(channel, dst)?;
    ctx.overlay.commit(channel)?;
    Ok(true)
}

/// How a policy reacts to a failed configuration. Unavailable hardware disables it for the
/// rest of the session; anything else only loses this frame. Either way the overlay closes
/// and the frame goes to the GPU.
pub(crate) fn handle_failure(
    name: &str,
    ctx: &mut DisplayPipelineContext,
    err: &HwcError,
    disabled: &mut bool,
) {
    match err {
        HwcError::Overlay(e) if e.is_device_unavailable() => {
            error!("{}: hardware unavailable, disabling: {}", name, e);
            *disabled = true;
        }
        HwcError::Overlay(e) if e.is_resource_exhaustion() => {
            warn!("{}: out of pipes this frame: {}", name, e);
        }
        e => error!("{}: falling back to GPU: {}", name, e),
    }
    ctx.overlay.close();
}

/// The buffers a policy holds read locks on while the display scans them out. The previous
/// frame's locks are dropped once the next frame has been queued.
#[derive(Default)]
pub(crate) struct HeldBuffers {
    held: Vec<Arc<BufferHandle>>,
    pending: Vec<Arc<BufferHandle>>,
}

impl HeldBuffers {
    /// Read-locks `handle` and queues it on `channel`. A lock timeout skips the buffer for
    /// this frame and is not an error.
    pub fn queue(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        channel: usize,
        handle: &Arc<BufferHandle>,
    ) -> HwcResult<()> {
        match handle.lock.lock_read(ctx.config.lock_timeout) {
            Ok(()) => self.pending.push(handle.clone()),
            Err(HwcError::LockTimeout(t)) => {
                warn!("draw: buffer fd {} still locked after {:?}, skipping", handle.fd, t);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        ctx.overlay.set_fd(channel, handle.fd)?;
        ctx.overlay.queue_buffer(channel, handle.offset)?;
        Ok(())
    }

    /// Ends a frame: the previous frame's buffers are unlocked and this frame's are kept.
    pub fn finish(&mut self) {
        for handle in self.held.drain(..) {
            handle.lock.unlock();
        }
        self.held = std::mem::take(&mut self.pending);
    }

    pub fn release(&mut self) {
        self.finish();
        self.finish();
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }
}

impl Drop for HeldBuffers {
    fn drop(&mut self) {
        self.release();
    }
}

/// Queues each `(channel, layer index)` pair and ends the frame, even when a queue fails.
pub(crate) fn draw_layers(
    ctx: &mut DisplayPipelineContext,
    buffers: &mut HeldBuffers,
    list: &LayerList,
    channels: &[(usize, usize)],
) -> HwcResult<()> {
    let mut result = Ok(());
    for &(channel, index) in channels {
        let handle = match list.layers.get(index).map(layer_handle) {
            Some(Ok(handle)) => handle,
            Some(Err(e)) => {
                result = Err(e);
                break;
            }
            None => continue,
        };
        if let Err(e) = buffers.queue(ctx, channel, handle) {
            result = Err(e);
            break;
        }
    }
    buffers.finish();
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn flags_follow_the_buffer() {
        let handle = BufferHandle::new(
            4,
            64,
            64,
            0x109,
            BufferFlags::SECURE | BufferFlags::INTERLACED | BufferFlags::VIDEO,
        );
        assert_eq!(pipe_flags(&handle), PipeFlags::SECURE | PipeFlags::INTERLACED);
        let handle = BufferHandle::new(4, 64, 64, 0x109, BufferFlags::VIDEO);
        assert!(pipe_flags(&handle).is_empty());
    }

    #[test]
    fn held_buffers_unlock_one_frame_late() {
        let handle = Arc::new(BufferHandle::new(4, 64, 64, 0x1, BufferFlags::empty()));
        let mut buffers = HeldBuffers::default();
        handle.lock.lock_read(Duration::from_millis(1)).unwrap();
        buffers.pending.push(handle.clone());
        buffers.finish();
        assert_eq!(buffers.held(), 1);
        assert_eq!(handle.lock.readers(), 1);
        buffers.finish();
        assert_eq!(buffers.held(), 0);
        assert_eq!(handle.lock.readers(), 0);
    }
}
