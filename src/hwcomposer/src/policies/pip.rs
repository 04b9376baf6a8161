//! pip: two video layers on the panel, the lower one as background and the upper one as the
//! picture in picture. When one of them goes away the pipe of the survivor is kept and the
//! single video policy takes over with it.

use std::sync::Arc;

use overlay::OverlayState;

use crate::buffer::BufferHandle;
use crate::config::HwcConfig;
use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::Composition;
use crate::layer::HwcRect;
use crate::layer::Layer;
use crate::layer::LayerList;
use crate::policies::*;
use crate::stats::FrameStats;

#[derive(Default)]
pub struct VideoPip {
    claimed: Vec<usize>,
    disabled: bool,
    buffers: HeldBuffers,
    /// What each channel showed when last configured.
    shown: [Option<Shown>; 2],
}

#[derive(Clone)]
struct Shown {
    handle: Arc<BufferHandle>,
    frame: HwcRect,
}

impl Shown {
    /// How confidently `layer` is the layer this channel showed: the same buffer, then a
    /// buffer of the same size in the same place, then only the same place.
    fn affinity(&self, layer: &Layer) -> u8 {
        let handle = match &layer.handle {
            Some(handle) => handle,
            None => return 0,
        };
        if Arc::ptr_eq(handle, &self.handle) || handle.fd == self.handle.fd {
            3
        } else if layer.display_frame == self.frame
            && (handle.width, handle.height) == (self.handle.width, self.handle.height)
        {
            2
        } else if layer.display_frame == self.frame {
            1
        } else {
            0
        }
    }
}

/// The channel that showed `survivor`. Ties go to the picture in picture.
fn surviving_channel(shown: &[Option<Shown>; 2], survivor: &Layer) -> usize {
    let affinity = |ch: usize| shown[ch].as_ref().map_or(0, |s| s.affinity(survivor));
    if affinity(0) > affinity(1) {
        0
    } else {
        1
    }
}

impl VideoPip {
    pub fn new() -> VideoPip {
        VideoPip::default()
    }

    fn configure(
        ctx: &mut DisplayPipelineContext,
        list: &LayerList,
        indices: &[usize],
    ) -> HwcResult<bool> {
        ctx.overlay.set_state(OverlayState::PipVideoOnPanel)?;
        for (channel, index) in indices.iter().enumerate() {
            let layer = &list.layers[*index];
            let handle = layer_handle(layer)?;
            let src = handle.source_buffer()?;
            ctx.overlay
                .set_channel_source(channel, &src, pipe_flags(handle), false)?;
            if !configure_layer(ctx, channel, layer)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drops the channel of the layer that disappeared. The remaining pipe keeps its z-order.
    fn downgrade(&mut self, ctx: &mut DisplayPipelineContext, survivor: &Layer) {
        let gone = 1 - surviving_channel(&self.shown, survivor);
        info!("pip: channel {} went away", gone);
        if let Err(e) = ctx.overlay.release_channel(gone) {
            handle_failure(self.name(), ctx, &HwcError::from(e), &mut self.disabled);
        }
        self.shown = [None, None];
    }
}

impl CompositionPolicy for VideoPip {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn enabled(&self, config: &HwcConfig) -> bool {
        config.pip_enabled && !self.disabled
    }

    fn prepare(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        list: &mut LayerList,
        stats: &FrameStats,
    ) -> bool {
        if ctx.external.is_connected() {
            return false;
        }
        if ctx.overlay.state() == OverlayState::PipVideoOnPanel && stats.yuv_count == 1 {
            let survivor = &list.layers[stats.yuv_indices[0]];
            self.downgrade(ctx, survivor);
            return false;
        }
        if stats.yuv_count != 2 {
            return false;
        }
        let indices = stats.yuv_indices.clone();
        if indices.iter().any(|i| list.layers[*i].is_skip()) {
            return false;
        }
        match VideoPip::configure(ctx, list, &indices) {
            Ok(true) => {
                for (channel, index) in indices.iter().enumerate() {
                    let layer = &mut list.layers[*index];
                    layer.composition = Composition::Overlay;
                    self.shown[channel] = layer.handle.clone().map(|handle| Shown {
                        handle,
                        frame: layer.display_frame,
                    });
                }
                self.claimed = indices;
                true
            }
            Ok(false) => {
                ctx.overlay.close();
                false
            }
            Err(e) => {
                handle_failure(self.name(), ctx, &e, &mut self.disabled);
                false
            }
        }
    }

    fn draw(&mut self, ctx: &mut DisplayPipelineContext, list: &LayerList) -> HwcResult<()> {
        let channels: Vec<(usize, usize)> = self.claimed.iter().copied().enumerate().collect();
        draw_layers(ctx, &mut self.buffers, list, &channels)
    }

    fn reset(&mut self) {
        self.claimed.clear();
    }

    fn claimed(&self) -> &[usize] {
        &self.claimed
    }

    fn release_buffers(&mut self) {
        self.buffers.release();
    }
}
