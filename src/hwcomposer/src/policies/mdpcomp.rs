//! mdpcomp: bypasses the GPU entirely by giving every layer of a small frame its own pipe,
//! stacked in layer order.

use overlay::geometry::PipeFlags;
use overlay::geometry::Transform;
use overlay::OverlayState;

use crate::buffer::BufferFlags;
use crate::config::HwcConfig;
use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::Blending;
use crate::layer::Composition;
use crate::layer::Layer;
use crate::layer::LayerList;
use crate::policies::*;
use crate::stats::FrameStats;

/// Oldest display controller revision with enough blend stages for bypass.
pub const MIN_MDP_REVISION: u32 = 400;

#[derive(Default)]
pub struct MdpComp {
    claimed: Vec<usize>,
    disabled: bool,
    buffers: HeldBuffers,
}

/// Whether a pipe can blend `layer` the way the GPU would.
fn is_candidate(layer: &Layer) -> bool {
    let handle = match &layer.handle {
        Some(handle) => handle,
        None => return false,
    };
    handle.validate().is_ok()
        && !handle.flags.contains(BufferFlags::EXTERNAL_ONLY)
        && layer.blending != Blending::Coverage
        && layer.plane_alpha == 0xff
}

impl MdpComp {
    pub fn new() -> MdpComp {
        MdpComp::default()
    }

    fn configure(ctx: &mut DisplayPipelineContext, list: &LayerList) -> HwcResult<bool> {
        let count = list.layers.len();
        let state = match OverlayState::bypass(count) {
            Some(state) => state,
            None => return Ok(false),
        };
        ctx.overlay.set_state(state)?;
        for (channel, layer) in list.layers.iter().enumerate() {
            let handle = layer_handle(layer)?;
            let src = handle.source_buffer()?;
            let mut flags = pipe_flags(handle);
            if layer.transform == Transform::empty() {
                flags |= PipeFlags::NO_ROT;
            }
            ctx.overlay
                .set_channel_source(channel, &src, flags, !handle.is_yuv())?;
            if !configure_layer(ctx, channel, layer)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl CompositionPolicy for MdpComp {
    fn name(&self) -> &'static str {
        "mdpcomp"
    }

    fn enabled(&self, config: &HwcConfig) -> bool {
        config.mdp_comp_enabled && !self.disabled
    }

    fn prepare(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        list: &mut LayerList,
        stats: &FrameStats,
    ) -> bool {
        if ctx.config.mdp_revision < MIN_MDP_REVISION {
            debug!("mdpcomp: revision {} too old", ctx.config.mdp_revision);
            self.disabled = true;
            return false;
        }
        if stats.has_skip_layers() || ctx.external.is_connected() {
            return false;
        }
        let budget = ctx.config.mdp_max_layers.min(ctx.zorder.max_pipes());
        if stats.num_app_layers < 2 || stats.num_app_layers > budget {
            return false;
        }
        if !list.layers.iter().all(is_candidate) {
            return false;
        }
        match MdpComp::configure(ctx, list) {
            Ok(true) => {
                for layer in list.layers.iter_mut() {
                    layer.composition = Composition::Overlay;
                }
                self.claimed = (0..list.layers.len()).collect();
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
