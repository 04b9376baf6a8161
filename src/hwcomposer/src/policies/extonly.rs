//! extonly: a layer flagged for the external display only, shown there through its own pipe
//! while the panel keeps compositing everything else.

use overlay::OverlayState;

use crate::config::HwcConfig;
use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::Composition;
use crate::layer::Layer;
use crate::layer::LayerList;
use crate::policies::*;
use crate::stats::FrameStats;

#[derive(Default)]
pub struct ExtOnly {
    claimed: Vec<usize>,
    disabled: bool,
    buffers: HeldBuffers,
}

impl ExtOnly {
    pub fn new() -> ExtOnly {
        ExtOnly::default()
    }

    fn configure(ctx: &mut DisplayPipelineContext, layer: &Layer) -> HwcResult<bool> {
        let handle = layer_handle(layer)?;
        let src = handle.source_buffer()?;
        ctx.overlay.set_state(OverlayState::DualDisplay)?;
        ctx.overlay
            .set_channel_source(0, &src, pipe_flags(handle), !handle.is_yuv())?;
        configure_layer(ctx, 0, layer)
    }
}

impl CompositionPolicy for ExtOnly {
    fn name(&self) -> &'static str {
        "extonly"
    }

    fn enabled(&self, config: &HwcConfig) -> bool {
        config.ext_only_enabled && !self.disabled
    }

    fn prepare(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        list: &mut LayerList,
        stats: &FrameStats,
    ) -> bool {
        let index = match stats.ext_only_index {
            Some(index) if ctx.external.is_connected() => index,
            _ => {
                ctx.external.set_ext_only(false);
                return false;
            }
        };
        if list.layers[index].is_skip() {
            return false;
        }
        let claimed = match ExtOnly::configure(ctx, &list.layers[index]) {
            Ok(true) => {
                list.layers[index].composition = Composition::Overlay;
                self.claimed.push(index);
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
        };
        ctx.external.set_ext_only(claimed);
        claimed
    }

    fn draw(&mut self, ctx: &mut DisplayPipelineContext, list: &LayerList) -> HwcResult<()> {
        let channels: Vec<(usize, usize)> = self.claimed.iter().map(|i| (0, *i)).collect();
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
