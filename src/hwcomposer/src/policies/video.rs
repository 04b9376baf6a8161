//! video: a single video layer scanned out by one pipe, mirrored to the external display when
//! one is connected.

use crate::config::HwcConfig;
use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::Composition;
use crate::layer::Layer;
use crate::layer::LayerList;
use crate::policies::*;
use crate::stats::FrameStats;

#[derive(Default)]
pub struct VideoOverlay {
    claimed: Vec<usize>,
    disabled: bool,
    buffers: HeldBuffers,
}

impl VideoOverlay {
    pub fn new() -> VideoOverlay {
        VideoOverlay::default()
    }

    fn configure(ctx: &mut DisplayPipelineContext, layer: &Layer) -> HwcResult<bool> {
        let handle = layer_handle(layer)?;
        let src = handle.source_buffer()?;
        let external = ctx.external.info();
        let state = ctx
            .overlay
            .set_source(&src, ctx.orientation, external, pipe_flags(handle))?;
        debug!("video: layer in {}", state);
        configure_layer(ctx, 0, layer)
    }
}

impl CompositionPolicy for VideoOverlay {
    fn name(&self) -> &'static str {
        "video"
    }

    fn enabled(&self, config: &HwcConfig) -> bool {
        config.video_enabled && !self.disabled
    }

    fn prepare(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        list: &mut LayerList,
        stats: &FrameStats,
    ) -> bool {
        if stats.yuv_count != 1 {
            return false;
        }
        let index = stats.yuv_indices[0];
        if stats.ext_only_index == Some(index) || list.layers[index].is_skip() {
            return false;
        }
        match VideoOverlay::configure(ctx, &list.layers[index]) {
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
        }
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
