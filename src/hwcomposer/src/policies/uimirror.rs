//! uimirror: the composed UI framebuffer scanned out to the external display. No layer is
//! taken away from the GPU; the policy only adds a pipe that reads the framebuffer target.

use std::sync::Arc;

use overlay::geometry::PipeFlags;
use overlay::geometry::Rect;
use overlay::OverlayState;

use crate::buffer::BufferHandle;
use crate::config::HwcConfig;
use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::LayerList;
use crate::policies::*;
use crate::stats::FrameStats;

#[derive(Default)]
pub struct UiMirror {
    disabled: bool,
    buffers: HeldBuffers,
    target: Option<Arc<BufferHandle>>,
}

impl UiMirror {
    pub fn new() -> UiMirror {
        UiMirror::default()
    }

    fn configure(ctx: &mut DisplayPipelineContext, target: &BufferHandle) -> HwcResult<()> {
        let state = if ctx.config.true_mirror {
            OverlayState::TrueUiMirror
        } else {
            OverlayState::UiMirror
        };
        let src = target.source_buffer()?;
        ctx.overlay.set_state(state)?;
        ctx.overlay
            .set_channel_source(0, &src, pipe_flags(target) | PipeFlags::NO_ROT, true)?;
        let panel = ctx.panel();
        ctx.overlay
            .set_crop(0, Rect::new(0, 0, src.width, src.height))?;
        ctx.overlay
            .set_position(0, Rect::new(0, 0, panel.width, panel.height))?;
        ctx.overlay.commit(0)?;
        Ok(())
    }
}

impl CompositionPolicy for UiMirror {
    fn name(&self) -> &'static str {
        "uimirror"
    }

    fn enabled(&self, config: &HwcConfig) -> bool {
        config.ui_mirror_enabled && !self.disabled
    }

    fn prepare(
        &mut self,
        ctx: &mut DisplayPipelineContext,
        list: &mut LayerList,
        _stats: &FrameStats,
    ) -> bool {
        if !ctx.external.is_connected() {
            return false;
        }
        let target = match &list.framebuffer_target {
            Some(target) => target.clone(),
            None => return false,
        };
        match UiMirror::configure(ctx, &target) {
            Ok(()) => {
                self.target = Some(target);
                true
            }
            Err(e) => {
                handle_failure(self.name(), ctx, &e, &mut self.disabled);
                false
            }
        }
    }

    fn draw(&mut self, ctx: &mut DisplayPipelineContext, _list: &LayerList) -> HwcResult<()> {
        let result = match &self.target {
            Some(target) => self.buffers.queue(ctx, 0, target),
            None => Ok(()),
        };
        self.buffers.finish();
        result
    }

    fn reset(&mut self) {
        self.target = None;
    }

    fn claimed(&self) -> &[usize] {
        &[]
    }

    fn release_buffers(&mut self) {
        self.buffers.release();
    }
}
