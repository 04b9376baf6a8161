//! hwc: the per-display prepare/set cycle. `prepare` offers the frame to each composition
//! policy in priority order and the first one that takes it owns the overlay until the next
//! frame; `set` queues that policy's buffers and exchanges fences with the driver.
//!
//! A claimed frame is not offered further down the list, so layers the winner leaves to the
//! framebuffer are never picked up by MDP composition in the same frame.

use std::fmt::Write;
use std::os::unix::io::RawFd;

use overlay::geometry::Rotation;
use overlay::OverlayState;

use crate::context::DisplayPipelineContext;
use crate::hwc_utils::*;
use crate::layer::Composition;
use crate::layer::LayerList;
use crate::policies::default_policies;
use crate::policies::CompositionPolicy;
use crate::stats::FrameStats;

pub struct HwcComposer {
    ctx: DisplayPipelineContext,
    policies: Vec<Box<dyn CompositionPolicy>>,
    /// Index of the policy that took the last prepared frame.
    active: Option<usize>,
    frames: u64,
}

impl HwcComposer {
    pub fn new(ctx: DisplayPipelineContext) -> HwcComposer {
        HwcComposer::with_policies(ctx, default_policies())
    }

    pub fn with_policies(
        ctx: DisplayPipelineContext,
        policies: Vec<Box<dyn CompositionPolicy>>,
    ) -> HwcComposer {
        HwcComposer {
            ctx,
            policies,
            active: None,
            frames: 0,
        }
    }

    pub fn context(&self) -> &DisplayPipelineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut DisplayPipelineContext {
        &mut self.ctx
    }

    pub fn state(&self) -> OverlayState {
        self.ctx.overlay.state()
    }

    /// Name of the policy that took the last prepared frame.
    pub fn active_policy(&self) -> Option<&'static str> {
        self.active.map(|i| self.policies[i].name())
    }

    pub fn set_orientation(&mut self, orientation: Rotation) {
        self.ctx.orientation = orientation;
        self.ctx.overlay.set_orientation(orientation);
    }

    /// Decides how `list` is composed. Layers a policy scans out are marked `Overlay`, the
    /// rest stay `Framebuffer`. When no policy takes the frame every pipe is closed.
    pub fn prepare(&mut self, list: &mut LayerList) -> OverlayState {
        if let Some(connected) = self.ctx.external.apply_staged() {
            debug!("hwc: applied staged hotplug {}", connected);
        }
        self.ctx.external.set_configuring(true);

        for policy in self.policies.iter_mut() {
            policy.reset();
        }
        for layer in list.layers.iter_mut() {
            layer.composition = Composition::Framebuffer;
        }
        let stats = FrameStats::compute(list);

        self.active = None;
        for (i, policy) in self.policies.iter_mut().enumerate() {
            if !policy.enabled(&self.ctx.config) {
                continue;
            }
            if policy.prepare(&mut self.ctx, list, &stats) {
                debug!("hwc: frame {} taken by {}", self.frames, policy.name());
                self.active = Some(i);
                break;
            }
        }
        if self.active.is_none() && self.ctx.overlay.state() != OverlayState::Closed {
            self.ctx.overlay.close();
        }
        self.frames += 1;
        self.ctx.overlay.state()
    }

    /// Queues the prepared frame and hands the acquire fences to the driver. Returns the
    /// release fence for the frame, if the driver gave one.
    pub fn set(&mut self, list: &LayerList) -> HwcResult<Option<RawFd>> {
        if let Some(i) = self.active {
            if let Err(e) = self.policies[i].draw(&mut self.ctx, list) {
                error!("hwc: {} failed to draw: {}", self.policies[i].name(), e);
                self.ctx.overlay.close();
                self.active = None;
            }
        }
        for (i, policy) in self.policies.iter_mut().enumerate() {
            if Some(i) != self.active {
                policy.release_buffers();
            }
        }
        let fences: Vec<RawFd> = list.layers.iter().filter_map(|l| l.acquire_fence).collect();
        let result = self.ctx.buffer_sync(&fences);
        self.ctx.external.set_configuring(false);
        result
    }

    /// A readable summary of the composition state, pipes and claims.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "overlay state: {}", self.ctx.overlay.state());
        let _ = writeln!(
            out,
            "panel: {}x{}, frames: {}, teardowns: {}",
            self.ctx.fb.xres,
            self.ctx.fb.yres,
            self.frames,
            self.ctx.overlay.teardown_count()
        );
        for pipe in self.ctx.overlay.pipes() {
            match pipe.geometry() {
                Some(g) => {
                    let _ = writeln!(
                        out,
                        "  {} pipe {:?} z {:?} {:?} {} crop {} dst {}",
                        pipe.mixer(),
                        pipe.id(),
                        pipe.z_order(),
                        g.pipe_type,
                        g.format,
                        g.crop,
                        g.dst
                    );
                }
                None => {
                    let _ = writeln!(out, "  {} pipe down", pipe.mixer());
                }
            }
        }
        match self.active {
            Some(i) => {
                let _ = writeln!(
                    out,
                    "policy: {} claimed {:?}",
                    self.policies[i].name(),
                    self.policies[i].claimed()
                );
            }
            None => {
                let _ = writeln!(out, "policy: none");
            }
        }
        let external = self.ctx.external.snapshot();
        let _ = writeln!(
            out,
            "external: connected {} mode {:?} ext-only {}",
            external.connected, external.mode, external.ext_only
        );
        out
    }
}
