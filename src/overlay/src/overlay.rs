//! overlay: the per-display facade over the pipes. One `OverlayState` is active at a time and
//! the pipes it owns live inside the matching `ActiveConfig` variant, so a call can only reach
//! the pipes the state is entitled to address.

use std::mem;
use std::os::unix::io::RawFd;

use crate::device::VisualParam;
use crate::formats::Eye;
use crate::formats::Format3D;
use crate::geometry::*;
use crate::overlay_utils::*;
use crate::pipe::Pipe;
use crate::pipe::PipeParams;
use crate::pipe::PipeResources;
use crate::rotator::ROTATOR_SLOTS;
use crate::rotator::ROTATOR_SLOTS_MIRRORED;
use crate::state::OverlayState;
use crate::zorder::Mixer;

/// Static properties of the display an `Overlay` drives.
#[derive(Copy, Clone, Debug)]
pub struct OverlayConfig {
    pub panel: Dimension,
    /// Whether the primary panel can show stereo content natively.
    pub panel_3d: bool,
    /// Percentages external destinations shrink by, width then height.
    pub action_safe: (f32, f32),
}

impl OverlayConfig {
    pub fn new(panel: Dimension) -> OverlayConfig {
        OverlayConfig {
            panel,
            panel_3d: false,
            action_safe: (0.0, 0.0),
        }
    }
}

/// What the overlay needs to know about a connected external display.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ExternalInfo {
    pub supports_3d: bool,
}

/// How a pipe serves the channel it is routed from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Role {
    /// Takes crop and position as given.
    Panel,
    /// Mirrors onto the external display; positions are letterboxed.
    Tv,
    /// Samples one eye of stereo content, positioned as given.
    Eye(Eye),
    /// Samples one eye and occupies that eye's half of the output.
    StereoEye(Eye),
}

/// The pipes of the active state.
enum ActiveConfig {
    Closed,
    Single(Pipe),
    /// The same content on both mixers. The TV pipe is always driven first.
    Mirrored {
        tv: Pipe,
        panel: Pipe,
    },
    Stereo {
        left: Pipe,
        right: Pipe,
    },
    /// Independent layers, one pipe per channel.
    Multi(Vec<Pipe>),
}

impl ActiveConfig {
    fn into_pipes(self) -> Vec<Pipe> {
        match self {
            ActiveConfig::Closed => Vec::new(),
            ActiveConfig::Single(pipe) => vec![pipe],
            ActiveConfig::Mirrored { tv, panel } => vec![tv, panel],
            ActiveConfig::Stereo { left, right } => vec![left, right],
            ActiveConfig::Multi(pipes) => pipes,
        }
    }

    fn pipes(&self) -> Vec<&Pipe> {
        match self {
            ActiveConfig::Closed => Vec::new(),
            ActiveConfig::Single(pipe) => vec![pipe],
            ActiveConfig::Mirrored { tv, panel } => vec![tv, panel],
            ActiveConfig::Stereo { left, right } => vec![left, right],
            ActiveConfig::Multi(pipes) => pipes.iter().collect(),
        }
    }

    fn channels(&self) -> usize {
        match self {
            ActiveConfig::Closed => 0,
            ActiveConfig::Multi(pipes) => pipes.len(),
            _ => 1,
        }
    }

    /// The pipes behind `channel`, in the order they must be driven.
    fn route(&mut self, state: OverlayState, channel: usize) -> OverlayResult<Vec<(Role, &mut Pipe)>> {
        let invalid = OverlayError::InvalidChannel {
            channel,
            state: state.as_str(),
        };
        match self {
            ActiveConfig::Closed => Err(invalid),
            ActiveConfig::Multi(pipes) => match pipes.get_mut(channel) {
                Some(pipe) => Ok(vec![(Role::Panel, pipe)]),
                None => Err(invalid),
            },
            _ if channel != 0 => Err(invalid),
            ActiveConfig::Single(pipe) => {
                let role = match state {
                    OverlayState::Video3dOn2dPanel => Role::Eye(Eye::Left),
                    _ if pipe.mixer() == Mixer::External => Role::Tv,
                    _ => Role::Panel,
                };
                Ok(vec![(role, pipe)])
            }
            ActiveConfig::Mirrored { tv, panel } => {
                let panel_role = if state.is_3d() {
                    Role::Eye(Eye::Left)
                } else {
                    Role::Panel
                };
                Ok(vec![(Role::Tv, tv), (panel_role, panel)])
            }
            ActiveConfig::Stereo { left, right } => Ok(vec![
                (Role::StereoEye(Eye::Left), left),
                (Role::StereoEye(Eye::Right), right),
            ]),
        }
    }
}

pub struct Overlay {
    resources: PipeResources,
    config: OverlayConfig,
    state: OverlayState,
    active: ActiveConfig,
    orientation: Rotation,
    format_3d: Format3D,
    teardowns: usize,
}

impl Overlay {
    pub fn new(resources: PipeResources, config: OverlayConfig) -> Overlay {
        Overlay {
            resources,
            config,
            state: OverlayState::Closed,
            active: ActiveConfig::Closed,
            orientation: Rotation::None,
            format_3d: Format3D::empty(),
            teardowns: 0,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn set_action_safe(&mut self, action_safe: (f32, f32)) {
        self.config.action_safe = action_safe;
    }

    /// Number of full teardowns forced by entering or leaving a stereo state.
    pub fn teardown_count(&self) -> usize {
        self.teardowns
    }

    /// Independently addressable channels of the current state.
    pub fn channels(&self) -> usize {
        self.active.channels()
    }

    /// Pipes of the current state, in driving order.
    pub fn pipes(&self) -> Vec<&Pipe> {
        self.active.pipes()
    }

    /// The state `src` should be shown in given the current connectivity.
    pub fn desired_state(&self, src: &SourceBuffer, external: Option<ExternalInfo>) -> OverlayState {
        if src.format_3d.is_3d() {
            match external {
                Some(info) if info.supports_3d => OverlayState::Video3dOn3dTv,
                _ if self.config.panel_3d => OverlayState::Video3dOn3dPanel,
                _ => OverlayState::Video3dOn2dPanel,
            }
        } else if external.is_some() {
            OverlayState::VideoOnTv2d
        } else {
            OverlayState::VideoOnPanel2d
        }
    }

    /// Switches to `state`. Entering or leaving a stereo state closes every pipe first, the
    /// doubled stereo framebuffer cannot reuse flat geometry. Otherwise pipes on a mixer the
    /// new state still uses are carried over in order and the rest are closed.
    pub fn set_state(&mut self, state: OverlayState) -> OverlayResult<()> {
        if state == self.state {
            return Ok(());
        }
        info!("overlay: {} -> {}", self.state, state);
        if self.state.is_3d() != state.is_3d() {
            self.close_all();
            self.teardowns += 1;
        }

        let mut pool = mem::replace(&mut self.active, ActiveConfig::Closed).into_pipes();
        let resources = &self.resources;
        let mut take = |mixer: Mixer| match pool.iter().position(|p| p.mixer() == mixer) {
            Some(i) => pool.remove(i),
            None => Pipe::new(mixer, resources.clone()),
        };
        self.active = match state {
            OverlayState::Closed => ActiveConfig::Closed,
            OverlayState::VideoOnPanel2d | OverlayState::Video3dOn2dPanel => {
                ActiveConfig::Single(take(Mixer::Primary))
            }
            OverlayState::UiMirror | OverlayState::DualDisplay => {
                ActiveConfig::Single(take(Mixer::External))
            }
            OverlayState::VideoOnTv2d
            | OverlayState::Video3dOn3dTv
            | OverlayState::TrueUiMirror => ActiveConfig::Mirrored {
                tv: take(Mixer::External),
                panel: take(Mixer::Primary),
            },
            OverlayState::Video3dOn3dPanel => ActiveConfig::Stereo {
                left: take(Mixer::Primary),
                right: take(Mixer::Primary),
            },
            OverlayState::PipVideoOnPanel
            | OverlayState::Bypass1Layer
            | OverlayState::Bypass2Layer
            | OverlayState::Bypass3Layer => {
                ActiveConfig::Multi(state.mixers().iter().map(|m| take(*m)).collect())
            }
        };
        for mut pipe in pool {
            pipe.close();
        }
        self.state = state;
        Ok(())
    }

    /// Picks the state for `src`, switches to it and starts every pipe of channel 0 on `src`.
    /// Pipes already showing an identical source with compatible parameters only get their
    /// flags updated.
    pub fn set_source(
        &mut self,
        src: &SourceBuffer,
        orientation: Rotation,
        external: Option<ExternalInfo>,
        flags: PipeFlags,
    ) -> OverlayResult<OverlayState> {
        let state = self.desired_state(src, external);
        self.orientation = orientation;
        self.set_state(state)?;
        self.set_channel_source(0, src, flags, false)?;
        Ok(state)
    }

    /// Starts the pipes behind `channel` on `src`.
    pub fn set_channel_source(
        &mut self,
        channel: usize,
        src: &SourceBuffer,
        flags: PipeFlags,
        is_ui: bool,
    ) -> OverlayResult<()> {
        let state = self.state;
        if channel == 0 {
            self.format_3d = src.format_3d;
        }
        let mirrored = matches!(self.active, ActiveConfig::Mirrored { .. });
        let result = self.active.route(state, channel).and_then(|pipes| {
            for (role, pipe) in pipes {
                let mut pipe_flags = flags;
                if role == Role::Tv && mirrored {
                    pipe_flags |= PipeFlags::MIRROR;
                }
                let params = PipeParams::new(pipe.mixer())
                    .flags(pipe_flags)
                    .ui(is_ui)
                    .rotator_slots(if mirrored {
                        ROTATOR_SLOTS_MIRRORED
                    } else {
                        ROTATOR_SLOTS
                    });
                let reusable = pipe.is_up()
                    && pipe.source() == Some(src)
                    && pipe.params().map_or(false, |p| !p.needs_restart(&params));
                if reusable {
                    pipe.update_flags(pipe_flags)?;
                    continue;
                }
                pipe.start(src, &params)?;
            }
            Ok(())
        });
        if let Err(e) = &result {
            if !matches!(e, OverlayError::InvalidChannel { .. }) {
                error!("overlay: {} channel {} failed to start: {}", state, channel, e);
                self.close();
            }
        }
        result
    }

    /// Sets the crop of `channel` in unrotated source coordinates. Eye pipes sample the
    /// matching part of their eye's region.
    pub fn set_crop(&mut self, channel: usize, crop: Rect) -> OverlayResult<()> {
        let format_3d = self.format_3d;
        for (role, pipe) in self.active.route(self.state, channel)? {
            let crop = match role {
                Role::Eye(eye) | Role::StereoEye(eye) => match pipe.source() {
                    Some(src) => eye_crop(format_3d, eye, crop, src.width, src.height),
                    None => crop,
                },
                Role::Panel | Role::Tv => crop,
            };
            pipe.set_crop(crop)?;
        }
        Ok(())
    }

    /// Positions `channel` at `dst` in primary panel coordinates. Pipes on the external mixer
    /// are letterboxed into the external frame relative to the panel's orientation.
    pub fn set_position(&mut self, channel: usize, dst: Rect) -> OverlayResult<()> {
        let panel = self.config.panel;
        let action_safe = self.config.action_safe;
        let orientation = self.orientation;
        let format_3d = self.format_3d;
        for (role, pipe) in self.active.route(self.state, channel)? {
            let dst = match role {
                Role::Panel | Role::Eye(_) => dst,
                Role::Tv => aspect_ratio_position(
                    panel,
                    pipe.screen().dimension(),
                    orientation,
                    dst,
                    action_safe,
                ),
                Role::StereoEye(eye) => stereo_half(format_3d, eye, dst),
            };
            pipe.set_position(dst)?;
        }
        Ok(())
    }

    /// Applies `transform` to `channel`.
    pub fn set_transform(&mut self, channel: usize, transform: Transform) -> OverlayResult<()> {
        for (_, pipe) in self.active.route(self.state, channel)? {
            pipe.set_transform(transform)?;
        }
        Ok(())
    }

    /// Records the panel rotation used when mirroring positions onto the external display.
    pub fn set_orientation(&mut self, orientation: Rotation) {
        self.orientation = orientation;
    }

    pub fn set_visual_param(
        &mut self,
        channel: usize,
        param: VisualParam,
        value: i32,
    ) -> OverlayResult<()> {
        for (_, pipe) in self.active.route(self.state, channel)? {
            pipe.set_visual_param(param, value)?;
        }
        Ok(())
    }

    pub fn commit(&mut self, channel: usize) -> OverlayResult<()> {
        for (_, pipe) in self.active.route(self.state, channel)? {
            pipe.commit()?;
        }
        Ok(())
    }

    pub fn set_fd(&mut self, channel: usize, fd: RawFd) -> OverlayResult<()> {
        for (_, pipe) in self.active.route(self.state, channel)? {
            pipe.set_fd(fd)?;
        }
        Ok(())
    }

    /// Queues the buffer at `offset` on `channel`. Mirrored states play the TV pipe, then the
    /// panel pipe, then wait for the external vsync so the pair lands within one TV refresh.
    pub fn queue_buffer(&mut self, channel: usize, offset: u32) -> OverlayResult<()> {
        let mirrored = matches!(self.active, ActiveConfig::Mirrored { .. });
        let mut pipes = self.active.route(self.state, channel)?;
        for (_, pipe) in pipes.iter_mut() {
            pipe.queue_buffer(offset)?;
        }
        if mirrored {
            if let Some((_, tv)) = pipes.into_iter().find(|(role, _)| *role == Role::Tv) {
                tv.wait_for_hdmi_vsync()?;
            }
        }
        Ok(())
    }

    /// Closes the pipe behind a multi-layer `channel` and falls back to the state that matches
    /// the remaining pipes. The other pipes keep their z-orders.
    pub fn release_channel(&mut self, channel: usize) -> OverlayResult<()> {
        let mut pipes = match mem::replace(&mut self.active, ActiveConfig::Closed) {
            ActiveConfig::Multi(pipes) if channel < pipes.len() => pipes,
            other => {
                self.active = other;
                return Err(OverlayError::InvalidChannel {
                    channel,
                    state: self.state.as_str(),
                });
            }
        };
        pipes.remove(channel).close();
        let state = match (self.state, pipes.len()) {
            (_, 0) => OverlayState::Closed,
            (OverlayState::PipVideoOnPanel, _) => OverlayState::VideoOnPanel2d,
            (_, n) => OverlayState::bypass(n).unwrap_or(OverlayState::Closed),
        };
        info!("overlay: released channel {}, {} -> {}", channel, self.state, state);
        self.active = ActiveConfig::Multi(pipes);
        self.set_state(state)
    }

    fn close_all(&mut self) {
        for mut pipe in mem::replace(&mut self.active, ActiveConfig::Closed).into_pipes() {
            pipe.close();
        }
    }

    /// Closes every pipe and returns to `Closed`.
    pub fn close(&mut self) {
        self.close_all();
        if self.state != OverlayState::Closed {
            info!("overlay: {} -> {}", self.state, OverlayState::Closed);
        }
        self.state = OverlayState::Closed;
        self.format_3d = Format3D::empty();
    }
}

/// The part of `crop` that falls in `eye`'s region of a `width` x `height` packed frame.
fn eye_crop(format_3d: Format3D, eye: Eye, crop: Rect, width: u32, height: u32) -> Rect {
    let (rx, ry, rw, rh) = format_3d.eye_region(eye, width, height);
    let scale = |v: u32, region: u32, full: u32| {
        if full == 0 {
            v
        } else {
            (v as u64 * region as u64 / full as u64) as u32
        }
    };
    Rect {
        x: rx + scale(crop.x, rw, width),
        y: ry + scale(crop.y, rh, height),
        w: scale(crop.w, rw, width),
        h: scale(crop.h, rh, height),
    }
}

/// The half of `dst` an eye occupies for the output packing in `format_3d`.
fn stereo_half(format_3d: Format3D, eye: Eye, dst: Rect) -> Rect {
    let output = format_3d.output();
    if output.contains(Format3D::OUT_SIDE_BY_SIDE) {
        let w = dst.w / 2;
        match eye {
            Eye::Left => Rect::new(dst.x, dst.y, w, dst.h),
            Eye::Right => Rect::new(dst.x + w, dst.y, w, dst.h),
        }
    } else if output.contains(Format3D::OUT_TOP_BOTTOM) {
        let h = dst.h / 2;
        match eye {
            Eye::Left => Rect::new(dst.x, dst.y, dst.w, h),
            Eye::Right => Rect::new(dst.x, dst.y + h, dst.w, h),
        }
    } else {
        dst
    }
}
