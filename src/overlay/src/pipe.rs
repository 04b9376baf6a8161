//! pipe: one hardware scaler/blender lane. A `Pipe` owns both the configuration of the kernel
//! pipe and the buffer hand-off to it, so the rotation state that crop remapping depends on
//! exists in exactly one place.
//!
//! Within a frame the configuration calls must run in the order `start`, `set_crop`,
//! `set_transform`, `set_position`, `commit`, and only then `queue_buffer`. Every call other
//! than `start` and `close` requires the pipe to be up.

use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::aligner::SurfaceAligner;
use crate::device::DeviceFactory;
use crate::device::MdpDevice;
use crate::device::PipeId;
use crate::device::PlayRequest;
use crate::device::ScreenInfo;
use crate::device::VisualParam;
use crate::formats::PixelFormat;
use crate::geometry::*;
use crate::overlay_utils::*;
use crate::rotator::RotatorSession;
use crate::rotator::ROTATOR_SLOTS;
use crate::zorder::Mixer;
use crate::zorder::ZOrder;
use crate::zorder::ZOrderManager;

/// The shared collaborators every pipe of a display needs.
#[derive(Clone)]
pub struct PipeResources {
    pub factory: Arc<dyn DeviceFactory>,
    pub zorder: Arc<ZOrderManager>,
    pub aligner: Arc<dyn SurfaceAligner>,
}

/// How a pipe should be brought up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PipeParams {
    pub mixer: Mixer,
    pub flags: PipeFlags,
    /// UI pipes are opaque foreground stages.
    pub is_ui: bool,
    /// Lane to request; derived from the source format when `None`.
    pub pipe_type: Option<PipeType>,
    pub rotator_slots: usize,
}

impl PipeParams {
    pub fn new(mixer: Mixer) -> PipeParams {
        PipeParams {
            mixer,
            flags: PipeFlags::empty(),
            is_ui: false,
            pipe_type: None,
            rotator_slots: ROTATOR_SLOTS,
        }
    }

    pub fn flags(mut self, flags: PipeFlags) -> PipeParams {
        self.flags = flags;
        self
    }

    pub fn ui(mut self, is_ui: bool) -> PipeParams {
        self.is_ui = is_ui;
        self
    }

    pub fn pipe_type(mut self, pipe_type: PipeType) -> PipeParams {
        self.pipe_type = Some(pipe_type);
        self
    }

    pub fn rotator_slots(mut self, slots: usize) -> PipeParams {
        self.rotator_slots = slots;
        self
    }

    /// Whether a pipe started with `self` has to be restarted to match `other`. Flags other
    /// than `NO_ROT` can change in place.
    pub fn needs_restart(&self, other: &PipeParams) -> bool {
        let no_rot = self.flags.contains(PipeFlags::NO_ROT);
        self.mixer != other.mixer
            || self.is_ui != other.is_ui
            || self.pipe_type != other.pipe_type
            || no_rot != other.flags.contains(PipeFlags::NO_ROT)
            || (!no_rot && self.rotator_slots != other.rotator_slots)
    }
}

pub struct Pipe {
    resources: PipeResources,
    mixer: Mixer,
    mdp: Option<Box<dyn MdpDevice>>,
    rotator: Option<RotatorSession>,
    id: Option<PipeId>,
    z: Option<ZOrder>,
    screen: ScreenInfo,
    source: Option<SourceBuffer>,
    geometry: Option<PipeGeometry>,
    /// Padded size and format of the source as started, before any rotator.
    unrotated: Option<(Dimension, PixelFormat)>,
    params: Option<PipeParams>,
    fd: Option<RawFd>,
    visual: BTreeMap<VisualParam, i32>,
}

impl Pipe {
    pub fn new(mixer: Mixer, resources: PipeResources) -> Pipe {
        Pipe {
            resources,
            mixer,
            mdp: None,
            rotator: None,
            id: None,
            z: None,
            screen: ScreenInfo::default(),
            source: None,
            geometry: None,
            unrotated: None,
            params: None,
            fd: None,
            visual: BTreeMap::new(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.id.is_some()
    }

    pub fn mixer(&self) -> Mixer {
        self.mixer
    }

    pub fn id(&self) -> Option<PipeId> {
        self.id
    }

    pub fn z_order(&self) -> Option<ZOrder> {
        self.z
    }

    pub fn screen(&self) -> ScreenInfo {
        self.screen
    }

    pub fn source(&self) -> Option<&SourceBuffer> {
        self.source.as_ref()
    }

    /// What the pipe was last started with.
    pub fn params(&self) -> Option<&PipeParams> {
        self.params.as_ref()
    }

    /// The geometry last committed to the driver.
    pub fn geometry(&self) -> Option<&PipeGeometry> {
        self.geometry.as_ref()
    }

    pub fn has_rotator(&self) -> bool {
        self.rotator.is_some()
    }

    pub fn visual_param(&self, param: VisualParam) -> Option<i32> {
        self.visual.get(&param).copied()
    }

    fn require_up(&self) -> OverlayResult<PipeId> {
        self.id.ok_or(OverlayError::ChannelDown(self.mixer))
    }

    fn unrotated(&self) -> OverlayResult<(Dimension, PixelFormat)> {
        self.unrotated.ok_or(OverlayError::ChannelDown(self.mixer))
    }

    fn mdp(&mut self) -> OverlayResult<&mut Box<dyn MdpDevice>> {
        let mixer = self.mixer;
        self.mdp.as_mut().ok_or(OverlayError::ChannelDown(mixer))
    }

    /// Opens the mixer (and the rotator unless `NO_ROT` is set), claims a z-order and creates
    /// the kernel pipe for `src`. Tiled sources are programmed with their tile-padded size and
    /// cropped back to `src`'s real size. A started pipe is closed and started afresh.
    ///
    /// On failure the pipe is left closed.
    pub fn start(&mut self, src: &SourceBuffer, params: &PipeParams) -> OverlayResult<()> {
        self.close();
        self.mixer = params.mixer;
        let result = self.try_start(src, params);
        if let Err(e) = &result {
            error!("{}: failed to start pipe: {}", self.mixer, e);
            self.close();
        }
        result
    }

    fn try_start(&mut self, src: &SourceBuffer, params: &PipeParams) -> OverlayResult<()> {
        if src.width == 0 || src.height == 0 {
            return Err(OverlayError::InvalidSource("empty source"));
        }

        let mdp = self.resources.factory.open_mdp(self.mixer)?;
        self.screen = mdp.screen_info()?;
        self.mdp = Some(mdp);

        if !params.flags.contains(PipeFlags::NO_ROT) {
            let rotator = self.resources.factory.open_rotator()?;
            self.rotator = Some(RotatorSession::new(rotator, params.rotator_slots));
        }

        let z = self.resources.zorder.get_z(self.mixer)?;
        self.z = Some(z);

        let (w, h) = self
            .resources
            .aligner
            .aligned_dimensions(src.width, src.height, src.format);
        let (w, h) = src.format.aligned_dimensions(w, h)?;

        let mut geometry = PipeGeometry::new(Dimension::new(w, h), src.format);
        geometry.crop = Rect::new(0, 0, src.width, src.height);
        geometry.dst = Rect::new(
            0,
            0,
            src.width.min(self.screen.xres),
            src.height.min(self.screen.yres),
        );
        geometry.z_order = z;
        geometry.flags = params.flags;
        if params.is_ui {
            geometry.flags |= PipeFlags::FG;
        }
        geometry.pipe_type = params
            .pipe_type
            .unwrap_or_else(|| PipeType::for_format(src.format));

        let id = self.mdp()?.overlay_set(None, &geometry)?;
        info!(
            "{}: pipe {} up, z {}, src {}x{} {} crop {}",
            self.mixer, id, z, w, h, src.format, geometry.crop
        );
        self.id = Some(id);
        self.geometry = Some(geometry);
        self.unrotated = Some((geometry.src, geometry.format));
        self.params = Some(*params);
        self.source = Some(*src);
        Ok(())
    }

    /// Cached geometry refreshed with the crop and position the driver currently holds. The
    /// transform is owned by the pipe.
    fn fetch(&mut self) -> OverlayResult<PipeGeometry> {
        let id = self.require_up()?;
        let mut geometry = self.geometry.ok_or(OverlayError::ChannelDown(self.mixer))?;
        let hw = self.mdp()?.overlay_get(id)?;
        geometry.crop = hw.crop;
        geometry.dst = hw.dst;
        Ok(geometry)
    }

    /// Programs `geometry`. A rejected update tears the pipe down.
    fn commit_geometry(&mut self, geometry: PipeGeometry) -> OverlayResult<()> {
        let id = self.require_up()?;
        match self.mdp()?.overlay_set(Some(id), &geometry) {
            Ok(_) => {
                self.geometry = Some(geometry);
                Ok(())
            }
            Err(e) => {
                error!("{}: pipe {} rejected {:?}: {}", self.mixer, id, geometry, e);
                self.close();
                Err(e)
            }
        }
    }

    /// Moves the pipe's output to `dst`. The rectangle must lie inside the mixer and keep the
    /// scale factor within the pipe limit; callers clip beforehand.
    pub fn set_position(&mut self, dst: Rect) -> OverlayResult<()> {
        self.require_up()?;
        if dst.is_empty() || !dst.fits_in(self.screen.xres, self.screen.yres) {
            error!("{}: position {} out of bounds", self.mixer, dst);
            return Err(OverlayError::InvalidPosition {
                x: dst.x,
                y: dst.y,
                w: dst.w,
                h: dst.h,
                fb_w: self.screen.xres,
                fb_h: self.screen.yres,
            });
        }
        let mut geometry = self.fetch()?;
        if !PipeGeometry::scale_in_range(&geometry.crop, &dst) {
            error!(
                "{}: scaling {} to {} exceeds the pipe limit",
                self.mixer, geometry.crop, dst
            );
            return Err(OverlayError::ScaleOutOfRange {
                src_w: geometry.crop.w,
                src_h: geometry.crop.h,
                dst_w: dst.w,
                dst_h: dst.h,
            });
        }
        if geometry.dst == dst {
            return Ok(());
        }
        geometry.dst = dst;
        self.commit_geometry(geometry)
    }

    /// Applies `transform`. Pipes started with `NO_ROT` ignore transforms, their source is
    /// already oriented. Otherwise the crop is carried into the new rotation's frame and the
    /// paired rotator session is reconfigured. While a rotation is in effect the pipe scans
    /// the rotator's output, so it is programmed with that buffer's size and format.
    pub fn set_transform(&mut self, transform: Transform) -> OverlayResult<()> {
        self.require_up()?;
        if self.rotator.is_none() {
            debug!("{}: no rotator, ignoring transform {:?}", self.mixer, transform);
            return Ok(());
        }
        let (src, _) = self.unrotated()?;
        let mut geometry = self.fetch()?;
        if geometry.transform == transform {
            return Ok(());
        }
        let from = geometry.transform.rotation();
        let to = transform.rotation();
        geometry.crop = remap_crop(geometry.crop, src, from, to);
        geometry.transform = transform;

        if let Err(e) = self.configure_rotator(&mut geometry) {
            self.close();
            return Err(e);
        }
        self.commit_geometry(geometry)
    }

    fn configure_rotator(&mut self, geometry: &mut PipeGeometry) -> OverlayResult<()> {
        let (src, format) = self.unrotated()?;
        let rotator = match self.rotator.as_mut() {
            Some(rotator) => rotator,
            None => return Ok(()),
        };
        let rotation = geometry.transform.rotation();
        if rotation == Rotation::None {
            rotator.close();
            geometry.src = src;
            geometry.format = format;
            geometry.flags.remove(PipeFlags::PREROTATED);
            return Ok(());
        }
        let unrotated_crop = remap_crop(geometry.crop, src, rotation, Rotation::None);
        let info = RotatorSession::session_info(
            src,
            format,
            unrotated_crop,
            geometry.transform,
            geometry.flags.contains(PipeFlags::SECURE),
        );
        geometry.src = info.dst;
        geometry.format = info.dst_format;
        geometry.flags.insert(PipeFlags::PREROTATED);
        rotator.configure(info)
    }

    /// Crops the source to `crop`, given in unrotated source coordinates. The rotation is read
    /// back from the driver, the crop is carried into that rotation's frame and evened out for
    /// chroma subsampling.
    pub fn set_crop(&mut self, crop: Rect) -> OverlayResult<()> {
        self.require_up()?;
        let (src, _) = self.unrotated()?;
        let mut geometry = self.fetch()?;
        if crop.is_empty() || !crop.fits_in(src.width, src.height) {
            return Err(OverlayError::InvalidCrop {
                x: crop.x,
                y: crop.y,
                w: crop.w,
                h: crop.h,
                src_w: src.width,
                src_h: src.height,
            });
        }
        let mut crop = remap_crop(
            crop,
            src,
            Rotation::None,
            geometry.transform.rotation(),
        );
        normalize_crop(&mut crop.x, &mut crop.w);
        normalize_crop(&mut crop.y, &mut crop.h);
        if crop == geometry.crop {
            return Ok(());
        }
        geometry.crop = crop;
        if self.rotator.as_ref().map_or(false, |r| r.is_started()) {
            if let Err(e) = self.configure_rotator(&mut geometry) {
                self.close();
                return Err(e);
            }
        }
        self.commit_geometry(geometry)
    }

    /// Adjusts a post-processing knob. The value sticks until changed or the pipe closes.
    pub fn set_visual_param(&mut self, param: VisualParam, value: i32) -> OverlayResult<()> {
        let id = self.require_up()?;
        let value = VisualParam::validate(value)?;
        self.mdp()?.set_visual_param(id, param, value)?;
        self.visual.insert(param, value);
        let mut geometry = self.fetch()?;
        if param == VisualParam::Sharpness {
            geometry.flags.set(PipeFlags::SHARPENING, value != 0);
        }
        self.commit_geometry(geometry)
    }

    /// Replaces the pipe flags without reopening anything. `NO_ROT` is fixed at start.
    pub fn update_flags(&mut self, flags: PipeFlags) -> OverlayResult<()> {
        self.require_up()?;
        let mut geometry = self.fetch()?;
        let fixed = PipeFlags::NO_ROT | PipeFlags::FG | PipeFlags::PREROTATED;
        let keep = geometry.flags & fixed;
        let flags = (flags - fixed) | keep;
        if geometry.flags == flags {
            return Ok(());
        }
        geometry.flags = flags;
        self.commit_geometry(geometry)
    }

    /// Re-sends the cached geometry, locking it in for the next queued buffer, and re-applies
    /// the visual parameters the driver resets on every set.
    pub fn commit(&mut self) -> OverlayResult<()> {
        let id = self.require_up()?;
        let geometry = self.geometry.ok_or(OverlayError::ChannelDown(self.mixer))?;
        self.commit_geometry(geometry)?;
        let visual: Vec<(VisualParam, i32)> = self.visual.iter().map(|(p, v)| (*p, *v)).collect();
        for (param, value) in visual {
            self.mdp()?.set_visual_param(id, param, value)?;
        }
        Ok(())
    }

    /// Tears the pipe down: rotator session, kernel pipe, z-order slot and cached state.
    /// Closing a closed pipe does nothing.
    pub fn close(&mut self) {
        if let Some(mut rotator) = self.rotator.take() {
            rotator.close();
        }
        if let Some(id) = self.id.take() {
            if let Some(mdp) = self.mdp.as_mut() {
                match mdp.overlay_unset(id) {
                    Ok(()) => debug!("{}: pipe {} closed", self.mixer, id),
                    Err(e) => warn!("{}: failed to unset pipe {}: {}", self.mixer, id, e),
                }
            }
        }
        if let Some(z) = self.z.take() {
            self.resources.zorder.dec_z(self.mixer, z);
        }
        self.mdp = None;
        self.screen = ScreenInfo::default();
        self.source = None;
        self.geometry = None;
        self.unrotated = None;
        self.params = None;
        self.fd = None;
        self.visual.clear();
    }

    /// Attaches the descriptor subsequent `queue_buffer` offsets refer to.
    pub fn set_fd(&mut self, fd: RawFd) -> OverlayResult<()> {
        self.require_up()?;
        self.fd = Some(fd);
        Ok(())
    }

    /// Submits the buffer at `offset` of the attached descriptor, through the rotator when a
    /// rotation is in effect.
    pub fn queue_buffer(&mut self, offset: u32) -> OverlayResult<()> {
        let id = self.require_up()?;
        let fd = self.fd.ok_or(OverlayError::NoSourceFd)?;
        let (fd, offset) = match self.rotator.as_mut() {
            Some(rotator) if rotator.is_started() => {
                let rotated = rotator.rotate(fd, offset)?;
                (rotated.fd, rotated.offset)
            }
            _ => (fd, offset),
        };
        let mixer = self.mixer;
        self.mdp()?
            .overlay_play(&PlayRequest { id, fd, offset })
            .map_err(|e| {
                error!("{}: failed to play on pipe {}: {}", mixer, id, e);
                e
            })
    }

    /// Blocks until the next vsync of this pipe's mixer.
    pub fn wait_for_hdmi_vsync(&mut self) -> OverlayResult<()> {
        self.require_up()?;
        self.mdp()?.wait_for_vsync()
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::NoopAligner;
    use crate::device::fake::DeviceCall;
    use crate::device::fake::FakeDevices;
    use crate::formats::Format3D;
    use crate::formats::PixelFormat;

    const NV12: PixelFormat = PixelFormat::YCbCr420SemiPlanar;
    const TILED: PixelFormat = PixelFormat::YCbCr420SemiPlanarTiled;

    fn resources(devices: &FakeDevices) -> PipeResources {
        PipeResources {
            factory: Arc::new(devices.clone()),
            zorder: Arc::new(ZOrderManager::new(false)),
            aligner: Arc::new(NoopAligner),
        }
    }

    fn source(width: u32, height: u32, format: PixelFormat) -> SourceBuffer {
        SourceBuffer {
            width,
            height,
            format,
            format_3d: Format3D::empty(),
            size: format.frame_size(width, height).unwrap(),
        }
    }

    fn video_pipe(devices: &FakeDevices) -> Pipe {
        let mut pipe = Pipe::new(Mixer::Primary, resources(devices));
        pipe.start(
            &source(1280, 720, NV12),
            &PipeParams::new(Mixer::Primary),
        )
        .unwrap();
        pipe
    }

    #[test]
    fn start_claims_a_z_order() {
        let devices = FakeDevices::new(1920, 1080);
        let res = resources(&devices);
        let mut pipe = Pipe::new(Mixer::Primary, res.clone());
        pipe.start(
            &source(1280, 720, NV12),
            &PipeParams::new(Mixer::Primary),
        )
        .unwrap();
        assert!(pipe.is_up());
        assert_eq!(pipe.z_order(), Some(0));
        assert_eq!(res.zorder.in_use(Mixer::Primary), 1);
        let g = pipe.geometry().unwrap();
        assert_eq!(g.pipe_type, PipeType::Vg);
        assert_eq!(g.crop, Rect::new(0, 0, 1280, 720));
        assert_eq!(devices.active_pipes(Mixer::Primary).len(), 1);
    }

    #[test]
    fn tiled_source_is_padded_then_cropped_back() {
        let devices = FakeDevices::new(1920, 1080);
        for &(w, h) in &[(1280, 720), (1920, 1080), (176, 144), (854, 480), (65, 33)] {
            let mut pipe = Pipe::new(Mixer::Primary, resources(&devices));
            pipe.start(
                &source(w, h, TILED),
                &PipeParams::new(Mixer::Primary),
            )
            .unwrap();
            let g = *pipe.geometry().unwrap();
            assert!(g.src.width >= w && g.src.height >= h);
            assert_eq!(g.src.width % 64, 0);
            assert_eq!(g.src.height % 32, 0);
            let hw = devices
                .active_pipes(Mixer::Primary)
                .into_iter()
                .find(|p| p.z_order == g.z_order)
                .unwrap();
            assert_eq!((hw.crop.w, hw.crop.h), (w, h));
            assert_eq!((hw.crop.x, hw.crop.y), (0, 0));
        }
    }

    #[test]
    fn start_failure_leaves_pipe_closed() {
        let devices = FakeDevices::new(1920, 1080);
        devices.reject_overlay_set(Mixer::Primary, true);
        let res = resources(&devices);
        let mut pipe = Pipe::new(Mixer::Primary, res.clone());
        assert!(pipe
            .start(
                &source(1280, 720, NV12),
                &PipeParams::new(Mixer::Primary)
            )
            .is_err());
        assert!(!pipe.is_up());
        assert_eq!(res.zorder.in_use(Mixer::Primary), 0);
        assert!(matches!(
            pipe.set_position(Rect::new(0, 0, 10, 10)),
            Err(OverlayError::ChannelDown(_))
        ));
    }

    #[test]
    fn missing_mixer_is_unavailable() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = Pipe::new(Mixer::External, resources(&devices));
        let err = pipe
            .start(
                &source(1280, 720, NV12),
                &PipeParams::new(Mixer::External),
            )
            .unwrap_err();
        assert!(err.is_device_unavailable());
    }

    #[test]
    fn exhausted_pool_fails_start() {
        let devices = FakeDevices::new(1920, 1080);
        let res = resources(&devices);
        let mut a = Pipe::new(Mixer::Primary, res.clone());
        let mut b = Pipe::new(Mixer::Primary, res.clone());
        let mut c = Pipe::new(Mixer::Primary, res.clone());
        let src = source(640, 480, NV12);
        a.start(&src, &PipeParams::new(Mixer::Primary)).unwrap();
        b.start(&src, &PipeParams::new(Mixer::Primary)).unwrap();
        let err = c.start(&src, &PipeParams::new(Mixer::Primary)).unwrap_err();
        assert!(err.is_resource_exhaustion());
        assert_eq!(res.zorder.in_use(Mixer::Primary), 2);
    }

    #[test]
    fn position_is_validated() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = video_pipe(&devices);
        pipe.set_position(Rect::new(0, 0, 1920, 1080)).unwrap();
        assert_eq!(pipe.geometry().unwrap().dst, Rect::new(0, 0, 1920, 1080));

        assert!(matches!(
            pipe.set_position(Rect::new(100, 0, 1920, 1080)),
            Err(OverlayError::InvalidPosition { .. })
        ));
        assert!(matches!(
            pipe.set_position(Rect::new(0, 0, 100, 1080)),
            Err(OverlayError::ScaleOutOfRange { .. })
        ));
        // Rejections of bad input leave the pipe up.
        assert!(pipe.is_up());
        assert_eq!(pipe.geometry().unwrap().dst, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn crop_is_evened_out() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = video_pipe(&devices);
        pipe.set_crop(Rect::new(1, 3, 641, 357)).unwrap();
        assert_eq!(pipe.geometry().unwrap().crop, Rect::new(2, 4, 640, 356));
        assert!(matches!(
            pipe.set_crop(Rect::new(0, 0, 1281, 720)),
            Err(OverlayError::InvalidCrop { .. })
        ));
    }

    #[test]
    fn transform_remaps_crop_and_starts_rotator() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = video_pipe(&devices);
        pipe.set_crop(Rect::new(100, 50, 400, 300)).unwrap();
        pipe.set_transform(Transform::ROT_90).unwrap();
        let g = *pipe.geometry().unwrap();
        assert_eq!(g.transform, Transform::ROT_90);
        assert_eq!(g.crop, Rect::new(50, 780, 300, 400));
        assert_eq!(
            devices.count(|c| matches!(c, DeviceCall::RotatorStart { .. })),
            1
        );

        // A crop set after the rotation is read back in the rotated frame.
        pipe.set_crop(Rect::new(0, 0, 1280, 720)).unwrap();
        assert_eq!(pipe.geometry().unwrap().crop, Rect::new(0, 0, 720, 1280));

        pipe.set_transform(Transform::empty()).unwrap();
        assert_eq!(pipe.geometry().unwrap().crop, Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn rotated_tiled_source_scans_the_rotator_output() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = Pipe::new(Mixer::Primary, resources(&devices));
        pipe.start(
            &source(1280, 720, TILED),
            &PipeParams::new(Mixer::Primary),
        )
        .unwrap();
        assert_eq!(pipe.geometry().unwrap().src, Dimension::new(1280, 736));

        pipe.set_transform(Transform::ROT_90).unwrap();
        let g = *pipe.geometry().unwrap();
        assert_eq!(g.format, TILED.rotator_output());
        assert_eq!(g.src, Dimension::new(736, 1280));
        assert!(g.flags.contains(PipeFlags::PREROTATED));
        assert_eq!(g.crop, Rect::new(0, 0, 720, 1280));
        let hw = devices.active_pipes(Mixer::Primary)[0];
        assert_eq!((hw.format, hw.src), (g.format, g.src));

        // Crops are still given against the unrotated source.
        pipe.set_crop(Rect::new(0, 0, 1280, 720)).unwrap();
        assert!(pipe.set_crop(Rect::new(0, 0, 1280, 737)).is_err());

        pipe.set_transform(Transform::empty()).unwrap();
        let g = *pipe.geometry().unwrap();
        assert_eq!(g.format, TILED);
        assert_eq!(g.src, Dimension::new(1280, 736));
        assert!(!g.flags.contains(PipeFlags::PREROTATED));
        assert_eq!(g.crop, Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn no_rot_pipe_ignores_transform() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = Pipe::new(Mixer::Primary, resources(&devices));
        pipe.start(
            &source(1280, 720, NV12),
            &PipeParams::new(Mixer::Primary).flags(PipeFlags::NO_ROT),
        )
        .unwrap();
        assert!(!pipe.has_rotator());
        pipe.set_transform(Transform::ROT_90).unwrap();
        assert_eq!(pipe.geometry().unwrap().transform, Transform::empty());
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::OpenRotator)), 0);
    }

    #[test]
    fn queue_requires_fd_and_goes_through_rotator() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = video_pipe(&devices);
        assert!(matches!(pipe.queue_buffer(0), Err(OverlayError::NoSourceFd)));

        pipe.set_fd(7).unwrap();
        pipe.queue_buffer(4096).unwrap();
        assert!(devices
            .calls()
            .contains(&DeviceCall::Play {
                mixer: Mixer::Primary,
                id: pipe.id().unwrap(),
                fd: 7,
                offset: 4096,
            }));

        pipe.set_transform(Transform::ROT_270).unwrap();
        pipe.queue_buffer(0).unwrap();
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::Rotate(_))), 1);
        let last = devices.calls().pop().unwrap();
        assert!(matches!(last, DeviceCall::Play { fd, .. } if fd != 7));
    }

    #[test]
    fn visual_params_persist_until_close() {
        let devices = FakeDevices::new(1920, 1080);
        let mut pipe = video_pipe(&devices);
        pipe.set_visual_param(VisualParam::Sharpness, 40).unwrap();
        assert_eq!(pipe.visual_param(VisualParam::Sharpness), Some(40));
        assert!(pipe
            .geometry()
            .unwrap()
            .flags
            .contains(PipeFlags::SHARPENING));
        pipe.set_crop(Rect::new(0, 0, 640, 360)).unwrap();
        assert_eq!(pipe.visual_param(VisualParam::Sharpness), Some(40));
        devices.clear_calls();
        pipe.commit().unwrap();
        assert_eq!(
            devices.count(|c| matches!(
                c,
                DeviceCall::VisualParam {
                    param: VisualParam::Sharpness,
                    value: 40,
                    ..
                }
            )),
            1
        );
        assert!(pipe.set_visual_param(VisualParam::Hue, 500).is_err());
        pipe.close();
        assert_eq!(pipe.visual_param(VisualParam::Sharpness), None);
    }

    #[test]
    fn close_twice_is_a_noop() {
        let devices = FakeDevices::new(1920, 1080);
        let res = resources(&devices);
        let mut pipe = Pipe::new(Mixer::Primary, res.clone());
        pipe.start(
            &source(1280, 720, NV12),
            &PipeParams::new(Mixer::Primary),
        )
        .unwrap();
        pipe.set_transform(Transform::ROT_90).unwrap();
        pipe.close();
        pipe.close();
        drop(pipe);
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::Unset { .. })), 1);
        assert_eq!(devices.count(|c| matches!(c, DeviceCall::RotatorFinish(_))), 1);
        assert_eq!(res.zorder.in_use(Mixer::Primary), 0);
    }

    #[test]
    fn rejected_update_tears_down() {
        let devices = FakeDevices::new(1920, 1080);
        let res = resources(&devices);
        let mut pipe = Pipe::new(Mixer::Primary, res.clone());
        pipe.start(
            &source(1280, 720, NV12),
            &PipeParams::new(Mixer::Primary),
        )
        .unwrap();
        devices.reject_overlay_set(Mixer::Primary, true);
        assert!(pipe.set_position(Rect::new(0, 0, 1920, 1080)).is_err());
        assert!(!pipe.is_up());
        assert_eq!(res.zorder.in_use(Mixer::Primary), 0);
    }
}
