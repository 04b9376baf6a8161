//! context: everything one display's composition session shares. It is created when the
//! display comes up and handed by reference to the overlay and every policy, so no state
//! lives in globals.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use overlay::device::DeviceFactory;
use overlay::device::MdpDevice;
use overlay::device::ScreenInfo;
use overlay::geometry::Dimension;
use overlay::geometry::Rotation;
use overlay::Mixer;
use overlay::Overlay;
use overlay::OverlayConfig;
use overlay::PipeResources;
use overlay::SurfaceAligner;
use overlay::ZOrderManager;

use crate::config::HwcConfig;
use crate::external::ExternalDisplay;
use crate::hwc_utils::*;
use crate::layer::HwcRect;

pub struct DisplayPipelineContext {
    pub overlay: Overlay,
    pub zorder: Arc<ZOrderManager>,
    pub fb: ScreenInfo,
    pub external: Arc<ExternalDisplay>,
    pub config: HwcConfig,
    pub aligner: Arc<dyn SurfaceAligner>,
    /// Rotation of the device as reported by the display server.
    pub orientation: Rotation,
    primary: Box<dyn MdpDevice>,
}

impl DisplayPipelineContext {
    pub fn new(
        factory: Arc<dyn DeviceFactory>,
        config: HwcConfig,
        external: Arc<ExternalDisplay>,
        aligner: Arc<dyn SurfaceAligner>,
    ) -> HwcResult<DisplayPipelineContext> {
        let primary = factory.open_mdp(Mixer::Primary)?;
        let fb = primary.screen_info()?;
        if fb.xres == 0 || fb.yres == 0 {
            return Err(HwcError::DisplayUnavailable(Mixer::Primary.to_string()));
        }
        let zorder = Arc::new(ZOrderManager::new(config.true_mirror));
        let resources = PipeResources {
            factory,
            zorder: zorder.clone(),
            aligner: aligner.clone(),
        };
        let mut overlay_config = OverlayConfig::new(fb.dimension());
        overlay_config.action_safe = config.action_safe;
        info!(
            "display: primary {}x{}, {} pipes per mixer",
            fb.xres,
            fb.yres,
            zorder.max_pipes()
        );
        Ok(DisplayPipelineContext {
            overlay: Overlay::new(resources, overlay_config),
            zorder,
            fb,
            external,
            config,
            aligner,
            orientation: Rotation::None,
            primary,
        })
    }

    pub fn panel(&self) -> Dimension {
        self.fb.dimension()
    }

    /// The whole primary panel, the scissor layers are clipped against.
    pub fn panel_rect(&self) -> HwcRect {
        HwcRect::new(0, 0, self.fb.xres as i32, self.fb.yres as i32)
    }

    /// Hands this frame's acquire fences to the primary mixer and returns the release fence.
    pub fn buffer_sync(&mut self, acquire_fences: &[RawFd]) -> HwcResult<Option<RawFd>> {
        Ok(self.primary.buffer_sync(acquire_fences)?)
    }
}
