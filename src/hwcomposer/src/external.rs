//! external: connectivity of the external (HDMI) display. The hotplug thread writes it, the
//! composition path reads it every frame; everything sits behind one mutex.
//!
//! A hotplug event that arrives while a frame is being configured is staged and applied when
//! the next frame starts, so an in-flight commit never sees its pipes torn down underneath it.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use overlay::geometry::Dimension;
use overlay::ExternalInfo;

use crate::hwc_utils::*;
use crate::modes;

/// Default sysfs directory of the external framebuffer.
pub const EXTERNAL_SYSFS_ROOT: &str = "/sys/class/graphics/fb1";

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExternalState {
    pub connected: bool,
    /// A frame is being configured; hotplug changes wait until it is done.
    pub configuring: bool,
    /// An external-only layer owns the display.
    pub ext_only: bool,
    pub true_mirror: bool,
    pub supports_3d: bool,
    pub edid_modes: Vec<u32>,
    pub mode: Option<u32>,
    pub resolution: Option<Dimension>,
    /// Connection change waiting for the current frame to finish.
    pub staged: Option<bool>,
}

/// Parses the space separated mode codes of an `edid_modes` node. Unparsable entries are
/// skipped.
pub fn parse_edid_modes(text: &str) -> Vec<u32> {
    text.split_whitespace()
        .filter_map(|t| match t.parse() {
            Ok(code) => Some(code),
            Err(_) => {
                warn!("external: skipping edid mode {:?}", t);
                None
            }
        })
        .collect()
}

/// Parses a sysfs flag node such as `connected` or `hpd`.
pub fn parse_flag(text: &str) -> Option<bool> {
    match text.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn read_node(root: &Path, node: &str) -> HwcResult<String> {
    let path = root.join(node);
    fs::read_to_string(&path).map_err(|e| HwcError::Sysfs {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub struct ExternalDisplay {
    state: Mutex<ExternalState>,
    sysfs_root: PathBuf,
    preferred_mode: Option<u32>,
}

impl ExternalDisplay {
    pub fn new<P: Into<PathBuf>>(
        sysfs_root: P,
        preferred_mode: Option<u32>,
        true_mirror: bool,
    ) -> ExternalDisplay {
        ExternalDisplay {
            state: Mutex::new(ExternalState {
                true_mirror,
                ..Default::default()
            }),
            sysfs_root: sysfs_root.into(),
            preferred_mode,
        }
    }

    pub fn snapshot(&self) -> ExternalState {
        self.state.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn resolution(&self) -> Option<Dimension> {
        self.state.lock().unwrap().resolution
    }

    /// What the overlay needs to route to the external mixer, when connected.
    pub fn info(&self) -> Option<ExternalInfo> {
        let state = self.state.lock().unwrap();
        if state.connected {
            Some(ExternalInfo {
                supports_3d: state.supports_3d,
            })
        } else {
            None
        }
    }

    pub fn set_ext_only(&self, ext_only: bool) {
        self.state.lock().unwrap().ext_only = ext_only;
    }

    pub fn set_supports_3d(&self, supports_3d: bool) {
        self.state.lock().unwrap().supports_3d = supports_3d;
    }

    pub fn set_configuring(&self, configuring: bool) {
        self.state.lock().unwrap().configuring = configuring;
    }

    /// Reads whether the sink is currently attached from the `connected` node.
    pub fn read_connected(&self) -> HwcResult<bool> {
        let path = self.sysfs_root.join("connected");
        let text = read_node(&self.sysfs_root, "connected")?;
        parse_flag(&text).ok_or_else(|| HwcError::Sysfs {
            path: path.display().to_string(),
            reason: format!("not a flag: {:?}", text.trim()),
        })
    }

    /// Reads the sink's mode list from the `edid_modes` node.
    pub fn read_edid_modes(&self) -> HwcResult<Vec<u32>> {
        Ok(parse_edid_modes(&read_node(&self.sysfs_root, "edid_modes")?))
    }

    /// Reacts to a connect or disconnect from the hotplug thread. Returns true when the change
    /// was applied, false when it was staged behind the frame being configured.
    pub fn handle_hotplug(&self, connected: bool) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.configuring {
                debug!("external: staging hotplug {}", connected);
                state.staged = Some(connected);
                return false;
            }
        }
        self.apply(connected);
        true
    }

    /// Applies a staged hotplug change, if any. Called when a frame starts.
    pub fn apply_staged(&self) -> Option<bool> {
        let staged = self.state.lock().unwrap().staged.take();
        if let Some(connected) = staged {
            self.apply(connected);
        }
        staged
    }

    fn apply(&self, connected: bool) {
        if !connected {
            self.disconnect();
            return;
        }
        let modes = match self.read_edid_modes() {
            Ok(modes) => modes,
            Err(e) => {
                warn!("external: no mode list, assuming 640x480: {}", e);
                vec![modes::MODE_640X480P60_4_3]
            }
        };
        self.connect_with_modes(&modes);
    }

    /// Marks the sink connected with the given mode list and picks its mode.
    pub fn connect_with_modes(&self, edid_modes: &[u32]) {
        let mode = modes::choose_mode(edid_modes, self.preferred_mode);
        let resolution =
            mode.and_then(|m| modes::mode_info(m).map(|i| Dimension::new(i.width, i.height)));
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        state.edid_modes = edid_modes.to_vec();
        state.mode = mode;
        state.resolution = resolution;
        info!(
            "external: connected, mode {:?} ({:?}){}",
            mode,
            resolution,
            if mode.map_or(false, modes::is_interlaced) {
                " interlaced"
            } else {
                ""
            }
        );
    }

    pub fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        if state.connected {
            info!("external: disconnected");
        }
        state.connected = false;
        state.ext_only = false;
        state.edid_modes.clear();
        state.mode = None;
        state.resolution = None;
    }
}

#[cfg(test)]
mod tests {
    use vmm_sys_util::tempdir::TempDir;

    use super::*;
    use crate::modes::*;

    #[test]
    fn parses_nodes() {
        assert_eq!(parse_edid_modes("1 4 16 x 31\n"), vec![1, 4, 16, 31]);
        assert_eq!(parse_flag("1\n"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("yes"), None);
    }

    #[test]
    fn connect_picks_best_mode() {
        let ext = ExternalDisplay::new("/nonexistent", None, false);
        assert!(ext.info().is_none());
        ext.connect_with_modes(&[MODE_720X480P60_4_3, MODE_1920X1080P60_16_9]);
        assert!(ext.is_connected());
        assert_eq!(ext.snapshot().mode, Some(MODE_1920X1080P60_16_9));
        assert_eq!(ext.resolution(), Some(Dimension::new(1920, 1080)));
        assert_eq!(ext.info(), Some(ExternalInfo::default()));
        ext.disconnect();
        assert!(!ext.is_connected());
        assert_eq!(ext.resolution(), None);
    }

    #[test]
    fn hotplug_waits_for_the_frame() {
        let ext = ExternalDisplay::new("/nonexistent", None, false);
        ext.set_configuring(true);
        assert!(!ext.handle_hotplug(true));
        assert!(!ext.is_connected());
        ext.set_configuring(false);
        assert_eq!(ext.apply_staged(), Some(true));
        // Without a readable mode list the sink falls back to 640x480.
        assert_eq!(ext.resolution(), Some(Dimension::new(640, 480)));
        assert_eq!(ext.apply_staged(), None);

        assert!(ext.handle_hotplug(false));
        assert!(!ext.is_connected());
    }

    #[test]
    fn reads_sysfs_nodes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.as_path().join("edid_modes"), "2 4 19\n").unwrap();
        fs::write(dir.as_path().join("connected"), "1\n").unwrap();
        let ext = ExternalDisplay::new(dir.as_path(), Some(MODE_1280X720P50_16_9), false);
        assert!(ext.read_connected().unwrap());
        assert!(ext.handle_hotplug(true));
        assert_eq!(ext.snapshot().edid_modes, vec![2, 4, 19]);
        assert_eq!(ext.snapshot().mode, Some(MODE_1280X720P50_16_9));
    }
}
