//! config: tunables read once from system properties when a display pipeline is created.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const PROP_MDP_MAX_LAYERS: &str = "debug.mdpcomp.maxlayer";
pub const PROP_MDP_COMP_ENABLE: &str = "debug.mdpcomp.enable";
pub const PROP_VIDEO_ENABLE: &str = "debug.hwc.video.enable";
pub const PROP_PIP_ENABLE: &str = "debug.hwc.pip.enable";
pub const PROP_UI_MIRROR_ENABLE: &str = "debug.hwc.uimirror.enable";
pub const PROP_EXT_ONLY_ENABLE: &str = "debug.hwc.extonly.enable";
pub const PROP_TRUE_MIRROR: &str = "hw.trueMirrorSupported";
pub const PROP_ACTION_SAFE_WIDTH: &str = "persist.sys.actionsafe.width";
pub const PROP_ACTION_SAFE_HEIGHT: &str = "persist.sys.actionsafe.height";
pub const PROP_HDMI_RESOLUTION: &str = "hw.hdmi.resolution";
pub const PROP_LOCK_TIMEOUT_MS: &str = "debug.hwc.lock.timeout_ms";
pub const PROP_MDP_REVISION: &str = "hw.mdp.revision";
pub const PROP_LOG_LEVEL: &str = "debug.hwc.loglevel";

/// Where property values come from.
pub trait PropertySource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Properties held in memory.
#[derive(Clone, Debug, Default)]
pub struct MapProperties {
    values: BTreeMap<String, String>,
}

impl MapProperties {
    pub fn new() -> MapProperties {
        MapProperties::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> MapProperties {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl PropertySource for MapProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Properties taken from the process environment: `debug.mdpcomp.maxlayer` is read from
/// `DEBUG_MDPCOMP_MAXLAYER`.
#[derive(Copy, Clone, Debug, Default)]
pub struct EnvProperties;

impl EnvProperties {
    pub fn env_key(key: &str) -> String {
        key.replace('.', "_").to_uppercase()
    }
}

impl PropertySource for EnvProperties {
    fn get(&self, key: &str) -> Option<String> {
        env::var(EnvProperties::env_key(key)).ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HwcConfig {
    pub mdp_max_layers: usize,
    pub mdp_comp_enabled: bool,
    pub video_enabled: bool,
    pub pip_enabled: bool,
    pub ui_mirror_enabled: bool,
    pub ext_only_enabled: bool,
    /// Adds a pipe per mixer reserved for mirroring UI.
    pub true_mirror: bool,
    /// Percentage external destinations shrink by, width then height.
    pub action_safe: (f32, f32),
    /// Preferred external display mode code.
    pub hdmi_mode: Option<u32>,
    pub lock_timeout: Duration,
    pub mdp_revision: u32,
    /// Verbosity handed to `logger::init`.
    pub log_level: u32,
}

impl Default for HwcConfig {
    fn default() -> HwcConfig {
        HwcConfig {
            mdp_max_layers: 3,
            mdp_comp_enabled: true,
            video_enabled: true,
            pip_enabled: true,
            ui_mirror_enabled: true,
            ext_only_enabled: true,
            true_mirror: false,
            action_safe: (0.0, 0.0),
            hdmi_mode: None,
            lock_timeout: Duration::from_millis(1000),
            mdp_revision: 400,
            log_level: 2,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn read<T, S: PropertySource + ?Sized>(
    source: &S,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let value = source.get(key)?;
    match parse(&value) {
        Some(v) => Some(v),
        None => {
            warn!("config: ignoring invalid value {:?} for {}", value, key);
            None
        }
    }
}

fn parse_num<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}

fn parse_percentage(value: &str) -> Option<f32> {
    parse_num::<f32>(value).filter(|v| (0.0..100.0).contains(v))
}

impl HwcConfig {
    /// Reads every recognised key, keeping the default for keys that are missing or invalid.
    pub fn from_properties<S: PropertySource + ?Sized>(source: &S) -> HwcConfig {
        let mut config = HwcConfig::default();
        if let Some(v) = read(source, PROP_MDP_MAX_LAYERS, parse_num::<usize>) {
            config.mdp_max_layers = v;
        }
        if let Some(v) = read(source, PROP_MDP_COMP_ENABLE, parse_bool) {
            config.mdp_comp_enabled = v;
        }
        if let Some(v) = read(source, PROP_VIDEO_ENABLE, parse_bool) {
            config.video_enabled = v;
        }
        if let Some(v) = read(source, PROP_PIP_ENABLE, parse_bool) {
            config.pip_enabled = v;
        }
        if let Some(v) = read(source, PROP_UI_MIRROR_ENABLE, parse_bool) {
            config.ui_mirror_enabled = v;
        }
        if let Some(v) = read(source, PROP_EXT_ONLY_ENABLE, parse_bool) {
            config.ext_only_enabled = v;
        }
        if let Some(v) = read(source, PROP_TRUE_MIRROR, parse_bool) {
            config.true_mirror = v;
        }
        if let Some(v) = read(source, PROP_ACTION_SAFE_WIDTH, parse_percentage) {
            config.action_safe.0 = v;
        }
        if let Some(v) = read(source, PROP_ACTION_SAFE_HEIGHT, parse_percentage) {
            config.action_safe.1 = v;
        }
        if let Some(v) = read(source, PROP_HDMI_RESOLUTION, parse_num::<u32>) {
            config.hdmi_mode = Some(v);
        }
        if let Some(v) = read(source, PROP_LOCK_TIMEOUT_MS, parse_num::<u64>) {
            config.lock_timeout = Duration::from_millis(v);
        }
        if let Some(v) = read(source, PROP_MDP_REVISION, parse_num::<u32>) {
            config.mdp_revision = v;
        }
        if let Some(v) = read(source, PROP_LOG_LEVEL, parse_num::<u32>) {
            config.log_level = v;
        }
        debug!("config: {:?}", config);
        config
    }

    pub fn with_mdp_max_layers(mut self, layers: usize) -> HwcConfig {
        self.mdp_max_layers = layers;
        self
    }

    pub fn with_mdp_comp(mut self, enabled: bool) -> HwcConfig {
        self.mdp_comp_enabled = enabled;
        self
    }

    pub fn with_video(mut self, enabled: bool) -> HwcConfig {
        self.video_enabled = enabled;
        self
    }

    pub fn with_true_mirror(mut self, supported: bool) -> HwcConfig {
        self.true_mirror = supported;
        self
    }

    pub fn with_action_safe(mut self, width: f32, height: f32) -> HwcConfig {
        self.action_safe = (width, height);
        self
    }

    pub fn with_hdmi_mode(mut self, mode: u32) -> HwcConfig {
        self.hdmi_mode = Some(mode);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> HwcConfig {
        self.lock_timeout = timeout;
        self
    }
}
