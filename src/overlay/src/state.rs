use std::fmt;

use crate::zorder::Mixer;

/// Exactly one state is active per display. It decides which pipes exist and how calls are
/// routed to them.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum OverlayState {
    #[default]
    Closed,
    /// One video pipe on the panel.
    VideoOnPanel2d,
    /// Video on the panel and on the external display.
    VideoOnTv2d,
    /// Two eye pipes on a stereo panel.
    Video3dOn3dPanel,
    /// Stereo video mirrored to a stereo-capable TV.
    Video3dOn3dTv,
    /// Stereo content shown as its left eye on a flat panel.
    Video3dOn2dPanel,
    /// The UI framebuffer scanned out to the external display.
    UiMirror,
    /// UI mirroring through a dedicated pipe on each mixer.
    TrueUiMirror,
    /// Two video layers on the panel, background and picture-in-picture.
    PipVideoOnPanel,
    /// A layer shown only on the external display.
    DualDisplay,
    Bypass1Layer,
    Bypass2Layer,
    Bypass3Layer,
}

impl OverlayState {
    /// States that run the framebuffer in its doubled stereo mode.
    pub fn is_3d(self) -> bool {
        matches!(
            self,
            OverlayState::Video3dOn3dPanel
                | OverlayState::Video3dOn3dTv
                | OverlayState::Video3dOn2dPanel
        )
    }

    /// Mixers of the pipes this state addresses, in the order they are started.
    pub fn mixers(self) -> &'static [Mixer] {
        use Mixer::*;
        match self {
            OverlayState::Closed => &[],
            OverlayState::VideoOnPanel2d | OverlayState::Video3dOn2dPanel => &[Primary],
            OverlayState::UiMirror | OverlayState::DualDisplay => &[External],
            OverlayState::VideoOnTv2d
            | OverlayState::Video3dOn3dTv
            | OverlayState::TrueUiMirror => &[External, Primary],
            OverlayState::Video3dOn3dPanel | OverlayState::PipVideoOnPanel => {
                &[Primary, Primary]
            }
            OverlayState::Bypass1Layer => &[Primary],
            OverlayState::Bypass2Layer => &[Primary, Primary],
            OverlayState::Bypass3Layer => &[Primary, Primary, Primary],
        }
    }

    pub fn pipe_count(self) -> usize {
        self.mixers().len()
    }

    /// Whether the state drives the external mixer.
    pub fn uses_external(self) -> bool {
        self.mixers().contains(&Mixer::External)
    }

    /// The bypass state for `layers` claimed layers.
    pub fn bypass(layers: usize) -> Option<OverlayState> {
        match layers {
            1 => Some(OverlayState::Bypass1Layer),
            2 => Some(OverlayState::Bypass2Layer),
            3 => Some(OverlayState::Bypass3Layer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayState::Closed => "CLOSED",
            OverlayState::VideoOnPanel2d => "2D_VIDEO_ON_PANEL",
            OverlayState::VideoOnTv2d => "2D_VIDEO_ON_TV",
            OverlayState::Video3dOn3dPanel => "3D_VIDEO_ON_3D_PANEL",
            OverlayState::Video3dOn3dTv => "3D_VIDEO_ON_3D_TV",
            OverlayState::Video3dOn2dPanel => "3D_VIDEO_ON_2D_PANEL",
            OverlayState::UiMirror => "UI_MIRROR",
            OverlayState::TrueUiMirror => "TRUE_UI_MIRROR",
            OverlayState::PipVideoOnPanel => "2D_PIP_VIDEO_ON_PANEL",
            OverlayState::DualDisplay => "DUAL_DISP",
            OverlayState::Bypass1Layer => "BYPASS_1_LAYER",
            OverlayState::Bypass2Layer => "BYPASS_2_LAYER",
            OverlayState::Bypass3Layer => "BYPASS_3_LAYER",
        }
    }
}

impl fmt::Display for OverlayState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_states() {
        assert!(OverlayState::Video3dOn3dPanel.is_3d());
        assert!(OverlayState::Video3dOn2dPanel.is_3d());
        assert!(!OverlayState::VideoOnTv2d.is_3d());
        assert!(!OverlayState::Closed.is_3d());
    }

    #[test]
    fn pipe_layout() {
        assert_eq!(OverlayState::Closed.pipe_count(), 0);
        assert_eq!(
            OverlayState::VideoOnTv2d.mixers(),
            &[Mixer::External, Mixer::Primary]
        );
        assert!(OverlayState::UiMirror.uses_external());
        assert!(!OverlayState::PipVideoOnPanel.uses_external());
        assert_eq!(OverlayState::bypass(3), Some(OverlayState::Bypass3Layer));
        assert_eq!(OverlayState::bypass(0), None);
        assert_eq!(OverlayState::bypass(4), None);
    }

    #[test]
    fn names() {
        assert_eq!(OverlayState::PipVideoOnPanel.to_string(), "2D_PIP_VIDEO_ON_PANEL");
        assert_eq!(OverlayState::default(), OverlayState::Closed);
    }
}
