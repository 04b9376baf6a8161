//! modes: the external display timing codes the pipeline knows, as explicit tables. Ranking
//! and interlace classification are lookups; codes missing from the tables rank below every
//! known mode and are reported as progressive.

use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AspectRatio {
    Ratio4x3,
    Ratio16x9,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModeInfo {
    pub code: u32,
    pub width: u32,
    pub height: u32,
    /// Refresh rate in Hz.
    pub refresh: u32,
    pub interlaced: bool,
    pub aspect: AspectRatio,
}

const fn mode(
    code: u32,
    width: u32,
    height: u32,
    refresh: u32,
    interlaced: bool,
    aspect: AspectRatio,
) -> ModeInfo {
    ModeInfo {
        code,
        width,
        height,
        refresh,
        interlaced,
        aspect,
    }
}

use self::AspectRatio::*;

pub const MODE_640X480P60_4_3: u32 = 1;
pub const MODE_720X480P60_4_3: u32 = 2;
pub const MODE_720X480P60_16_9: u32 = 3;
pub const MODE_1280X720P60_16_9: u32 = 4;
pub const MODE_1920X1080I60_16_9: u32 = 5;
pub const MODE_1440X480I60_4_3: u32 = 6;
pub const MODE_1440X480I60_16_9: u32 = 7;
pub const MODE_1920X1080P60_16_9: u32 = 16;
pub const MODE_720X576P50_4_3: u32 = 17;
pub const MODE_720X576P50_16_9: u32 = 18;
pub const MODE_1280X720P50_16_9: u32 = 19;
pub const MODE_1920X1080I50_16_9: u32 = 20;
pub const MODE_1440X576I50_4_3: u32 = 21;
pub const MODE_1440X576I50_16_9: u32 = 22;
pub const MODE_1920X1080P50_16_9: u32 = 31;
pub const MODE_1920X1080P24_16_9: u32 = 32;
pub const MODE_1920X1080P25_16_9: u32 = 33;
pub const MODE_1920X1080P30_16_9: u32 = 34;

/// Every mode the pipeline can drive.
pub const MODES: &[ModeInfo] = &[
    mode(MODE_640X480P60_4_3, 640, 480, 60, false, Ratio4x3),
    mode(MODE_720X480P60_4_3, 720, 480, 60, false, Ratio4x3),
    mode(MODE_720X480P60_16_9, 720, 480, 60, false, Ratio16x9),
    mode(MODE_1280X720P60_16_9, 1280, 720, 60, false, Ratio16x9),
    mode(MODE_1920X1080I60_16_9, 1920, 1080, 60, true, Ratio16x9),
    mode(MODE_1440X480I60_4_3, 1440, 480, 60, true, Ratio4x3),
    mode(MODE_1440X480I60_16_9, 1440, 480, 60, true, Ratio16x9),
    mode(MODE_1920X1080P60_16_9, 1920, 1080, 60, false, Ratio16x9),
    mode(MODE_720X576P50_4_3, 720, 576, 50, false, Ratio4x3),
    mode(MODE_720X576P50_16_9, 720, 576, 50, false, Ratio16x9),
    mode(MODE_1280X720P50_16_9, 1280, 720, 50, false, Ratio16x9),
    mode(MODE_1920X1080I50_16_9, 1920, 1080, 50, true, Ratio16x9),
    mode(MODE_1440X576I50_4_3, 1440, 576, 50, true, Ratio4x3),
    mode(MODE_1440X576I50_16_9, 1440, 576, 50, true, Ratio16x9),
    mode(MODE_1920X1080P50_16_9, 1920, 1080, 50, false, Ratio16x9),
    mode(MODE_1920X1080P24_16_9, 1920, 1080, 24, false, Ratio16x9),
    mode(MODE_1920X1080P25_16_9, 1920, 1080, 25, false, Ratio16x9),
    mode(MODE_1920X1080P30_16_9, 1920, 1080, 30, false, Ratio16x9),
];

/// Preference order, worst first. A mode's rank is its position here plus one.
pub const MODE_RANKING: &[u32] = &[
    MODE_640X480P60_4_3,
    MODE_1440X480I60_4_3,
    MODE_1440X480I60_16_9,
    MODE_1440X576I50_4_3,
    MODE_1440X576I50_16_9,
    MODE_720X480P60_4_3,
    MODE_720X480P60_16_9,
    MODE_720X576P50_4_3,
    MODE_720X576P50_16_9,
    MODE_1920X1080I50_16_9,
    MODE_1920X1080I60_16_9,
    MODE_1280X720P50_16_9,
    MODE_1280X720P60_16_9,
    MODE_1920X1080P24_16_9,
    MODE_1920X1080P25_16_9,
    MODE_1920X1080P30_16_9,
    MODE_1920X1080P50_16_9,
    MODE_1920X1080P60_16_9,
];

static MODE_INDEX: Lazy<HashMap<u32, &'static ModeInfo>> =
    Lazy::new(|| MODES.iter().map(|m| (m.code, m)).collect());

pub fn mode_info(code: u32) -> Option<&'static ModeInfo> {
    MODE_INDEX.get(&code).copied()
}

/// Preference rank of `code`; higher is better and unknown codes are 0.
pub fn mode_order(code: u32) -> usize {
    MODE_RANKING
        .iter()
        .position(|c| *c == code)
        .map_or(0, |p| p + 1)
}

pub fn is_interlaced(code: u32) -> bool {
    mode_info(code).map_or(false, |m| m.interlaced)
}

/// The configured mode when the sink supports it, else the best ranked mode the sink
/// reports, else whatever the sink lists first.
pub fn choose_mode(available: &[u32], preferred: Option<u32>) -> Option<u32> {
    if let Some(code) = preferred {
        if available.contains(&code) && mode_info(code).is_some() {
            return Some(code);
        }
        warn!("modes: preferred mode {} is not supported by the sink", code);
    }
    available
        .iter()
        .copied()
        .filter(|c| mode_info(*c).is_some())
        .max_by_key(|c| mode_order(*c))
        .or_else(|| available.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_agree() {
        assert_eq!(MODES.len(), MODE_RANKING.len());
        for code in MODE_RANKING {
            assert!(mode_info(*code).is_some(), "ranked mode {} has no timing", code);
        }
    }

    #[test]
    fn ranking() {
        assert!(mode_order(MODE_1920X1080P60_16_9) > mode_order(MODE_1280X720P60_16_9));
        assert!(mode_order(MODE_1280X720P60_16_9) > mode_order(MODE_1920X1080I60_16_9));
        assert!(mode_order(MODE_640X480P60_4_3) > mode_order(999));
        assert_eq!(mode_order(999), 0);
    }

    #[test]
    fn interlace_classification() {
        for code in [
            MODE_1920X1080I60_16_9,
            MODE_1440X480I60_4_3,
            MODE_1440X480I60_16_9,
            MODE_1920X1080I50_16_9,
            MODE_1440X576I50_4_3,
            MODE_1440X576I50_16_9,
        ] {
            assert!(is_interlaced(code), "mode {}", code);
        }
        assert!(!is_interlaced(MODE_1920X1080P60_16_9));
        assert!(!is_interlaced(MODE_720X576P50_4_3));
        assert!(!is_interlaced(999));
    }

    #[test]
    fn mode_choice() {
        let sink = [MODE_720X480P60_4_3, MODE_1280X720P60_16_9, MODE_1920X1080I60_16_9];
        assert_eq!(choose_mode(&sink, None), Some(MODE_1280X720P60_16_9));
        assert_eq!(
            choose_mode(&sink, Some(MODE_720X480P60_4_3)),
            Some(MODE_720X480P60_4_3)
        );
        assert_eq!(
            choose_mode(&sink, Some(MODE_1920X1080P60_16_9)),
            Some(MODE_1280X720P60_16_9)
        );
        assert_eq!(choose_mode(&[77], None), Some(77));
        assert_eq!(choose_mode(&[], None), None);
    }
}
