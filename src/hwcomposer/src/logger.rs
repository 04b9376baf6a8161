use log::LevelFilter;

use crate::hwc_utils::*;

/// Maps a numeric verbosity, as found in `debug.hwc.loglevel`, to a level filter.
pub fn level_filter(level: u32) -> LevelFilter {
    match level {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the process logger at the given verbosity. `RUST_LOG` still refines it.
pub fn init(level: u32) -> HwcResult<()> {
    env_logger::Builder::new()
        .filter_level(level_filter(level))
        .parse_default_env()
        .format_timestamp_micros()
        .try_init()
        .map_err(|e| HwcError::LoggerInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(level_filter(0), LevelFilter::Off);
        assert_eq!(level_filter(2), LevelFilter::Warn);
        assert_eq!(level_filter(4), LevelFilter::Debug);
        assert_eq!(level_filter(9), LevelFilter::Trace);
    }

    #[test]
    fn second_init_fails() {
        let first = init(1);
        let second = init(1);
        // Another test may have installed a logger first.
        assert!(first.is_ok() || second.is_err());
        assert!(matches!(second, Err(HwcError::LoggerInit(_))));
    }
}
