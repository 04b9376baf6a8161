//! hwc_utils: error type and result alias of the composition layer.

use std::io::Error as IoError;
use std::time::Duration;

use nix::Error as NixError;
use overlay::OverlayError;
use remain::sorted;
use thiserror::Error;

/// An error generated while preparing or presenting a frame.
#[sorted]
#[derive(Error, Debug)]
pub enum HwcError {
    /// The primary framebuffer reports an unusable mode.
    #[error("display {0} is unavailable")]
    DisplayUnavailable(String),
    /// An eventfd could not be created or signalled.
    #[error("eventfd failure: {0}")]
    EventFd(IoError),
    /// A buffer handle failed validation.
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(&'static str),
    /// An input/output error occurred.
    #[error("an input/output error occurred: {0}")]
    IoError(IoError),
    /// A buffer lock was not granted in time.
    #[error("buffer lock timed out after {0:?}")]
    LockTimeout(Duration),
    /// The logger could not be installed.
    #[error("failed to initialize the logger: {0}")]
    LoggerInit(String),
    /// A system call through nix failed.
    #[error("the errno is {0}")]
    NixError(NixError),
    /// An overlay operation failed.
    #[error("overlay: {0}")]
    Overlay(#[from] OverlayError),
    /// A background thread could not be spawned.
    #[error("failed to spawn thread {name}: {err}")]
    SpawnThread { name: &'static str, err: IoError },
    /// A sysfs node held something other than what was expected.
    #[error("unexpected contents in {path}: {reason}")]
    Sysfs { path: String, reason: String },
}

impl From<NixError> for HwcError {
    fn from(e: NixError) -> HwcError {
        HwcError::NixError(e)
    }
}

impl From<IoError> for HwcError {
    fn from(e: IoError) -> HwcError {
        HwcError::IoError(e)
    }
}

/// The result of a composition operation.
pub type HwcResult<T> = std::result::Result<T, HwcError>;
