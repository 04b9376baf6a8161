//! Hardware overlay pipe scheduling for MDP display controllers: the per-mixer pipe pool,
//! rotator sessions, the unified `Pipe` and the per-display `Overlay` state machine.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

#[macro_use]
mod macros;
mod overlay_utils;

pub mod aligner;
pub mod device;
pub mod formats;
pub mod geometry;
pub mod overlay;
pub mod pipe;
pub mod rotator;
pub mod state;
pub mod zorder;

pub use crate::aligner::NoopAligner;
pub use crate::aligner::SurfaceAligner;
pub use crate::overlay::ExternalInfo;
pub use crate::overlay::Overlay;
pub use crate::overlay::OverlayConfig;
pub use crate::overlay_utils::*;
pub use crate::pipe::Pipe;
pub use crate::pipe::PipeParams;
pub use crate::pipe::PipeResources;
pub use crate::state::OverlayState;
pub use crate::zorder::Mixer;
pub use crate::zorder::ZOrderManager;
