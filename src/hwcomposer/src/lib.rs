//! Per-frame composition for MDP display controllers. Every frame the layer list is offered
//! to the composition policies (video overlay, picture-in-picture, external-only, UI mirror
//! and full MDP bypass); the policy that takes it drives the `overlay` crate's pipes.
//! Background threads deliver vsync timestamps and HDMI hotplug events.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod buffer;
pub mod config;
pub mod context;
pub mod external;
pub mod hwc;
mod hwc_utils;
pub mod layer;
pub mod lock;
pub mod logger;
pub mod modes;
pub mod policies;
pub mod stats;
pub mod uevent;
pub mod utils;
pub mod vsync;

pub use crate::config::HwcConfig;
pub use crate::context::DisplayPipelineContext;
pub use crate::external::ExternalDisplay;
pub use crate::hwc::HwcComposer;
pub use crate::hwc_utils::*;
pub use crate::layer::Layer;
pub use crate::layer::LayerList;
pub use crate::policies::CompositionPolicy;
