// Backend module - Vulkan bootstrap and presentation
//
// Design: Thin wrapper around ash; selection rules are plain functions over
// queried data so they can be tested without a GPU.

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod prober;
pub mod selector;
pub mod surface;
pub mod swapchain;
pub mod teardown;
pub mod uniqueness;

pub use context::{ContextSettings, GraphicsContext};
pub use diagnostics::ResultName;
pub use error::{Error, OrTerminate};
pub use surface::{PresentTarget, PresentationSurface, SurfaceState};
