// Errors - Failure classes of the bootstrap and presentation core
//
// Fatal errors mean the engine cannot run at all (no GPU, no device, no
// presentation on this queue family). Recoverable errors only cost a frame:
// the surface rolls back and the render loop retries later.

use super::diagnostics::ResultName;
use crate::logging::critical;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load Vulkan library. Is Vulkan installed? ({0})")]
    Loading(#[from] ash::LoadingError),

    #[error("{0} has already been created once")]
    AlreadyCreated(&'static str),

    #[error("Driver query {query} failed with {result}")]
    Query {
        query: &'static str,
        result: ResultName,
    },

    #[error("Required windowing extensions are not supported: {0}")]
    MissingWindowExtensions(String),

    #[error("Vulkan instance unable to be created: {0}")]
    InstanceCreation(ResultName),

    #[error("Vulkan unable to find a suitable physical device")]
    NoSuitableDevice,

    #[error("Logical device unable to be created: {0}")]
    DeviceCreation(ResultName),

    #[error("Present support query failed with {0}")]
    PresentSupportQuery(ResultName),

    #[error("Present support not available on graphics queue family {0}")]
    PresentUnsupported(u32),

    #[error("Surface capability query failed with {0}")]
    SurfaceQuery(ResultName),

    #[error("Surface reports no formats")]
    NoSurfaceFormat,

    #[error("Surface extent is zero (window minimized?)")]
    ZeroExtent,

    #[error("Swapchain unable to be created: {0}")]
    SwapchainCreation(ResultName),

    #[error("Swapchain images unable to be acquired: {0}")]
    SwapchainImages(ResultName),

    #[error("Image view {index} unable to be created: {result}")]
    ImageView { index: usize, result: ResultName },
}

impl Error {
    /// Whether the engine can carry on after this error.
    ///
    /// Everything that happens while building the context, plus the present
    /// support check of a new surface, is fatal. Swap chain work is not.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::SurfaceQuery(_)
                | Error::NoSurfaceFormat
                | Error::ZeroExtent
                | Error::SwapchainCreation(_)
                | Error::SwapchainImages(_)
                | Error::ImageView { .. }
        )
    }

    pub(crate) fn query(query: &'static str) -> impl FnOnce(ash::vk::Result) -> Self {
        move |result| Error::Query {
            query,
            result: result.into(),
        }
    }
}

/// Terminates the process on a fatal error.
///
/// The bootstrap phase has no fallback (no second GPU to try, no headless
/// mode), so the entry point unwraps context and surface construction with
/// this instead of propagating.
pub trait OrTerminate<T> {
    fn or_terminate(self) -> T;
}

impl<T> OrTerminate<T> for Result<T, Error> {
    fn or_terminate(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                critical!("{}", termination_message(&e));
                log::logger().flush();
                std::process::exit(1);
            }
        }
    }
}

/// Log line for an error that ends the process.
fn termination_message(e: &Error) -> String {
    if e.is_fatal() {
        format!("Fatal: {}", e)
    } else {
        format!("Giving up on recoverable error: {}", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn bootstrap_failures_are_fatal() {
        assert!(Error::NoSuitableDevice.is_fatal());
        assert!(Error::AlreadyCreated("GraphicsContext").is_fatal());
        assert!(Error::PresentUnsupported(0).is_fatal());
        assert!(Error::InstanceCreation(vk::Result::ERROR_INCOMPATIBLE_DRIVER.into()).is_fatal());
    }

    #[test]
    fn swapchain_failures_are_recoverable() {
        assert!(!Error::ZeroExtent.is_fatal());
        assert!(!Error::SwapchainCreation(vk::Result::ERROR_SURFACE_LOST_KHR.into()).is_fatal());
        assert!(!Error::ImageView {
            index: 2,
            result: vk::Result::ERROR_OUT_OF_HOST_MEMORY.into(),
        }
        .is_fatal());
    }

    #[test]
    fn termination_names_the_error_class() {
        assert_eq!(
            termination_message(&Error::NoSuitableDevice),
            "Fatal: Vulkan unable to find a suitable physical device"
        );
        assert_eq!(
            termination_message(&Error::ZeroExtent),
            "Giving up on recoverable error: Surface extent is zero (window minimized?)"
        );
    }

    #[test]
    fn messages_use_result_names() {
        let e = Error::DeviceCreation(vk::Result::ERROR_DEVICE_LOST.into());
        assert_eq!(
            e.to_string(),
            "Logical device unable to be created: VK_ERROR_DEVICE_LOST"
        );
    }
}
