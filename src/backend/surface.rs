// Presentation Surface - One window's connection to the GPU
//
// States:
//   Invalid        no surface binding (default value, or binding failed)
//   SurfaceBound   surface exists, no usable swapchain (yet, or any more)
//   SwapchainReady swapchain and image views ready for rendering
//
// recreate() rebuilds the swapchain in place; on failure the surface drops
// back to SurfaceBound and the render loop tries again on a later frame.
// The window is only borrowed: whoever created it also destroys it.

use super::swapchain::{Swapchain, SwapchainDriver, SwapchainRequest, SwapchainSupportDetails};
use super::{Error, GraphicsContext, ResultName};
use crate::logging::critical;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;

/// A window a surface can be created for.
pub trait PresentTarget: HasRawWindowHandle + HasRawDisplayHandle {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> vk::Extent2D;
}

/// Device-side calls a bound surface needs after it exists.
pub trait PresentDevice {
    type Driver: SwapchainDriver;

    fn swapchain_driver(&self) -> &Self::Driver;
    fn surface_support(&self, surface: vk::SurfaceKHR) -> Result<SwapchainSupportDetails, Error>;
    fn destroy_surface(&self, surface: vk::SurfaceKHR);
}

impl PresentDevice for GraphicsContext {
    type Driver = GraphicsContext;

    fn swapchain_driver(&self) -> &GraphicsContext {
        self
    }

    fn surface_support(&self, surface: vk::SurfaceKHR) -> Result<SwapchainSupportDetails, Error> {
        SwapchainSupportDetails::query(self.surface_loader(), self.physical_device(), surface)
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface_loader().destroy_surface(surface, None) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Invalid,
    SurfaceBound,
    SwapchainReady,
}

pub struct PresentationSurface<W: PresentTarget, D: PresentDevice = GraphicsContext> {
    context: Option<Arc<D>>,
    window: Option<Arc<W>>,
    surface: vk::SurfaceKHR,
    swapchain: Swapchain,
    support: SwapchainSupportDetails,
    preferred_present_mode: vk::PresentModeKHR,
}

impl<W: PresentTarget, D: PresentDevice> Default for PresentationSurface<W, D> {
    /// The invalid sentinel: no window, no context, no handles.
    fn default() -> Self {
        Self {
            context: None,
            window: None,
            surface: vk::SurfaceKHR::null(),
            swapchain: Swapchain::default(),
            support: SwapchainSupportDetails::default(),
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

impl<W: PresentTarget> PresentationSurface<W> {
    /// Binds `window` to the context's instance and builds the first
    /// swapchain.
    ///
    /// Only fatal errors are returned. If the surface binding itself fails
    /// the result is the invalid sentinel, and if the first swapchain cannot
    /// be built the surface stays bound; check [`Self::is_valid`].
    pub fn new(
        context: Arc<GraphicsContext>,
        window: Arc<W>,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self, Error> {
        let surface = match unsafe {
            ash_window::create_surface(
                context.entry(),
                context.instance(),
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(result) => {
                critical!("Surface was unable to be created with err: {}!", ResultName(result));
                return Ok(Self::default());
            }
        };

        let graphics = context.queue_families().graphics;
        // From here on a drop destroys the surface again
        let mut this = Self::bind(Arc::clone(&context), window, surface, preferred_present_mode);

        let supported = unsafe {
            context.surface_loader().get_physical_device_surface_support(
                context.physical_device(),
                graphics,
                surface,
            )
        }
        .map_err(|r| Error::PresentSupportQuery(r.into()))?;
        if !supported {
            return Err(Error::PresentUnsupported(graphics));
        }

        this.recreate();
        Ok(this)
    }
}

impl<W: PresentTarget, D: PresentDevice> PresentationSurface<W, D> {
    /// Takes ownership of an existing surface handle, without a swapchain.
    fn bind(
        context: Arc<D>,
        window: Arc<W>,
        surface: vk::SurfaceKHR,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Self {
        Self {
            context: Some(context),
            window: Some(window),
            surface,
            swapchain: Swapchain::default(),
            support: SwapchainSupportDetails::default(),
            preferred_present_mode,
        }
    }

    /// Rebuilds the swapchain and its image views.
    ///
    /// Refreshes the cached support details first. Failures are logged and
    /// leave the surface in `SurfaceBound`.
    pub fn recreate(&mut self) -> SurfaceState {
        let (Some(context), Some(window)) = (self.context.clone(), self.window.as_ref()) else {
            log::warn!("recreate called on an invalid surface");
            return self.state();
        };
        let driver = context.swapchain_driver();

        match context.surface_support(self.surface) {
            Ok(support) => self.support = support,
            Err(e) => {
                critical!("{}", e);
                self.swapchain.release(driver);
                return self.state();
            }
        }

        let request = SwapchainRequest {
            surface: self.surface,
            support: &self.support,
            framebuffer: window.framebuffer_size(),
            preferred_present_mode: self.preferred_present_mode,
        };
        if let Err(e) = self.swapchain.rebuild(driver, &request) {
            critical!("{}", e);
        }

        self.state()
    }

    /// Whether a frame should call [`Self::recreate`] first.
    ///
    /// Never for an unbound surface: there is nothing to rebuild on.
    pub fn needs_recreate(&self, stale: bool) -> bool {
        match self.state() {
            SurfaceState::Invalid => false,
            SurfaceState::SurfaceBound => true,
            SurfaceState::SwapchainReady => stale,
        }
    }

    /// Drops the swapchain and image views, keeping the surface. Idempotent.
    pub fn invalidate(&mut self) {
        if let Some(context) = self.context.clone() {
            self.swapchain.release(context.swapchain_driver());
        }
    }

    /// Destroys everything this surface owns and returns it to `Invalid`.
    pub fn exit(&mut self) {
        self.invalidate();

        if let Some(context) = self.context.take() {
            if self.surface != vk::SurfaceKHR::null() {
                context.destroy_surface(self.surface);
            }
        }
        self.surface = vk::SurfaceKHR::null();
        self.window = None;
    }

    /// True when window, instance, surface, swapchain and device all exist.
    pub fn is_valid(&self) -> bool {
        self.window.is_some()
            && self.context.is_some()
            && self.surface != vk::SurfaceKHR::null()
            && self.swapchain.is_ready()
    }

    pub fn state(&self) -> SurfaceState {
        if self.context.is_none() || self.surface == vk::SurfaceKHR::null() {
            SurfaceState::Invalid
        } else if self.swapchain.is_ready() {
            SurfaceState::SwapchainReady
        } else {
            SurfaceState::SurfaceBound
        }
    }

    pub fn window(&self) -> Option<&Arc<W>> {
        self.window.as_ref()
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain.handle
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.swapchain.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.swapchain.image_views
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode
    }
}

impl<W: PresentTarget, D: PresentDevice> Drop for PresentationSurface<W, D> {
    fn drop(&mut self) {
        self.exit();
    }
}
