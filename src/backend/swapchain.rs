// Swapchain - The chain of images a surface presents
//
// Owns the swapchain handle and one view per image. Rebuilding replaces
// both in place; any failure leaves the chain empty so the surface can retry
// on a later frame.
//
// Driver calls go through SwapchainDriver so the rebuild/release logic can
// be exercised without a GPU.

use super::{Error, GraphicsContext};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;

/// Everything a surface reports about the swapchains it accepts.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        surface_loader: &khr::Surface,
        gpu: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, Error> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(gpu, surface)
                    .map_err(|r| Error::SurfaceQuery(r.into()))?,
                formats: surface_loader
                    .get_physical_device_surface_formats(gpu, surface)
                    .map_err(|r| Error::SurfaceQuery(r.into()))?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(gpu, surface)
                    .map_err(|r| Error::SurfaceQuery(r.into()))?,
            })
        }
    }
}

/// Driver calls a swapchain needs.
pub trait SwapchainDriver {
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
}

// SAFETY (all methods): every handle passed in was created from this device,
// and the swapchain owning an image view outlives it.
impl SwapchainDriver for GraphicsContext {
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader().create_swapchain(info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader().get_swapchain_images(swapchain) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device().create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device().destroy_image_view(view, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader().destroy_swapchain(swapchain, None) }
    }
}

/// Inputs of one rebuild.
pub struct SwapchainRequest<'a> {
    pub surface: vk::SurfaceKHR,
    pub support: &'a SwapchainSupportDetails,
    /// Current framebuffer size of the window, in pixels.
    pub framebuffer: vk::Extent2D,
    pub preferred_present_mode: vk::PresentModeKHR,
}

/// First SRGB + nonlinear entry, else the first entry.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| is_srgb(f.format) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

fn is_srgb(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::R8_SRGB
            | vk::Format::R8G8_SRGB
            | vk::Format::R8G8B8_SRGB
            | vk::Format::B8G8R8_SRGB
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::A8B8G8R8_SRGB_PACK32
    )
}

/// MAILBOX when the surface offers it, else FIFO.
///
/// A FIFO preference opts out of MAILBOX. FIFO is the only mode every
/// surface is required to support.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if preferred != vk::PresentModeKHR::FIFO && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's fixed extent, or the framebuffer size clamped into the
/// surface's bounds when it accepts any extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

#[derive(Debug, Default)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn is_ready(&self) -> bool {
        self.handle != vk::SwapchainKHR::null()
    }

    /// Replaces the swapchain and its views.
    ///
    /// The previous swapchain is handed to the driver as `oldSwapchain` and
    /// destroyed afterwards, whether or not the rebuild succeeded. On error
    /// the chain is left empty.
    pub fn rebuild<D: SwapchainDriver>(
        &mut self,
        driver: &D,
        request: &SwapchainRequest<'_>,
    ) -> Result<(), Error> {
        self.destroy_views(driver);
        self.images.clear();

        let old = std::mem::take(&mut self.handle);
        let result = self.build(driver, request, old);

        if old != vk::SwapchainKHR::null() {
            driver.destroy_swapchain(old);
        }
        result
    }

    /// Destroys the views and the swapchain, if any. Idempotent.
    pub fn release<D: SwapchainDriver>(&mut self, driver: &D) {
        self.destroy_views(driver);
        self.images.clear();

        let handle = std::mem::take(&mut self.handle);
        if handle != vk::SwapchainKHR::null() {
            driver.destroy_swapchain(handle);
        }
    }

    fn destroy_views<D: SwapchainDriver>(&mut self, driver: &D) {
        for view in self.image_views.drain(..) {
            driver.destroy_image_view(view);
        }
    }

    fn build<D: SwapchainDriver>(
        &mut self,
        driver: &D,
        request: &SwapchainRequest<'_>,
        old: vk::SwapchainKHR,
    ) -> Result<(), Error> {
        let caps = &request.support.capabilities;

        let surface_format =
            choose_surface_format(&request.support.formats).ok_or(Error::NoSurfaceFormat)?;
        let present_mode =
            choose_present_mode(&request.support.present_modes, request.preferred_present_mode);
        let extent = choose_extent(caps, request.framebuffer);
        if extent.width == 0 || extent.height == 0 {
            return Err(Error::ZeroExtent);
        }
        let image_count = choose_image_count(caps);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(request.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let handle = driver
            .create_swapchain(&create_info)
            .map_err(|r| Error::SwapchainCreation(r.into()))?;

        let images = match driver.swapchain_images(handle) {
            Ok(images) => images,
            Err(r) => {
                driver.destroy_swapchain(handle);
                return Err(Error::SwapchainImages(r.into()));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for (index, &image) in images.iter().enumerate() {
            match driver.create_image_view(&color_view_info(image, surface_format.format)) {
                Ok(view) => image_views.push(view),
                Err(r) => {
                    for view in image_views {
                        driver.destroy_image_view(view);
                    }
                    driver.destroy_swapchain(handle);
                    return Err(Error::ImageView {
                        index,
                        result: r.into(),
                    });
                }
            }
        }

        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode
        );

        self.handle = handle;
        self.images = images;
        self.image_views = image_views;
        self.format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;
        Ok(())
    }
}

fn color_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

/// Recording driver shared by the swapchain and surface tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use ash::vk::Handle;
    use std::cell::{Cell, RefCell};

    /// Hands out increasing raw handles and records every call.
    #[derive(Default)]
    pub(crate) struct FakeDriver {
        pub(crate) next: Cell<u64>,
        pub(crate) image_count: Cell<usize>,
        pub(crate) fail_create: Cell<Option<vk::Result>>,
        pub(crate) fail_view_at: Cell<Option<usize>>,
        pub(crate) calls: RefCell<Vec<String>>,
        pub(crate) last_old_swapchain: Cell<u64>,
        pub(crate) last_min_image_count: Cell<u32>,
        pub(crate) live_views: Cell<i64>,
        pub(crate) live_swapchains: Cell<i64>,
    }

    impl FakeDriver {
        pub(crate) fn new(image_count: usize) -> Self {
            let driver = Self::default();
            driver.next.set(1);
            driver.image_count.set(image_count);
            driver
        }

        fn handle(&self) -> u64 {
            let h = self.next.get();
            self.next.set(h + 1);
            h
        }

        pub(crate) fn count(&self, prefix: &str) -> usize {
            self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl SwapchainDriver for FakeDriver {
        fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
            self.last_old_swapchain.set(info.old_swapchain.as_raw());
            self.last_min_image_count.set(info.min_image_count);
            if let Some(err) = self.fail_create.get() {
                self.calls.borrow_mut().push("create_swapchain:failed".into());
                return Err(err);
            }
            let h = self.handle();
            self.calls.borrow_mut().push(format!("create_swapchain:{}", h));
            self.live_swapchains.set(self.live_swapchains.get() + 1);
            Ok(vk::SwapchainKHR::from_raw(h))
        }

        fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
            Ok((0..self.image_count.get())
                .map(|_| vk::Image::from_raw(self.handle()))
                .collect())
        }

        fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
            assert_eq!(info.view_type, vk::ImageViewType::TYPE_2D);
            assert_eq!(info.subresource_range.level_count, 1);
            assert_eq!(info.subresource_range.layer_count, 1);

            let attempted = self.count("create_image_view");
            self.calls.borrow_mut().push("create_image_view".into());
            if self.fail_view_at.get() == Some(attempted) {
                return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
            }
            self.live_views.set(self.live_views.get() + 1);
            Ok(vk::ImageView::from_raw(self.handle()))
        }

        fn destroy_image_view(&self, _view: vk::ImageView) {
            self.calls.borrow_mut().push("destroy_image_view".into());
            self.live_views.set(self.live_views.get() - 1);
        }

        fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
            self.calls
                .borrow_mut()
                .push(format!("destroy_swapchain:{}", swapchain.as_raw()));
            self.live_swapchains.set(self.live_swapchains.get() - 1);
        }
    }

    /// A surface accepting any extent up to 4096, UNORM and SRGB formats,
    /// FIFO and MAILBOX.
    pub(crate) fn support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                ..Default::default()
            },
            formats: vec![
                surface_format(vk::Format::B8G8R8A8_UNORM),
                surface_format(vk::Format::B8G8R8A8_SRGB),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    pub(crate) fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }
}
