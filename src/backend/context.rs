// Graphics Context - Instance, GPU and logical device
//
// Responsibilities:
// - Instance creation with windowing extensions and optional validation
// - Debug messenger forwarding driver messages to the log
// - Physical device selection (see selector)
// - Logical device + graphics queue creation
//
// Construction is all-or-nothing: every step either succeeds or the error is
// returned after releasing what was already acquired, in reverse order.

use super::diagnostics::{severity_level, ResultName};
use super::selector::{self, DeviceCandidate, QueueFamilyIndices};
use super::teardown::ReleaseStack;
use super::uniqueness::{ActiveCheck, UniquenessCheck};
use super::{prober, Error};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};
use std::sync::Arc;

const ENGINE_NAME: &CStr = c"GPU Present";

/// Options for building a GraphicsContext.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub application_name: String,
    /// Request validation layers and the debug-utils messenger.
    pub enable_diagnostics: bool,
    pub validation_layers: Vec<CString>,
    /// Log every instance extension and layer before creating the instance.
    pub print_capabilities: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            application_name: "GPU Present".to_string(),
            enable_diagnostics: cfg!(debug_assertions),
            validation_layers: vec![c"VK_LAYER_KHRONOS_validation".to_owned()],
            print_capabilities: false,
        }
    }
}

/// The process-wide Vulkan context.
///
/// Surfaces hold an `Arc` to it, so it is destroyed only after the last
/// surface is gone.
pub struct GraphicsContext {
    entry: Entry,
    instance: ash::Instance,
    diagnostics: Option<vk::DebugUtilsMessengerEXT>,
    gpu: DeviceCandidate,
    queue_families: QueueFamilyIndices,
    device: ash::Device,
    graphics_queue: vk::Queue,

    surface_loader: khr::Surface,
    swapchain_loader: khr::Swapchain,

    // Destroys device, messenger and instance in that order
    releases: ReleaseStack,
    _unique: <ActiveCheck as UniquenessCheck>::Token,
}

impl GraphicsContext {
    /// Builds the context for windows living on `display_handle`.
    pub fn new(settings: &ContextSettings, display_handle: RawDisplayHandle) -> Result<Arc<Self>, Error> {
        log::info!("Creating graphics context: {}", settings.application_name);

        let unique = ActiveCheck::acquire("GraphicsContext")?;

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;
        let mut releases = ReleaseStack::new();

        if settings.print_capabilities {
            prober::log_instance_capabilities(&entry)?;
        }

        // Step 2: Create instance
        let window_extensions = ash_window::enumerate_required_extensions(display_handle)
            .map_err(Error::query("enumerate_required_extensions"))?
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect::<Vec<_>>();
        let (instance, layers) = Self::create_instance(&entry, settings, &window_extensions)?;
        {
            let instance = instance.clone();
            releases.push("instance", move || unsafe { instance.destroy_instance(None) });
        }

        // Step 3: Debug messenger, only if the instance got the extension
        let diagnostics = if layers.diagnostics {
            Self::attach_diagnostics(&entry, &instance)
        } else {
            None
        };
        if let Some((debug_utils, messenger)) = diagnostics.clone() {
            releases.push("debug messenger", move || unsafe {
                debug_utils.destroy_debug_utils_messenger(messenger, None)
            });
        }

        // Step 4: Pick physical device (GPU)
        let required_device_extensions = [khr::Swapchain::name()];
        let (gpu, queue_families) = selector::select_device(&instance, &required_device_extensions)?;

        log::info!("Selected GPU: {} ({:?})", gpu.name, gpu.device_type);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(gpu.api_version),
            vk::api_version_minor(gpu.api_version),
            vk::api_version_patch(gpu.api_version)
        );
        log::info!(
            "Queue families: graphics {}, compute {:?}",
            queue_families.graphics,
            queue_families.compute
        );

        // Step 5: Create logical device
        let (device, graphics_queue) = Self::create_logical_device(
            &instance,
            &gpu,
            queue_families,
            &required_device_extensions,
            &layers.enabled,
        )?;
        {
            let device = device.clone();
            releases.push("logical device", move || unsafe { device.destroy_device(None) });
        }

        let surface_loader = khr::Surface::new(&entry, &instance);
        let swapchain_loader = khr::Swapchain::new(&instance, &device);

        log::info!("Graphics context ready");

        Ok(Arc::new(Self {
            entry,
            instance,
            diagnostics: diagnostics.map(|(_, messenger)| messenger),
            gpu,
            queue_families,
            device,
            graphics_queue,
            surface_loader,
            swapchain_loader,
            releases,
            _unique: unique,
        }))
    }

    /// Creates the instance with the windowing extensions, plus debug utils
    /// and validation layers when requested and available.
    fn create_instance(
        entry: &Entry,
        settings: &ContextSettings,
        window_extensions: &[&CStr],
    ) -> Result<(ash::Instance, InstanceLayers), Error> {
        let available = prober::list_instance_extensions(entry)?;

        let missing = prober::missing_extensions(window_extensions, &available);
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|name| name.to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::MissingWindowExtensions(names));
        }

        let available_layers = if settings.enable_diagnostics {
            prober::list_instance_layers(entry)?
        } else {
            Vec::new()
        };
        let layers = plan_diagnostics(settings, &available, &available_layers);

        let mut extensions = window_extensions.to_vec();
        if layers.diagnostics {
            extensions.push(DebugUtils::name());
        }

        let app_name = CString::new(settings.application_name.as_str())
            .unwrap_or_else(|_| ENGINE_NAME.to_owned());
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs = extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();
        let layer_ptrs = layers.enabled.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();

        // Also reports problems during vkCreateInstance/vkDestroyInstance
        let mut instance_messenger = messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if layers.diagnostics {
            create_info = create_info.push_next(&mut instance_messenger);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|r| Error::InstanceCreation(r.into()))?;

        log::info!(
            "Instance created with {} extensions and {} layers",
            extension_ptrs.len(),
            layer_ptrs.len()
        );
        Ok((instance, layers))
    }

    /// Registers the debug messenger. Failure only costs observability.
    fn attach_diagnostics(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Option<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        match unsafe { debug_utils.create_debug_utils_messenger(&messenger_info(), None) } {
            Ok(messenger) => Some((debug_utils, messenger)),
            Err(result) => {
                log::warn!("vkCreateDebugUtilsMessengerEXT failed with {}", ResultName(result));
                None
            }
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        gpu: &DeviceCandidate,
        queue_families: QueueFamilyIndices,
        extensions: &[&CStr],
        layers: &[CString],
    ) -> Result<(ash::Device, vk::Queue), Error> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_families.graphics)
            .queue_priorities(&queue_priorities)
            .build();

        let extension_ptrs = extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();
        // Ignored by current loaders, kept for older implementations
        let layer_ptrs = layers.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();
        let features = vk::PhysicalDeviceFeatures::default();

        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(gpu.handle, &create_info, None) }
            .map_err(|r| Error::DeviceCreation(r.into()))?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };

        Ok((device, graphics_queue))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn gpu(&self) -> &DeviceCandidate {
        &self.gpu
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.gpu.handle
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    pub fn swapchain_loader(&self) -> &khr::Swapchain {
        &self.swapchain_loader
    }

    pub fn has_diagnostics(&self) -> bool {
        self.diagnostics.is_some()
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), Error> {
        unsafe { self.device.device_wait_idle() }.map_err(Error::query("vkDeviceWaitIdle"))
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        log::info!("Destroying graphics context...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }
        log::debug!("Release order: {:?}", self.releases.pending());
        self.releases.release_all();
    }
}

/// What instance creation actually enabled.
#[derive(Debug, Default)]
struct InstanceLayers {
    enabled: Vec<CString>,
    diagnostics: bool,
}

/// Decides the debug-utils extension and validation layers to enable.
///
/// Missing pieces are dropped with a warning; instance creation goes ahead
/// without them.
fn plan_diagnostics(
    settings: &ContextSettings,
    available_extensions: &[vk::ExtensionProperties],
    available_layers: &[vk::LayerProperties],
) -> InstanceLayers {
    let mut layers = InstanceLayers::default();
    if !settings.enable_diagnostics {
        return layers;
    }

    if prober::extensions_supported(&[DebugUtils::name()], available_extensions) {
        layers.diagnostics = true;
    } else {
        log::warn!("Validation requested but debug extension not present");
    }

    let requested = settings
        .validation_layers
        .iter()
        .map(CString::as_c_str)
        .collect::<Vec<_>>();
    if prober::layer_supported(&requested, available_layers) {
        // Only the layers that exist; the loader rejects unknown names
        layers.enabled = requested
            .into_iter()
            .filter(|name| {
                available_layers
                    .iter()
                    .any(|layer| prober::layer_name(layer) == *name)
            })
            .map(CStr::to_owned)
            .collect();
    } else {
        log::warn!("Validation layer support requested but not supported");
    }

    layers
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    log::log!(
        severity_level(message_severity),
        "[Vulkan] {}",
        message.to_string_lossy()
    );

    vk::FALSE
}
