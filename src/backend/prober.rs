// Capability Prober - Read-only driver and hardware queries
//
// Instance extensions/layers, device extensions and queue families.
// Nothing here owns state; the support checks are pure so device selection
// can be tested without a driver.

use super::Error;
use ash::{vk, Entry};
use std::ffi::CStr;

pub fn list_instance_extensions(entry: &Entry) -> Result<Vec<vk::ExtensionProperties>, Error> {
    entry
        .enumerate_instance_extension_properties(None)
        .map_err(Error::query("vkEnumerateInstanceExtensionProperties"))
}

pub fn list_instance_layers(entry: &Entry) -> Result<Vec<vk::LayerProperties>, Error> {
    entry
        .enumerate_instance_layer_properties()
        .map_err(Error::query("vkEnumerateInstanceLayerProperties"))
}

pub fn list_device_extensions(
    instance: &ash::Instance,
    gpu: vk::PhysicalDevice,
) -> Result<Vec<vk::ExtensionProperties>, Error> {
    unsafe { instance.enumerate_device_extension_properties(gpu) }
        .map_err(Error::query("vkEnumerateDeviceExtensionProperties"))
}

/// Queue family capabilities; a family's index is its position.
pub fn list_queue_families(
    instance: &ash::Instance,
    gpu: vk::PhysicalDevice,
) -> Vec<vk::QueueFamilyProperties> {
    unsafe { instance.get_physical_device_queue_family_properties(gpu) }
}

pub fn extension_name(properties: &vk::ExtensionProperties) -> &CStr {
    // SAFETY: the driver fills extensionName with a null-terminated string
    unsafe { CStr::from_ptr(properties.extension_name.as_ptr()) }
}

pub fn layer_name(properties: &vk::LayerProperties) -> &CStr {
    // SAFETY: the driver fills layerName with a null-terminated string
    unsafe { CStr::from_ptr(properties.layer_name.as_ptr()) }
}

/// True iff every required extension has an exact name match.
pub fn extensions_supported(required: &[&CStr], available: &[vk::ExtensionProperties]) -> bool {
    missing_extensions(required, available).is_empty()
}

/// Required extensions without a match in `available`, in request order.
pub fn missing_extensions<'a>(
    required: &[&'a CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| !available.iter().any(|ext| extension_name(ext) == *name))
        .collect()
}

/// True iff at least one of the required layers is available.
pub fn layer_supported(required: &[&CStr], available: &[vk::LayerProperties]) -> bool {
    required
        .iter()
        .any(|name| available.iter().any(|layer| layer_name(layer) == *name))
}

/// Logs every instance extension and layer, for `debug.print_capabilities`.
pub fn log_instance_capabilities(entry: &Entry) -> Result<(), Error> {
    let extensions = list_instance_extensions(entry)?;
    log::info!("Number of available extensions: {}", extensions.len());
    for (idx, ext) in extensions.iter().enumerate() {
        log::info!("Extension {}) {}", idx, extension_name(ext).to_string_lossy());
    }

    let layers = list_instance_layers(entry)?;
    log::info!("Number of available layers: {}", layers.len());
    for (idx, layer) in layers.iter().enumerate() {
        log::info!("Layer {}) {}", idx, layer_name(layer).to_string_lossy());
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn extension_properties(name: &str) -> vk::ExtensionProperties {
    let mut props = vk::ExtensionProperties::default();
    for (dst, &b) in props.extension_name.iter_mut().zip(name.as_bytes()) {
        *dst = b as std::ffi::c_char;
    }
    props
}

#[cfg(test)]
pub(crate) fn layer_properties(name: &str) -> vk::LayerProperties {
    let mut props = vk::LayerProperties::default();
    for (dst, &b) in props.layer_name.iter_mut().zip(name.as_bytes()) {
        *dst = b as std::ffi::c_char;
    }
    props
}
