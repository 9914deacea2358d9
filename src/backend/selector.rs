// Device Selector - Score and pick one physical GPU
//
// Everything the selection needs is gathered once per GPU into a
// DeviceCandidate; scoring and filtering then run on plain data.

use super::prober;
use super::Error;
use ash::vk;
use std::ffi::CStr;

/// Bonus for discrete GPUs, and the penalty for missing geometry shaders.
pub const DISCRETE_GPU_BONUS: i64 = 1000;

/// Resolved queue family indices of the selected GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub compute: Option<u32>,
}

/// Result of a queue family scan, before the graphics family is confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyCandidate {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
}

impl QueueFamilyCandidate {
    pub fn resolve(self) -> Option<QueueFamilyIndices> {
        self.graphics.map(|graphics| QueueFamilyIndices {
            graphics,
            compute: self.compute,
        })
    }
}

/// What device selection knows about one physical GPU.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    pub extensions: Vec<vk::ExtensionProperties>,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl DeviceCandidate {
    pub fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Result<Self, Error> {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let features = unsafe { instance.get_physical_device_features(handle) };

        Ok(Self {
            handle,
            name: unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: properties.device_type,
            api_version: properties.api_version,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            geometry_shader: features.geometry_shader == vk::TRUE,
            extensions: prober::list_device_extensions(instance, handle)?,
            queue_families: prober::list_queue_families(instance, handle),
        })
    }
}

/// Higher is strictly preferred.
pub fn score_device(gpu: &DeviceCandidate) -> i64 {
    let mut score = 0;

    if gpu.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }

    // Maximum possible size of textures affects graphics quality
    score += i64::from(gpu.max_image_dimension_2d);

    if !gpu.geometry_shader {
        score -= DISCRETE_GPU_BONUS;
    }

    score
}

/// Scans every family in index order. The first graphics family wins; the
/// first compute family is recorded along the way.
pub fn find_queue_families(families: &[vk::QueueFamilyProperties]) -> QueueFamilyCandidate {
    let mut candidate = QueueFamilyCandidate::default();

    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let index = index as u32;

        if candidate.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            candidate.graphics = Some(index);
        }
        if candidate.compute.is_none() && family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            candidate.compute = Some(index);
        }
    }

    candidate
}

pub fn is_device_suitable(gpu: &DeviceCandidate, required_extensions: &[&CStr]) -> bool {
    prober::extensions_supported(required_extensions, &gpu.extensions)
        && find_queue_families(&gpu.queue_families).graphics.is_some()
}

/// The suitable candidate with the highest score; ties go to the first seen.
pub fn pick_best_device<'a>(
    candidates: &'a [DeviceCandidate],
    required_extensions: &[&CStr],
) -> Option<&'a DeviceCandidate> {
    let mut best: Option<(&DeviceCandidate, i64)> = None;

    for gpu in candidates {
        if !is_device_suitable(gpu, required_extensions) {
            log::debug!("GPU {} is not suitable", gpu.name);
            continue;
        }

        let score = score_device(gpu);
        log::debug!("GPU {} ({:?}) scored {}", gpu.name, gpu.device_type, score);

        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((gpu, score)),
        }
    }

    best.map(|(gpu, _)| gpu)
}

/// Enumerates the GPUs visible to `instance` and picks the best suitable one.
pub fn select_device(
    instance: &ash::Instance,
    required_extensions: &[&CStr],
) -> Result<(DeviceCandidate, QueueFamilyIndices), Error> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(Error::query("vkEnumeratePhysicalDevices"))?;

    let mut candidates = Vec::with_capacity(devices.len());
    for handle in devices {
        match DeviceCandidate::query(instance, handle) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => log::warn!("Skipping GPU: {}", e),
        }
    }

    let best = pick_best_device(&candidates, required_extensions).ok_or(Error::NoSuitableDevice)?;
    let families = find_queue_families(&best.queue_families)
        .resolve()
        .ok_or(Error::NoSuitableDevice)?;

    Ok((best.clone(), families))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::prober::extension_properties;
    use ash::vk::Handle;

    const SWAPCHAIN: &CStr = c"VK_KHR_swapchain";

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn gpu(id: u64, device_type: vk::PhysicalDeviceType, max_dim: u32) -> DeviceCandidate {
        DeviceCandidate {
            handle: vk::PhysicalDevice::from_raw(id),
            name: format!("gpu{}", id),
            device_type,
            api_version: vk::API_VERSION_1_0,
            max_image_dimension_2d: max_dim,
            geometry_shader: true,
            extensions: vec![extension_properties("VK_KHR_swapchain")],
            queue_families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)],
        }
    }

    #[test]
    fn first_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];

        let found = find_queue_families(&families);
        assert_eq!(found.graphics, Some(1));
        assert_eq!(found.compute, Some(2));
    }

    #[test]
    fn compute_is_recorded_after_graphics() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];

        let indices = find_queue_families(&families).resolve().unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 0, compute: Some(1) });
    }

    #[test]
    fn no_graphics_family_does_not_resolve() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        assert_eq!(find_queue_families(&families).resolve(), None);
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];

        assert_eq!(find_queue_families(&families).graphics, Some(1));
    }

    #[test]
    fn suitable_gpu_has_graphics_family() {
        let candidates = [
            gpu(1, vk::PhysicalDeviceType::INTEGRATED_GPU, 8192),
            {
                let mut g = gpu(2, vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
                g.queue_families = vec![family(vk::QueueFlags::COMPUTE)];
                g
            },
        ];

        for candidate in candidates.iter().filter(|g| is_device_suitable(g, &[SWAPCHAIN])) {
            let graphics = find_queue_families(&candidate.queue_families).graphics.unwrap();
            assert!(candidate.queue_families[graphics as usize]
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS));
        }
        assert!(!is_device_suitable(&candidates[1], &[SWAPCHAIN]));
    }

    #[test]
    fn missing_device_extension_is_unsuitable() {
        let mut g = gpu(1, vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        g.extensions.clear();
        assert!(!is_device_suitable(&g, &[SWAPCHAIN]));
        assert!(is_device_suitable(&g, &[]));
    }

    #[test]
    fn discrete_outscores_integrated_by_bonus() {
        let discrete = gpu(1, vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let integrated = gpu(2, vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);

        assert!(score_device(&discrete) - score_device(&integrated) >= DISCRETE_GPU_BONUS);
    }

    #[test]
    fn missing_geometry_shader_is_penalized() {
        let with = gpu(1, vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let mut without = with.clone();
        without.geometry_shader = false;

        assert_eq!(score_device(&with) - score_device(&without), DISCRETE_GPU_BONUS);
    }

    #[test]
    fn best_scoring_suitable_gpu_is_picked() {
        let mut unsuitable = gpu(3, vk::PhysicalDeviceType::DISCRETE_GPU, 32768);
        unsuitable.extensions.clear();
        let candidates = [
            gpu(1, vk::PhysicalDeviceType::INTEGRATED_GPU, 16384),
            gpu(2, vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
            unsuitable,
        ];

        let best = pick_best_device(&candidates, &[SWAPCHAIN]).unwrap();
        assert_eq!(best.handle, vk::PhysicalDevice::from_raw(2));

        let max = candidates
            .iter()
            .filter(|g| is_device_suitable(g, &[SWAPCHAIN]))
            .map(score_device)
            .max()
            .unwrap();
        assert_eq!(score_device(best), max);
    }

    #[test]
    fn ties_go_to_first_enumerated() {
        let candidates = [
            gpu(7, vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
            gpu(8, vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
        ];

        for _ in 0..3 {
            let best = pick_best_device(&candidates, &[SWAPCHAIN]).unwrap();
            assert_eq!(best.handle, vk::PhysicalDevice::from_raw(7));
        }
    }

    #[test]
    fn negative_scores_still_pick_a_gpu() {
        let mut weak = gpu(1, vk::PhysicalDeviceType::CPU, 0);
        weak.geometry_shader = false;

        assert!(score_device(&weak) < 0);
        assert!(pick_best_device(&[weak], &[SWAPCHAIN]).is_some());
    }

    #[test]
    fn zero_suitable_gpus_pick_nothing() {
        let mut g = gpu(1, vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        g.queue_families.clear();

        assert!(pick_best_device(&[], &[SWAPCHAIN]).is_none());
        assert!(pick_best_device(&[g], &[SWAPCHAIN]).is_none());
    }
}
