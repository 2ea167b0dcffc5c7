// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical/logical device and queues. Built once by
//! [`Context::new`] and never mutated afterwards.

use std::ffi::{c_char, c_void, CStr, CString};

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use glint_render::{RenderError, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, trace, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Everything the device build depends on, consumed by one call.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub app_name: String,
    pub api_version: u32,
    pub device_extensions: Vec<&'static CStr>,
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    /// Enable `VK_LAYER_KHRONOS_validation` and a debug messenger when the
    /// layer is installed.
    pub validation: bool,
    pub prefer_dedicated_transfer: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "glint".into(),
            api_version: vk::API_VERSION_1_3,
            device_extensions: vec![swapchain::NAME],
            dynamic_rendering: true,
            synchronization2: true,
            validation: cfg!(debug_assertions),
            prefer_dedicated_transfer: true,
        }
    }
}

impl DeviceConfig {
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_validation(mut self, on: bool) -> Self {
        self.validation = on;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilies {
    pub fn unique(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.present, self.transfer];
        families.sort_unstable();
        families.dedup();
        families
    }
}

pub struct Context {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub device: ash::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub transfer_queue: vk::Queue,
}

// Teardown: device, then surface, then messenger, instance last.
impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn init_err(what: &str) -> impl Fn(vk::Result) -> RenderError + '_ {
    move |e| RenderError::DeviceInit(format!("{what}: {e}"))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        error!(?types, "vulkan: {msg}");
    } else if severity.contains(S::WARNING) {
        warn!(?types, "vulkan: {msg}");
    } else if severity.contains(S::INFO) {
        debug!(?types, "vulkan: {msg}");
    } else {
        trace!(?types, "vulkan: {msg}");
    }
    vk::FALSE
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name)
}

unsafe fn create_instance(
    entry: &Entry,
    display: &dyn HasDisplayHandle,
    config: &DeviceConfig,
    validation: bool,
) -> Result<Instance> {
    let app = CString::new(config.app_name.as_str())
        .map_err(|e| RenderError::DeviceInit(format!("application name: {e}")))?;

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: config.api_version,
        ..Default::default()
    };

    let display_raw = display
        .display_handle()
        .map_err(|e| RenderError::DeviceInit(format!("display handle: {e}")))?
        .as_raw();
    let mut exts = ash_window::enumerate_required_extensions(display_raw)
        .map_err(init_err("enumerate_required_extensions"))?
        .to_vec();
    if validation {
        exts.push(debug_utils::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];
    let layer_count = if validation { layers.len() as u32 } else { 0 };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layer_count,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    entry
        .create_instance(&create_info, None)
        .map_err(init_err("vkCreateInstance"))
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .map_err(init_err("vkCreateDebugUtilsMessengerEXT"))?;
    Ok((loader, messenger))
}

struct Candidate {
    phys: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    families: QueueFamilies,
    score: u32,
}

/// Graphics + present families (one family when possible) and a transfer
/// family, preferring one without graphics.
unsafe fn pick_families(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    prefer_dedicated_transfer: bool,
) -> Option<QueueFamilies> {
    let props = instance.get_physical_device_queue_family_properties(phys);
    let presents = |i: usize| {
        surface_loader
            .get_physical_device_surface_support(phys, i as u32, surface)
            .unwrap_or(false)
    };
    let graphics_family = |q: &vk::QueueFamilyProperties| {
        q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    let shared = props
        .iter()
        .enumerate()
        .position(|(i, q)| graphics_family(q) && presents(i));
    let (graphics, present) = match shared {
        Some(i) => (i, i),
        None => (
            props.iter().position(graphics_family)?,
            (0..props.len()).find(|&i| presents(i))?,
        ),
    };

    let dedicated = props.iter().position(|q| {
        q.queue_count > 0
            && q.queue_flags.contains(vk::QueueFlags::TRANSFER)
            && !q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    });
    let transfer = match dedicated {
        Some(i) if prefer_dedicated_transfer => i,
        _ => graphics,
    };

    Some(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
        transfer: transfer as u32,
    })
}

unsafe fn supports_extensions(instance: &Instance, phys: vk::PhysicalDevice, names: &[&CStr]) -> bool {
    let available = instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default();
    names.iter().all(|&name| {
        available
            .iter()
            .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
    })
}

unsafe fn supports_features(instance: &Instance, phys: vk::PhysicalDevice, config: &DeviceConfig) -> bool {
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        ..Default::default()
    };
    let mut feats2 = vk::PhysicalDeviceFeatures2 {
        s_type: vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        p_next: (&mut feats13) as *mut _ as *mut c_void,
        ..Default::default()
    };
    instance.get_physical_device_features2(phys, &mut feats2);
    (!config.dynamic_rendering || feats13.dynamic_rendering == vk::TRUE)
        && (!config.synchronization2 || feats13.synchronization2 == vk::TRUE)
}

unsafe fn select_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    config: &DeviceConfig,
) -> Result<Candidate> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(init_err("vkEnumeratePhysicalDevices"))?;

    devices
        .into_iter()
        .filter_map(|phys| {
            let properties = instance.get_physical_device_properties(phys);
            let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy();
            if properties.api_version < config.api_version {
                debug!(%name, "skipped: api version too old");
                return None;
            }
            if !supports_extensions(instance, phys, &config.device_extensions)
                || !supports_features(instance, phys, config)
            {
                debug!(%name, "skipped: missing extensions or features");
                return None;
            }
            let families = pick_families(
                instance,
                surface_loader,
                surface,
                phys,
                config.prefer_dedicated_transfer,
            )?;
            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
                _ => 0,
            };
            Some(Candidate {
                phys,
                properties,
                families,
                score,
            })
        })
        .max_by_key(|c| c.score)
        .ok_or_else(|| RenderError::DeviceInit("no physical device supports the surface".into()))
}

unsafe fn create_device(
    instance: &Instance,
    candidate: &Candidate,
    config: &DeviceConfig,
) -> Result<ash::Device> {
    // Feature chain: feats2 -> feats13. Core structs only.
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = candidate
        .families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        dynamic_rendering: config.dynamic_rendering.into(),
        synchronization2: config.synchronization2.into(),
        ..Default::default()
    };
    let feats2 = vk::PhysicalDeviceFeatures2 {
        s_type: vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        p_next: (&mut feats13) as *mut _ as *mut c_void,
        ..Default::default()
    };

    let exts: Vec<*const c_char> = config.device_extensions.iter().map(|e| e.as_ptr()).collect();
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        p_next: (&feats2) as *const _ as *const c_void,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        ..Default::default()
    };

    instance
        .create_device(candidate.phys, &dinfo, None)
        .map_err(init_err("vkCreateDevice"))
}

impl Context {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        config: &DeviceConfig,
    ) -> Result<Self> {
        unsafe {
            // Order: instance, surface from that instance, then the device
            // chosen against that surface.
            let entry = Entry::load()
                .map_err(|e| RenderError::DeviceInit(format!("loading Vulkan: {e}")))?;

            let validation = config.validation && has_layer(&entry, VALIDATION_LAYER);
            if config.validation && !validation {
                warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
            }
            let instance = create_instance(&entry, display, config, validation)?;
            let debug = if validation {
                Some(create_debug_messenger(&entry, &instance)?)
            } else {
                None
            };

            let display_raw = display
                .display_handle()
                .map_err(|e| RenderError::DeviceInit(format!("display handle: {e}")))?
                .as_raw();
            let window_raw = window
                .window_handle()
                .map_err(|e| RenderError::DeviceInit(format!("window handle: {e}")))?
                .as_raw();
            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface =
                ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
                    .map_err(init_err("create_surface"))?;

            let candidate = select_physical_device(&instance, &surface_loader, surface, config)?;
            let device = create_device(&instance, &candidate, config)?;
            let families = candidate.families;

            let name = CStr::from_ptr(candidate.properties.device_name.as_ptr()).to_string_lossy();
            info!(
                device = %name,
                graphics = families.graphics,
                present = families.present,
                transfer = families.transfer,
                validation,
                "vulkan device ready"
            );
            if families.transfer == families.graphics {
                warn!("no dedicated transfer queue; sharing the graphics family");
            }

            Ok(Self {
                graphics_queue: device.get_device_queue(families.graphics, 0),
                present_queue: device.get_device_queue(families.present, 0),
                transfer_queue: device.get_device_queue(families.transfer, 0),
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys: candidate.phys,
                properties: candidate.properties,
                device,
                families,
            })
        }
    }
}
