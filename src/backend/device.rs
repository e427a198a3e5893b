// Device session - one Vulkan instance + device per render
//
// Responsibilities:
// - Instance creation (optionally with validation layers)
// - Physical device + queue family selection (first match, no scoring)
// - Logical device + queue creation
// - Memory type selection for readback and render target memory
// - Owning every object created on the device until the session ends

use ash::{vk, Entry};
use std::ffi::{CStr, CString};

use super::release::{PendingRelease, ReleaseStack};
use crate::config::DeviceConfig;
use crate::error::{DeviceResultExt, RenderError, Result};

/// Readback memory: mapped by the host for the whole session.
pub const HOST_MEMORY_FLAGS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw()
        | vk::MemoryPropertyFlags::HOST_CACHED.as_raw(),
);

/// Render target memory.
pub const DEVICE_MEMORY_FLAGS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    HostVisible,
    DeviceLocal,
}

impl MemoryKind {
    pub fn flags(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::HostVisible => HOST_MEMORY_FLAGS,
            Self::DeviceLocal => DEVICE_MEMORY_FLAGS,
        }
    }
}

/// Instance plus the loader it came from. Destroyed last.
struct InstanceHandle {
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    instance: ash::Instance,
    _entry: Entry,
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

struct DeviceHandle {
    device: ash::Device,
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}

/// Everything needed to talk to one GPU for one render.
///
/// Field order matters for Drop: tracked objects are released first (in
/// `Drop::drop`), then the device, then the instance.
pub struct DeviceSession {
    resources: ReleaseStack,
    device: DeviceHandle,
    queue: vk::Queue,
    queue_family: u32,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    host_memory_type: u32,
    device_memory_type: u32,
    instance: InstanceHandle,
}

impl DeviceSession {
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        log::debug!("Opening device session: {}", config.application_name);

        let entry = unsafe { Entry::load() }
            .map_err(|e| RenderError::device("load the Vulkan library", e))?;

        let instance = Self::create_instance(&entry, config)?;
        let debug_utils = if config.validation_layers {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(debug_utils) => Some(debug_utils),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        // From here on the instance is released by InstanceHandle::drop on
        // every early return.
        let instance = InstanceHandle {
            debug_utils,
            instance,
            _entry: entry,
        };

        let physical_device = Self::pick_physical_device(&instance.instance)?;
        let queue_family = Self::pick_queue_family(&instance.instance, physical_device)?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        let memory_properties = unsafe {
            instance.instance.get_physical_device_memory_properties(physical_device)
        };

        log::info!("Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy());
        log::debug!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));

        let host_memory_type = find_memory_type(&memory_properties, u32::MAX, HOST_MEMORY_FLAGS)
            .ok_or_else(|| RenderError::device(
                "select a memory type",
                "no host-visible, coherent and cached memory type",
            ))?;
        let device_memory_type = find_memory_type(&memory_properties, u32::MAX, DEVICE_MEMORY_FLAGS)
            .ok_or_else(|| RenderError::device(
                "select a memory type",
                "no device-local memory type",
            ))?;

        let (device, queue) =
            Self::create_logical_device(&instance.instance, physical_device, queue_family)?;

        Ok(Self {
            resources: ReleaseStack::new(),
            device: DeviceHandle { device },
            queue,
            queue_family,
            memory_properties,
            host_memory_type,
            device_memory_type,
            instance,
        })
    }

    fn create_instance(entry: &Entry, config: &DeviceConfig) -> Result<ash::Instance> {
        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| RenderError::device("create instance", e))?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions = Vec::new();
        let mut layer_names = Vec::new();
        if config.validation_layers {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
            layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.or_device("create instance")
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
        }.or_device("create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    /// First enumerated device, no scoring.
    fn pick_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .or_device("enumerate physical devices")?;

        devices.first().copied().ok_or_else(|| {
            RenderError::device("find a GPU", "no Vulkan capable device enumerated")
        })
    }

    /// First queue family with the graphics bit.
    fn pick_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<u32> {
        let queue_families = unsafe {
            instance.get_physical_device_queue_family_properties(physical_device)
        };

        queue_families
            .iter()
            .position(|props| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
            .ok_or_else(|| RenderError::device("select a queue family", "no graphics queue available"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_features(&features);

        let device = unsafe {
            instance.create_device(physical_device, &create_info, None)
        }.or_device("create logical device")?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Ok((device, queue))
    }

    pub fn device(&self) -> &ash::Device {
        &self.device.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// The memory type chosen at open time for `kind`.
    pub fn selected_memory_type(&self, kind: MemoryKind) -> u32 {
        match kind {
            MemoryKind::HostVisible => self.host_memory_type,
            MemoryKind::DeviceLocal => self.device_memory_type,
        }
    }

    /// Memory type for an allocation with the given `memoryTypeBits`.
    pub fn memory_type_for(&self, kind: MemoryKind, type_bits: u32) -> Result<u32> {
        let selected = self.selected_memory_type(kind);
        if type_bits & (1 << selected) != 0 {
            return Ok(selected);
        }

        find_memory_type(&self.memory_properties, type_bits, kind.flags()).ok_or_else(|| {
            RenderError::device(
                "select a memory type",
                format!("no {kind:?} memory type allowed by mask {type_bits:#x}"),
            )
        })
    }

    /// Hand ownership of a freshly created object to the session.
    pub fn track(&mut self, release: PendingRelease) {
        self.resources.push(release);
    }

    pub fn tracked_count(&self) -> usize {
        self.resources.len()
    }

    /// Block until all submitted work has finished.
    ///
    /// There is no timeout; a hung driver blocks here forever.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device().queue_wait_idle(self.queue) }.or_device("wait for queue idle")
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        log::debug!("Closing device session ({} objects)", self.resources.len());

        if let Err(e) = unsafe { self.device.device.device_wait_idle() } {
            log::error!("Device wait before teardown failed: {:?}", e);
        }

        unsafe { self.resources.unwind(&self.device.device) };
    }
}

/// First memory type allowed by `type_bits` whose flags contain `flags`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let allowed = type_bits & (1 << i) != 0;
        let has_flags = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(flags);
        allowed && has_flags
    })
}

// Validation layer messages end up in the regular log
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
