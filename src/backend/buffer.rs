// Render target and readback buffer
//
// The render target is a device-local RGBA8 image the pipeline draws into.
// The readback buffer is host-visible memory the image is copied into after
// the draw, mapped for the whole session.

use ash::vk;

use super::device::{DeviceSession, MemoryKind};
use super::release::PendingRelease;
use crate::error::{DeviceResultExt, Result};
use crate::options::Resolution;

pub const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub const COLOR_SUBRESOURCE_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Device-local color image + view.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

impl RenderTarget {
    pub fn new(session: &mut DeviceSession, resolution: Resolution) -> Result<Self> {
        let extent = vk::Extent2D {
            width: resolution.width,
            height: resolution.height,
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(COLOR_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { session.device().create_image(&image_info, None) }
            .or_device("create render target image")?;
        session.track(PendingRelease::Image(image));

        let mem_requirements = unsafe { session.device().get_image_memory_requirements(image) };
        let memory_type_index =
            session.memory_type_for(MemoryKind::DeviceLocal, mem_requirements.memory_type_bits)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { session.device().allocate_memory(&alloc_info, None) }
            .or_device("allocate render target memory")?;
        session.track(PendingRelease::Memory(memory));

        unsafe { session.device().bind_image_memory(image, memory, 0) }
            .or_device("bind render target memory")?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(COLOR_FORMAT)
            .subresource_range(COLOR_SUBRESOURCE_RANGE);

        let view = unsafe { session.device().create_image_view(&view_info, None) }
            .or_device("create render target view")?;
        session.track(PendingRelease::ImageView(view));

        log::debug!("Render target: {}x{}", extent.width, extent.height);

        Ok(Self { image, view, extent })
    }
}

/// Host-visible buffer holding `4 * width * height` bytes, persistently mapped.
#[derive(Debug)]
pub struct ReadbackBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    mapped: *const u8,
}

impl ReadbackBuffer {
    pub fn new(session: &mut DeviceSession, resolution: Resolution) -> Result<Self> {
        let size = resolution.rgba8_size();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { session.device().create_buffer(&buffer_info, None) }
            .or_device("create readback buffer")?;
        session.track(PendingRelease::Buffer(buffer));

        let mem_requirements = unsafe { session.device().get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            session.memory_type_for(MemoryKind::HostVisible, mem_requirements.memory_type_bits)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { session.device().allocate_memory(&alloc_info, None) }
            .or_device("allocate readback buffer memory")?;
        // Freeing mapped memory unmaps it implicitly.
        session.track(PendingRelease::Memory(memory));

        unsafe { session.device().bind_buffer_memory(buffer, memory, 0) }
            .or_device("bind readback buffer memory")?;

        let mapped = unsafe {
            session
                .device()
                .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        }
        .or_device("map readback buffer memory")? as *const u8;

        Ok(Self { buffer, size, mapped })
    }

    /// View the mapped contents.
    ///
    /// Only meaningful after the copy into this buffer has completed. The
    /// session must still be alive, which the borrow enforces.
    pub fn contents<'a>(&'a self, _session: &'a DeviceSession) -> &'a [u8] {
        // The memory type is host-coherent, so no invalidate is needed.
        unsafe { std::slice::from_raw_parts(self.mapped, self.size as usize) }
    }
}
