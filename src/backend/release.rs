// Release stack - Vulkan objects owned by a session
//
// Every object is pushed right after it is created. Unwinding pops in
// reverse order, so whatever was built last is destroyed first, no matter
// how far construction got before an error.

use ash::vk;

/// A Vulkan object waiting to be destroyed.
#[derive(Debug, Clone, Copy)]
pub enum PendingRelease {
    Image(vk::Image),
    ImageView(vk::ImageView),
    Buffer(vk::Buffer),
    Memory(vk::DeviceMemory),
    ShaderModule(vk::ShaderModule),
    PipelineLayout(vk::PipelineLayout),
    RenderPass(vk::RenderPass),
    Pipeline(vk::Pipeline),
    Framebuffer(vk::Framebuffer),
    CommandPool(vk::CommandPool),
    CommandBuffer {
        pool: vk::CommandPool,
        buffer: vk::CommandBuffer,
    },
}

impl PendingRelease {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::ImageView(_) => "image view",
            Self::Buffer(_) => "buffer",
            Self::Memory(_) => "memory",
            Self::ShaderModule(_) => "shader module",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::RenderPass(_) => "render pass",
            Self::Pipeline(_) => "pipeline",
            Self::Framebuffer(_) => "framebuffer",
            Self::CommandPool(_) => "command pool",
            Self::CommandBuffer { .. } => "command buffer",
        }
    }

    /// Destroy the object.
    ///
    /// # Safety
    ///
    /// The handle must have been created from `device` and the GPU must no
    /// longer be using it.
    pub unsafe fn destroy(self, device: &ash::Device) {
        match self {
            Self::Image(image) => device.destroy_image(image, None),
            Self::ImageView(view) => device.destroy_image_view(view, None),
            Self::Buffer(buffer) => device.destroy_buffer(buffer, None),
            Self::Memory(memory) => device.free_memory(memory, None),
            Self::ShaderModule(module) => device.destroy_shader_module(module, None),
            Self::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
            Self::RenderPass(render_pass) => device.destroy_render_pass(render_pass, None),
            Self::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
            Self::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer, None),
            Self::CommandPool(pool) => device.destroy_command_pool(pool, None),
            Self::CommandBuffer { pool, buffer } => device.free_command_buffers(pool, &[buffer]),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReleaseStack {
    pending: Vec<PendingRelease>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, release: PendingRelease) {
        log::debug!("Tracking {}", release.label());
        self.pending.push(release);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove every entry, most recent first.
    pub fn drain_reverse(&mut self) -> impl Iterator<Item = PendingRelease> + '_ {
        self.pending.drain(..).rev()
    }

    /// Destroy everything on the stack, most recent first.
    ///
    /// # Safety
    ///
    /// Same contract as [`PendingRelease::destroy`] for every entry.
    pub unsafe fn unwind(&mut self, device: &ash::Device) {
        for release in self.drain_reverse() {
            log::debug!("Releasing {}", release.label());
            release.destroy(device);
        }
    }
}
