// One-shot command recording and submission
//
// A single primary command buffer is recorded with the whole frame:
// layout barrier, render pass, draw, copy to the readback buffer. It is
// submitted once and the queue is drained before returning.

use ash::vk;

use super::buffer::{ReadbackBuffer, RenderTarget, COLOR_SUBRESOURCE_RANGE};
use super::device::DeviceSession;
use super::pipeline::PipelineState;
use super::release::PendingRelease;
use crate::error::{DeviceResultExt, Result};

/// Vertices per draw. Both topologies are a single triangle.
const VERTEX_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
}

impl CommandContext {
    pub fn new(session: &mut DeviceSession) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(session.queue_family());

        let pool = unsafe { session.device().create_command_pool(&pool_info, None) }
            .or_device("create command pool")?;
        session.track(PendingRelease::CommandPool(pool));

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = unsafe { session.device().allocate_command_buffers(&alloc_info) }
            .or_device("allocate command buffer")?[0];
        session.track(PendingRelease::CommandBuffer { pool, buffer });

        Ok(Self { pool, buffer })
    }

    /// Record, submit and wait for the single draw.
    pub fn render_once(
        &self,
        session: &DeviceSession,
        pipeline: &PipelineState,
        target: &RenderTarget,
        readback: &ReadbackBuffer,
        clear_color: [f32; 4],
    ) -> Result<()> {
        self.record(session, pipeline, target, readback, clear_color)?;
        self.submit(session)
    }

    fn record(
        &self,
        session: &DeviceSession,
        pipeline: &PipelineState,
        target: &RenderTarget,
        readback: &ReadbackBuffer,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let device = session.device();
        let cmd = self.buffer;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { device.begin_command_buffer(cmd, &begin_info) }
            .or_device("begin command buffer")?;

        // UNDEFINED -> COLOR_ATTACHMENT_OPTIMAL before the pass clears it
        let to_attachment = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(target.image)
            .subresource_range(COLOR_SUBRESOURCE_RANGE)
            .build();

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(pipeline.render_pass)
            .framebuffer(pipeline.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pipeline.extent,
            })
            .clear_values(&clear_values);

        // One region covering the whole image, rows tightly packed
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: target.extent.width,
                height: target.extent.height,
                depth: 1,
            })
            .build();

        let to_host = vk::BufferMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(readback.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_attachment],
            );

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            device.cmd_draw(cmd, VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.cmd_copy_image_to_buffer(
                cmd,
                target.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback.buffer,
                &[region],
            );

            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[],
                &[to_host],
                &[],
            );
        }

        unsafe { device.end_command_buffer(cmd) }.or_device("record command buffer")
    }

    fn submit(&self, session: &DeviceSession) -> Result<()> {
        let command_buffers = [self.buffer];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        unsafe {
            session
                .device()
                .queue_submit(session.queue(), &[submit_info], vk::Fence::null())
        }
        .or_device("submit command buffer")?;

        // Exactly one render per session, so a blocking wait is all the
        // synchronization needed.
        session.wait_idle()
    }
}
