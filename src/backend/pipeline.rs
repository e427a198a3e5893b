// Graphics pipeline creation
//
// Fixed-function state for a single full-viewport draw: no vertex buffers,
// no depth, no blending. Everything the pipeline needs is sized from the
// render target.

use ash::vk;

use super::buffer::{RenderTarget, COLOR_FORMAT};
use super::device::DeviceSession;
use super::release::PendingRelease;
use super::shader::create_shader_module;
use crate::compiler::Bytecode;
use crate::error::{DeviceResultExt, Result};

/// All objects derived from the shaders and the render target.
#[derive(Debug, Clone, Copy)]
pub struct PipelineState {
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

impl PipelineState {
    pub fn build(
        session: &mut DeviceSession,
        target: &RenderTarget,
        vertex: &Bytecode,
        fragment: &Bytecode,
    ) -> Result<Self> {
        let vertex_module = create_shader_module(session, vertex)?;
        let fragment_module = create_shader_module(session, fragment)?;
        let layout = create_pipeline_layout(session)?;
        let render_pass = create_render_pass(session)?;
        let pipeline = create_graphics_pipeline(
            session,
            render_pass,
            layout,
            target.extent,
            vertex_module,
            fragment_module,
        )?;
        let framebuffer = create_framebuffer(session, render_pass, target)?;

        log::debug!("Pipeline ready for {}x{}", target.extent.width, target.extent.height);

        Ok(Self {
            vertex_module,
            fragment_module,
            layout,
            render_pass,
            pipeline,
            framebuffer,
            extent: target.extent,
        })
    }
}

/// Empty layout: no descriptor sets, no push constants.
pub fn create_pipeline_layout(session: &mut DeviceSession) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder();

    let layout = unsafe { session.device().create_pipeline_layout(&layout_info, None) }
        .or_device("create pipeline layout")?;
    session.track(PendingRelease::PipelineLayout(layout));

    Ok(layout)
}

/// One color attachment, cleared on load and left ready for a transfer read.
pub fn create_render_pass(session: &mut DeviceSession) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(COLOR_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // Color writes must be visible to the copy that follows the pass
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(0)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags::TRANSFER)
        .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    let render_pass = unsafe { session.device().create_render_pass(&render_pass_info, None) }
        .or_device("create render pass")?;
    session.track(PendingRelease::RenderPass(render_pass));

    Ok(render_pass)
}

pub fn create_framebuffer(
    session: &mut DeviceSession,
    render_pass: vk::RenderPass,
    target: &RenderTarget,
) -> Result<vk::Framebuffer> {
    let attachments = &[target.view];
    let framebuffer_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(target.extent.width)
        .height(target.extent.height)
        .layers(1);

    let framebuffer = unsafe { session.device().create_framebuffer(&framebuffer_info, None) }
        .or_device("create framebuffer")?;
    session.track(PendingRelease::Framebuffer(framebuffer));

    Ok(framebuffer)
}

pub fn create_graphics_pipeline(
    session: &mut DeviceSession,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // Positions come from gl_VertexIndex, nothing is bound
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build();

    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build();

    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    // No culling: the two vertex shaders emit opposite windings
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0);

    // Pass-through: write every channel, no blend equation
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        session.device().create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    }
    .map_err(|(_, e)| e)
    .or_device("create graphics pipeline")?;

    let pipeline = pipelines[0];
    session.track(PendingRelease::Pipeline(pipeline));

    Ok(pipeline)
}
