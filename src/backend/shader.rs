// Shader module creation
//
// Vulkan consumes SPIR-V words; the compiler adapter already hands us u32s,
// so no realignment is needed here.

use ash::vk;

use super::device::DeviceSession;
use super::release::PendingRelease;
use crate::compiler::{Bytecode, ShaderStage};
use crate::error::{DeviceResultExt, Result};

/// Create a shader module owned by `session`.
pub fn create_shader_module(
    session: &mut DeviceSession,
    bytecode: &Bytecode,
) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&bytecode.words);

    let operation = match bytecode.stage {
        ShaderStage::Vertex => "create vertex shader module",
        ShaderStage::Fragment => "create fragment shader module",
    };

    let module = unsafe { session.device().create_shader_module(&create_info, None) }
        .or_device(operation)?;
    session.track(PendingRelease::ShaderModule(module));

    Ok(module)
}
