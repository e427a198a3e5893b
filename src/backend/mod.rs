// Backend module - Vulkan objects for a single offscreen render
//
// Everything created here is owned by a DeviceSession and released in
// reverse creation order when the session drops.

pub mod buffer;
pub mod command;
pub mod device;
pub mod pipeline;
pub mod release;
pub mod shader;

pub use buffer::{ReadbackBuffer, RenderTarget};
pub use command::CommandContext;
pub use device::DeviceSession;
pub use pipeline::PipelineState;
