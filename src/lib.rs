// =============================================================================
// SHADEY - offscreen shader runner
// =============================================================================
//
// Takes untrusted fragment shader source, renders it once into an offscreen
// Vulkan image and writes the result as a PNG.
//
// FLOW:
// 1. Sandbox check + directive parsing (no GPU involved)
// 2. Compile the built-in vertex shader and the user fragment shader
// 3. Open a device session (instance, device, queue, memory types)
// 4. Build render target, readback buffer, pipeline, command buffer
// 5. Record, submit, wait idle
// 6. Copy pixels out, tear the session down, encode the PNG
//
// =============================================================================

pub mod backend;
pub mod compiler;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod options;
pub mod report;

pub use compiler::SourceLanguage;
pub use config::Config;
pub use engine::{render_shader, Engine};
pub use error::{RenderError, Result};
pub use options::{parse_options, RenderOptions, Resolution, Topology};
