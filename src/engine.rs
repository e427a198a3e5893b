// Engine - one fragment shader in, one PNG out
//
// Every call to Engine::render builds a fresh device session, draws once,
// tears the session down and then writes the image. Nothing GPU-side
// survives between calls.

use std::path::PathBuf;

use crate::backend::{CommandContext, DeviceSession, PipelineState, ReadbackBuffer, RenderTarget};
use crate::compiler::{self, ShaderStage, SourceLanguage};
use crate::config::{Config, DeviceConfig};
use crate::encoder::ImageEncoder;
use crate::error::Result;
use crate::options::{self, RenderOptions};

#[derive(Debug, Clone)]
pub struct Engine {
    device: DeviceConfig,
    encoder: ImageEncoder,
}

impl Engine {
    pub fn new(device: DeviceConfig, encoder: ImageEncoder) -> Self {
        Self { device, encoder }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.device.clone(), ImageEncoder::new(&config.output.directory))
    }

    /// Render `source` and return the path of the written image.
    ///
    /// Blocks until the GPU is done. Sandbox, directive and compile errors
    /// are reported before any GPU object exists.
    pub fn render(&self, source: &str, language: SourceLanguage) -> Result<PathBuf> {
        let (options, pixels) = self.render_pixels(source, language)?;
        log::debug!("Device session closed, encoding {} bytes", pixels.len());

        self.encoder.write_image(&pixels, options.resolution)
    }

    /// Render `source` into tightly packed RGBA8 rows.
    ///
    /// The device session is opened and closed inside this call; the
    /// returned pixels are owned by the caller.
    pub fn render_pixels(
        &self,
        source: &str,
        language: SourceLanguage,
    ) -> Result<(RenderOptions, Vec<u8>)> {
        let source = compiler::prepare_source(language, source)?;
        let options = options::parse_options(&source)?;

        log::info!(
            "Rendering {:?} shader at {}x{} ({:?})",
            language,
            options.resolution.width,
            options.resolution.height,
            options.topology
        );

        let vertex = compiler::compile(
            ShaderStage::Vertex,
            SourceLanguage::Glsl,
            compiler::vertex_source(options.topology),
        )?;
        let fragment = compiler::compile(ShaderStage::Fragment, language, &source)?;

        let mut session = DeviceSession::open(&self.device)?;
        let pixels = Self::draw(&mut session, &options, &vertex, &fragment)?;
        drop(session);

        Ok((options, pixels))
    }

    /// Build every GPU object, draw once and copy the readback contents out.
    fn draw(
        session: &mut DeviceSession,
        options: &RenderOptions,
        vertex: &compiler::Bytecode,
        fragment: &compiler::Bytecode,
    ) -> Result<Vec<u8>> {
        options.validate()?;

        let target = RenderTarget::new(session, options.resolution)?;
        let readback = ReadbackBuffer::new(session, options.resolution)?;
        let pipeline = PipelineState::build(session, &target, vertex, fragment)?;
        let commands = CommandContext::new(session)?;

        commands.render_once(session, &pipeline, &target, &readback, options.clear_color)?;

        log::debug!("Draw complete, {} objects to release", session.tracked_count());
        Ok(readback.contents(session).to_vec())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Render with default settings into the working directory.
pub fn render_shader(source: &str, language: SourceLanguage) -> Result<PathBuf> {
    Engine::default().render(source, language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    // These fail before a device is opened, so they run without a GPU.

    #[test]
    fn test_include_rejected_before_compiling() {
        let engine = Engine::default();
        for language in [SourceLanguage::Glsl, SourceLanguage::Hlsl] {
            let err = engine
                .render("// include me\nthis would not even compile", language)
                .unwrap_err();
            assert!(matches!(err, RenderError::Validation(_)), "{err:?}");
        }
    }

    #[test]
    fn test_bad_resolution_rejected_before_compiling() {
        let err = Engine::default()
            .render("// SHADEY: resolution = 0 0\nnot glsl", SourceLanguage::Glsl)
            .unwrap_err();
        assert!(matches!(err, RenderError::Validation(_)), "{err:?}");
    }

    #[test]
    fn test_from_config_uses_output_directory() {
        let mut config = Config::default();
        config.output.directory = PathBuf::from("renders");
        config.device.validation_layers = true;

        let engine = Engine::from_config(&config);
        assert_eq!(engine.encoder.directory(), std::path::Path::new("renders"));
        assert!(engine.device.validation_layers);
    }

    #[test]
    fn test_compile_error_before_device() {
        let err = Engine::default()
            .render("void main() { oops }", SourceLanguage::Glsl)
            .unwrap_err();
        assert!(matches!(err, RenderError::Compile(_)), "{err:?}");
    }
}
