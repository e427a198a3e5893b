// Shader compilation (GLSL/HLSL to SPIR-V)
//
// User fragment code goes through shaderc. The vertex stage is never user
// supplied: one of two fixed GLSL sources is picked by topology.

use crate::error::{RenderError, Result};
use crate::options::Topology;

/// Any source containing this is refused before it reaches the
/// preprocessor, wherever it appears.
const FORBIDDEN: &str = "include";

const DEFAULT_GLSL_VERSION: &str = "#version 330\n";

const QUAD_VERTEX_SHADER: &str = r#"
#version 450

void main() {
  vec2 coord = vec2(
    float(gl_VertexIndex & 2),
    float(gl_VertexIndex & 1) * 2.0f);

  gl_Position = vec4(-1.0f + 2.0f * coord, 0.0f, 1.0f);
}
"#;

const TRIANGLE_VERTEX_SHADER: &str = r#"
#version 450

vec2 positions[3] = vec2[](
    vec2(-0.5, 0.5),
    vec2(0.5, 0.5),
    vec2(0.0, -0.5)
);

void main() {
  gl_Position = vec4(positions[gl_VertexIndex], 0.0, 1.0);
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceLanguage {
    #[default]
    Glsl,
    Hlsl,
}

/// Compiled SPIR-V words for one stage.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub stage: ShaderStage,
    pub words: Vec<u32>,
}

/// Reject sources that could pull in files through the preprocessor.
pub fn check_sandbox(source: &str) -> Result<()> {
    if source.contains(FORBIDDEN) {
        return Err(RenderError::validation(
            "Shader source must not contain \"include\"",
        ));
    }
    Ok(())
}

/// Sandbox check plus the GLSL version fixup. Returns the text that will
/// actually be compiled.
pub fn prepare_source(language: SourceLanguage, source: &str) -> Result<String> {
    check_sandbox(source)?;

    if language == SourceLanguage::Glsl && !source.contains("#version") {
        return Ok(format!("{DEFAULT_GLSL_VERSION}{source}"));
    }
    Ok(source.to_owned())
}

pub fn vertex_source(topology: Topology) -> &'static str {
    match topology {
        Topology::Quad => QUAD_VERTEX_SHADER,
        Topology::Triangle => TRIANGLE_VERTEX_SHADER,
    }
}

/// Compile one stage to SPIR-V.
///
/// The sandbox rule is checked again here so no caller can skip it.
pub fn compile(stage: ShaderStage, language: SourceLanguage, source: &str) -> Result<Bytecode> {
    check_sandbox(source)?;

    let compiler = shaderc::Compiler::new()
        .ok_or_else(|| RenderError::Compile("shader compiler unavailable".to_string()))?;
    let mut options = shaderc::CompileOptions::new()
        .ok_or_else(|| RenderError::Compile("shader compiler options unavailable".to_string()))?;

    options.set_source_language(match language {
        SourceLanguage::Glsl => shaderc::SourceLanguage::GLSL,
        SourceLanguage::Hlsl => shaderc::SourceLanguage::HLSL,
    });
    options.set_target_env(shaderc::TargetEnv::Vulkan, shaderc::EnvVersion::Vulkan1_2 as u32);
    options.set_auto_map_locations(true);

    let (kind, file_name) = match stage {
        ShaderStage::Vertex => (shaderc::ShaderKind::Vertex, "shader.vert"),
        ShaderStage::Fragment => (shaderc::ShaderKind::Fragment, "shader.frag"),
    };

    let artifact = compiler
        .compile_into_spirv(source, kind, file_name, "main", Some(&options))
        .map_err(|e| RenderError::Compile(e.to_string()))?;

    if artifact.get_num_warnings() > 0 {
        log::debug!("{} warnings: {}", file_name, artifact.get_warning_messages());
    }

    Ok(Bytecode {
        stage,
        words: artifact.as_binary().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SOLID_RED: &str = "\
layout(location = 0) out vec4 color;
void main() { color = vec4(1.0, 0.0, 0.0, 1.0); }
";

    #[rstest]
    #[case(SourceLanguage::Glsl)]
    #[case(SourceLanguage::Hlsl)]
    fn test_include_rejected_anywhere(#[case] language: SourceLanguage) {
        for source in [
            "#include \"/etc/passwd\"\nvoid main() {}",
            "// nothing to include here\nvoid main() {}",
            "void main() { int included = 1; }",
        ] {
            let err = prepare_source(language, source).unwrap_err();
            assert!(matches!(err, RenderError::Validation(_)), "{err:?}");

            let err = compile(ShaderStage::Fragment, language, source).unwrap_err();
            assert!(matches!(err, RenderError::Validation(_)), "{err:?}");
        }
    }

    #[test]
    fn test_include_check_is_case_sensitive() {
        assert!(check_sandbox("// INCLUDE").is_ok());
        assert!(check_sandbox("// Include").is_ok());
    }

    #[test]
    fn test_glsl_version_prepended_when_missing() {
        let prepared = prepare_source(SourceLanguage::Glsl, SOLID_RED).unwrap();
        assert!(prepared.starts_with("#version 330\n"));
        assert!(prepared.ends_with(SOLID_RED));

        let versioned = "#version 450\nvoid main() {}";
        assert_eq!(prepare_source(SourceLanguage::Glsl, versioned).unwrap(), versioned);
    }

    #[test]
    fn test_hlsl_left_untouched() {
        let hlsl = "float4 main() : SV_Target { return float4(1, 0, 0, 1); }";
        assert_eq!(prepare_source(SourceLanguage::Hlsl, hlsl).unwrap(), hlsl);
    }

    #[rstest]
    #[case(Topology::Quad)]
    #[case(Topology::Triangle)]
    fn test_builtin_vertex_shaders_compile(#[case] topology: Topology) {
        let bytecode =
            compile(ShaderStage::Vertex, SourceLanguage::Glsl, vertex_source(topology)).unwrap();
        assert_eq!(bytecode.stage, ShaderStage::Vertex);
        // SPIR-V magic number
        assert_eq!(bytecode.words[0], 0x0723_0203);
    }

    #[test]
    fn test_glsl_fragment_compiles() {
        let source = prepare_source(SourceLanguage::Glsl, SOLID_RED).unwrap();
        let bytecode = compile(ShaderStage::Fragment, SourceLanguage::Glsl, &source).unwrap();
        assert_eq!(bytecode.words[0], 0x0723_0203);
    }

    #[test]
    fn test_hlsl_fragment_compiles() {
        let source = "float4 main() : SV_Target { return float4(0.0, 1.0, 0.0, 1.0); }";
        let bytecode = compile(ShaderStage::Fragment, SourceLanguage::Hlsl, source).unwrap();
        assert_eq!(bytecode.words[0], 0x0723_0203);
    }

    #[test]
    fn test_syntax_error_reports_diagnostic() {
        let source = prepare_source(SourceLanguage::Glsl, "void main() { this is not glsl }").unwrap();
        let err = compile(ShaderStage::Fragment, SourceLanguage::Glsl, &source).unwrap_err();
        match err {
            RenderError::Compile(message) => assert!(message.contains("error"), "{message}"),
            other => panic!("expected a compile error, got {other:?}"),
        }
    }
}
