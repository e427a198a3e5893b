// =============================================================================
// SHADEY CLI - render one fragment shader to a PNG
// =============================================================================
//
//   shadey shader.frag
//   shadey --hlsl --output-dir renders shader.hlsl
//   cat shader.frag | shadey -
//
// Prints the path of the written image. Failures are printed in the same
// escaped, length-capped form a chat front end would relay.
//
// =============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use shadey::config::Config;
use shadey::{report, Engine, SourceLanguage};

#[derive(Debug, Parser)]
#[command(name = "shadey", version, about = "Render a fragment shader offscreen to a PNG")]
struct Args {
    /// Fragment shader source file, or `-` for stdin
    shader: PathBuf,

    /// Treat the source as HLSL instead of GLSL
    #[arg(long)]
    hlsl: bool,

    /// Configuration file (defaults to ./shadey.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the generated image, overriding the config file
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);

    let source = match read_source(&args.shader) {
        Ok(source) => source,
        Err(e) => {
            log::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let language = if args.hlsl {
        SourceLanguage::Hlsl
    } else {
        SourceLanguage::Glsl
    };

    match Engine::from_config(&config).render(&source, language) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::debug!("Render failed: {:?}", e);
            eprintln!("{}", report::format_failure(&e));
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }

    Ok(config)
}

/// Level comes from the config file; RUST_LOG still wins when set
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.logging.level_filter());
    builder.parse_default_env();
    builder.init();
}

fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read shader from stdin")?;
        return Ok(source);
    }

    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read shader file: {:?}", path))
}
