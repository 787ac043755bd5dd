//! hintctl: command-line front end for field hint resolution
//!
//! - `resolve`: run one resolution over an evidence file and print the JSON result
//! - `check`: load a model's hint document and report unusable formulas
//!
//! Logs go to stderr (`RUST_LOG` adjusts the filter); stdout carries only
//! command output.

mod cli;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{debug, info};

use field_resolver::{EngineConfig, ResolutionEngine};

use cli::Commands;

#[derive(Parser)]
#[command(name = "hintctl")]
#[command(about = "Resolve recognized text into form field values using field hints")]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "hintctl.yaml")]
    config: String,

    /// Hint document directory (overrides the config file search paths)
    #[arg(long, env = "HINTCTL_HINT_DIR")]
    hint_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hintctl=info".parse()?)
                .add_directive("field_resolver=info".parse()?)
                .add_directive("field_hints=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = load_config(Path::new(&cli.config))?;
    if let Some(hint_dir) = cli.hint_dir {
        config.hints.search_paths = vec![hint_dir];
    }
    debug!(search_paths = ?config.hints.search_paths, "Hint search paths");

    let engine = ResolutionEngine::from_config(&config);
    let output = cli::execute_command(&engine, cli.command)?;
    println!("{}", output);

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = EngineConfig::from_yaml(&content)?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}
