#![forbid(unsafe_code)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use vcpm_pack::CancelHandle;

pub mod build;
pub mod completions;

pub use build::BuildArgs;

/// Environment variable that overrides `--log`.
pub const LOG_ENV: &str = "VCPM_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "vcpm",
    about = "VCPM - Voxel Core Project Manager. Unofficial CLI for managing content packs",
    version
)]
pub struct Cli {
    /// Logging filter, used when VCPM_LOG is unset (VCPM_LOG takes precedence)
    #[arg(long = "log", default_value = "warn", global = true)]
    pub verbosity: String,

    /// Emit machine-readable JSON output where applicable
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the content pack into a zip archive
    Build(BuildArgs),
    /// Print a shell completion script
    Completions(completions::CompletionsArgs),
}

/// Resolve the logging filter to use for telemetry initialisation.
pub fn resolve_env_filter(cli: &Cli) -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| cli.verbosity.clone())
}

/// Execute the CLI using a pre-parsed argument set.
pub async fn run_with_cli(cli: Cli, cancel: CancelHandle) -> Result<()> {
    match cli.command {
        Command::Build(args) => build::handle(args, cli.json, cancel).await?,
        Command::Completions(args) => completions::handle(args),
    }

    Ok(())
}
