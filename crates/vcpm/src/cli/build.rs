#![forbid(unsafe_code)]

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use vcpm_pack::build::{BuildEvent, BuildOptions, BuildReport, Builder, CancelHandle};
use vcpm_pack::select::{DEFAULT_EXCLUDED_MODULE, DEFAULT_OUT_DIR};
use vcpm_pack::{BuildError, BuildMode, ErrorKind};

#[derive(Debug, Clone, Parser)]
pub struct BuildArgs {
    /// Root directory of the content pack (must contain package.json or pack.toml)
    #[arg(long = "dir", value_name = "DIR", default_value = ".")]
    pub input: PathBuf,

    /// Build in development mode
    #[arg(short = 'd', long)]
    pub dev: bool,

    /// Directory receiving the archive, relative to the pack root unless absolute
    #[arg(long = "out-dir", value_name = "DIR", default_value = DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// Subtree that production builds never ship
    #[arg(long = "exclude-module", value_name = "PATH", default_value = DEFAULT_EXCLUDED_MODULE)]
    pub excluded_module: PathBuf,

    /// Maximum number of files read at once (defaults to available parallelism)
    #[arg(long, value_name = "N")]
    pub jobs: Option<NonZeroUsize>,
}

impl From<BuildArgs> for BuildOptions {
    fn from(args: BuildArgs) -> Self {
        let mut options = BuildOptions::new(normalize(args.input), BuildMode::from_dev_flag(args.dev));
        options.out_dir = args.out_dir;
        options.excluded_module = args.excluded_module;
        if let Some(jobs) = args.jobs {
            options.max_concurrent_reads = jobs.get();
        }
        options
    }
}

pub async fn handle(args: BuildArgs, json: bool, cancel: CancelHandle) -> Result<()> {
    let options = BuildOptions::from(args);
    info!(path = %options.project_root.display(), mode = %options.mode, "build requested");

    let mut builder = Builder::new(options).with_cancel(cancel);
    if !json {
        builder = builder.with_observer(announce);
    }
    let report = match builder.run().await {
        Ok(report) => report,
        Err(err) => {
            let headline = headline(&err);
            return Err(anyhow::Error::new(err).context(headline));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_human(&report);
    }

    Ok(())
}

/// Console progress; nothing is printed before the manifest has loaded.
fn announce(event: BuildEvent<'_>) {
    if let Some(line) = progress_line(event) {
        println!("{line}");
    }
}

fn progress_line(event: BuildEvent<'_>) -> Option<&'static str> {
    match event {
        BuildEvent::ManifestLoaded(_) => Some("Start building..."),
        BuildEvent::RemovingPrevious(_) => Some("Remove previous build..."),
        BuildEvent::FilesSelected(_) | BuildEvent::Writing(_) => None,
    }
}

fn print_human(report: &BuildReport) {
    println!(
        "  pack: {}\n  files: {}\n  output: {}",
        report.identity,
        report.entries,
        report.output_path.display()
    );
    match report.mode {
        BuildMode::Production => println!("Production build completed!"),
        BuildMode::Development => println!("Development build completed!"),
    }
}

/// User-facing summary for each failure kind.
fn headline(err: &BuildError) -> &'static str {
    match err.kind() {
        ErrorKind::ManifestMissing => "Pack manifest (package.json or pack.toml) does not exist",
        ErrorKind::ManifestInvalid => "Not a voxel core content pack",
        ErrorKind::ManifestFieldInvalid => match err {
            BuildError::ManifestFieldInvalid {
                field: vcpm_pack::ManifestField::Id,
                ..
            } => "Invalid package ID",
            _ => "Invalid package version",
        },
        ErrorKind::SelectionFailed | ErrorKind::FileUnreadable => "Failed to read project files",
        ErrorKind::OutputUnwritable | ErrorKind::Archive => "Failed to write build output",
        ErrorKind::OutputOverlapsProject => "Output directory overlaps the project",
        ErrorKind::Cancelled => "Build cancelled",
    }
}

fn normalize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}
