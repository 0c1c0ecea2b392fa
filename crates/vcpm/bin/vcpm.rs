use std::process::ExitCode;

use clap::Parser;
use tokio::runtime::Builder;
use tracing::warn;
use vcpm::cli::{self, Cli};
use vcpm_pack::{BuildError, CancelHandle};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env_filter = cli::resolve_env_filter(&cli);

    match run(cli, &env_filter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<BuildError>()
                .map(BuildError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli, env_filter: &str) -> anyhow::Result<()> {
    vcpm::telemetry::install(env_filter)?;
    let rt = Builder::new_multi_thread().enable_all().build()?;

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping before the archive is written");
            on_interrupt.cancel();
        }
    });

    rt.block_on(cli::run_with_cli(cli, cancel))
}
