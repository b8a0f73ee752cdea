//! Smoke-test supervisor for the metrics exporter.
//!
//! Boots the exporter release binary under `systemd-run`, waits for the
//! transient unit to come up, polls its metrics endpoint for the test
//! window, then stops the unit and mirrors the exporter's exit status as
//! the harness exit code.

mod classify;
mod config;
mod errors;
mod exit_code;
mod journal;
mod launcher;
mod preflight;
mod prober;
mod supervisor;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::{ArgFormat, ProbeSettings, RunConfig, Transport, DEFAULT_PORT};
use crate::errors::{HarnessError, Result};
use crate::supervisor::Supervisor;

/// Exit code for harness-level failures before the service is spawned.
const SETUP_FAILURE_CODE: i32 = 2;

/// Smoke-test the metrics exporter end to end
#[derive(Parser, Debug)]
#[command(name = "exporter-smoke", version, about)]
struct Cli {
    /// Path to the exporter release binary
    #[arg(short = 'b', long)]
    binary: PathBuf,

    /// Port the exporter serves metrics on
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT,
          value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Test window in seconds
    #[arg(short = 'd', long = "duration", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    duration: u64,

    /// Transport used to reach the metrics endpoint
    #[arg(short = 't', long, value_enum, default_value = "http")]
    transport: Transport,

    /// How the exporter receives its configuration
    #[arg(short = 'f', long, value_enum, default_value = "flags")]
    format: ArgFormat,

    /// Directory holding the pre-baked exporter config files
    #[arg(long, default_value = "test-configs")]
    config_dir: PathBuf,

    /// Metrics endpoint path
    #[arg(long, default_value = "/metrics")]
    metrics_path: String,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        if self.format == ArgFormat::Config && self.port != DEFAULT_PORT {
            return Err(HarnessError::Usage(
                "custom ports cannot be used with --format config; the config files pin the port"
                    .to_string(),
            ));
        }
        // systemd-run executes from its own working directory, so both paths
        // must be absolute before they are handed over.
        let binary = std::path::absolute(&self.binary)?;
        let config_dir = std::path::absolute(&self.config_dir)?;
        Ok(RunConfig {
            binary,
            port: self.port,
            window: Duration::from_secs(self.duration),
            transport: self.transport,
            format: self.format,
            config_dir,
            metrics_path: self.metrics_path,
            probe: ProbeSettings::default(),
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e}");
            std::process::exit(SETUP_FAILURE_CODE);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    preflight::check_privilege()?;
    let credential = preflight::load_default_fixtures()?;
    let cfg = cli.into_config()?;

    let root = CancellationToken::new();
    spawn_signal_listener(root.clone());

    Supervisor::new(cfg, credential, root).run().await
}

/// Cancel the root token on the first termination signal; every scope in the
/// harness hangs off this one token.
fn spawn_signal_listener(root: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::warn!("failed to install signal handlers: {e}");
            return;
        }
        root.cancel();
    });
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}
