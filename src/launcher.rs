//! Spawning the exporter under `systemd-run` and asking systemd to stop it.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::errors::{HarnessError, Result};

/// Transient-unit properties: notify-type startup, a watchdog, and a bounded
/// start so a hung exporter fails the run instead of stalling it.
const UNIT_PROPERTIES: [&str; 3] = [
    "--property=Type=notify",
    "--property=WatchdogSec=5s",
    "--property=TimeoutStartSec=5s",
];

/// Build the launcher command:
/// `systemd-run --wait --collect <properties> <binary> <exporter args…>`.
///
/// stdout is passed through; stderr is piped so the supervisor can watch for
/// the unit markers systemd prints there.
pub fn launch_command(cfg: &RunConfig) -> Command {
    let mut cmd = Command::new("systemd-run");
    cmd.arg("--wait").arg("--collect").args(UNIT_PROPERTIES);
    cmd.arg(&cfg.binary);
    cmd.args(cfg.exporter_args());
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped());
    cmd
}

/// Spawn the launcher. `--wait` keeps it alive for the unit's whole life, so
/// its exit status mirrors the exporter's.
pub fn spawn(cfg: &RunConfig) -> Result<Child> {
    info!("spawning {} under systemd-run", cfg.binary.display());
    launch_command(cfg).spawn().map_err(HarnessError::Spawn)
}

/// Ask systemd to stop the transient unit. Fire-and-forget: only the
/// launcher's own exit event is authoritative, so the request is not awaited
/// beyond reaping it in the background.
pub fn request_unit_stop(unit: &str) {
    let unit = unit.to_string();
    let spawned = Command::new("systemctl")
        .args(["stop", &unit])
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn();
    match spawned {
        Ok(mut child) => {
            tokio::spawn(async move {
                if let Err(e) = child.wait().await {
                    warn!("systemctl stop {unit} did not complete: {e}");
                }
            });
        }
        Err(e) => warn!("failed to run systemctl stop {unit}: {e}"),
    }
}
