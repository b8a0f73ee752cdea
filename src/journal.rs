//! journalctl/systemctl visibility tooling around the transient unit.
//!
//! Everything here is best-effort operator context: failures are reported
//! and ignored, and nothing in this module can change the run's outcome.

use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Stream the unit's journal to the console for the rest of the run.
///
/// Fire-and-forget: the supervisor never waits for this process. It is
/// killed through `cancel` once the unit itself is gone.
pub fn spawn_follower(unit: &str, cancel: CancellationToken) {
    let unit = unit.to_string();
    tokio::spawn(async move {
        let spawned = Command::new("journalctl")
            .args(["--unit", &unit, "--follow", "--output=cat"])
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("could not start the journal follower for {unit}: {e}");
                return;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                debug!("journal follower for {unit} stopped");
            }
            status = child.wait() => match status {
                Ok(status) => debug!("journal follower for {unit} exited: {status}"),
                Err(e) => warn!("journal follower for {unit} errored: {e}"),
            },
        }
    });
}

/// Print the unit's journal and systemd's view of it after a failed start,
/// one command after the other so the two outputs stay sequenced.
pub async fn dump_failure_context(unit: &str) {
    run_display_command("journalctl", &["--unit", unit, "--catalog", "--output=cat"]).await;
    run_display_command("systemctl", &["status", unit]).await;
}

async fn run_display_command(program: &str, args: &[&str]) {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await;
    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.trim_end().is_empty() {
                eprintln!("{}", stdout.trim_end());
            }
            if !stderr.trim_end().is_empty() {
                eprintln!("{}", stderr.trim_end());
            }
        }
        Err(e) => warn!("could not run {program}: {e}"),
    }
}
