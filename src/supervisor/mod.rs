//! The run orchestrator: owns the launcher process and coordinates its life
//! from spawn to confirmed exit.
//!
//! Every termination trigger (a delivered signal, a failed probe, the test
//! window running out, the unit failing to start, the launcher exiting on
//! its own) converges on [`Supervisor::begin_termination`]; the state
//! machine guarantees its body runs at most once.

use std::fmt;
use std::process::ExitStatus;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::classify::{classify, LineClass};
use crate::config::{RunConfig, SETTLE_DELAY};
use crate::errors::{HarnessError, Result};
use crate::exit_code;
use crate::journal;
use crate::launcher;
use crate::prober::{self, HttpProbeClient};

/// Forward-only lifecycle of a supervised run. `Terminating` is reachable
/// from every earlier state; nothing happens after `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SupervisorState {
    Spawning,
    AwaitingReady,
    Probing,
    Terminating,
    Terminated,
}

/// Why the run is being brought down. Recorded at most once; the first
/// trigger wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT/SIGTERM delivered to the harness.
    Interrupted,
    /// A probe attempt failed.
    ProbeFailed,
    /// The test window ran out, the normal end of a passing run.
    WindowElapsed,
    /// The launcher exited before anything asked it to.
    ServiceExited,
    /// The unit never became ready.
    ServiceFailed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Interrupted => "interrupted by signal",
            StopReason::ProbeFailed => "health probe failed",
            StopReason::WindowElapsed => "test window elapsed",
            StopReason::ServiceExited => "service exited on its own",
            StopReason::ServiceFailed => "service failed to start",
        };
        f.write_str(text)
    }
}

pub struct Supervisor {
    cfg: RunConfig,
    credential: String,
    root: CancellationToken,
    probe_scope: CancellationToken,
    follow_scope: CancellationToken,
    state: SupervisorState,
    /// Transient unit name, discovered from the launcher's stderr.
    unit: Option<String>,
    /// stderr lines held back until readiness or failure is known, so a
    /// failed start can be replayed as a clean transcript. `None` once the
    /// supervisor has switched to pass-through.
    held: Option<Vec<String>>,
    reason: Option<StopReason>,
}

impl Supervisor {
    pub fn new(cfg: RunConfig, credential: String, root: CancellationToken) -> Self {
        let probe_scope = root.child_token();
        let follow_scope = root.child_token();
        Self {
            cfg,
            credential,
            root,
            probe_scope,
            follow_scope,
            state: SupervisorState::Spawning,
            unit: None,
            held: Some(Vec::new()),
            reason: None,
        }
    }

    /// Drive the run from spawn to confirmed exit; returns the harness exit
    /// code.
    pub async fn run(mut self) -> Result<i32> {
        let probe_client = HttpProbeClient::new(&self.cfg, &self.credential)?;

        let mut child = launcher::spawn(&self.cfg)?;
        self.state = SupervisorState::AwaitingReady;

        let stderr = child.stderr.take().ok_or(HarnessError::StderrCapture)?;
        let mut lines = BufReader::new(stderr).lines();

        let (stop_tx, mut stop_rx) = mpsc::channel::<StopReason>(4);
        let mut probe_client = Some(probe_client);
        let mut stderr_open = true;
        let root = self.root.clone();

        let code = loop {
            tokio::select! {
                _ = root.cancelled(), if self.state < SupervisorState::Terminating => {
                    info!("termination signal received");
                    self.begin_termination(StopReason::Interrupted, &mut child);
                }
                Some(reason) = stop_rx.recv(), if self.state < SupervisorState::Terminating => {
                    self.begin_termination(reason, &mut child);
                }
                line = lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => self.handle_line(line, &mut probe_client, &stop_tx).await,
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!("error reading launcher stderr: {e}");
                        stderr_open = false;
                    }
                },
                status = child.wait() => {
                    break self.finish(status);
                }
            }
        };

        Ok(code)
    }

    /// React to one stderr line. Before readiness, lines are classified and
    /// held; afterwards they pass straight through.
    async fn handle_line(
        &mut self,
        line: String,
        probe_client: &mut Option<HttpProbeClient>,
        stop_tx: &mpsc::Sender<StopReason>,
    ) {
        if self.held.is_none() {
            eprintln!("{line}");
            return;
        }
        match classify(&line) {
            LineClass::UnitLive(unit) if self.state == SupervisorState::AwaitingReady => {
                info!("detected transient unit: {unit}");
                self.unit = Some(unit.clone());
                self.flush_held();
                journal::spawn_follower(&unit, self.follow_scope.clone());
                if let Some(client) = probe_client.take() {
                    self.start_probing(client, stop_tx.clone());
                }
            }
            LineClass::UnitFailed(unit) => {
                warn!("unit failed to initialize: {unit}");
                self.flush_held();
                journal::dump_failure_context(&unit).await;
                let _ = stop_tx.send(StopReason::ServiceFailed).await;
            }
            LineClass::DetailsHint => {}
            LineClass::UnitLive(_) | LineClass::Other => self.hold(line),
        }
    }

    /// Schedule the probe loop: settle, then poll until the first failure,
    /// the end of the test window, or scope cancellation.
    fn start_probing(&mut self, client: HttpProbeClient, stop_tx: mpsc::Sender<StopReason>) {
        self.state = SupervisorState::Probing;
        let scope = self.probe_scope.clone();
        let settings = self.cfg.probe;
        let window = self.cfg.window;
        info!("probing starts in {SETTLE_DELAY:?}, window {window:?}");

        tokio::spawn(async move {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = sleep(SETTLE_DELAY) => {}
            }
            info!("starting fetch loop");
            tokio::select! {
                _ = sleep(window) => {
                    let _ = stop_tx.send(StopReason::WindowElapsed).await;
                }
                failed = prober::run_probe_loop(&client, settings, &scope) => {
                    if failed.is_some() {
                        let _ = stop_tx.send(StopReason::ProbeFailed).await;
                    }
                }
            }
        });
    }

    /// Convergent termination entry point. Every trigger funnels here; only
    /// the first caller performs the escalation.
    fn begin_termination(&mut self, reason: StopReason, child: &mut Child) {
        if !self.note_stop(reason) {
            return;
        }
        info!("stopping service: {reason}");
        self.probe_scope.cancel();

        match self.unit.as_deref() {
            Some(unit) => launcher::request_unit_stop(unit),
            None => signal_launcher(child),
        }
        info!("stop request sent; waiting for the launcher to exit");
    }

    /// Record the stop reason. Returns false when termination has already
    /// begun, making every later trigger a no-op.
    fn note_stop(&mut self, reason: StopReason) -> bool {
        if self.state >= SupervisorState::Terminating {
            return false;
        }
        self.state = SupervisorState::Terminating;
        self.reason = Some(reason);
        true
    }

    /// Final accounting once the launcher has exited: stop the follower,
    /// replay anything still held, and translate the exit status.
    fn finish(&mut self, status: std::io::Result<ExitStatus>) -> i32 {
        self.probe_scope.cancel();
        self.follow_scope.cancel();
        self.flush_held();

        if self.state < SupervisorState::Terminating {
            self.note_stop(StopReason::ServiceExited);
        }
        self.state = SupervisorState::Terminated;
        let reason = self.reason.unwrap_or(StopReason::ServiceExited);

        match status {
            Ok(status) => {
                let code = exit_code::from_status(status);
                info!("launcher exited: {status} ({reason}); harness exit code {code}");
                code
            }
            Err(e) => {
                error!("failed waiting for the launcher: {e}");
                1
            }
        }
    }

    /// Keep a pre-ready line for later replay.
    fn hold(&mut self, line: String) {
        if let Some(held) = self.held.as_mut() {
            held.push(line);
        }
    }

    /// Replay every held line in arrival order and switch to pass-through.
    fn flush_held(&mut self) {
        if let Some(held) = self.held.take() {
            for line in held {
                eprintln!("{line}");
            }
        }
    }
}

/// Send SIGTERM to the launcher directly. Used when no unit name was ever
/// discovered, so there is no session to stop gracefully.
fn signal_launcher(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("failed to signal the launcher: {e}");
                let _ = child.start_kill();
            }
        }
        // Already reaped; nothing to signal.
        None => {}
    }
}

#[cfg(test)]
mod tests;
