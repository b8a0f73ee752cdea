//! Health probing of the exporter's metrics endpoint.
//!
//! One request per tick, strictly sequential: the next attempt is scheduled
//! only after the previous one has been fully resolved and its resources
//! dropped. The first failing attempt ends the loop; cancellation of the
//! probe scope ends it silently (the normal shutdown path).

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ProbeSettings, RunConfig, Transport};
use crate::errors::{HarnessError, Result};

/// Content-type marker of the metrics text format.
const OPENMETRICS_MARKER: &str = "application/openmetrics-text";

/// Basic-auth user the exporter grants metrics access to.
const METRICS_USER: &str = "metrics";

/// Summary of one HTTP response, already fully drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body_bytes: usize,
}

/// Terminal judgment of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success {
        status: u16,
        content_type: String,
        bytes: usize,
    },
    Timeout,
    Transport(String),
    Protocol(String),
}

/// One fetch of the metrics endpoint. Implementations must drain the
/// response body before returning so every attempt releases its connection.
pub trait ProbeClient {
    async fn fetch(&self) -> std::result::Result<ProbeResponse, String>;
}

/// Probe client backed by a real HTTP client.
pub struct HttpProbeClient {
    client: reqwest::Client,
    url: String,
    credential: String,
}

impl HttpProbeClient {
    /// Build the client for the configured transport. HTTPS accepts the
    /// self-signed test certificate.
    pub fn new(cfg: &RunConfig, credential: &str) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if cfg.transport == Transport::Https {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(HarnessError::ProbeClient)?;
        let scheme = match cfg.transport {
            Transport::Http => "http",
            Transport::Https => "https",
        };
        let url = format!("{scheme}://localhost:{}{}", cfg.port, cfg.metrics_path);
        Ok(Self {
            client,
            url,
            credential: credential.to_string(),
        })
    }
}

impl ProbeClient for HttpProbeClient {
    async fn fetch(&self) -> std::result::Result<ProbeResponse, String> {
        let response = self
            .client
            .get(&self.url)
            .basic_auth(METRICS_USER, Some(&self.credential))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| e.to_string())?
            .len();
        Ok(ProbeResponse {
            status,
            content_type,
            body_bytes,
        })
    }
}

/// Judge a drained response against the metrics-endpoint contract:
/// a 2xx status, the openmetrics content type, and a non-empty body.
pub fn evaluate(response: &ProbeResponse) -> ProbeOutcome {
    if !(200..300).contains(&response.status) {
        return ProbeOutcome::Protocol(format!(
            "unsuccessful response with status {}",
            response.status
        ));
    }
    let content_type = response.content_type.clone().unwrap_or_default();
    if !content_type.contains(OPENMETRICS_MARKER) {
        return ProbeOutcome::Protocol(format!("unexpected content type {content_type:?}"));
    }
    if response.body_bytes == 0 {
        return ProbeOutcome::Protocol("empty response body".to_string());
    }
    ProbeOutcome::Success {
        status: response.status,
        content_type,
        bytes: response.body_bytes,
    }
}

/// Poll the endpoint until the first failure or until `cancel` fires.
///
/// Returns the failing outcome, reported exactly once, or `None` when the
/// loop was stopped by cancellation. Dropping the losing side of each
/// `select!` aborts the in-flight request or pending timer.
pub async fn run_probe_loop(
    client: &impl ProbeClient,
    settings: ProbeSettings,
    cancel: &CancellationToken,
) -> Option<ProbeOutcome> {
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            attempt = timeout(settings.request_timeout, client.fetch()) => match attempt {
                Err(_) => ProbeOutcome::Timeout,
                Ok(Err(e)) => ProbeOutcome::Transport(e),
                Ok(Ok(response)) => evaluate(&response),
            },
        };

        match &outcome {
            ProbeOutcome::Success {
                status,
                content_type,
                bytes,
            } => info!("probe response: {status} {content_type} {bytes}B"),
            ProbeOutcome::Timeout => {
                warn!("probe timed out after {:?}", settings.request_timeout);
                return Some(outcome);
            }
            ProbeOutcome::Transport(e) => {
                warn!("probe transport error: {e}");
                return Some(outcome);
            }
            ProbeOutcome::Protocol(e) => {
                warn!("probe protocol violation: {e}");
                return Some(outcome);
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = sleep(settings.interval) => {}
        }
    }
}
