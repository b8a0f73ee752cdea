use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("this harness must run as root (it manages transient systemd units)")]
    NotRoot,

    #[error("{what} missing: {path}. Generate the test fixtures before running")]
    MissingFixture { what: &'static str, path: PathBuf },

    #[error("failed to read the credential at {path}: {source}")]
    CredentialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Usage(String),

    #[error("failed to spawn systemd-run: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("could not capture the launcher's stderr")]
    StderrCapture,

    #[error("failed to build the probe client: {0}")]
    ProbeClient(#[source] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
