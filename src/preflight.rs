//! Eager environment checks, performed before anything is spawned.

use std::path::Path;

use tracing::debug;

use crate::config::{KEY_DIR, TLS_CERT, TLS_KEY};
use crate::errors::{HarnessError, Result};

/// Name of the credential file inside the key directory.
const CREDENTIAL_FILE: &str = "test.key";

/// The harness drives transient systemd units, which needs root.
pub fn check_privilege() -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        return Err(HarnessError::NotRoot);
    }
    Ok(())
}

/// Verify the pre-generated fixtures exist and load the shared credential
/// the exporter grants metrics access with.
pub fn load_fixtures(key_dir: &Path, tls_cert: &Path, tls_key: &Path) -> Result<String> {
    require(key_dir, "API key directory")?;
    require(tls_cert, "TLS public certificate")?;
    require(tls_key, "TLS private key")?;

    let credential_path = key_dir.join(CREDENTIAL_FILE);
    let credential = std::fs::read_to_string(&credential_path).map_err(|source| {
        HarnessError::CredentialRead {
            path: credential_path.clone(),
            source,
        }
    })?;
    debug!("loaded credential from {}", credential_path.display());
    Ok(credential.trim().to_string())
}

/// Check the well-known fixture locations.
pub fn load_default_fixtures() -> Result<String> {
    load_fixtures(Path::new(KEY_DIR), Path::new(TLS_CERT), Path::new(TLS_KEY))
}

fn require(path: &Path, what: &'static str) -> Result<()> {
    if !path.exists() {
        return Err(HarnessError::MissingFixture {
            what,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
