//! Resolved run configuration and the exporter's command line.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

/// Fixture locations, shared with the setup step that generates them.
pub const KEY_DIR: &str = "/tmp/integ-test.keys";
pub const TLS_CERT: &str = "/tmp/integ-test-cert.pem";
pub const TLS_KEY: &str = "/tmp/integ-test-key.pem";

/// Default port, also hard-coded in the config-file fixtures.
pub const DEFAULT_PORT: u16 = 8080;

/// Delay between unit readiness and the first probe.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// How the harness reaches the metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Http,
    Https,
}

/// How the exporter receives its own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArgFormat {
    /// Discrete command-line flags (port, key dir, TLS material).
    Flags,
    /// A single pre-baked config file; the file pins the port.
    Config,
}

/// Health-probe cadence.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    /// Pause between a successful attempt and the next one.
    pub interval: Duration,
    /// How long a single attempt may run before it is aborted.
    pub request_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a run needs, resolved from the CLI once.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub binary: PathBuf,
    pub port: u16,
    /// How long the probe loop runs before the harness stops a healthy service.
    pub window: Duration,
    pub transport: Transport,
    pub format: ArgFormat,
    pub config_dir: PathBuf,
    pub metrics_path: String,
    pub probe: ProbeSettings,
}

impl RunConfig {
    /// Command line handed to the exporter itself, after the launcher's args.
    pub fn exporter_args(&self) -> Vec<String> {
        match self.format {
            ArgFormat::Config => vec![
                "--config".to_string(),
                self.config_file().display().to_string(),
            ],
            ArgFormat::Flags => {
                let mut args = vec![
                    "--port".to_string(),
                    self.port.to_string(),
                    "--key-dir".to_string(),
                    KEY_DIR.to_string(),
                ];
                if self.transport == Transport::Https {
                    args.extend([
                        "--certificate".to_string(),
                        TLS_CERT.to_string(),
                        "--private-key".to_string(),
                        TLS_KEY.to_string(),
                    ]);
                }
                args
            }
        }
    }

    /// Path of the pre-baked config file for the chosen transport.
    pub fn config_file(&self) -> PathBuf {
        let name = match self.transport {
            Transport::Http => "valid-http",
            Transport::Https => "valid-https",
        };
        self.config_dir.join(name)
    }
}

#[cfg(test)]
impl RunConfig {
    /// Minimal config for unit tests.
    pub(crate) fn for_tests(port: u16) -> Self {
        Self {
            binary: PathBuf::from("/bin/true"),
            port,
            window: Duration::from_secs(60),
            transport: Transport::Http,
            format: ArgFormat::Flags,
            config_dir: PathBuf::from("test-configs"),
            metrics_path: "/metrics".to_string(),
            probe: ProbeSettings::default(),
        }
    }
}
