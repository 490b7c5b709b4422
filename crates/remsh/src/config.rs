//! Engine configuration.
//!
//! Every timing knob the engine uses is an explicit field here rather than a
//! constant buried in a loop: the poll-read timeout, the termination grace
//! period, the staleness bound and the reaper interval are all tunable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default output chunk ceiling, matching the transport's message-size limit.
const DEFAULT_CHUNK_SIZE: usize = 3500;

/// Default poll-read timeout for the output drain loop.
const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;

/// Default grace period between SIGTERM and SIGKILL.
const DEFAULT_GRACE_PERIOD_MS: u64 = 500;

/// Default bound after which a session with no liveness signal is reaped.
const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

/// Default reaper sweep interval.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default cap on concurrent sessions per tenant.
const DEFAULT_MAX_SESSIONS_PER_TENANT: usize = 8;

/// Default capacity of the system alert ring.
const DEFAULT_ALERT_CAPACITY: usize = 50;

/// Configuration for the execution engine and reaper.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory under which per-tenant working directories are created.
    pub data_dir: PathBuf,
    /// Shell that command lines are handed to, unparsed, via `-c`.
    pub shell: String,
    /// Poll-read timeout for the drain loop, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Maximum size of one output chunk handed to the sink, in bytes.
    pub chunk_size: usize,
    /// Grace period between graceful and forced termination, in milliseconds.
    pub grace_period_ms: u64,
    /// Sessions without a liveness signal for this long are reaped, in seconds.
    pub stale_after_secs: u64,
    /// Interval between reaper sweeps, in seconds.
    pub sweep_interval_secs: u64,
    /// Maximum concurrent sessions per tenant.
    pub max_sessions_per_tenant: usize,
    /// Capacity of the bounded system alert ring.
    pub alert_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("tenant_data"),
            shell: "bash".to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_sessions_per_tenant: DEFAULT_MAX_SESSIONS_PER_TENANT,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 3500);
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));
        assert_eq!(config.grace_period(), Duration::from_millis(500));
        assert_eq!(config.stale_after(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.max_sessions_per_tenant, 8);
        assert_eq!(config.alert_capacity, 50);
        assert_eq!(config.shell, "bash");
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let config: EngineConfig = toml::from_str(
            r#"
            data_dir = "/srv/remsh/tenants"
            poll_timeout_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/remsh/tenants"));
        assert_eq!(config.poll_timeout_ms, 50);
        assert_eq!(config.chunk_size, 3500);
        assert_eq!(config.shell, "bash");
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remsh.toml");
        std::fs::write(&path, "shell = \"sh\"\nmax_sessions_per_tenant = 2\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.shell, "sh");
        assert_eq!(config.max_sessions_per_tenant, 2);
    }

    #[test]
    fn from_file_missing_file_is_an_error() {
        assert!(EngineConfig::from_file("/nonexistent/remsh.toml").is_err());
    }
}
