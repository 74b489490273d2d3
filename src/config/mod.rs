use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Complete vmwatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmwatchConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub deadlock: DeadlockConfig,
}

/// Poll cadence of the reference-set monitors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How often VMs on a host are re-fetched (milliseconds)
    #[serde(default = "default_host_poll_interval")]
    pub host_poll_interval_ms: u64,
    /// How often hosts on the network are re-fetched (milliseconds)
    #[serde(default = "default_network_poll_interval")]
    pub network_poll_interval_ms: u64,
}

fn default_host_poll_interval() -> u64 {
    200
}

fn default_network_poll_interval() -> u64 {
    1000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host_poll_interval_ms: default_host_poll_interval(),
            network_poll_interval_ms: default_network_poll_interval(),
        }
    }
}

/// Deadlock dump handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockConfig {
    /// Largest dump accepted for parsing (bytes)
    #[serde(default = "default_max_dump_bytes")]
    pub max_dump_bytes: u64,
}

fn default_max_dump_bytes() -> u64 {
    1_048_576 // 1 MB
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            max_dump_bytes: default_max_dump_bytes(),
        }
    }
}

impl VmwatchConfig {
    /// Apply `VMWATCH_*` environment overrides on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_u64("VMWATCH_HOST_POLL_INTERVAL_MS") {
            self.monitor.host_poll_interval_ms = ms;
        }
        if let Some(ms) = env_u64("VMWATCH_NETWORK_POLL_INTERVAL_MS") {
            self.monitor.network_poll_interval_ms = ms;
        }
        if let Some(bytes) = env_u64("VMWATCH_MAX_DUMP_BYTES") {
            self.deadlock.max_dump_bytes = bytes;
        }
        self
    }

    /// Reject values the monitors and the dump reader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.host_poll_interval_ms == 0 {
            bail!("monitor.host_poll_interval_ms must be greater than zero");
        }
        if self.monitor.network_poll_interval_ms == 0 {
            bail!("monitor.network_poll_interval_ms must be greater than zero");
        }
        if self.deadlock.max_dump_bytes == 0 {
            bail!("deadlock.max_dump_bytes must be greater than zero");
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(variable = name, value = %raw, "Ignoring invalid environment override");
            None
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<VmwatchConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: VmwatchConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}
