//! Channel and run configuration: the TOML file that stands in for the
//! original interactive setup. Loaded once, validated as a whole, and passed
//! by reference into the dispatcher -- never ambient state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

pub const MAX_CHANNELS: usize = 4;
pub const DEFAULT_SERVER_PORT: u16 = 5201;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no channels configured")]
    NoChannels,

    #[error("too many channels: {count} (limit {MAX_CHANNELS})")]
    TooManyChannels { count: usize },

    #[error("channel {index}: interface name is empty")]
    EmptyInterface { index: usize },

    #[error("channel {index}: interface {interface:?} does not exist")]
    UnknownInterface { index: usize, interface: String },

    #[error("channel {index}: remote port must be nonzero")]
    InvalidPort { index: usize },
}

/// One local-interface-to-remote-endpoint pairing under test.
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub interface: String,
    pub local_ip: Ipv4Addr,
    pub remote_ip: Ipv4Addr,
    #[serde(default = "default_server_port")]
    pub remote_port: u16,
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

/// External tool binaries. Override in the config file when they are not on
/// PATH (or to point tests at stand-ins).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub iperf3: String,
    pub ping: String,
    pub ethtool: String,
    pub ip: String,
    pub stress_ng: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            iperf3: "iperf3".into(),
            ping: "ping".into(),
            ethtool: "ethtool".into(),
            ip: "ip".into(),
            stress_ng: "stress-ng".into(),
        }
    }
}

/// Whole-run configuration. Replaced wholesale on reconfiguration, never
/// mutated field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_threshold")]
    pub threshold_percent: f64,

    #[serde(default)]
    pub tools: ToolPaths,

    pub channels: Vec<ChannelConfig>,
}

fn default_threshold() -> f64 {
    crate::throughput::decision::DEFAULT_THRESHOLD_PERCENT
}

impl RunConfig {
    /// Load and validate a configuration file. No partially-valid channel
    /// set is ever admitted.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: RunConfig = toml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate(crate::system::diag::interface_exists)?;
        Ok(config)
    }

    /// Validate with an injectable interface-existence check, so tests do
    /// not depend on host interfaces.
    pub fn validate(&self, iface_exists: impl Fn(&str) -> bool) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if self.channels.len() > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels {
                count: self.channels.len(),
            });
        }
        for (index, channel) in self.channels.iter().enumerate() {
            if channel.interface.is_empty() {
                return Err(ConfigError::EmptyInterface { index });
            }
            if !iface_exists(&channel.interface) {
                return Err(ConfigError::UnknownInterface {
                    index,
                    interface: channel.interface.clone(),
                });
            }
            if channel.remote_port == 0 {
                return Err(ConfigError::InvalidPort { index });
            }
        }
        Ok(())
    }
}
