//! Configuration for the node service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lantern_core::{DiscoveryConfig, SessionConfig, peers};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Who this node is on the network.
    pub identity: IdentityConfig,
    /// Network settings.
    pub network: NetworkConfig,
    /// On-disk locations.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Name shown to peers. If empty, taken from the environment.
    pub display_name: String,
    /// Whether peers may take control of this node's screen.
    pub allow_control: bool,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP session port (0 = OS-assigned).
    pub listen_port: u16,
    /// UDP port for presence beacons.
    pub discovery_port: u16,
    /// Beacon cadence in milliseconds.
    pub broadcast_interval_ms: u64,
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where received files land.
    pub download_dir: PathBuf,
    /// Where the peer directory file lives.
    pub data_dir: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            allow_control: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            discovery_port: lantern_core::DISCOVERY_PORT,
            broadcast_interval_ms: lantern_core::BROADCAST_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            data_dir: PathBuf::from("."),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Display name with the empty-config fallback applied.
    pub fn resolved_name(&self) -> String {
        if self.identity.display_name.is_empty() {
            peers::display_name()
        } else {
            self.identity.display_name.clone()
        }
    }

    /// Assemble the session configuration, filling in the local MAC.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            display_name: self.resolved_name(),
            mac: peers::local_mac(),
            allow_control: self.identity.allow_control,
            listen_port: self.network.listen_port,
            download_dir: self.storage.download_dir.clone(),
            data_dir: self.storage.data_dir.clone(),
        }
    }

    /// Assemble the discovery configuration around the port the
    /// session actually bound.
    pub fn to_discovery_config(&self, session_port: u16) -> DiscoveryConfig {
        let mut discovery = DiscoveryConfig::new(self.resolved_name(), session_port);
        discovery.discovery_port = self.network.discovery_port;
        discovery.interval = Duration::from_millis(self.network.broadcast_interval_ms.max(100));
        discovery
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = NodeConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("listen_port"));
        assert!(text.contains("discovery_port"));
        assert!(text.contains("download_dir"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = NodeConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.discovery_port, 45000);
        assert_eq!(parsed.network.broadcast_interval_ms, 2000);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn empty_display_name_resolves() {
        let cfg = NodeConfig::default();
        let session = cfg.to_session_config();
        assert!(!session.display_name.is_empty());
        assert!(!session.mac.is_empty());
    }

    #[test]
    fn configured_display_name_wins() {
        let mut cfg = NodeConfig::default();
        cfg.identity.display_name = "ops-bench".into();
        assert_eq!(cfg.resolved_name(), "ops-bench");
    }

    #[test]
    fn to_discovery_config_clamps_interval() {
        let mut cfg = NodeConfig::default();
        cfg.network.broadcast_interval_ms = 0;
        let discovery = cfg.to_discovery_config(9100);
        assert_eq!(discovery.listen_port, 9100);
        assert_eq!(discovery.interval, Duration::from_millis(100));
    }
}
