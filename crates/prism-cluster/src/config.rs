//! Cluster configuration management
//!
//! All values are supplied at process start and are immutable for the
//! process lifetime.

use crate::error::{ClusterError, Result};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Main cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Name of this node, reported as the hostname in node details.
    pub node_name: String,

    /// Address this node answers on.
    pub self_addr: Ipv4Addr,

    /// Subnet swept during discovery.
    pub subnet: Ipv4Network,

    /// Service port shared by every node on the segment.
    pub port: u16,

    /// Upper bound on the number of addresses probed per discovery sweep.
    pub max_probe: usize,

    /// Timeout for a single discovery or health probe.
    pub probe_timeout: Duration,

    /// Interval between master health probes.
    pub heartbeat_interval: Duration,

    /// Interval between master color pushes.
    pub push_interval: Duration,

    /// Timeout for a single election round-trip.
    pub election_timeout: Duration,

    /// How long a deferring node waits for a master announcement before
    /// retrying its election.
    pub announcement_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_name: "prism-node".to_string(),
            self_addr: Ipv4Addr::LOCALHOST,
            subnet: "127.0.0.0/24".parse().unwrap(),
            port: 5000,
            max_probe: 64,
            probe_timeout: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(2),
            push_interval: Duration::from_secs(1),
            election_timeout: Duration::from_secs(1),
            announcement_timeout: Duration::from_secs(6),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::configuration(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ClusterError::configuration(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClusterError::configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClusterError::configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() {
            return Err(ClusterError::configuration("Node name cannot be empty"));
        }

        if self.max_probe == 0 {
            return Err(ClusterError::configuration(
                "Discovery probe budget must be at least 1",
            ));
        }

        if !self.subnet.contains(self.self_addr) {
            return Err(ClusterError::configuration(format!(
                "Own address {} is outside the configured subnet {}",
                self.self_addr, self.subnet
            )));
        }

        if self.probe_timeout < Duration::from_millis(10) {
            return Err(ClusterError::configuration(
                "Probe timeout must be at least 10ms",
            ));
        }

        if self.heartbeat_interval < Duration::from_millis(100) {
            return Err(ClusterError::configuration(
                "Heartbeat interval must be at least 100ms",
            ));
        }

        if self.push_interval < Duration::from_millis(100) {
            return Err(ClusterError::configuration(
                "Push interval must be at least 100ms",
            ));
        }

        if self.announcement_timeout < self.election_timeout {
            return Err(ClusterError::configuration(
                "Announcement timeout must not be shorter than the election timeout",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();
        assert!(!config.node_name.is_empty());
        assert_eq!(config.port, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClusterConfig::default();

        config.node_name = String::new();
        assert!(config.validate().is_err());

        config.node_name = "test".to_string();
        config.max_probe = 0;
        assert!(config.validate().is_err());

        config.max_probe = 16;
        config.self_addr = "192.168.1.10".parse().unwrap();
        assert!(config.validate().is_err());

        config.subnet = "192.168.1.0/24".parse().unwrap();
        assert!(config.validate().is_ok());

        config.announcement_timeout = Duration::from_millis(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("cluster.toml");

        let config = ClusterConfig::default();

        config.to_file(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = ClusterConfig::from_file(&config_path).unwrap();
        assert_eq!(config.self_addr, loaded.self_addr);
        assert_eq!(config.subnet, loaded.subnet);
        assert_eq!(config.heartbeat_interval, loaded.heartbeat_interval);
    }
}
