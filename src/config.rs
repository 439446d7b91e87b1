//! Configuration module for tunbridge
//!
//! JSON configuration loaded once at startup. The session engine treats the
//! configuration as read-only for the lifetime of a session; the `device`
//! section is the only part filled in at runtime (from the allocator
//! registration) before the session starts.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Tunnel server address, host:port (e.g. "vpn.example.com:443")
    pub server_addr: String,

    /// Transport scheme: plain or TLS WebSocket
    #[serde(default)]
    pub protocol: Scheme,

    /// Pre-shared key sent as the `key` header on every request
    #[serde(default)]
    pub key: String,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Bytes read from the interface per pump iteration
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Interface MTU
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Whole-frame Snappy compression (must match the server)
    #[serde(default)]
    pub compress: bool,

    /// Virtual interface addressing, assigned by the allocator
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Transport scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    #[default]
    Wss,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Ws => write!(f, "ws"),
            Scheme::Wss => write!(f, "wss"),
        }
    }
}

/// Virtual interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Interface name (OS-assigned when absent)
    pub name: Option<String>,

    /// Local tunnel address
    pub address: Option<String>,

    /// Netmask for the tunnel subnet
    #[serde(default = "default_netmask")]
    pub netmask: String,

    /// Peer (server-side) tunnel address
    pub peer: Option<String>,

    /// Device id assigned at registration
    pub id: Option<String>,
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_mtu() -> u16 {
    1500
}

fn default_netmask() -> String {
    "255.255.255.0".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: None,
            address: None,
            netmask: default_netmask(),
            peer: None,
            id: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create a default client configuration
    pub fn default_config() -> Self {
        Config {
            log: LogConfig::default(),
            server_addr: "vpn.example.com:443".to_string(),
            protocol: Scheme::Wss,
            key: String::new(),
            insecure_skip_verify: false,
            buffer_size: default_buffer_size(),
            mtu: default_mtu(),
            compress: false,
            device: DeviceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = Config::from_json(r#"{"server_addr": "vpn.example.com:443"}"#).unwrap();
        assert_eq!(config.server_addr, "vpn.example.com:443");
        assert_eq!(config.protocol, Scheme::Wss);
        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.mtu, 1500);
        assert!(!config.compress);
        assert!(config.device.address.is_none());
        assert_eq!(config.device.netmask, "255.255.255.0");
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "log": {"level": "debug"},
            "server_addr": "10.0.0.1:8443",
            "protocol": "ws",
            "key": "secret",
            "insecure_skip_verify": true,
            "buffer_size": 1500,
            "mtu": 1400,
            "compress": true,
            "device": {"name": "tun7", "address": "172.16.0.2", "peer": "172.16.0.1"}
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.protocol, Scheme::Ws);
        assert_eq!(config.key, "secret");
        assert!(config.insecure_skip_verify);
        assert_eq!(config.buffer_size, 1500);
        assert_eq!(config.mtu, 1400);
        assert!(config.compress);
        assert_eq!(config.device.name.as_deref(), Some("tun7"));
        assert_eq!(config.device.netmask, "255.255.255.0");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.server_addr, config.server_addr);
        assert_eq!(parsed.protocol, config.protocol);
    }

    #[test]
    fn test_missing_server_addr_rejected() {
        assert!(Config::from_json("{}").is_err());
    }
}
