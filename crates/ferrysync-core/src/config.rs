use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level daemon configuration (loaded from `ferrysync.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub transport: TransportSection,
    pub sessions: SessionSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            transport: TransportSection::default(),
            sessions: SessionSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Interface to bind the control endpoint on.
    pub bind_addr: String,
    /// Control endpoint UDP port.
    pub port: u16,
    /// Confinement root directory.
    pub root: PathBuf,
    /// Prometheus metrics endpoint (disabled if `None`).
    pub metrics_addr: Option<String>,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format: "json" or "text".
    pub log_format: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 51234,
            root: PathBuf::from("./server_files"),
            metrics_addr: Some("127.0.0.1:9100".to_string()),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Per-attempt timeout in seconds (`T` in the transport spec).
    pub timeout_secs: f64,
    /// Total attempts including the first send (`N` in the transport spec).
    pub max_attempts: u32,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            timeout_secs: 1.0,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Upload and bulk-upload session idle expiry, in minutes.
    pub upload_idle_minutes: u64,
    /// Sync session watchdog window since `NEEDS_FILES_READY`, in minutes.
    pub sync_lock_watchdog_minutes: u64,
    /// Maximum directory depth accepted in a bulk-upload structure.
    pub max_bulk_depth: usize,
    /// Maximum path component length accepted in a bulk-upload structure.
    pub max_component_len: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            upload_idle_minutes: 30,
            sync_lock_watchdog_minutes: 5,
            max_bulk_depth: 10,
            max_component_len: 255,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults if it
    /// doesn't exist.
    pub fn load_or_default(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[server]
bind_addr = "127.0.0.1"
port = 9999
root = "/tmp/ferry-root"
log_level = "debug"
log_format = "json"

[transport]
timeout_secs = 2.5
max_attempts = 3

[sessions]
upload_idle_minutes = 10
sync_lock_watchdog_minutes = 2
max_bulk_depth = 4
max_component_len = 64
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.root, PathBuf::from("/tmp/ferry-root"));
        assert_eq!(config.transport.timeout_secs, 2.5);
        assert_eq!(config.transport.max_attempts, 3);
        assert_eq!(config.sessions.upload_idle_minutes, 10);
        assert_eq!(config.sessions.max_bulk_depth, 4);
    }

    #[test]
    fn parse_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 51234);
        assert_eq!(config.transport.timeout_secs, 1.0);
        assert_eq!(config.transport.max_attempts, 5);
        assert_eq!(config.sessions.upload_idle_minutes, 30);
        assert_eq!(config.sessions.sync_lock_watchdog_minutes, 5);
    }

    #[test]
    fn parse_partial_config_keeps_other_defaults() {
        let toml_str = r#"
[server]
port = 6000
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.transport.max_attempts, 5);
    }

    #[test]
    fn serialize_roundtrip() {
        let config = ServerConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.port, parsed.server.port);
        assert_eq!(config.transport.timeout_secs, parsed.transport.timeout_secs);
    }

    #[test]
    fn load_or_default_missing_file() {
        let config = ServerConfig::load_or_default(std::path::Path::new(
            "/nonexistent/ferrysync.toml",
        ))
        .unwrap();
        assert_eq!(config.server.port, 51234);
    }
}
