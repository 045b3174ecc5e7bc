//! Configuration module for Argus.

use crate::error::{ArgusError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for an Argus fleet member.
///
/// All fields are immutable after construction; the cluster engine never
/// re-reads configuration at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgusConfig {
    /// Node identity configuration.
    pub node: NodeConfig,
    /// Cluster engine timing configuration.
    pub cluster: ClusterConfig,
    /// Coordination store configuration.
    pub store: StoreConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl ArgusConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArgusError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ArgusError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node.member_id.is_empty() {
            return Err(ArgusError::InvalidConfig {
                field: "node.member_id".to_string(),
                reason: "Member ID must be non-empty".to_string(),
            });
        }

        if self.store.endpoints.is_empty() {
            return Err(ArgusError::InvalidConfig {
                field: "store.endpoints".to_string(),
                reason: "At least one coordination store endpoint is required".to_string(),
            });
        }

        if self.store.prefix.is_empty() {
            return Err(ArgusError::InvalidConfig {
                field: "store.prefix".to_string(),
                reason: "Store prefix must be non-empty".to_string(),
            });
        }

        if self.cluster.heartbeat_interval.is_zero() {
            return Err(ArgusError::InvalidConfig {
                field: "cluster.heartbeat_interval".to_string(),
                reason: "Heartbeat interval must be non-zero".to_string(),
            });
        }

        // A director heartbeats every interval and its record carries a TTL of
        // heartbeat_timeout; anything under 2x leaves healthy directors
        // expiring between their own refreshes.
        if self.cluster.heartbeat_timeout < self.cluster.heartbeat_interval * 2 {
            return Err(ArgusError::InvalidConfig {
                field: "cluster.heartbeat_timeout".to_string(),
                reason: "Heartbeat timeout must be at least 2x heartbeat interval".to_string(),
            });
        }

        Ok(())
    }

    /// Create a minimal development configuration.
    pub fn development() -> Self {
        Self {
            node: NodeConfig {
                member_id: "dev-member".to_string(),
                listen_address: "127.0.0.1:8080".to_string(),
                tags: vec![],
                version: "dev".to_string(),
                semver: env!("CARGO_PKG_VERSION").to_string(),
            },
            cluster: ClusterConfig::default(),
            store: StoreConfig {
                endpoints: vec!["http://127.0.0.1:2379".to_string()],
                prefix: "argus".to_string(),
                username: None,
                password: None,
            },
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Node identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable member identity. Defaults to a hostname-derived value when
    /// launched through the CLI.
    pub member_id: String,
    /// Address the (out-of-scope) HTTP API listens on; published in the
    /// member status record so peers can reach this node.
    pub listen_address: String,
    /// Member tags used for work routing.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Build identifier.
    pub version: String,
    /// Semantic version.
    pub semver: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            member_id: String::new(),
            listen_address: "0.0.0.0:8080".to_string(),
            tags: Vec::new(),
            version: "N/A".to_string(),
            semver: "N/A".to_string(),
        }
    }
}

impl NodeConfig {
    /// Derive a member ID from the local hostname and listen address.
    ///
    /// Two members on the same host get distinct identities through the
    /// listen port.
    pub fn derive_member_id(listen_address: &str) -> Result<String> {
        let hostname = hostname::get()
            .map_err(|e| ArgusError::Hostname(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        let port = listen_address.rsplit(':').next().unwrap_or("0");
        Ok(format!("{}-{}", hostname, port))
    }
}

/// Cluster engine timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// How often periodic writes and observations occur.
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// TTL applied to director and member records. Must be at least
    /// 2x `heartbeat_interval`.
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(6),
        }
    }
}

/// Coordination store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store cluster endpoints.
    pub endpoints: Vec<String>,
    /// Prefix all engine keys live under.
    pub prefix: String,
    /// Optional store username.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional store password.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:2379".to_string()],
            prefix: "argus".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
