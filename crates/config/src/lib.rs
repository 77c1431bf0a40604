//! Shared configuration for the homelab toolkit.
//!
//! Both the MCP server and the `doctor` CLI read an optional
//! `homelab-config.json` from the working directory (or the path named by
//! `HOMELAB_CONFIG`). Every field has a default tuned for the stock cluster,
//! so a missing file is not an error: the binaries run unconfigured on any
//! cluster that follows the usual namespace layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File name probed in the working directory and its parent.
pub const CONFIG_FILE_NAME: &str = "homelab-config.json";

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV_VAR: &str = "HOMELAB_CONFIG";

const SUPPORTED_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported config version: {found} (expected 1.0)")]
    UnsupportedVersion { found: String },
}

/// Top-level configuration shared by every binary in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HomelabConfig {
    pub version: String,
    pub cluster: ClusterInfo,
    pub namespaces: Namespaces,
    pub prometheus: PrometheusSettings,
    pub velero: VeleroSettings,
    /// Timeout applied to every kubectl invocation, in seconds.
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterInfo {
    pub name: String,
}

/// Namespaces the operational stack is deployed into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Namespaces {
    pub argocd: String,
    pub rook_ceph: String,
    pub monitoring: String,
    pub velero: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrometheusSettings {
    /// In-cluster service URL of the Prometheus instance.
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VeleroSettings {
    /// A completed backup older than this counts as stale. Daily schedules
    /// get a two-hour grace window on top of the 24h cadence.
    pub freshness_hours: i64,
    /// Retention applied to manual backups when the caller gives none.
    pub default_ttl: String,
}

impl Default for HomelabConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION.to_string(),
            cluster: ClusterInfo::default(),
            namespaces: Namespaces::default(),
            prometheus: PrometheusSettings::default(),
            velero: VeleroSettings::default(),
            command_timeout_secs: 30,
        }
    }
}

impl Default for ClusterInfo {
    fn default() -> Self {
        Self {
            name: "homelab".to_string(),
        }
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            argocd: "argocd".to_string(),
            rook_ceph: "rook-ceph".to_string(),
            monitoring: "monitoring".to_string(),
            velero: "velero".to_string(),
        }
    }
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            url: "http://kube-prometheus-stack-prometheus.monitoring:9090".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for VeleroSettings {
    fn default() -> Self {
        Self {
            freshness_hours: 26,
            default_ttl: "720h".to_string(),
        }
    }
}

impl PrometheusSettings {
    /// Resolved URL with the `PROMETHEUS_URL` environment variable taking
    /// precedence over the config file (useful for port-forwarded sessions).
    #[must_use]
    pub fn resolved_url(&self) -> String {
        std::env::var("PROMETHEUS_URL").unwrap_or_else(|_| self.url.clone())
    }
}

impl HomelabConfig {
    /// Load configuration from the standard locations.
    ///
    /// Search order: the path in `HOMELAB_CONFIG` (an error if set but
    /// unreadable), then `./homelab-config.json`, then the parent directory.
    /// When nothing is found the defaults are returned.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from(Path::new(&explicit));
        }

        let config_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ];

        for config_path in config_paths {
            if config_path.exists() {
                return Self::load_from(&config_path);
            }
        }

        debug!("no {CONFIG_FILE_NAME} found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate a config file at an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.version != SUPPORTED_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
            });
        }

        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}
