//! Configuration parsing and structures

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::env;

/// Configuration file used when `CLOUDVOL_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kubernetes/cloudvol.yaml";

/// Token file consulted last when no other credential source is set
pub const DEFAULT_TOKEN_FILE: &str = "/etc/kubernetes/cloudvol.json";

// =============================================================================
// Top-level config
// =============================================================================

/// Driver configuration, deserialized from YAML.
///
/// Every section has defaults, so an empty document is a valid config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Remote API endpoint and credentials
    pub api: ApiConfig,

    /// Attach polling bounds
    pub attach: AttachConfig,

    /// Detach retry policy
    pub detach: DetachConfig,

    /// How this node finds out who it is
    pub identity: IdentityConfig,

    /// Local device resolution
    pub device: DeviceConfig,

    /// Filesystem preparation
    pub mount: MountConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the cloud API
    pub endpoint: String,

    /// Inline API token
    pub token: Option<String>,

    /// JSON file holding `{"token": "..."}`
    pub token_file: Option<PathBuf>,

    /// Per-request timeout (e.g., "30s")
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloudpanel-api.1and1.com/v1".to_string(),
            token: None,
            token_file: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Bounds for waiting on a remote attach
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
    /// Number of state polls before giving up
    pub poll_attempts: u32,

    /// Sleep between polls (e.g., "30s")
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Volume state that counts as ready
    pub ready_state: String,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval: Duration::from_secs(30),
            ready_state: "POWERED_ON".to_string(),
        }
    }
}

/// Detach retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetachConfig {
    /// Total detach attempts (2 = one retry)
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for DetachConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// Source of this node's identity
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum IdentityConfig {
    /// Ask the link-local metadata service for the server id
    Metadata {
        #[serde(default = "default_metadata_url")]
        url: String,
    },
    /// Match a host address against the addresses of known servers
    Address { address: String },
    /// Use a fixed server id
    Static { server_id: String },
}

fn default_metadata_url() -> String {
    "http://169.254.169.254/latest/meta_data/server_id".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig::Metadata {
            url: default_metadata_url(),
        }
    }
}

/// How the local block device of a volume is located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceResolution {
    /// Derive the path from the volume's hardware UUID
    #[default]
    ById,
    /// Diff lsblk snapshots taken around the attach
    TreeDiff,
}

/// Device resolution configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub resolution: DeviceResolution,

    /// Prefix joined with the volume UUID in `by-id` mode
    pub by_id_prefix: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            resolution: DeviceResolution::ById,
            by_id_prefix: "/dev/disk/by-id/scsi-3".to_string(),
        }
    }
}

/// Filesystem preparation defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Filesystem used when the options carry none
    pub default_fs_type: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            default_fs_type: "ext4".to_string(),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Load from `CLOUDVOL_CONFIG`, else from the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing file
    /// that was explicitly requested is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match env::non_empty_var(env::CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, expanding `${VAR}` first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = env::expand_vars(content)?;
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "api.endpoint cannot be empty".to_string(),
            ));
        }

        if self.attach.poll_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "attach.poll_attempts must be at least 1".to_string(),
            ));
        }

        if self.detach.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "detach.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.mount.default_fs_type.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mount.default_fs_type cannot be empty".to_string(),
            ));
        }

        match &self.identity {
            IdentityConfig::Address { address } if address.trim().is_empty() => {
                return Err(ConfigError::ValidationError(
                    "identity.address cannot be empty".to_string(),
                ));
            }
            IdentityConfig::Static { server_id } if server_id.trim().is_empty() => {
                return Err(ConfigError::ValidationError(
                    "identity.server_id cannot be empty".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
