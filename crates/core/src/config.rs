//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Upload session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Idle time after which a session expires, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// How often the background sweeper expires idle sessions, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Largest size a session may declare.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Largest single chunk accepted.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Upper bound on a whole commit (assembly, verification and storage), in seconds.
    #[serde(default = "default_commit_timeout_secs")]
    pub commit_timeout_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    86400 // 24 hours
}

/// Longest accepted session TTL: 10 years.
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_upload_size() -> u64 {
    crate::MAX_UPLOAD_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_commit_timeout_secs() -> u64 {
    600
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_upload_size: default_max_upload_size(),
            max_chunk_size: default_max_chunk_size(),
            commit_timeout_secs: default_commit_timeout_secs(),
        }
    }
}

impl UploadConfig {
    /// Session TTL as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn commit_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.commit_timeout_secs)
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_ttl_secs == 0 {
            return Err("uploads.session_ttl_secs must be greater than 0".to_string());
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(format!(
                "uploads.session_ttl_secs must be at most {MAX_SESSION_TTL_SECS}"
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err("uploads.sweep_interval_secs must be greater than 0".to_string());
        }
        if self.max_upload_size == 0 {
            return Err("uploads.max_upload_size must be greater than 0".to_string());
        }
        if self.max_chunk_size == 0 {
            return Err("uploads.max_chunk_size must be greater than 0".to_string());
        }
        if self.commit_timeout_secs == 0 {
            return Err("uploads.commit_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// Process-local memory. Contents are lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty path".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.uploads.validate()?;
        self.storage.validate()
    }
}
