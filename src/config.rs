//! Configuration for the archiver
//!
//! Loaded from a YAML file. Every field has a default, so an empty file
//! (or no file at all) yields a usable configuration.

use crate::engine::SyncConfig;
use crate::error::{Error, Result};
use crate::media::MediaSelection;
use crate::remote::{HttpClientConfig, RateLimiterConfig};
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page the remote history endpoint serves
pub const MAX_CHUNK_SIZE: usize = 100;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete archiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiverConfig {
    /// Root directory holding one subdirectory per archived target
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,

    /// Protocol version tag stored with every checkpoint (diagnostic only)
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,

    /// Remote gateway settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// History synchronisation settings
    #[serde(default)]
    pub sync: SyncSection,

    /// Media retrieval settings
    #[serde(default)]
    pub media: MediaSection,

    /// Export settings
    #[serde(default)]
    pub export: ExportSection,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            backups_dir: default_backups_dir(),
            protocol_version: default_protocol_version(),
            remote: RemoteConfig::default(),
            sync: SyncSection::default(),
            media: MediaSection::default(),
            export: ExportSection::default(),
        }
    }
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_protocol_version() -> u32 {
    1
}

impl ArchiverConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {e}")))?;
        Self::from_yaml_str(&contents)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.sync.chunk_size == 0 || self.sync.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::invalid_value(
                "sync.chunk_size",
                format!("must be between 1 and {MAX_CHUNK_SIZE}"),
            ));
        }
        if self.media.requests_per_second == 0 {
            return Err(Error::invalid_value(
                "media.requests_per_second",
                "must be greater than zero",
            ));
        }
        if self.remote.requests_per_second == Some(0) {
            return Err(Error::invalid_value(
                "remote.requests_per_second",
                "must be greater than zero",
            ));
        }
        if let Some(base_url) = &self.remote.base_url {
            url::Url::parse(base_url)?;
        }
        Ok(())
    }

    /// Sync engine settings
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_chunk_size(self.sync.chunk_size)
            .with_page_delay(Duration::from_millis(self.sync.page_delay_ms))
    }

    /// HTTP client settings for the remote gateway
    pub fn http_config(&self) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .timeout(Duration::from_secs(self.remote.timeout_secs))
            .max_retries(self.remote.max_retries)
            .backoff(
                self.remote.backoff.backoff_type,
                Duration::from_millis(self.remote.backoff.initial_ms),
                Duration::from_millis(self.remote.backoff.max_ms),
            );

        if let Some(base_url) = &self.remote.base_url {
            builder = builder.base_url(base_url.clone());
        }

        builder = match self.remote.requests_per_second {
            Some(rps) => builder.rate_limit(RateLimiterConfig::new(rps, rps)),
            None => builder.no_rate_limit(),
        };

        builder.build()
    }

    /// Media download rate limit
    pub fn media_rate_limit(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.media.requests_per_second, 1)
    }

    /// Media categories enabled in the config
    pub fn media_selection(&self) -> MediaSelection {
        MediaSelection {
            profile_photos: self.media.profile_photos,
            photos: self.media.photos,
            documents: self.media.documents,
        }
    }
}

// ============================================================================
// Remote
// ============================================================================

/// Remote gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the history gateway
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of retries for a single request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry backoff configuration
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Token bucket quota for all gateway requests
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
            requests_per_second: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_initial_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    60000
}

// ============================================================================
// Sync / Media / Export
// ============================================================================

/// History synchronisation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Records requested per page
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause after every page, in milliseconds
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

fn default_chunk_size() -> usize {
    MAX_CHUNK_SIZE
}

fn default_page_delay_ms() -> u64 {
    1000
}

/// Media retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSection {
    /// Download quota
    #[serde(default = "default_media_rps")]
    pub requests_per_second: u32,

    #[serde(default = "default_true")]
    pub profile_photos: bool,

    #[serde(default = "default_true")]
    pub photos: bool,

    #[serde(default = "default_true")]
    pub documents: bool,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            requests_per_second: default_media_rps(),
            profile_photos: true,
            photos: true,
            documents: true,
        }
    }
}

fn default_media_rps() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    /// Where day units are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("backups/exported")
}
