//! # Core Configuration Module
//!
//! Builder-based configuration for the indexing engine.
//!
//! `CoreConfig` carries the storage locations and the feature switches that
//! the host application exposes to users. Component-level tuning (worker
//! counts, debounce windows) lives next to the component that consumes it.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/collection.db")
//!     .cache_dir("/path/to/cache")
//!     .build()
//!     .expect("Failed to build config");
//!
//! assert!(config.artwork_cache_dir().ends_with("artwork"));
//! ```
//!
//! ## Error Handling
//!
//! The builder fails fast with actionable messages:
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/collection.db")
//!     .build()
//!     .expect("Should fail - missing cache directory");
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Core configuration for the indexing engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Directory for cached files (album artwork)
    pub cache_dir: PathBuf,

    /// Feature flags
    pub features: FeatureFlags,

    /// Remote artwork service configuration
    pub metadata_api_config: MetadataApiConfig,
}

/// User-facing switches that change engine behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Download artwork for albums without embedded covers
    pub enable_artwork_remote: bool,

    /// Watch collection folders and refresh automatically on change
    pub refresh_collection_automatically: bool,

    /// Re-add files the user previously removed from the collection
    pub ignore_removed_files: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_artwork_remote: false,
            refresh_collection_automatically: true,
            ignore_removed_files: false,
        }
    }
}

/// Configuration for the remote artwork service.
///
/// # Example
///
/// ```no_run
/// use core_runtime::config::MetadataApiConfig;
///
/// let config = MetadataApiConfig::new()
///     .with_musicbrainz_user_agent("MyPlayer/1.0 (contact@example.com)")
///     .with_rate_limit_delay_ms(1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataApiConfig {
    /// MusicBrainz user agent string (format: "AppName/Version (Contact)")
    ///
    /// MusicBrainz rejects anonymous clients, so remote lookups stay
    /// disabled until this is set.
    pub musicbrainz_user_agent: Option<String>,

    /// Delay between consecutive API requests in milliseconds
    ///
    /// Default: 1000ms (MusicBrainz allows 1 request/second).
    pub rate_limit_delay_ms: u64,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for MetadataApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataApiConfig {
    pub fn new() -> Self {
        Self {
            musicbrainz_user_agent: None,
            rate_limit_delay_ms: 1000,
            request_timeout_ms: 10_000,
        }
    }

    pub fn with_musicbrainz_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.musicbrainz_user_agent = Some(user_agent.into());
        self
    }

    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref ua) = self.musicbrainz_user_agent {
            if ua.is_empty() {
                return Err(Error::Config(
                    "MusicBrainz user agent cannot be empty".to_string(),
                ));
            }
            if !ua.contains('/') || !ua.contains('(') || !ua.contains(')') {
                return Err(Error::Config(
                    "MusicBrainz user agent must follow format: 'AppName/Version (Contact)'"
                        .to_string(),
                ));
            }
        }

        if self.rate_limit_delay_ms == 0 {
            return Err(Error::Config(
                "Rate limit delay must be greater than 0ms".to_string(),
            ));
        }

        if self.rate_limit_delay_ms > 60000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "Request timeout must be greater than 0ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks if MusicBrainz is configured
    pub fn has_musicbrainz(&self) -> bool {
        self.musicbrainz_user_agent.is_some()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Directory holding cached album artwork files.
    pub fn artwork_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("artwork")
    }

    /// Whether remote artwork lookups can actually run.
    pub fn remote_artwork_available(&self) -> bool {
        self.features.enable_artwork_remote && self.metadata_api_config.has_musicbrainz()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        self.metadata_api_config.validate()?;

        if self.features.enable_artwork_remote && !self.metadata_api_config.has_musicbrainz() {
            tracing::warn!(
                "Remote artwork enabled without a MusicBrainz user agent; remote lookups will be skipped"
            );
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    features: FeatureFlags,
    metadata_api_config: Option<MetadataApiConfig>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/collection.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the cache directory.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Enables or disables remote artwork fetching.
    ///
    /// Default: false
    pub fn enable_artwork_remote(mut self, enabled: bool) -> Self {
        self.features.enable_artwork_remote = enabled;
        self
    }

    /// Enables or disables folder watching with automatic refresh.
    ///
    /// Default: true
    pub fn refresh_collection_automatically(mut self, enabled: bool) -> Self {
        self.features.refresh_collection_automatically = enabled;
        self
    }

    /// When set, files the user removed are re-added on the next scan.
    ///
    /// Default: false
    pub fn ignore_removed_files(mut self, enabled: bool) -> Self {
        self.features.ignore_removed_files = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Sets the remote artwork service configuration.
    pub fn metadata_api_config(mut self, config: MetadataApiConfig) -> Self {
        self.metadata_api_config = Some(config);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required path is missing or a value
    /// fails validation.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            cache_dir,
            features: self.features,
            metadata_api_config: self.metadata_api_config.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
