//! Configuration for the cache manager, its storage and the proxy host.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::manifest;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FITREPORT_CONFIG";

/// Everything the cache manager needs to know about one deployed version.
///
/// Two managers with different configs can run side by side against the same
/// storage, which is how version upgrades are exercised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the core namespace.
    pub core_cache_name: String,
    /// Name of the audio namespace.
    pub audio_cache_name: String,
    /// Paths stored in the core namespace at install time.
    pub core_files: Vec<String>,
    /// Paths stored in the audio namespace on preload.
    pub audio_files: Vec<String>,
    /// Path segment that routes a request to the audio namespace.
    pub audio_marker: String,
    /// Document served when the network is unreachable.
    pub offline_document: String,
    /// Restricts the offline fallback to navigation requests. Off by
    /// default: any failed generic request gets the offline document.
    pub fallback_navigations_only: bool,
    /// Concurrent network fetches during install and preload.
    pub fetch_concurrency: usize,
    /// Page opened by the `start` notification action.
    pub app_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            core_cache_name: manifest::CORE_CACHE_NAME.to_string(),
            audio_cache_name: manifest::AUDIO_CACHE_NAME.to_string(),
            core_files: manifest::core_files(),
            audio_files: manifest::audio_files(),
            audio_marker: manifest::AUDIO_MARKER.to_string(),
            offline_document: manifest::OFFLINE_DOCUMENT.to_string(),
            fallback_navigations_only: false,
            fetch_concurrency: 8,
            app_url: "/".to_string(),
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with the build-time manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the core namespace name.
    #[must_use]
    pub fn with_core_cache_name(mut self, name: impl Into<String>) -> Self {
        self.core_cache_name = name.into();
        self
    }

    /// Sets the audio namespace name.
    #[must_use]
    pub fn with_audio_cache_name(mut self, name: impl Into<String>) -> Self {
        self.audio_cache_name = name.into();
        self
    }

    /// Replaces the core-files list.
    #[must_use]
    pub fn with_core_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the audio-files list.
    #[must_use]
    pub fn with_audio_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audio_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the offline fallback document.
    #[must_use]
    pub fn with_offline_document(mut self, path: impl Into<String>) -> Self {
        self.offline_document = path.into();
        self
    }

    /// Sets whether only navigations fall back to the offline document.
    #[must_use]
    pub const fn with_fallback_navigations_only(mut self, only: bool) -> Self {
        self.fallback_navigations_only = only;
        self
    }

    /// Sets the number of concurrent fetches during install and preload.
    #[must_use]
    pub const fn with_fetch_concurrency(mut self, concurrent: usize) -> Self {
        self.fetch_concurrency = concurrent;
        self
    }

    /// Returns the namespace names that survive activation.
    #[must_use]
    pub fn recognized_names(&self) -> [&str; 2] {
        [self.core_cache_name.as_str(), self.audio_cache_name.as_str()]
    }

    /// Returns true if `path` belongs to the audio namespace.
    #[must_use]
    pub fn is_audio_path(&self, path: &str) -> bool {
        path.contains(&self.audio_marker)
    }
}

/// Proxy host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origin of the report application the proxy sits in front of.
    pub origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            origin: "http://127.0.0.1:5000".to_string(),
        }
    }
}

/// Directory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Root of the on-disk cache storage.
    pub cache_dir: PathBuf,
    /// Directory the default config file is read from.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            cache_dir: cache_dir.join("fitreport-offline"),
            config_dir: config_dir.join("fitreport-offline"),
        }
    }
}

impl PathConfig {
    /// Returns the default config file path.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache manager configuration.
    pub cache: CacheConfig,
    /// Proxy host configuration.
    pub server: ServerConfig,
    /// Directory configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from `path`, from the file named by
    /// `FITREPORT_CONFIG`, or from the default config file, in that order.
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let path = path.map_or_else(
            || {
                std::env::var_os(CONFIG_ENV)
                    .map_or_else(|| PathConfig::default().config_file(), PathBuf::from)
            },
            Path::to_path_buf,
        );

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                log::debug!("Loading config from {}", path.display());
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parses configuration from a TOML string. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string(self)?)
    }
}
