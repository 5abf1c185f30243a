//! Error types for the fitreport-offline library.

use thiserror::Error;

/// Errors that can occur while serving or populating the offline caches.
#[derive(Error, Debug)]
pub enum Error {
    /// The network request could not be completed (offline, DNS failure, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during cache storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache namespace could not be opened.
    #[error("Failed to open cache {name}: {reason}")]
    CacheOpen {
        /// Name of the namespace.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// The namespace behind a cache handle was deleted.
    #[error("Cache {0} was deleted")]
    CacheDeleted(String),

    /// Namespace names must be usable as a single directory component.
    #[error("Invalid cache name: {0:?}")]
    InvalidCacheName(String),

    /// Only `GET` requests can be stored in a cache.
    #[error("Request method {0} is unsupported by the cache")]
    UnsupportedMethod(String),

    /// A stored entry could not be decoded.
    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptEntry {
        /// Cache key of the entry.
        key: String,
        /// What failed to decode.
        reason: String,
    },

    /// URL could not be parsed or resolved against the scope origin.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Returns true if this error came from the network rather than the cache.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

/// A specialized `Result` type for fitreport-offline operations.
pub type Result<T> = std::result::Result<T, Error>;
