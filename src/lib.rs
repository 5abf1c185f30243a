//! fitreport-offline - an offline asset cache for the fitness report web app.
//!
//! The manager keeps two named cache namespaces: a versioned core namespace
//! holding the application shell, and an audio namespace holding the coach
//! voice clips. It answers requests cache-first, falls back to an offline
//! document when the network is gone, and retires namespaces from older
//! versions on activation.
//!
//! # Example
//!
//! ```no_run
//! use fitreport_offline::{
//!     CacheConfig, DiskCacheStorage, HttpFetcher, NoProgress, OfflineCacheManager, Request,
//! };
//!
//! # async fn example() -> fitreport_offline::Result<()> {
//! let origin = fitreport_offline::parse_url("http://127.0.0.1:5000")?;
//! let storage = DiskCacheStorage::new("/tmp/fitreport-cache").await?;
//! let fetcher = HttpFetcher::new(fitreport_offline::build_http_client()?, origin.clone());
//! let manager = OfflineCacheManager::new(CacheConfig::default(), origin.clone(), storage, fetcher);
//!
//! manager.install().await;
//! manager.activate().await?;
//!
//! let stats = manager.preload_audio(&NoProgress).await?;
//! println!("{} clips cached", stats.cached);
//!
//! let url = fitreport_offline::resolve(&origin, "/index.html")?;
//! let response = manager.handle_fetch(Request::navigate(url)).await?;
//! println!("{}", response.status);
//!
//! manager.settle().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod fetch;
pub mod format;
pub mod manifest;
pub mod request;
pub mod stats;
pub mod storage;
pub mod worker;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, CacheConfig};
pub use error::{Error, Result};
pub use event::{Event, EventOutcome, InstallOutcome, Message, Notification};
pub use fetch::{Fetcher, HttpFetcher, build_http_client};
pub use format::{format_bytes, format_duration, format_preload_summary};
pub use request::{Request, RequestMode, Response, ResponseType, parse_url, resolve};
pub use stats::PreloadStats;
pub use storage::{Cache, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use worker::{NoProgress, OfflineCacheManager, PreloadProgress, WorkerState};
