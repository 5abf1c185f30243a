//! The offline asset cache manager.
//!
//! One [`OfflineCacheManager`] corresponds to one deployed version of the
//! caching policy. It owns no global state: names and manifests come from
//! its [`CacheConfig`], so an old and a new version can run against the same
//! storage during an upgrade.
//!
//! Background work (the write-back after a network fetch) is registered with
//! the manager's task tracker; hosts call [`OfflineCacheManager::settle`]
//! before shutting down so no write is cut off halfway.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{StreamExt, stream};
use reqwest::Url;
use serde::Serialize;
use tokio_util::task::TaskTracker;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventOutcome, InstallOutcome, Message, Notification, START_ACTION, SYNC_REPORTS_TAG};
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::stats::{PreloadStats, PreloadStatsBuilder};
use crate::storage::{Cache, CacheStorage};

/// Lifecycle position of a manager version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Constructed, not yet installed.
    Parsed,
    /// Install is running.
    Installing,
    /// Install finished (successfully or not); eligible for activation.
    Installed,
    /// Old namespaces are being deleted.
    Activating,
    /// Serving requests.
    Activated,
}

/// Trait for receiving preload progress updates.
///
/// All methods have default no-op implementations.
pub trait PreloadProgress: Send + Sync {
    /// Called once before any entry is processed.
    fn on_batch_start(&self, _total: usize) {}

    /// Called when an entry was already cached and is not fetched.
    fn on_entry_skipped(&self, _path: &str) {}

    /// Called when an entry was fetched and stored.
    fn on_entry_cached(&self, _path: &str, _bytes: u64) {}

    /// Called when an entry failed.
    fn on_error(&self, _path: &str, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl PreloadProgress for NoProgress {}

/// Serves the controlled scope from the core and audio namespaces.
pub struct OfflineCacheManager<S: CacheStorage, F: Fetcher> {
    config: CacheConfig,
    origin: Url,
    storage: Arc<S>,
    fetcher: Arc<F>,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    tasks: TaskTracker,
}

impl<S: CacheStorage, F: Fetcher> OfflineCacheManager<S, F> {
    /// Creates a manager for the scope rooted at `origin`.
    #[must_use]
    pub fn new(config: CacheConfig, origin: Url, storage: S, fetcher: F) -> Self {
        Self::with_shared(config, origin, Arc::new(storage), Arc::new(fetcher))
    }

    /// Creates a manager sharing storage and network with other versions.
    #[must_use]
    pub fn with_shared(config: CacheConfig, origin: Url, storage: Arc<S>, fetcher: Arc<F>) -> Self {
        Self {
            config,
            origin,
            storage,
            fetcher,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            tasks: TaskTracker::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the scope origin.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Returns the cache storage.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the network fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true once install has asked to skip the waiting phase.
    #[must_use]
    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Returns true once activation has claimed the open clients.
    #[must_use]
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    fn set_state(&self, state: WorkerState) {
        log::debug!("{} -> {state:?}", self.config.core_cache_name);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Keeps the manager alive until `task` finishes.
    pub fn wait_until<Fut>(&self, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Waits for every task registered with [`wait_until`](Self::wait_until).
    ///
    /// The tracker stays closed afterwards. Tasks registered later are still
    /// tracked, so any number of callers may settle, concurrently or not.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Dispatches a lifecycle event to its handler.
    ///
    /// # Errors
    ///
    /// Propagates errors from `activate`, `fetch` and `message` handling.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        log::trace!("event {}", event.name());
        match event {
            Event::Install => Ok(EventOutcome::Installed(self.install().await)),
            Event::Activate => Ok(EventOutcome::Activated(self.activate().await?)),
            Event::Fetch(request) => Ok(EventOutcome::Response(self.handle_fetch(request).await?)),
            Event::Message(payload) => Ok(self
                .handle_message(&payload, &NoProgress)
                .await?
                .map_or(EventOutcome::Ignored, EventOutcome::Preloaded)),
            Event::Sync(tag) => {
                self.sync(&tag);
                Ok(EventOutcome::Ignored)
            }
            Event::Push(payload) => Ok(EventOutcome::Notify(self.push(payload.as_deref()))),
            Event::NotificationClick(action) => Ok(self
                .notification_click(action.as_deref())
                .map_or(EventOutcome::Ignored, EventOutcome::OpenWindow)),
        }
    }

    // =========================================================================
    // Install
    // =========================================================================

    /// Populates the core namespace with every core file.
    ///
    /// The batch is all-or-nothing: if any entry cannot be fetched, answers
    /// with a non-2xx status or cannot be stored, the entries this batch
    /// already wrote are removed again. Failures are logged and never
    /// escape; the version becomes installed either way and always asks to
    /// take over without waiting.
    pub async fn install(&self) -> InstallOutcome {
        self.set_state(WorkerState::Installing);

        let outcome = match self.add_all_core().await {
            Ok(stats) if stats.is_complete() => {
                log::info!(
                    "Installed {}: cached {} core file(s)",
                    self.config.core_cache_name,
                    stats.cached
                );
                InstallOutcome {
                    cached: stats.cached,
                    failed: 0,
                    skip_waiting: true,
                }
            }
            Ok(stats) => {
                for failed in &stats.failed {
                    log::error!("Failed to cache core file {}: {}", failed.path, failed.reason);
                }
                InstallOutcome {
                    cached: stats.cached,
                    failed: stats.failed.len(),
                    skip_waiting: true,
                }
            }
            Err(e) => {
                log::error!("Install of {} failed: {e}", self.config.core_cache_name);
                InstallOutcome {
                    cached: 0,
                    failed: self.config.core_files.len(),
                    skip_waiting: true,
                }
            }
        };

        self.skip_waiting.store(true, Ordering::Release);
        self.set_state(WorkerState::Installed);
        outcome
    }

    async fn add_all_core(&self) -> Result<PreloadStats> {
        let cache = self.storage.open(&self.config.core_cache_name).await?;
        let mut builder = PreloadStatsBuilder::new();

        let fetched: Vec<_> = stream::iter(self.config.core_files.iter().cloned())
            .map(|path| async move {
                let result = match Request::for_path(&self.origin, &path) {
                    Ok(request) => self
                        .fetcher
                        .fetch(&request)
                        .await
                        .map(|response| (request, response)),
                    Err(e) => Err(e),
                };
                (path, result)
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;

        let mut ready = Vec::with_capacity(fetched.len());
        for (path, result) in fetched {
            match result {
                Ok((_, response)) if !response.ok() => {
                    builder.add_failed(&path, format!("HTTP {}", response.status));
                }
                Ok(pair) => ready.push((path, pair)),
                Err(e) => builder.add_failed(&path, e.to_string()),
            }
        }

        if builder.failed_count() > 0 {
            return Ok(builder.build());
        }

        let mut written = Vec::with_capacity(ready.len());
        for (path, (request, response)) in ready {
            let bytes = response.body.len() as u64;
            if let Err(e) = cache.put(&request, response).await {
                for stored in &written {
                    if let Err(e) = cache.delete(stored).await {
                        log::warn!("Failed to roll back {}: {e}", stored.url);
                    }
                }
                let mut failed = PreloadStatsBuilder::new();
                failed.add_failed(&path, e.to_string());
                return Ok(failed.build());
            }
            builder.add_cached(bytes);
            written.push(request);
        }
        Ok(builder.build())
    }

    // =========================================================================
    // Activate
    // =========================================================================

    /// Deletes every namespace other than the current core and audio ones,
    /// then claims the open clients.
    ///
    /// Returns the names of the deleted namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespaces cannot be listed or deleted.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.set_state(WorkerState::Activating);

        let recognized = self.config.recognized_names();
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if recognized.contains(&name.as_str()) {
                continue;
            }
            log::info!("Deleting old cache {name}");
            if self.storage.delete(&name).await? {
                deleted.push(name);
            }
        }

        self.clients_claimed.store(true, Ordering::Release);
        self.set_state(WorkerState::Activated);
        Ok(deleted)
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Answers a request from the controlled scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read, or if the network fails
    /// and no offline document can stand in. With
    /// `fallback_navigations_only` set, only navigations get the offline
    /// document.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response> {
        if self.config.is_audio_path(request.path()) {
            return self.handle_audio(request).await;
        }

        if let Some(hit) = self.storage.match_any(&request).await? {
            log::debug!("cache hit {}", request.url);
            return Ok(hit);
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.is_cacheable_core() {
                    self.store_in_background(request, response.clone());
                }
                Ok(response)
            }
            Err(e) => self.offline_fallback(&request, e).await,
        }
    }

    /// Writes a copy of a network response into the core namespace without
    /// holding up the caller.
    fn store_in_background(&self, request: Request, response: Response) {
        let storage = Arc::clone(&self.storage);
        let name = self.config.core_cache_name.clone();
        self.wait_until(async move {
            let result: Result<()> = async {
                let cache = storage.open(&name).await?;
                cache.put(&request, response).await
            }
            .await;
            if let Err(e) = result {
                log::warn!("Failed to cache {}: {e}", request.url);
            }
        });
    }

    async fn offline_fallback(&self, request: &Request, error: Error) -> Result<Response> {
        if self.config.fallback_navigations_only && !request.is_navigation() {
            return Err(error);
        }

        let offline = Request::for_path(&self.origin, &self.config.offline_document)?;
        match self.storage.match_any(&offline).await? {
            Some(shell) => {
                log::warn!("{} unreachable ({error}), serving offline document", request.url);
                Ok(shell)
            }
            None => Err(error),
        }
    }

    /// Audio requests are served from the audio namespace, populated on first
    /// use. Any response is stored, whatever its status or type.
    async fn handle_audio(&self, request: Request) -> Result<Response> {
        let cache = self.storage.open(&self.config.audio_cache_name).await?;
        if let Some(hit) = cache.match_request(&request).await? {
            log::debug!("audio cache hit {}", request.url);
            return Ok(hit);
        }

        let response = self.fetcher.fetch(&request).await?;
        if let Err(e) = cache.put(&request, response.clone()).await {
            log::warn!("Failed to cache audio {}: {e}", request.url);
        }
        Ok(response)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Handles a message posted by the page.
    ///
    /// Returns the preload statistics when the payload was `preloadAudio`,
    /// `None` for any other payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio namespace cannot be opened.
    pub async fn handle_message(
        &self,
        payload: &str,
        progress: &dyn PreloadProgress,
    ) -> Result<Option<PreloadStats>> {
        match Message::parse(payload) {
            Some(Message::PreloadAudio) => self.preload_audio(progress).await.map(Some),
            None => {
                log::debug!("Ignoring message {payload:?}");
                Ok(None)
            }
        }
    }

    /// Fetches and stores every audio clip not already cached.
    ///
    /// Entries are processed concurrently and independently; a failing entry
    /// is recorded in the returned statistics and does not affect the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the audio namespace cannot be opened.
    pub async fn preload_audio(&self, progress: &dyn PreloadProgress) -> Result<PreloadStats> {
        let cache = self.storage.open(&self.config.audio_cache_name).await?;
        progress.on_batch_start(self.config.audio_files.len());

        let results: Vec<_> = stream::iter(self.config.audio_files.iter().cloned())
            .map(|path| {
                let cache = &cache;
                async move {
                    let result = self.preload_entry(cache, &path, progress).await;
                    (path, result)
                }
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;

        let mut builder = PreloadStatsBuilder::new();
        for (path, result) in results {
            match result {
                Ok(Some(bytes)) => builder.add_cached(bytes),
                Ok(None) => builder.add_skipped(),
                Err(e) => builder.add_failed(&path, e.to_string()),
            }
        }

        let stats = builder.build();
        log::info!(
            "Audio preload: {} cached, {} already present, {} failed",
            stats.cached,
            stats.skipped,
            stats.failed.len()
        );
        Ok(stats)
    }

    /// Returns `Some(bytes)` when the entry was stored, `None` when it was
    /// already present.
    async fn preload_entry(
        &self,
        cache: &S::Cache,
        path: &str,
        progress: &dyn PreloadProgress,
    ) -> Result<Option<u64>> {
        let result: Result<Option<u64>> = async {
            let request = Request::for_path(&self.origin, path)?;
            if cache.match_request(&request).await?.is_some() {
                progress.on_entry_skipped(path);
                return Ok(None);
            }
            let response = self.fetcher.fetch(&request).await?;
            let bytes = response.body.len() as u64;
            cache.put(&request, response).await?;
            progress.on_entry_cached(path, bytes);
            Ok(Some(bytes))
        }
        .await;

        if let Err(ref e) = result {
            log::warn!("Failed to preload {path}: {e}");
            progress.on_error(path, &e.to_string());
        }
        result
    }

    // =========================================================================
    // Sync and notifications
    // =========================================================================

    /// Handles a background-sync registration. Returns true if the tag is
    /// recognised.
    pub fn sync(&self, tag: &str) -> bool {
        if tag == SYNC_REPORTS_TAG {
            // Report submissions are not queued yet, so there is nothing to replay.
            log::info!("Background sync {tag}: nothing to replay");
            true
        } else {
            log::debug!("Ignoring sync tag {tag:?}");
            false
        }
    }

    /// Builds the notification shown for a push message.
    #[must_use]
    pub fn push(&self, payload: Option<&str>) -> Notification {
        Notification::from_push(payload)
    }

    /// Handles a notification click. Returns the URL to open, if any.
    #[must_use]
    pub fn notification_click(&self, action: Option<&str>) -> Option<String> {
        (action == Some(START_ACTION)).then(|| {
            self.origin
                .join(&self.config.app_url)
                .map_or_else(|_| self.config.app_url.clone(), String::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ResponseType;
    use crate::storage::MemoryCacheStorage;
    use crate::testing::{FlakyStorage, MockFetcher, get, navigate, origin};
    use std::time::Duration;

    type Manager = OfflineCacheManager<MemoryCacheStorage, MockFetcher>;

    fn small_config() -> CacheConfig {
        CacheConfig::new()
            .with_core_cache_name("core-v1")
            .with_audio_cache_name("audio-v1")
            .with_core_files(["/", "/index.html", "/offline.html", "/manifest.json"])
            .with_audio_files([
                "/audio/commander/phases/start.mp3",
                "/audio/commander/numbers/1.mp3",
                "/audio/commander/numbers/2.mp3",
                "/audio/commander/encouragement/great-job.mp3",
            ])
    }

    fn manager(config: CacheConfig) -> Manager {
        OfflineCacheManager::new(config, origin(), MemoryCacheStorage::new(), MockFetcher::new())
    }

    async fn cached_in(manager: &Manager, name: &str, path: &str) -> Option<Response> {
        let cache = manager.storage().open(name).await.unwrap();
        cache.match_request(&get(path)).await.unwrap()
    }

    // =========================================================================
    // Install
    // =========================================================================

    #[tokio::test]
    async fn install_caches_every_core_file() {
        let m = manager(small_config());
        let outcome = m.install().await;

        assert_eq!(outcome.cached, 4);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.skip_waiting);
        assert_eq!(m.state(), WorkerState::Installed);

        m.fetcher().set_offline(true);
        let before = m.fetcher().total_calls();
        for path in &m.config().core_files.clone() {
            let response = m.handle_fetch(get(path)).await.unwrap();
            assert_eq!(response.body, path.as_str());
        }
        assert_eq!(m.fetcher().total_calls(), before);
    }

    #[tokio::test]
    async fn install_failure_is_swallowed_and_stores_nothing() {
        let m = manager(small_config());
        m.fetcher().fail("/manifest.json");

        let outcome = m.install().await;
        assert_eq!(outcome.cached, 0);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.skip_waiting);
        assert!(m.skip_waiting());
        assert_eq!(m.state(), WorkerState::Installed);
        assert!(cached_in(&m, "core-v1", "/index.html").await.is_none());
    }

    #[tokio::test]
    async fn install_treats_error_status_as_failure() {
        let m = manager(small_config());
        m.fetcher().respond("/offline.html", Response::new(404, "missing"));

        let outcome = m.install().await;
        assert_eq!(outcome.failed, 1);
        assert!(cached_in(&m, "core-v1", "/").await.is_none());
    }

    #[tokio::test]
    async fn install_rolls_back_when_a_store_fails() {
        let storage = FlakyStorage::default();
        storage.fail_put("/offline.html");
        let m = OfflineCacheManager::new(small_config(), origin(), storage, MockFetcher::new());

        let outcome = m.install().await;
        assert_eq!(outcome.cached, 0);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.skip_waiting);
        let core = m.storage().open("core-v1").await.unwrap();
        assert!(core.keys().await.unwrap().is_empty());
    }

    // =========================================================================
    // Generic path
    // =========================================================================

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let m = manager(small_config());
        m.install().await;
        let before = m.fetcher().calls("/index.html");

        m.handle_fetch(get("/index.html")).await.unwrap();
        assert_eq!(m.fetcher().calls("/index.html"), before);
    }

    #[tokio::test]
    async fn successful_response_is_written_back() {
        let m = manager(small_config());
        let first = m.handle_fetch(get("/static/js/report.js")).await.unwrap();
        assert_eq!(first.status, 200);
        m.settle().await;

        let second = m.handle_fetch(get("/static/js/report.js")).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(m.fetcher().calls("/static/js/report.js"), 1);
        assert!(cached_in(&m, "core-v1", "/static/js/report.js").await.is_some());
    }

    #[tokio::test]
    async fn not_found_is_never_cached() {
        let m = manager(small_config());
        m.fetcher().respond("/missing.png", Response::new(404, "nope"));

        let response = m.handle_fetch(get("/missing.png")).await.unwrap();
        assert_eq!(response.status, 404);
        m.settle().await;
        assert!(cached_in(&m, "core-v1", "/missing.png").await.is_none());
    }

    #[tokio::test]
    async fn opaque_response_is_never_cached() {
        let m = manager(small_config());
        m.fetcher().respond(
            "/fonts/inter.woff2",
            Response::new(200, "font").with_type(ResponseType::Opaque),
        );

        m.handle_fetch(get("/fonts/inter.woff2")).await.unwrap();
        m.settle().await;
        assert!(cached_in(&m, "core-v1", "/fonts/inter.woff2").await.is_none());
    }

    #[tokio::test]
    async fn failed_write_back_does_not_affect_response() {
        let m = manager(small_config());
        let post = get("/generate").with_method("POST").with_body(r#"{"name":"A"}"#);
        m.fetcher().respond("/generate", Response::new(200, r#"{"success":true}"#));

        let response = m.handle_fetch(post).await.unwrap();
        assert_eq!(response.body, r#"{"success":true}"#);
        m.settle().await;
        assert!(cached_in(&m, "core-v1", "/generate").await.is_none());
    }

    #[tokio::test]
    async fn offline_navigation_serves_offline_document() {
        let m = manager(small_config());
        m.install().await;
        m.fetcher().set_offline(true);

        let response = m.handle_fetch(navigate("/ios-app.html")).await.unwrap();
        assert_eq!(response.body, "/offline.html");
    }

    #[tokio::test]
    async fn any_offline_request_gets_offline_document_by_default() {
        let m = manager(CacheConfig::default());
        m.install().await;
        m.fetcher().set_offline(true);

        let page = m.handle_fetch(get("/ios-app.html")).await.unwrap();
        assert_eq!(page.body, "/offline.html");
        let script = m.handle_fetch(get("/static/js/chart.js")).await.unwrap();
        assert_eq!(script.body, "/offline.html");
    }

    #[tokio::test]
    async fn navigation_only_fallback_rejects_subresources() {
        let m = manager(small_config().with_fallback_navigations_only(true));
        m.install().await;
        m.fetcher().set_offline(true);

        let err = m.handle_fetch(get("/static/js/chart.js")).await.unwrap_err();
        assert!(err.is_network());
        let page = m.handle_fetch(navigate("/ios-app.html")).await.unwrap();
        assert_eq!(page.body, "/offline.html");
    }

    #[tokio::test]
    async fn offline_without_shell_propagates_error() {
        let m = manager(small_config());
        m.fetcher().set_offline(true);

        let err = m.handle_fetch(navigate("/ios-app.html")).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    // =========================================================================
    // Audio path
    // =========================================================================

    #[tokio::test]
    async fn audio_miss_then_hit_without_network() {
        let m = manager(small_config());
        let path = "/audio/commander/numbers/7.mp3";

        m.handle_fetch(get(path)).await.unwrap();
        m.handle_fetch(get(path)).await.unwrap();
        assert_eq!(m.fetcher().calls(path), 1);
        assert!(cached_in(&m, "audio-v1", path).await.is_some());
        assert!(cached_in(&m, "core-v1", path).await.is_none());
    }

    #[tokio::test]
    async fn audio_error_responses_are_cached_too() {
        let m = manager(small_config());
        let path = "/audio/commander/numbers/9.mp3";
        m.fetcher().respond(path, Response::new(500, "boom"));

        assert_eq!(m.handle_fetch(get(path)).await.unwrap().status, 500);
        m.fetcher().respond(path, Response::new(200, "clip"));
        let replay = m.handle_fetch(get(path)).await.unwrap();
        assert_eq!(replay.status, 500);
        assert_eq!(m.fetcher().calls(path), 1);
    }

    #[tokio::test]
    async fn audio_network_failure_has_no_fallback() {
        let m = manager(small_config());
        m.install().await;
        m.fetcher().set_offline(true);

        let request = navigate("/audio/commander/phases/start.mp3");
        assert!(m.handle_fetch(request).await.unwrap_err().is_network());
    }

    // =========================================================================
    // Activate
    // =========================================================================

    #[tokio::test]
    async fn activate_deletes_only_unrecognized_namespaces() {
        let storage = Arc::new(MemoryCacheStorage::new());
        for name in ["core-v1", "core-v2", "audio-v1"] {
            storage.open(name).await.unwrap();
        }
        let config = small_config().with_core_cache_name("core-v2");
        let m = OfflineCacheManager::with_shared(
            config,
            origin(),
            Arc::clone(&storage),
            Arc::new(MockFetcher::new()),
        );

        let deleted = m.activate().await.unwrap();
        assert_eq!(deleted, vec!["core-v1"]);
        assert_eq!(storage.keys().await.unwrap(), vec!["core-v2", "audio-v1"]);
        assert!(m.clients_claimed());
        assert_eq!(m.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn version_upgrade_replaces_core_generation() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(MockFetcher::new());
        let v1 = OfflineCacheManager::with_shared(
            small_config(),
            origin(),
            Arc::clone(&storage),
            Arc::clone(&fetcher),
        );
        v1.install().await;
        v1.activate().await.unwrap();
        v1.handle_fetch(get("/audio/commander/numbers/1.mp3")).await.unwrap();

        let v2 = OfflineCacheManager::with_shared(
            small_config().with_core_cache_name("core-v2"),
            origin(),
            Arc::clone(&storage),
            Arc::clone(&fetcher),
        );
        v2.install().await;
        assert_eq!(v2.activate().await.unwrap(), vec!["core-v1"]);

        // Audio survives the core bump.
        assert!(cached_in(&v2, "audio-v1", "/audio/commander/numbers/1.mp3").await.is_some());
        assert!(cached_in(&v2, "core-v2", "/index.html").await.is_some());
    }

    // =========================================================================
    // Preload
    // =========================================================================

    #[tokio::test]
    async fn preload_fetches_each_uncached_clip_once() {
        let m = manager(small_config());
        m.handle_fetch(get("/audio/commander/numbers/1.mp3")).await.unwrap();

        let stats = m
            .handle_message("preloadAudio", &NoProgress)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.cached, 3);
        assert_eq!(stats.skipped, 1);
        assert!(stats.is_complete());
        for path in &m.config().audio_files.clone() {
            assert_eq!(m.fetcher().calls(path), 1, "{path}");
            assert!(cached_in(&m, "audio-v1", path).await.is_some());
        }

        let again = m.preload_audio(&NoProgress).await.unwrap();
        assert_eq!(again.cached, 0);
        assert_eq!(again.skipped, 4);
        assert_eq!(m.fetcher().total_calls(), 4);
    }

    #[tokio::test]
    async fn preload_failure_does_not_block_other_entries() {
        let m = manager(small_config());
        m.fetcher().fail("/audio/commander/numbers/2.mp3");

        let stats = m.preload_audio(&NoProgress).await.unwrap();
        assert_eq!(stats.cached, 3);
        assert_eq!(stats.failed.len(), 1);
        assert_eq!(stats.failed[0].path, "/audio/commander/numbers/2.mp3");
        assert!(cached_in(&m, "audio-v1", "/audio/commander/numbers/2.mp3").await.is_none());
    }

    #[tokio::test]
    async fn preload_concurrency_is_bounded() {
        let m = manager(CacheConfig::new().with_fetch_concurrency(2));
        m.fetcher().set_delay(Duration::from_millis(2));

        let stats = m.preload_audio(&NoProgress).await.unwrap();
        assert_eq!(stats.cached, 71);
        assert!(m.fetcher().max_in_flight() <= 2);
        assert!(m.fetcher().max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn preload_reports_progress() {
        use std::sync::atomic::AtomicUsize;

        #[derive(Default)]
        struct Counter {
            total: AtomicUsize,
            cached: AtomicUsize,
            errors: AtomicUsize,
        }
        impl PreloadProgress for Counter {
            fn on_batch_start(&self, total: usize) {
                self.total.store(total, Ordering::SeqCst);
            }
            fn on_entry_cached(&self, _path: &str, _bytes: u64) {
                self.cached.fetch_add(1, Ordering::SeqCst);
            }
            fn on_error(&self, _path: &str, _error: &str) {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
        }

        let m = manager(small_config());
        m.fetcher().fail("/audio/commander/phases/start.mp3");
        let counter = Counter::default();
        m.preload_audio(&counter).await.unwrap();
        assert_eq!(counter.total.load(Ordering::SeqCst), 4);
        assert_eq!(counter.cached.load(Ordering::SeqCst), 3);
        assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_messages_are_ignored() {
        let m = manager(small_config());
        assert!(m.handle_message("refresh", &NoProgress).await.unwrap().is_none());
        assert_eq!(m.fetcher().total_calls(), 0);
    }

    // =========================================================================
    // Dispatch, sync and notifications
    // =========================================================================

    #[tokio::test]
    async fn dispatch_routes_lifecycle_events() {
        let m = manager(small_config());
        assert!(matches!(
            m.dispatch(Event::Install).await.unwrap(),
            EventOutcome::Installed(InstallOutcome { cached: 4, .. })
        ));
        assert!(matches!(
            m.dispatch(Event::Activate).await.unwrap(),
            EventOutcome::Activated(deleted) if deleted.is_empty()
        ));
        assert!(matches!(
            m.dispatch(Event::Fetch(get("/"))).await.unwrap(),
            EventOutcome::Response(r) if r.status == 200
        ));
        assert!(matches!(
            m.dispatch(Event::Message("preloadAudio".into())).await.unwrap(),
            EventOutcome::Preloaded(stats) if stats.cached == 4
        ));
        assert!(matches!(
            m.dispatch(Event::Message("hello".into())).await.unwrap(),
            EventOutcome::Ignored
        ));
        assert!(matches!(
            m.dispatch(Event::Sync("sync-reports".into())).await.unwrap(),
            EventOutcome::Ignored
        ));
        assert!(matches!(
            m.dispatch(Event::Push(Some("Report ready".into()))).await.unwrap(),
            EventOutcome::Notify(n) if n.body == "Report ready"
        ));
        assert!(matches!(
            m.dispatch(Event::NotificationClick(Some("start".into()))).await.unwrap(),
            EventOutcome::OpenWindow(url) if url == "https://coach.example/"
        ));
    }

    #[tokio::test]
    async fn concurrent_settles_wait_for_background_work() {
        let m = manager(small_config());
        let first = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&first);
        m.wait_until(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(m.settle(), m.settle());
        })
        .await
        .unwrap();
        assert!(first.load(Ordering::SeqCst));

        // Work registered after a settle is still waited for.
        let second = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&second);
        m.wait_until(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::timeout(Duration::from_secs(5), m.settle())
            .await
            .unwrap();
        assert!(second.load(Ordering::SeqCst));
    }

    #[test]
    fn sync_recognises_reserved_tag_only() {
        let m = manager(small_config());
        assert!(m.sync(SYNC_REPORTS_TAG));
        assert!(!m.sync("other"));
    }

    #[test]
    fn notification_click_opens_app_only_for_start() {
        let m = manager(small_config());
        assert_eq!(
            m.notification_click(Some("start")).as_deref(),
            Some("https://coach.example/")
        );
        assert_eq!(m.notification_click(Some("close")), None);
        assert_eq!(m.notification_click(None), None);
    }

    #[test]
    fn new_manager_is_parsed() {
        let m = manager(small_config());
        assert_eq!(m.state(), WorkerState::Parsed);
        assert!(!m.skip_waiting());
        assert!(!m.clients_claimed());
    }
}
