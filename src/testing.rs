//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::storage::{Cache, CacheStorage, MemoryCache, MemoryCacheStorage};

pub const ORIGIN: &str = "https://coach.example";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn get(path: &str) -> Request {
    Request::for_path(&origin(), path).unwrap()
}

pub fn navigate(path: &str) -> Request {
    Request::navigate(origin().join(path).unwrap())
}

enum Reply {
    Respond(Response),
    Fail,
}

/// A scripted network. Unscripted paths answer `200` with the path as body.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.replies
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Respond(response));
    }

    pub fn fail(&self, path: &str) {
        self.replies.lock().unwrap().insert(path.to_string(), Reply::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let path = request.path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".to_string()));
        }
        match self.replies.lock().unwrap().get(&path) {
            Some(Reply::Respond(response)) => Ok(response.clone()),
            Some(Reply::Fail) => Err(Error::Network(format!("{path}: connection reset"))),
            None => Ok(Response::new(200, path.clone()).with_url(&request.url)),
        }
    }
}

/// In-memory storage whose puts fail for chosen paths.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryCacheStorage,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FlakyStorage {
    pub fn fail_put(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    fn wrap(&self, inner: MemoryCache) -> FlakyCache {
        FlakyCache {
            inner,
            failing: Arc::clone(&self.failing),
        }
    }
}

pub struct FlakyCache {
    inner: MemoryCache,
    failing: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl Cache for FlakyCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        self.inner.match_request(request).await
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        let fails = self.failing.lock().unwrap().contains(request.path());
        if fails {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        self.inner.put(request, response).await
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        self.inner.delete(request).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    type Cache = FlakyCache;

    async fn open(&self, name: &str) -> Result<FlakyCache> {
        Ok(self.wrap(self.inner.open(name).await?))
    }

    async fn lookup(&self, name: &str) -> Result<Option<FlakyCache>> {
        Ok(self.inner.lookup(name).await?.map(|cache| self.wrap(cache)))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}
