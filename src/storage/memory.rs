//! In-process cache storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use super::{Cache, CacheStorage, ensure_storable, validate_name};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

type Entries = Arc<RwLock<HashMap<String, Response>>>;
type Namespaces = Arc<Mutex<Vec<(String, Entries)>>>;

/// Namespaces kept in memory for the lifetime of the process.
///
/// Clones share the same namespaces.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    namespaces: Namespaces,
}

impl MemoryCacheStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, name: &str, entries: Entries) -> MemoryCache {
        MemoryCache {
            name: name.to_string(),
            entries,
            namespaces: Arc::clone(&self.namespaces),
        }
    }
}

/// Handle to one in-memory namespace.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    name: String,
    entries: Entries,
    namespaces: Namespaces,
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&request.cache_key()).cloned())
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        ensure_storable(request)?;
        // Held across the insert; namespace delete takes the same lock.
        let namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        if !namespaces.iter().any(|(_, e)| Arc::ptr_eq(e, &self.entries)) {
            return Err(Error::CacheDeleted(self.name.clone()));
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.cache_key(), response);
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request.cache_key())
            .is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Cache = MemoryCache;

    async fn open(&self, name: &str) -> Result<MemoryCache> {
        validate_name(name)?;
        let mut namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = if let Some((_, entries)) = namespaces.iter().find(|(n, _)| n == name) {
            Arc::clone(entries)
        } else {
            let entries = Entries::default();
            namespaces.push((name.to_string(), Arc::clone(&entries)));
            entries
        };
        Ok(self.handle(name, entries))
    }

    async fn lookup(&self, name: &str) -> Result<Option<MemoryCache>> {
        let namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(namespaces
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| self.handle(name, Arc::clone(entries))))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(namespaces.iter().any(|(n, _)| n == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        let before = namespaces.len();
        namespaces.retain(|(n, _)| n != name);
        Ok(namespaces.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(namespaces.iter().map(|(n, _)| n.clone()).collect())
    }
}
