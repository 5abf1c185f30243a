//! Cache namespace abstraction.
//!
//! A [`CacheStorage`] holds named namespaces, each a [`Cache`] mapping request
//! keys to stored responses. Entries carry no expiry: they live until they are
//! overwritten or their whole namespace is deleted.

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::request::{Request, Response};

pub use disk::{DiskCache, DiskCacheStorage};
pub use memory::{MemoryCache, MemoryCacheStorage};

/// A single named namespace.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the namespace name.
    fn name(&self) -> &str;

    /// Looks up the entry stored for `request`.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>>;

    /// Stores `response` for `request`, replacing any previous entry.
    ///
    /// Each put replaces the entry as a whole; concurrent puts for the same
    /// key resolve as last-write-wins. Fails with [`Error::CacheDeleted`]
    /// once the namespace has been deleted.
    async fn put(&self, request: &Request, response: Response) -> Result<()>;

    /// Removes the entry for `request`. Returns true if one existed.
    async fn delete(&self, request: &Request) -> Result<bool>;

    /// Returns the keys of every stored entry.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// The set of namespaces available to the manager.
#[async_trait]
pub trait CacheStorage: Send + Sync + 'static {
    /// Handle type for an opened namespace.
    type Cache: Cache + 'static;

    /// Opens the namespace called `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Self::Cache>;

    /// Returns the namespace called `name` if it exists. Never creates one.
    async fn lookup(&self, name: &str) -> Result<Option<Self::Cache>>;

    /// Returns true if a namespace called `name` exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Deletes the namespace called `name` with all its entries.
    /// Returns true if it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Returns every namespace name in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Looks `request` up in every namespace, in creation order, and returns
    /// the first match.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        for name in self.keys().await? {
            // Deleted since it was listed.
            let Some(cache) = self.lookup(&name).await? else {
                continue;
            };
            if let Some(response) = cache.match_request(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Rejects requests a cache cannot hold.
pub(crate) fn ensure_storable(request: &Request) -> Result<()> {
    if request.is_get() {
        Ok(())
    } else {
        Err(Error::UnsupportedMethod(request.method.clone()))
    }
}

/// Rejects namespace names that cannot be used as a single path component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        Err(Error::InvalidCacheName(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_with_separators_are_rejected() {
        assert!(validate_name("fitreport-core-v3").is_ok());
        assert!(validate_name("audio v1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn only_get_is_storable() {
        let url = reqwest::Url::parse("https://coach.example/upload").unwrap();
        assert!(ensure_storable(&Request::get(url.clone())).is_ok());
        assert!(matches!(
            ensure_storable(&Request::get(url).with_method("POST")),
            Err(Error::UnsupportedMethod(m)) if m == "POST"
        ));
    }
}
