//! Durable cache storage on the local file system.
//!
//! Layout under the root directory:
//!
//! ```text
//! index.toml                  namespace names in creation order
//! caches/<name>/<sha>.entry   one file per entry
//! ```
//!
//! An entry file starts with the byte length of a TOML header (key,
//! timestamp and response metadata) on its own line, followed by the header
//! and then the raw body. Each put writes the whole file to a temporary path
//! and renames it into place, so that rename is the only commit point.
//!
//! Puts hold the storage lock shared; creating or deleting a namespace holds
//! it exclusively. A put through a handle whose namespace is gone fails
//! instead of recreating the directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{Cache, CacheStorage, ensure_storable, validate_name};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

const INDEX_FILE: &str = "index.toml";
const CACHES_DIR: &str = "caches";
const ENTRY_EXT: &str = "entry";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default, Serialize, Deserialize)]
struct NamespaceIndex {
    names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    stored_at: DateTime<Utc>,
    response: Response,
}

/// Namespaces persisted as directories under a root path.
#[derive(Debug)]
pub struct DiskCacheStorage {
    root: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl DiskCacheStorage {
    /// Creates a storage rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(CACHES_DIR)).await?;
        Ok(Self {
            root,
            lock: Arc::new(RwLock::new(())),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, name: &str) -> PathBuf {
        self.root.join(CACHES_DIR).join(name)
    }

    fn handle(&self, name: &str) -> DiskCache {
        DiskCache {
            name: name.to_string(),
            dir: self.namespace_dir(name),
            lock: Arc::clone(&self.lock),
        }
    }

    async fn load_index(&self) -> Result<NamespaceIndex> {
        match tokio::fs::read_to_string(self.root.join(INDEX_FILE)).await {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(NamespaceIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &NamespaceIndex) -> Result<()> {
        let contents = toml::to_string(index)?;
        write_atomic(&self.root.join(INDEX_FILE), contents.as_bytes()).await
    }
}

/// Handle to one namespace directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    name: String,
    dir: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl DiskCache {
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{digest}.{ENTRY_EXT}"))
    }

    /// Reads the entry at `path`. Missing and undecodable entries are misses.
    async fn read_entry(path: &Path) -> Result<Option<(EntryMeta, Bytes)>> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => Bytes::from(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match decode_entry(&path.display().to_string(), contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry: {e}");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if !request.is_get() {
            return Ok(None);
        }
        let key = request.cache_key();
        let Some((meta, body)) = Self::read_entry(&self.entry_path(&key)).await? else {
            return Ok(None);
        };
        if meta.key != key {
            log::warn!("Cache entry for {key} holds {}", meta.key);
            return Ok(None);
        }

        let mut response = meta.response;
        response.body = body;
        Ok(Some(response))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        ensure_storable(request)?;
        let key = request.cache_key();
        let path = self.entry_path(&key);
        let body = response.body.clone();
        let meta = EntryMeta {
            key,
            stored_at: Utc::now(),
            response,
        };
        let contents = encode_entry(&meta, &body)?;

        let _guard = self.lock.read().await;
        if !tokio::fs::try_exists(&self.dir).await? {
            return Err(Error::CacheDeleted(self.name.clone()));
        }
        write_atomic(&path, &contents).await
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(&request.cache_key())).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                if let Some((meta, _)) = Self::read_entry(&path).await? {
                    keys.push(meta.key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Cache = DiskCache;

    async fn open(&self, name: &str) -> Result<DiskCache> {
        validate_name(name)?;

        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(self.namespace_dir(name))
            .await
            .map_err(|e| Error::CacheOpen {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let mut index = self.load_index().await?;
        if !index.names.iter().any(|n| n == name) {
            index.names.push(name.to_string());
            self.save_index(&index).await?;
            log::debug!("Created cache namespace {name}");
        }

        Ok(self.handle(name))
    }

    async fn lookup(&self, name: &str) -> Result<Option<DiskCache>> {
        let _guard = self.lock.read().await;
        let index = self.load_index().await?;
        Ok(index
            .names
            .iter()
            .any(|n| n == name)
            .then(|| self.handle(name)))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.read().await;
        Ok(self.load_index().await?.names.iter().any(|n| n == name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.write().await;
        let mut index = self.load_index().await?;
        let before = index.names.len();
        index.names.retain(|n| n != name);
        if index.names.len() == before {
            return Ok(false);
        }
        self.save_index(&index).await?;

        if validate_name(name).is_ok() {
            match tokio::fs::remove_dir_all(self.namespace_dir(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;
        Ok(self.load_index().await?.names)
    }
}

fn encode_entry(meta: &EntryMeta, body: &[u8]) -> Result<Vec<u8>> {
    let header = toml::to_string(meta)?;
    let prefix = format!("{}\n", header.len());
    let mut contents = Vec::with_capacity(prefix.len() + header.len() + body.len());
    contents.extend_from_slice(prefix.as_bytes());
    contents.extend_from_slice(header.as_bytes());
    contents.extend_from_slice(body);
    Ok(contents)
}

fn decode_entry(location: &str, contents: Bytes) -> Result<(EntryMeta, Bytes)> {
    let corrupt = |reason: &str| Error::CorruptEntry {
        key: location.to_string(),
        reason: reason.to_string(),
    };

    let newline = contents
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupt("missing header length"))?;
    let len: usize = std::str::from_utf8(&contents[..newline])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| corrupt("invalid header length"))?;
    let start = newline + 1;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= contents.len())
        .ok_or_else(|| corrupt("truncated header"))?;

    let header = std::str::from_utf8(&contents[start..end]).map_err(|e| corrupt(&e.to_string()))?;
    let meta: EntryMeta = toml::from_str(header).map_err(|e| corrupt(&e.to_string()))?;
    Ok((meta, contents.slice(end..)))
}

/// Writes `data` to a unique temporary file next to `path`, then renames it
/// over `path`.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));

    tokio::fs::write(&tmp_path, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}
