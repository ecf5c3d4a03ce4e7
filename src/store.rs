//! Store collaborators: blob storage and key-value persistence.
//!
//! Both stores are external services in production; this module defines the
//! interface boundary the pipeline consumes plus two embedded
//! implementations — [`MemoryStore`] for tests and examples, [`LocalStore`]
//! for the CLI's on-disk data directory. The pipeline treats the stores as
//! last-write-wins: no locking happens at this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors reported by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("{0}")]
    Other(String),
}

/// Handle to an uploaded blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    /// Store path usable with [`BlobStore::read`] and [`BlobStore::delete`].
    pub path: String,
}

/// One entry from [`KvStore::list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    /// Present only when the listing requested values.
    pub value: Option<String>,
}

/// Blob file storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name; the returned path is unique even when the
    /// same name is uploaded twice.
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<StoredFile, StoreError>;

    /// Read a blob back, `None` when the path does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// List stored paths starting with `prefix` (empty prefix lists all).
    async fn list_dir(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Key-value persistence.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// List entries whose keys match `pattern` — a literal key, or a prefix
    /// glob ending in `*` (the only glob form the stores support).
    async fn list(&self, pattern: &str, include_values: bool)
        -> Result<Vec<KvEntry>, StoreError>;

    /// Remove every key.
    async fn flush(&self) -> Result<(), StoreError>;
}

/// Match a key against a literal pattern or trailing-`*` prefix glob.
fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Both stores in one in-memory value. Cheap to construct per test; all
/// state dies with the value.
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    kv: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored KV entries (test helper).
    pub async fn kv_len(&self) -> usize {
        self.kv.read().await.len()
    }

    /// Number of stored blobs (test helper).
    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}

/// Pick a path not yet present in `existing` by suffixing a counter.
fn unique_path(existing: &BTreeMap<String, Vec<u8>>, name: &str) -> String {
    let base = format!("/{name}");
    if !existing.contains_key(&base) {
        return base;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (name.to_string(), String::new()),
    };
    let mut n = 1;
    loop {
        let candidate = format!("/{stem}-{n}{ext}");
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<StoredFile, StoreError> {
        let mut files = self.files.write().await;
        let path = unique_path(&files, name);
        files.insert(path.clone(), bytes.to_vec());
        Ok(StoredFile { path })
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.files.read().await.get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.files.write().await.remove(path);
        Ok(())
    }

    async fn list_dir(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let want = format!("/{}", prefix.trim_start_matches('/'));
        Ok(self
            .files
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(want.trim_end_matches('/')))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list(
        &self,
        pattern: &str,
        include_values: bool,
    ) -> Result<Vec<KvEntry>, StoreError> {
        Ok(self
            .kv
            .read()
            .await
            .iter()
            .filter(|(k, _)| key_matches(pattern, k))
            .map(|(k, v)| KvEntry {
                key: k.clone(),
                value: include_values.then(|| v.clone()),
            })
            .collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.kv.write().await.clear();
        Ok(())
    }
}

// ── Local-disk store ─────────────────────────────────────────────────────

/// Directory-backed store for the CLI.
///
/// Blobs live under `<root>/files/`; the KV map is one JSON document at
/// `<root>/kv.json`, cached in memory and rewritten on every mutation.
/// Suitable for one process at a time — the CLI — not for concurrent
/// writers.
pub struct LocalStore {
    root: PathBuf,
    kv: RwLock<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("files")).await?;

        let kv_path = root.join("kv.json");
        let kv = match tokio::fs::read_to_string(&kv_path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::Serialization(format!("{}: {e}", kv_path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(root = %root.display(), "Opened local store");
        Ok(Self {
            root,
            kv: RwLock::new(kv),
        })
    }

    fn kv_path(&self) -> PathBuf {
        self.root.join("kv.json")
    }

    /// Resolve a store path under the root, rejecting traversal.
    fn blob_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(StoreError::Other(format!("invalid store path: {path}")));
        }
        Ok(self.root.join(rel))
    }

    async fn persist_kv(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(self.kv_path(), json).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<StoredFile, StoreError> {
        let safe = name.replace(['/', '\\'], "_");
        let (stem, ext) = match safe.rsplit_once('.') {
            Some((s, e)) => (s.to_string(), format!(".{e}")),
            None => (safe.clone(), String::new()),
        };

        let mut candidate = format!("files/{safe}");
        let mut n = 1;
        while tokio::fs::try_exists(self.root.join(&candidate)).await? {
            candidate = format!("files/{stem}-{n}{ext}");
            n += 1;
        }

        tokio::fs::write(self.root.join(&candidate), bytes).await?;
        Ok(StoredFile { path: candidate })
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.blob_path(path)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.blob_path(path)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dir(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join("files")).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let rel = format!("files/{}", entry.file_name().to_string_lossy());
                if rel.strip_prefix("files/").is_some_and(|n| n.starts_with(prefix)) {
                    entries.push(rel);
                }
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl KvStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.kv.write().await;
        map.insert(key.to_string(), value.to_string());
        self.persist_kv(&map).await
    }

    async fn list(
        &self,
        pattern: &str,
        include_values: bool,
    ) -> Result<Vec<KvEntry>, StoreError> {
        Ok(self
            .kv
            .read()
            .await
            .iter()
            .filter(|(k, _)| key_matches(pattern, k))
            .map(|(k, v)| KvEntry {
                key: k.clone(),
                value: include_values.then(|| v.clone()),
            })
            .collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut map = self.kv.write().await;
        map.clear();
        self.persist_kv(&map).await
    }
}
