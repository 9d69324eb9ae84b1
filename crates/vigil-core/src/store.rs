//! Document store seam
//!
//! Persistence is an external collaborator. Everything Vigil persists is a
//! JSON document addressed by `(collection, key)`. Keys are chosen so that
//! lexicographic order is chronological (ULIDs, ISO dates), which lets
//! `recent` serve most-recent-N queries without an index.
//!
//! Writes replace whole documents; there are no field-level patches.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Collection names
pub mod collections {
    /// Policy documents, keyed by policy id
    pub const POLICIES: &str = "policies";
    /// Runtime operational state, keyed by scope
    pub const RUNTIME_OPS: &str = "runtimeOps";
    /// Daily metrics, keyed by `YYYY-MM-DD`
    pub const GOVERNANCE: &str = "governance";
    /// Raw QA results, keyed by record id
    pub const QA_RESULTS: &str = "qaResults";
    /// Audit entries, keyed by audit id
    pub const AUDIT_LOGS: &str = "auditLogs";
    /// Governance alerts, keyed by alert id
    pub const ALERTS: &str = "alerts";
    /// Model cards, keyed by model version
    pub const MODEL_CARDS: &str = "modelCards";
    /// Organisations
    pub const ORGS: &str = "orgs";
    /// Tenants
    pub const TENANTS: &str = "tenants";
    /// Teams
    pub const TEAMS: &str = "teams";
}

/// Keyed JSON document storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Value>>;

    /// Write (replace) a document
    async fn put(&self, collection: &str, key: &str, doc: Value) -> StoreResult<()>;

    /// Most recent `limit` documents by key, newest first
    async fn recent(&self, collection: &str, limit: usize) -> StoreResult<Vec<(String, Value)>>;

    /// Most recent `limit` documents with keys below `before`, newest first
    ///
    /// `None` starts at the newest document. Passing the last key of one page
    /// as `before` reads the next page. The default reads the whole
    /// collection; stores with ordered keys should override it.
    async fn recent_before(
        &self,
        collection: &str,
        before: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .recent(collection, usize::MAX)
            .await?
            .into_iter()
            .filter(|(key, _)| before.map_or(true, |b| key.as_str() < b))
            .take(limit)
            .collect())
    }

    /// Check whether a document exists
    async fn exists(&self, collection: &str, key: &str) -> StoreResult<bool> {
        Ok(self.get(collection, key).await?.is_some())
    }
}

/// Typed helpers over [`DocumentStore`]
#[async_trait]
pub trait StoreExt: DocumentStore {
    /// Read and deserialize a document
    async fn load<T>(&self, collection: &str, key: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(collection, key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::serde(collection, key, e)),
            None => Ok(None),
        }
    }

    /// Serialize and write a document
    async fn save<T>(&self, collection: &str, key: &str, doc: &T) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(doc).map_err(|e| StoreError::serde(collection, key, e))?;
        self.put(collection, key, value).await
    }

    /// Most recent `limit` documents, deserialized, newest first
    async fn load_recent<T>(&self, collection: &str, limit: usize) -> StoreResult<Vec<(String, T)>>
    where
        T: DeserializeOwned + Send,
    {
        self.recent(collection, limit)
            .await?
            .into_iter()
            .map(|(key, value)| decode(collection, key, value))
            .collect()
    }

    /// One page of documents below `before`, deserialized, newest first
    async fn load_recent_before<T>(
        &self,
        collection: &str,
        before: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, T)>>
    where
        T: DeserializeOwned + Send,
    {
        self.recent_before(collection, before, limit)
            .await?
            .into_iter()
            .map(|(key, value)| decode(collection, key, value))
            .collect()
    }
}

fn decode<T: DeserializeOwned>(collection: &str, key: String, value: Value) -> StoreResult<(String, T)> {
    match serde_json::from_value(value) {
        Ok(doc) => Ok((key, doc)),
        Err(e) => Err(StoreError::serde(collection, key, e)),
    }
}

impl<S: DocumentStore + ?Sized> StoreExt for S {}

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// In-process store
///
/// Readers share a read lock; each write replaces one document under the
/// write lock, so a reader never observes a half-written document. The whole
/// image can be saved to and restored from a JSON snapshot file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a snapshot file; a missing file yields an empty store
    ///
    /// # Errors
    /// `StoreError::Io` on read failure, `StoreError::InvalidSnapshot` on bad JSON.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let image: Collections =
            serde_json::from_str(&text).map_err(|e| StoreError::InvalidSnapshot {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self {
            inner: RwLock::new(image),
        })
    }

    /// Write the whole image to a snapshot file
    ///
    /// The image is written to a sibling temp file first and renamed into place.
    ///
    /// # Errors
    /// `StoreError::Io` on write failure.
    pub fn persist(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let text = {
            let guard = self.inner.read();
            serde_json::to_string_pretty(&*guard).map_err(|e| StoreError::InvalidSnapshot {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, text)
            .and_then(|()| std::fs::rename(&tmp, path))
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Number of documents in a collection
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.inner.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Check if a collection is empty
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .inner
            .read()
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &str, doc: Value) -> StoreResult<()> {
        self.inner
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), doc);
        Ok(())
    }

    async fn recent(&self, collection: &str, limit: usize) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .inner
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .rev()
                    .take(limit)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent_before(
        &self,
        collection: &str,
        before: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>> {
        let inner = self.inner.read();
        let Some(docs) = inner.get(collection) else {
            return Ok(Vec::new());
        };
        let page = match before {
            Some(before) => docs.range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(before))).rev().take(limit),
            None => docs.range::<str, _>(..).rev().take(limit),
        };
        Ok(page.map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}
