//! Snapshot-keyed cache of generated code.
//!
//! Entries live in buckets addressed by a [`BucketKey`]. Each bucket is an
//! append-only list in insertion order, and lookup returns the first entry
//! whose fingerprint is similar to the query, so earlier entries win.
//! Nothing is ever evicted here; retention belongs to whoever owns the
//! [`CacheStore`].
//!
//! The cache is not synchronized. Runs that share one must serialize access
//! per bucket themselves (e.g. behind a `tokio::sync::Mutex`).

pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::DEFAULT_SIMILARITY_THRESHOLD;
use crate::error::CacheStoreError;
use crate::hash::SnapshotFingerprint;

pub use store::{CacheStore, JsonFileStore};

/// Stable address of a cache bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a step at a given position of a flow: SHA-256 of both, hex encoded
    pub fn for_step(step: &str, position: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(position.to_le_bytes());
        hasher.update(step.trim().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One memoized step: the screen it ran on and the code that worked there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: SnapshotFingerprint,
    pub view_hierarchy: String,
    pub generated_code: String,
}

pub type Buckets = BTreeMap<BucketKey, Vec<CacheEntry>>;

pub struct SnapshotCache {
    buckets: Buckets,
    threshold: f64,
    store: Option<Box<dyn CacheStore>>,
    dirty: bool,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("buckets", &self.buckets.len())
            .field("entries", &self.entry_count())
            .field("threshold", &self.threshold)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    /// An empty in-memory cache
    pub fn new() -> Self {
        Self {
            buckets: Buckets::new(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            store: None,
            dirty: false,
        }
    }

    /// A cache loaded from, and flushed back to, `store`
    pub fn with_store(store: impl CacheStore + 'static) -> Result<Self, CacheStoreError> {
        let buckets = store.load()?;
        info!(buckets = buckets.len(), "loaded snapshot cache");
        Ok(Self {
            buckets,
            store: Some(Box::new(store)),
            ..Self::new()
        })
    }

    /// Default threshold for lookups that do not pass one
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// First entry in `key`'s bucket similar to `fingerprint`.
    ///
    /// A missing fingerprint or an empty bucket is always a miss.
    pub fn lookup(
        &self,
        key: &BucketKey,
        fingerprint: Option<&SnapshotFingerprint>,
        threshold: Option<f64>,
    ) -> Option<&CacheEntry> {
        let fingerprint = fingerprint?;
        let threshold = threshold.unwrap_or(self.threshold);
        let hit = self
            .buckets
            .get(key)?
            .iter()
            .find(|entry| entry.fingerprint.is_similar_to(fingerprint, Some(threshold)));
        debug!(bucket = %key, hit = hit.is_some(), threshold, "cache lookup");
        hit
    }

    /// Append an entry to the end of `key`'s bucket
    pub fn append(&mut self, key: BucketKey, entry: CacheEntry) {
        debug!(bucket = %key, "cache append");
        self.buckets.entry(key).or_default().push(entry);
        self.dirty = true;
    }

    /// Drop a bucket, returning how many entries it held
    pub fn clear(&mut self, key: &BucketKey) -> usize {
        let removed = self.buckets.remove(key).map(|b| b.len()).unwrap_or(0);
        self.dirty |= removed > 0;
        removed
    }

    pub fn clear_all(&mut self) {
        self.dirty |= !self.buckets.is_empty();
        self.buckets.clear();
    }

    pub fn bucket(&self, key: &BucketKey) -> &[CacheEntry] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &[CacheEntry])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Persist pending changes, if the cache has a store
    pub fn flush(&mut self) -> Result<(), CacheStoreError> {
        if let (true, Some(store)) = (self.dirty, &self.store) {
            store.save(&self.buckets)?;
            self.dirty = false;
            info!(buckets = self.buckets.len(), entries = self.entry_count(), "flushed snapshot cache");
        }
        Ok(())
    }
}
