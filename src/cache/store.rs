use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Buckets;
use crate::error::CacheStoreError;

/// Persistence for cache buckets across processes.
pub trait CacheStore: Send + Sync {
    fn load(&self) -> Result<Buckets, CacheStoreError>;
    fn save(&self, buckets: &Buckets) -> Result<(), CacheStoreError>;
}

/// All buckets in one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<Buckets, CacheStoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no cache file yet");
            return Ok(Buckets::new());
        }
        let data = fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(Buckets::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, buckets: &Buckets) -> Result<(), CacheStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // write then rename so a crash never leaves a truncated cache
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(buckets)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BucketKey, CacheEntry, SnapshotCache};
    use crate::hash::SnapshotFingerprint;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_cache_survives_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let key = BucketKey::for_step("tap login", 0);

        let mut cache = SnapshotCache::with_store(JsonFileStore::new(&path)).unwrap();
        cache.append(
            key.clone(),
            CacheEntry {
                fingerprint: SnapshotFingerprint::new().with("phash", "abcd"),
                view_hierarchy: "<root/>".into(),
                generated_code: "[]".into(),
            },
        );
        cache.flush().unwrap();
        assert!(path.exists());

        let reloaded = SnapshotCache::with_store(JsonFileStore::new(&path)).unwrap();
        assert_eq!(reloaded.bucket(&key).len(), 1);
        assert_eq!(reloaded.bucket(&key)[0].generated_code, "[]");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CacheStoreError::Serialization(_)));
    }
}
