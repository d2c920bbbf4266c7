use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::are_similar;

/// Hashes of one snapshot keyed by algorithm name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotFingerprint(BTreeMap<String, String>);

impl SnapshotFingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, algorithm: impl Into<String>, hash: impl Into<String>) {
        self.0.insert(algorithm.into(), hash.into());
    }

    pub fn with(mut self, algorithm: impl Into<String>, hash: impl Into<String>) -> Self {
        self.insert(algorithm, hash);
        self
    }

    pub fn get(&self, algorithm: &str) -> Option<&str> {
        self.0.get(algorithm).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Unanimous multi-algorithm comparison.
    ///
    /// Every algorithm must be present on both sides and agree that the
    /// hashes are similar. An algorithm present on only one side counts as a
    /// mismatch, and two fingerprints with no algorithms never match.
    pub fn is_similar_to(&self, other: &SnapshotFingerprint, threshold: Option<f64>) -> bool {
        if self.is_empty() || self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|(algorithm, hash)| {
            other
                .0
                .get(algorithm)
                .is_some_and(|theirs| are_similar(hash, theirs, threshold))
        })
    }
}

impl FromIterator<(String, String)> for SnapshotFingerprint {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_algorithms_must_agree() {
        let a = SnapshotFingerprint::new().with("blockhash", "ffff").with("phash", "0000");
        let b = SnapshotFingerprint::new().with("blockhash", "ffff").with("phash", "ffff");
        assert!(!a.is_similar_to(&b, Some(0.5)));
        assert!(a.is_similar_to(&a.clone(), Some(0.0)));
    }

    #[test]
    fn test_missing_algorithm_is_a_mismatch() {
        let full = SnapshotFingerprint::new().with("blockhash", "ffff").with("phash", "0000");
        let partial = SnapshotFingerprint::new().with("blockhash", "ffff");
        assert!(!full.is_similar_to(&partial, Some(1.0)));
        assert!(!partial.is_similar_to(&full, Some(1.0)));
    }

    #[test]
    fn test_empty_fingerprints_never_match() {
        assert!(!SnapshotFingerprint::new().is_similar_to(&SnapshotFingerprint::new(), Some(1.0)));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let fp = SnapshotFingerprint::new().with("phash", "abcd");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, r#"{"phash":"abcd"}"#);
    }
}
