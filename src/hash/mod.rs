//! Perceptual fingerprints for UI snapshots.
//!
//! A [`SnapshotHasher`] holds a registry of [`HashAlgorithm`]s addressed by
//! name. Hashing a snapshot decodes the image once and runs every registered
//! algorithm on its own blocking task; the results are joined into a
//! [`SnapshotFingerprint`].
//!
//! Hash strings are lowercase hex of a packed bit vector, so two hashes from
//! the same algorithm compare by Hamming distance normalized to `[0, 1]`.

pub mod block;
pub mod dct;
pub mod fingerprint;

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use image::DynamicImage;
use tracing::debug;

use crate::config::DEFAULT_SIMILARITY_THRESHOLD;
use crate::error::HashingError;

pub use block::BlockMeanHash;
pub use dct::DctHash;
pub use fingerprint::SnapshotFingerprint;

/// A named perceptual hash over a decoded image.
pub trait HashAlgorithm: Send + Sync {
    /// Registry key, e.g. `"blockhash"`
    fn name(&self) -> &str;

    /// Hash the image into a lowercase hex bit string. Must be deterministic.
    fn hash_image(&self, image: &DynamicImage) -> String;
}

/// Registry of hash algorithms plus the default similarity threshold.
#[derive(Clone)]
pub struct SnapshotHasher {
    algorithms: Vec<Arc<dyn HashAlgorithm>>,
    threshold: f64,
}

impl std::fmt::Debug for SnapshotHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHasher")
            .field("algorithms", &self.algorithm_names())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Default for SnapshotHasher {
    fn default() -> Self {
        Self::new()
            .register(BlockMeanHash::default())
            .register(DctHash)
    }
}

impl SnapshotHasher {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            algorithms: Vec::new(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Register an algorithm, replacing any previous one with the same name
    pub fn register(mut self, algorithm: impl HashAlgorithm + 'static) -> Self {
        self.algorithms.retain(|a| a.name() != algorithm.name());
        self.algorithms.push(Arc::new(algorithm));
        self
    }

    /// Set the threshold used by [`SnapshotHasher::matches`]
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn default_threshold(&self) -> f64 {
        self.threshold
    }

    pub fn algorithm_names(&self) -> Vec<String> {
        self.algorithms.iter().map(|a| a.name().to_string()).collect()
    }

    /// Fingerprint an image file, running all algorithms concurrently.
    pub async fn hash(&self, path: &Path) -> Result<SnapshotFingerprint, HashingError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| HashingError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let decode_path = path.to_path_buf();
        let image = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map_err(|e| HashingError::Corrupt {
                path: decode_path,
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| HashingError::Task {
            algorithm: "decode".to_string(),
            message: e.to_string(),
        })??;

        let image = Arc::new(image);
        let tasks = self.algorithms.iter().map(|algorithm| {
            let algorithm = Arc::clone(algorithm);
            let image = Arc::clone(&image);
            async move {
                let name = algorithm.name().to_string();
                tokio::task::spawn_blocking(move || algorithm.hash_image(&image))
                    .await
                    .map(|hash| (name.clone(), hash))
                    .map_err(|e| HashingError::Task {
                        algorithm: name,
                        message: e.to_string(),
                    })
            }
        });

        let mut fingerprint = SnapshotFingerprint::default();
        for result in join_all(tasks).await {
            let (name, hash) = result?;
            fingerprint.insert(name, hash);
        }
        debug!(path = %path.display(), algorithms = fingerprint.len(), "hashed snapshot");
        Ok(fingerprint)
    }

    /// Fingerprint an already decoded image on the current thread
    pub fn hash_image(&self, image: &DynamicImage) -> SnapshotFingerprint {
        let mut fingerprint = SnapshotFingerprint::default();
        for algorithm in &self.algorithms {
            fingerprint.insert(algorithm.name().to_string(), algorithm.hash_image(image));
        }
        fingerprint
    }

    /// Compare two fingerprints under this hasher's threshold
    pub fn matches(&self, a: &SnapshotFingerprint, b: &SnapshotFingerprint) -> bool {
        a.is_similar_to(b, Some(self.threshold))
    }
}

/// Number of differing bits between two hex hash strings.
///
/// Strings that are not valid hex, or differ in length, are compared
/// bit-for-bit over the overlap with every extra bit counted as different.
pub fn distance(a: &str, b: &str) -> u32 {
    match (hex::decode(a), hex::decode(b)) {
        (Ok(left), Ok(right)) => {
            let overlap: u32 = left
                .iter()
                .zip(right.iter())
                .map(|(x, y)| (x ^ y).count_ones())
                .sum();
            let extra = left.len().abs_diff(right.len()) as u32 * 8;
            overlap + extra
        }
        _ if a == b => 0,
        _ => bit_len(a).max(bit_len(b)),
    }
}

/// [`distance`] divided by the bit length of the longer hash, in `[0, 1]`
pub fn normalized_distance(a: &str, b: &str) -> f64 {
    let bits = bit_len(a).max(bit_len(b));
    if bits == 0 {
        return 0.0;
    }
    (f64::from(distance(a, b)) / f64::from(bits)).clamp(0.0, 1.0)
}

/// True when the normalized distance does not exceed the threshold.
///
/// A threshold of zero only accepts byte-identical strings.
pub fn are_similar(a: &str, b: &str, threshold: Option<f64>) -> bool {
    if a == b {
        return true;
    }
    let threshold = threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
    threshold > 0.0 && normalized_distance(a, b) <= threshold
}

fn bit_len(hash: &str) -> u32 {
    (hash.len() as u32) * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MockFramebuffer;

    #[test]
    fn test_distance_counts_bits() {
        assert_eq!(distance("00", "00"), 0);
        assert_eq!(distance("00", "01"), 1);
        assert_eq!(distance("ff", "00"), 8);
        assert_eq!(distance("ff", "ff00"), 8);
    }

    #[test]
    fn test_distance_invalid_hex_is_maximal() {
        assert_eq!(distance("zz", "00"), 8);
        assert_eq!(distance("zz", "zz"), 0);
    }

    #[test]
    fn test_similarity_threshold_zero_requires_identity() {
        assert!(are_similar("abcd", "abcd", Some(0.0)));
        assert!(!are_similar("abcd", "abce", Some(0.0)));
    }

    #[test]
    fn test_threshold_zero_is_case_sensitive() {
        assert_eq!(distance("ABCD", "abcd"), 0);
        assert!(!are_similar("ABCD", "abcd", Some(0.0)));
        assert!(are_similar("ABCD", "abcd", Some(0.01)));
    }

    #[test]
    fn test_similarity_is_monotonic_in_threshold() {
        let (a, b) = ("ff00ff00", "ff00fff0");
        let mut previous = false;
        for step in 0..=20 {
            let threshold = f64::from(step) / 20.0;
            let similar = are_similar(a, b, Some(threshold));
            assert!(similar || !previous, "flipped back to dissimilar at {}", threshold);
            previous = similar;
        }
        assert!(previous);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let hasher = SnapshotHasher::new()
            .register(BlockMeanHash::new(8))
            .register(BlockMeanHash::new(16));
        assert_eq!(hasher.algorithm_names(), vec!["blockhash".to_string()]);

        let image = DynamicImage::ImageRgb8(MockFramebuffer::with_color(32, 32, [9, 9, 9]).to_image());
        assert_eq!(hasher.hash_image(&image).get("blockhash").map(str::len), Some(64));
    }

    #[test]
    fn test_hash_image_is_deterministic() {
        let mut fb = MockFramebuffer::with_color(64, 64, [40, 40, 40]);
        fb.draw_rect(8, 8, 24, 16, [220, 220, 220]);
        let image = DynamicImage::ImageRgb8(fb.to_image());

        let hasher = SnapshotHasher::default();
        let first = hasher.hash_image(&image);
        let second = hasher.hash_image(&image);
        assert_eq!(first, second);
        assert!(first.is_similar_to(&second, Some(0.0)));
    }
}
