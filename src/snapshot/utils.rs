use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use crate::snapshot::types::Snapshot;

/// Generate a timestamp string in YYYYMMDD_HHMMSS_mmm format
pub fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Generate a filename for a step screenshot
pub fn generate_filename(prefix: &str, step: usize, timestamp: &str) -> String {
    format!("{}_{:03}_{}.png", prefix, step, timestamp)
}

/// Write the JSON manifest for a snapshot next to its image (or into `dir`
/// when the snapshot has no image)
pub fn write_manifest(snapshot: &Snapshot, dir: &Path, step: usize) -> std::io::Result<PathBuf> {
    let manifest_path = match &snapshot.image_path {
        Some(path) => path.with_extension("json"),
        None => dir.join(format!("step_{:03}.json", step)),
    };
    let manifest = serde_json::to_string_pretty(snapshot)?;
    fs::write(&manifest_path, manifest)?;
    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_filename() {
        assert_eq!(generate_filename("mock", 3, "20260101_000000_000"), "mock_003_20260101_000000_000.png");
    }

    #[test]
    fn test_write_manifest_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(None, "<root/>");
        let path = write_manifest(&snapshot, dir.path(), 2).unwrap();
        assert!(path.ends_with("step_002.json"));
        let written: Snapshot = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.view_hierarchy, "<root/>");
    }
}
