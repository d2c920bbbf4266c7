// Core snapshot data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A captured UI state: an optional screenshot plus the serialized view hierarchy.
///
/// Snapshots are immutable once captured; the image file is owned by the
/// session that captured it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Path to the screenshot, when the driver could take one
    pub image_path: Option<PathBuf>,

    /// Structural description of on-screen elements
    pub view_hierarchy: String,

    /// Timestamp when the snapshot was captured
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(image_path: Option<PathBuf>, view_hierarchy: impl Into<String>) -> Self {
        Self {
            image_path,
            view_hierarchy: view_hierarchy.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn image(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    /// Short identity used in logs
    pub fn describe(&self) -> String {
        match &self.image_path {
            Some(path) => format!("{} ({} bytes of hierarchy)", path.display(), self.view_hierarchy.len()),
            None => format!("<no image> ({} bytes of hierarchy)", self.view_hierarchy.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_without_image() {
        let snapshot = Snapshot::new(None, "<root/>");
        assert!(snapshot.image().is_none());
        assert!(snapshot.describe().starts_with("<no image>"));
    }

    #[test]
    fn test_snapshot_serializes_timestamp_as_seconds() {
        let snapshot = Snapshot::new(Some(PathBuf::from("/tmp/a.png")), "<root/>");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["timestamp"].is_i64());
        assert_eq!(json["image_path"], "/tmp/a.png");
    }
}
