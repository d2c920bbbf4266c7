//! Integration tests for snapshot fingerprinting

use std::path::{Path, PathBuf};

use ui_autopilot::error::HashingError;
use ui_autopilot::hash::{SnapshotHasher, normalized_distance};
use ui_autopilot::snapshot::MockFramebuffer;

/// 4x4 grid of distinct gray levels on a 256x256 canvas
fn grid_screen() -> MockFramebuffer {
    let mut fb = MockFramebuffer::new(256, 256);
    for row in 0..4u32 {
        for col in 0..4u32 {
            let level = (((row * 4 + col) * 7) % 16 * 15 + 10) as u8;
            fb.draw_rect(col * 64, row * 64, 64, 64, [level, level, level]);
        }
    }
    fb
}

fn save(fb: &MockFramebuffer, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fb.save_png(&path).expect("Failed to save PNG");
    path
}

#[tokio::test]
async fn test_same_image_hashes_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = save(&grid_screen(), dir.path(), "a.png");

    let hasher = SnapshotHasher::default();
    let first = hasher.hash(&path).await.unwrap();
    let second = hasher.hash(&path).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    for threshold in [0.0, 0.1, 1.0] {
        assert!(first.is_similar_to(&second, Some(threshold)));
    }
}

#[tokio::test]
async fn test_near_identical_images_are_similar() {
    let dir = tempfile::tempdir().unwrap();
    let original = grid_screen();
    let mut touched = original.clone();
    for (x, y) in [(5, 5), (100, 37), (200, 220)] {
        let [r, g, b] = touched.get_pixel(x, y);
        touched.set_pixel(x, y, [r.saturating_add(20), g.saturating_add(20), b.saturating_add(20)]);
    }
    assert_ne!(original, touched);

    let hasher = SnapshotHasher::default();
    let a = hasher.hash(&save(&original, dir.path(), "a.png")).await.unwrap();
    let b = hasher.hash(&save(&touched, dir.path(), "b.png")).await.unwrap();

    assert!(a.is_similar_to(&b, None), "{:?} vs {:?}", a, b);
    assert!(hasher.matches(&a, &b));
}

#[tokio::test]
async fn test_solid_and_checkerboard_are_different() {
    let dir = tempfile::tempdir().unwrap();
    let solid = MockFramebuffer::with_color(256, 256, [128, 128, 128]);
    let checker = MockFramebuffer::checkerboard(256, 256, 32, [0, 0, 0], [255, 255, 255]);

    let hasher = SnapshotHasher::default();
    let a = hasher.hash(&save(&solid, dir.path(), "solid.png")).await.unwrap();
    let b = hasher.hash(&save(&checker, dir.path(), "checker.png")).await.unwrap();

    let block_distance = normalized_distance(a.get("blockhash").unwrap(), b.get("blockhash").unwrap());
    assert_eq!(block_distance, 0.5);
    assert!(!a.is_similar_to(&b, None));
}

#[tokio::test]
async fn test_missing_file_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let err = SnapshotHasher::default()
        .hash(&dir.path().join("nope.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, HashingError::Unreadable { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"\x89PNG not really").unwrap();
    let err = SnapshotHasher::default().hash(&path).await.unwrap_err();
    assert!(matches!(err, HashingError::Corrupt { .. }), "{:?}", err);
}
