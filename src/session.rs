//! Per-run working directories.
//!
//! A session owns the directory snapshot images of one autopilot run are
//! written to, plus the final report. It is removed on drop unless kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::autopilot::AutopilotReport;
use crate::config;

const REPORT_FILE: &str = "report.json";
const SNAPSHOT_DIR: &str = "snapshots";

/// Working directory for one run
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub dir: PathBuf,
    /// Keep files after the session is dropped
    pub keep: bool,
}

impl Session {
    /// A session with a unique ID under the configured base directory
    pub fn new() -> Self {
        Self::at(generate_session_id())
    }

    /// A session named after `goal`, e.g. `open_settings_20260101_120000`
    pub fn for_goal(goal: &str) -> Self {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        Self::at(format!("{}_{}", sanitize_name(goal), timestamp))
    }

    /// Use an explicit directory; kept by default
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);
        Self { id, dir, keep: true }
    }

    fn at(id: String) -> Self {
        let dir = PathBuf::from(config::session_base_dir()).join(&id);
        Self { id, dir, keep: false }
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Create the directory tree and write session metadata
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.snapshot_dir())?;
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
        });
        fs::write(self.dir.join(".session.json"), serde_json::to_string_pretty(&metadata)?)?;
        debug!(dir = %self.dir.display(), "session initialized");
        Ok(())
    }

    /// Where drivers should save screenshots
    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_DIR)
    }

    pub fn write_report(&self, report: &AutopilotReport) -> std::io::Result<PathBuf> {
        let path = self.dir.join(REPORT_FILE);
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        Ok(path)
    }

    /// Saved screenshots, oldest first
    pub fn list_snapshots(&self) -> std::io::Result<Vec<PathBuf>> {
        list_matching(&self.snapshot_dir(), |p| p.extension().is_some_and(|e| e == "png"))
    }

    /// Remove the directory unless the session is kept
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            debug!(dir = %self.dir.display(), error = %e, "session cleanup failed");
        }
    }
}

fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("session_{}_{}", timestamp, std::process::id())
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if cleaned.is_empty() { "run".to_string() } else { cleaned }
}

fn list_matching(dir: &Path, keep: impl Fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if keep(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Remove session directories older than `max_age`
pub fn cleanup_old_sessions(max_age: std::time::Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut cleaned = 0;
    for path in list_sessions()? {
        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) && fs::remove_dir_all(&path).is_ok() {
            cleaned += 1;
        }
    }
    Ok(cleaned)
}

/// All session directories under the configured base
pub fn list_sessions() -> std::io::Result<Vec<PathBuf>> {
    list_matching(Path::new(&config::session_base_dir()), Path::is_dir)
}
