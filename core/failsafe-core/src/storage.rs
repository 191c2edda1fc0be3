//! Path management for a watched project root.
//!
//! Every file the watchdog reads or writes is derived from a single root
//! directory, so tests can point a `StoragePaths` at a temp dir and get full
//! isolation from the real project tree.

use fs_err as fs;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{FailsafeError, Result};

const CONFIG_DIR: &str = "config";
const LOGS_DIR: &str = "logs";
const CONFIG_FILE: &str = "emad-failsafe-config.json";
const STATE_FILE: &str = "emad-failsafe-state.json";

/// Subdirectories scanned for recent modifications, in scan order.
/// The root itself is scanned last.
const MONITORED_SUBDIRS: &[&str] = &["src", "bmad-agent", "docs"];

/// Central path resolution for one watched project.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The watched project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    /// Path to the failsafe configuration document.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    /// Path to the persisted activation log and initialization stamp.
    pub fn state_file(&self) -> PathBuf {
        self.config_dir().join(STATE_FILE)
    }

    /// Directory holding the per-day log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Probe Targets
    // ─────────────────────────────────────────────────────────────────────────────

    /// Directories walked when looking for recent file changes.
    pub fn monitored_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = MONITORED_SUBDIRS
            .iter()
            .map(|dir| self.root.join(dir))
            .collect();
        roots.push(self.root.clone());
        roots
    }

    /// Version-control metadata directory.
    pub fn vcs_dir(&self) -> PathBuf {
        self.root.join(".git")
    }

    /// Resolves a companion script name relative to the root.
    pub fn script(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Serializes `value` as pretty JSON and atomically replaces `path`.
///
/// Writes to a sibling `.tmp` file first and renames it into place, creating
/// the parent directory when missing.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| FailsafeError::io("Failed to create storage directory", err))?;
    }

    let payload = serde_json::to_vec_pretty(value)
        .map_err(|err| FailsafeError::json("Failed to serialize document", err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload)
        .map_err(|err| FailsafeError::io("Failed to write document", err))?;
    fs::rename(&tmp_path, path)
        .map_err(|err| FailsafeError::io("Failed to commit document", err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_files_live_under_config_dir() {
        let paths = StoragePaths::new("/project");
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/project/config/emad-failsafe-config.json")
        );
        assert_eq!(
            paths.state_file(),
            PathBuf::from("/project/config/emad-failsafe-state.json")
        );
    }

    #[test]
    fn monitored_roots_end_with_project_root() {
        let paths = StoragePaths::new("/project");
        let roots = paths.monitored_roots();
        assert_eq!(roots.len(), 4);
        assert_eq!(roots.last(), Some(&PathBuf::from("/project")));
    }

    #[test]
    fn write_json_atomic_creates_parent_and_leaves_no_tmp() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("nested").join("doc.json");

        write_json_atomic(&path, &serde_json::json!({ "ok": true })).expect("write");

        let content = std::fs::read_to_string(&path).expect("read back");
        assert!(content.contains("\"ok\": true"));
        assert!(!path.with_extension("tmp").exists());
    }
}
