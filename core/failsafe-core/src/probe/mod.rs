//! Read-only environment queries: processes, files, project markers.
//!
//! Every probe degrades to "no evidence found" on any filesystem or process
//! table fault; none of them return errors.
//!
//! The detection engine talks to the environment only through the
//! [`Environment`] trait, so rules can be exercised against a fake.

pub mod files;
pub mod process;
pub mod project;
pub mod tasks;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::StoragePaths;

pub use files::{recent_change_window, scan_recent_changes, IgnoreList};
pub use tasks::{scan_completion_status, TaskState};

/// A recently modified file. Recomputed on every evaluation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedTask {
    pub path: String,
    pub name: String,
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTask {
    pub path: String,
    pub name: String,
    pub state: TaskState,
}

/// Aggregate of all task markers found under the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionStatus {
    pub is_completed: bool,
    pub completed_tasks: Vec<CompletedTask>,
    pub active_tasks: Vec<ActiveTask>,
}

/// Observations the detection rules depend on.
pub trait Environment: Send + Sync {
    fn is_companion_running(&self) -> bool;

    fn recent_file_changes(&self, now: DateTime<Utc>) -> Vec<FileChange>;

    fn detect_repository_init(&self, now: DateTime<Utc>) -> bool;

    fn detect_new_project(&self, now: DateTime<Utc>) -> bool;

    fn completion_status(&self) -> CompletionStatus;
}

/// The real filesystem and process table.
#[derive(Debug, Clone)]
pub struct LocalEnvironment {
    paths: StoragePaths,
    ignore: IgnoreList,
    companion_marker: String,
}

impl LocalEnvironment {
    pub fn new(paths: StoragePaths, companion_marker: impl Into<String>) -> Self {
        Self {
            paths,
            ignore: IgnoreList::default(),
            companion_marker: companion_marker.into(),
        }
    }

    pub fn with_ignore(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }
}

impl Environment for LocalEnvironment {
    fn is_companion_running(&self) -> bool {
        process::is_process_running(&self.companion_marker)
    }

    fn recent_file_changes(&self, now: DateTime<Utc>) -> Vec<FileChange> {
        scan_recent_changes(
            self.paths.root(),
            &self.paths.monitored_roots(),
            &self.ignore,
            now,
            recent_change_window(),
        )
    }

    fn detect_repository_init(&self, now: DateTime<Utc>) -> bool {
        project::detect_repository_init(&self.paths.vcs_dir(), now)
    }

    fn detect_new_project(&self, now: DateTime<Utc>) -> bool {
        project::detect_new_project(self.paths.root(), now)
    }

    fn completion_status(&self) -> CompletionStatus {
        scan_completion_status(self.paths.root())
    }
}
