//! Scriptable environment for rule and dispatcher tests.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::probe::{CompletionStatus, Environment, FileChange};

pub fn change_at(path: &str, modified: DateTime<Utc>) -> FileChange {
    FileChange {
        path: path.to_string(),
        modified,
        size: 1,
    }
}

#[derive(Debug, Default)]
pub struct FakeEnvironment {
    pub companion_running: bool,
    pub changes: Vec<FileChange>,
    pub repository_init: bool,
    pub new_project: bool,
    pub completion: CompletionStatus,
    calls: AtomicUsize,
}

impl FakeEnvironment {
    /// `count` files, each modified one second apart up to `now`.
    pub fn with_changes(now: DateTime<Utc>, count: usize) -> Self {
        let changes = (0..count)
            .map(|i| change_at(&format!("src/file_{}.rs", i), now - Duration::seconds(i as i64)))
            .collect();
        Self {
            changes,
            ..Self::default()
        }
    }

    /// Number of probe calls made so far.
    pub fn probe_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Environment for FakeEnvironment {
    fn is_companion_running(&self) -> bool {
        self.tick();
        self.companion_running
    }

    fn recent_file_changes(&self, _now: DateTime<Utc>) -> Vec<FileChange> {
        self.tick();
        self.changes.clone()
    }

    fn detect_repository_init(&self, _now: DateTime<Utc>) -> bool {
        self.tick();
        self.repository_init
    }

    fn detect_new_project(&self, _now: DateTime<Utc>) -> bool {
        self.tick();
        self.new_project
    }

    fn completion_status(&self) -> CompletionStatus {
        self.tick();
        self.completion.clone()
    }
}
