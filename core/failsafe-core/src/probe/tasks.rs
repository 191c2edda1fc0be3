//! Task-marker discovery and completion classification.
//!
//! Task markers are JSON documents produced by other tools, named
//! `task*.json` or `bmad-task*.json`, anywhere under the project root:
//!
//! ```json
//! { "name": "Ship login flow", "state": "COMPLETE", "completed_at": "2026-01-01T10:00:00" }
//! ```
//!
//! Markers that fail to read or parse, or whose `state` is unknown, are
//! skipped.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use walkdir::WalkDir;

use super::{ActiveTask, CompletedTask, CompletionStatus};

const MARKER_PREFIXES: &[&str] = &["task", "bmad-task"];
const MARKER_SUFFIX: &str = ".json";

/// Directories never worth descending into when looking for markers.
const PRUNED_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Complete,
    InProgress,
    NotStarted,
}

#[derive(Debug, Deserialize)]
struct TaskMarker {
    state: TaskState,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    completed_at: Option<String>,
}

pub fn is_task_marker(file_name: &str) -> bool {
    file_name.ends_with(MARKER_SUFFIX)
        && MARKER_PREFIXES
            .iter()
            .any(|prefix| file_name.starts_with(prefix))
}

/// Parses a marker timestamp: RFC 3339, or naive ISO-8601 in local time.
pub fn parse_marker_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Scans `root` for task markers and aggregates their completion state.
pub fn scan_completion_status(root: &Path) -> CompletionStatus {
    let mut status = CompletionStatus::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !PRUNED_DIRS
                    .iter()
                    .any(|dir| entry.file_name() == std::ffi::OsStr::new(dir))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_task_marker(file_name) {
            continue;
        }

        let Some(marker) = read_marker(entry.path()) else {
            continue;
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let name = marker.name.unwrap_or_else(|| "Unknown".to_string());

        match marker.state {
            TaskState::Complete => {
                status.is_completed = true;
                status.completed_tasks.push(CompletedTask {
                    path: relative,
                    name,
                    completion_time: marker.completed_at.as_deref().and_then(parse_marker_time),
                });
            }
            state => status.active_tasks.push(ActiveTask {
                path: relative,
                name,
                state,
            }),
        }
    }

    status
}

fn read_marker(path: &Path) -> Option<TaskMarker> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::debug!(error = %err, path = %path.display(), "Skipping unreadable task marker");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(marker) => Some(marker),
        Err(err) => {
            tracing::debug!(error = %err, path = %path.display(), "Skipping malformed task marker");
            None
        }
    }
}
