//! New-project and repository-initialization heuristics.

use chrono::{DateTime, Duration, Utc};
use std::fs::Metadata;
use std::path::Path;

/// Manifest and readme files whose recent creation suggests a new project.
pub const PROJECT_INDICATORS: &[&str] = &[
    "package.json",
    "requirements.txt",
    "Cargo.toml",
    "pom.xml",
    "README.md",
];

/// How many indicators must be recent for a directory to count as new.
pub const NEW_PROJECT_MIN_INDICATORS: usize = 2;

pub fn repository_init_window() -> Duration {
    Duration::hours(1)
}

pub fn new_project_window() -> Duration {
    Duration::hours(24)
}

/// Birth time when the filesystem records one, modification time otherwise.
pub fn created_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn created_within(path: &Path, now: DateTime<Utc>, window: Duration) -> bool {
    std::fs::metadata(path)
        .ok()
        .as_ref()
        .and_then(created_at)
        .map(|created| now.signed_duration_since(created) < window)
        .unwrap_or(false)
}

/// True when the VCS metadata directory exists and was created within the hour.
pub fn detect_repository_init(vcs_dir: &Path, now: DateTime<Utc>) -> bool {
    vcs_dir.is_dir() && created_within(vcs_dir, now, repository_init_window())
}

/// True when enough project indicator files were created within a day.
pub fn detect_new_project(root: &Path, now: DateTime<Utc>) -> bool {
    let recent = PROJECT_INDICATORS
        .iter()
        .map(|name| root.join(name))
        .filter(|path| path.is_file() && created_within(path, now, new_project_window()))
        .count();
    recent >= NEW_PROJECT_MIN_INDICATORS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn fresh_repository_is_detected() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let git = temp_dir.path().join(".git");
        fs::create_dir(&git).expect("mkdir");

        assert!(detect_repository_init(&git, Utc::now()));
    }

    #[test]
    fn repository_outside_window_is_ignored() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let git = temp_dir.path().join(".git");
        fs::create_dir(&git).expect("mkdir");

        assert!(!detect_repository_init(&git, Utc::now() + Duration::hours(2)));
    }

    #[test]
    fn missing_repository_is_not_detected() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        assert!(!detect_repository_init(&temp_dir.path().join(".git"), Utc::now()));
    }

    #[test]
    fn two_fresh_indicators_mean_new_project() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        fs::write(temp_dir.path().join("Cargo.toml"), "").expect("write");
        fs::write(temp_dir.path().join("README.md"), "").expect("write");

        assert!(detect_new_project(temp_dir.path(), Utc::now()));
        assert!(!detect_new_project(temp_dir.path(), Utc::now() + Duration::hours(25)));
    }

    #[test]
    fn single_indicator_is_not_enough() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        fs::write(temp_dir.path().join("package.json"), "{}").expect("write");

        assert!(!detect_new_project(temp_dir.path(), Utc::now()));
    }
}
