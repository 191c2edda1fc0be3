//! Recent file modification scanning.
//!
//! Pure over its inputs: the caller supplies the roots, the ignore list and
//! the current time, so tests can drive it against a temp directory.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::FileChange;

/// Trailing window in which a modification counts as recent.
pub fn recent_change_window() -> Duration {
    Duration::minutes(30)
}

/// Case-insensitive path-substring ignore list.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    patterns: Vec<String>,
}

/// VCS metadata, dependency caches, IDE dirs, log/config dirs, transient suffixes.
const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".vscode",
    ".idea",
    "logs",
    "config",
    "target",
    ".log",
    ".tmp",
    ".temp",
    ".pyc",
    ".swp",
];

impl Default for IgnoreList {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_PATTERNS.iter().copied())
    }
}

impl IgnoreList {
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let lowered = path.to_string_lossy().to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
    }
}

/// Collects files under `roots` modified within the trailing window.
///
/// Paths are matched against `ignore` relative to `project_root`, so the
/// location of the project itself never causes everything to be ignored.
/// Missing roots are skipped; a file reachable from several roots is
/// reported once; unreadable entries are skipped silently.
pub fn scan_recent_changes(
    project_root: &Path,
    roots: &[PathBuf],
    ignore: &IgnoreList,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<FileChange> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut changes = Vec::new();

    for root in roots {
        if !root.is_dir() {
            continue;
        }

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !ignore.is_ignored(relative_to(project_root, entry.path()))
            });

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_to(project_root, entry.path()).to_path_buf();
            if ignore.is_ignored(&relative) || seen.contains(&relative) {
                continue;
            }

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let modified = DateTime::<Utc>::from(modified);

            if now.signed_duration_since(modified) < window {
                seen.insert(relative.clone());
                changes.push(FileChange {
                    path: relative.to_string_lossy().replace('\\', "/"),
                    modified,
                    size: metadata.len(),
                });
            }
        }
    }

    changes
}

fn relative_to<'a>(base: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration as StdDuration, SystemTime};

    fn touch(path: &Path, age: StdDuration) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, b"x").expect("write");
        let file = File::options().write(true).open(path).expect("open");
        file.set_modified(SystemTime::now() - age).expect("set mtime");
    }

    fn scan(root: &Path) -> Vec<FileChange> {
        let roots = vec![root.join("src"), root.join("docs"), root.to_path_buf()];
        scan_recent_changes(
            root,
            &roots,
            &IgnoreList::default(),
            Utc::now(),
            recent_change_window(),
        )
    }

    fn paths(changes: &[FileChange]) -> Vec<String> {
        let mut paths: Vec<_> = changes.iter().map(|c| c.path.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn collects_recent_files_once() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        touch(&root.join("src/main.rs"), StdDuration::from_secs(60));
        touch(&root.join("README.md"), StdDuration::from_secs(5));

        let changes = scan(root);

        assert_eq!(paths(&changes), vec!["README.md", "src/main.rs"]);
        assert_eq!(changes.iter().find(|c| c.path == "README.md").map(|c| c.size), Some(1));
    }

    #[test]
    fn excludes_files_outside_window() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        touch(&root.join("old.txt"), StdDuration::from_secs(31 * 60));
        touch(&root.join("new.txt"), StdDuration::from_secs(29 * 60));

        assert_eq!(paths(&scan(root)), vec!["new.txt"]);
    }

    #[test]
    fn vcs_metadata_is_never_reported() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        touch(&root.join(".git/index"), StdDuration::ZERO);
        touch(&root.join(".git/objects/ab/cdef"), StdDuration::ZERO);
        touch(&root.join("src/.git/HEAD"), StdDuration::ZERO);

        assert!(scan(root).is_empty());
    }

    #[test]
    fn ignore_list_covers_caches_logs_and_suffixes() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        for file in [
            "node_modules/pkg/index.js",
            "__pycache__/mod.pyc",
            "logs/today.txt",
            "config/settings.json",
            "src/build.LOG",
            "scratch.tmp",
            ".vscode/settings.json",
        ] {
            touch(&root.join(file), StdDuration::ZERO);
        }
        touch(&root.join("src/lib.rs"), StdDuration::ZERO);

        assert_eq!(paths(&scan(root)), vec!["src/lib.rs"]);
    }

    #[test]
    fn project_location_does_not_trigger_ignore() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path().join("my-config-project");
        touch(&root.join("notes.md"), StdDuration::ZERO);

        assert_eq!(paths(&scan(&root)), vec!["notes.md"]);
    }

    #[test]
    fn missing_roots_are_skipped() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path().join("does-not-exist");

        assert!(scan(&root).is_empty());
    }

    #[test]
    fn ignore_list_is_case_insensitive() {
        let ignore = IgnoreList::new(["Node_Modules"]);
        assert!(ignore.is_ignored(Path::new("web/NODE_MODULES/x.js")));
        assert!(!ignore.is_ignored(Path::new("web/src/x.js")));
    }
}
