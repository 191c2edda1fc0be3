//! Persistent watchdog state: the activation log and initialization stamp.
//!
//! # File Format
//!
//! ```json
//! {
//!   "last_initialization": "2026-01-01T10:00:00Z",
//!   "last_completion_check": null,
//!   "activation_log": [
//!     {
//!       "timestamp": "2026-01-01T10:05:00Z",
//!       "rule": "uninitialized_detection",
//!       "reasons": ["..."],
//!       "counts": { "changes_count": 5 },
//!       "actions_taken": ["notification_shown"]
//!     }
//!   ]
//! }
//! ```
//!
//! The whole document is rewritten on every change. The log is append-only:
//! entries are never edited or removed by normal operation.
//!
//! # Defensive Design
//!
//! - Missing file → empty state
//! - Empty or corrupt file → empty state, logged
//! - Unknown top-level keys are carried through rewrites
//!
//! # Legacy Files
//!
//! Files written by the earlier watchdog used `last_emad_initialization`,
//! `failsafe_activations`, a `failsafe` key for the rule, counts as top-level
//! entry fields, and naive local timestamps. They load as-is and are
//! rewritten in the current format on the next save.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::RuleId;
use crate::error::{FailsafeError, Result};
use crate::probe::tasks::parse_marker_time;
use crate::storage::write_json_atomic;

/// Something the dispatcher did in response to a rule firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    NotificationShown,
    InitializationPrompted,
    CompanionStarted,
    CompanionStartFailed,
    CompanionTestRun,
    CompanionStatusShown,
    RuleDisabled,
    AlertShown,
    StatusClarificationPrompted,
    ProjectReopened,
    FeatureBranchSuggested,
    CompletionOverrideConfirmed,
    ContinuedWithoutAction,
    PromptCancelled,
}

impl fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionTaken::NotificationShown => "notification_shown",
            ActionTaken::InitializationPrompted => "initialization_prompted",
            ActionTaken::CompanionStarted => "companion_started",
            ActionTaken::CompanionStartFailed => "companion_start_failed",
            ActionTaken::CompanionTestRun => "companion_test_run",
            ActionTaken::CompanionStatusShown => "companion_status_shown",
            ActionTaken::RuleDisabled => "rule_disabled",
            ActionTaken::AlertShown => "alert_shown",
            ActionTaken::StatusClarificationPrompted => "status_clarification_prompted",
            ActionTaken::ProjectReopened => "project_reopened",
            ActionTaken::FeatureBranchSuggested => "feature_branch_suggested",
            ActionTaken::CompletionOverrideConfirmed => "completion_override_confirmed",
            ActionTaken::ContinuedWithoutAction => "continued_without_action",
            ActionTaken::PromptCancelled => "prompt_cancelled",
        };
        f.write_str(name)
    }
}

/// One persisted record of a rule firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredActivation")]
pub struct Activation {
    pub timestamp: DateTime<Utc>,
    pub rule: RuleId,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub actions_taken: Vec<ActionTaken>,
}

impl Activation {
    pub fn new(rule: RuleId, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            rule,
            reasons: Vec::new(),
            counts: BTreeMap::new(),
            actions_taken: Vec::new(),
        }
    }

    pub fn with_count(mut self, name: &str, value: usize) -> Self {
        self.counts.insert(name.to_string(), value);
        self
    }

    pub fn record(&mut self, action: ActionTaken) {
        self.actions_taken.push(action);
    }
}

/// On-disk shape of an activation, accepting the legacy layout too.
#[derive(Deserialize)]
struct StoredActivation {
    timestamp: String,
    #[serde(alias = "failsafe")]
    rule: RuleId,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    counts: BTreeMap<String, usize>,
    #[serde(default)]
    actions_taken: Vec<ActionTaken>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl TryFrom<StoredActivation> for Activation {
    type Error = String;

    fn try_from(stored: StoredActivation) -> std::result::Result<Self, Self::Error> {
        let timestamp = parse_marker_time(&stored.timestamp)
            .ok_or_else(|| format!("invalid activation timestamp {:?}", stored.timestamp))?;
        let mut counts = stored.counts;
        for (name, value) in stored.extra {
            if let Some(n) = value.as_u64() {
                counts.entry(name).or_insert(n as usize);
            }
        }
        Ok(Activation {
            timestamp,
            rule: stored.rule,
            reasons: stored.reasons,
            counts,
            actions_taken: stored.actions_taken,
        })
    }
}

/// Accepts RFC 3339 or naive local timestamps; anything else reads as unset.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_marker_time))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailsafeState {
    #[serde(
        default,
        alias = "last_emad_initialization",
        deserialize_with = "lenient_timestamp"
    )]
    pub last_initialization: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_completion_check: Option<DateTime<Utc>>,
    #[serde(default, rename = "activation_log", alias = "failsafe_activations")]
    pub activations: Vec<Activation>,
    /// Keys written by other tools or older versions.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Owns the state and mirrors it to disk after each mutation.
///
/// Create with [`StateStore::load`] to read from the state file, or
/// [`StateStore::new_in_memory`] when persistence is disabled.
#[derive(Debug, Clone)]
pub struct StateStore {
    state: FailsafeState,
    file_path: Option<PathBuf>,
}

impl StateStore {
    pub fn new_in_memory() -> Self {
        Self {
            state: FailsafeState::default(),
            file_path: None,
        }
    }

    /// Reads the state file. Never fails: faults yield an empty state.
    pub fn load(file_path: &Path) -> Self {
        let state = match read_state(file_path) {
            Ok(state) => state,
            Err(err) => {
                tracing::error!(error = %err, path = %file_path.display(), "Failed to load state; starting empty");
                FailsafeState::default()
            }
        };
        Self {
            state,
            file_path: Some(file_path.to_path_buf()),
        }
    }

    pub fn state(&self) -> &FailsafeState {
        &self.state
    }

    pub fn activations(&self) -> &[Activation] {
        &self.state.activations
    }

    /// Rewrites the full state document. No-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        match &self.file_path {
            Some(path) => write_json_atomic(path, &self.state),
            None => Ok(()),
        }
    }

    /// Appends to the activation log and persists.
    pub fn record_activation(&mut self, activation: Activation) -> Result<()> {
        tracing::debug!(
            rule = %activation.rule,
            actions = activation.actions_taken.len(),
            "Recording activation"
        );
        self.state.activations.push(activation);
        self.save()
    }

    /// Stamps a companion initialization and persists.
    pub fn mark_initialized(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.state.last_initialization = Some(at);
        self.save()
    }

    /// Stamps a completion check and persists.
    pub fn mark_completion_check(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.state.last_completion_check = Some(at);
        self.save()
    }
}

fn read_state(path: &Path) -> Result<FailsafeState> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FailsafeState::default())
        }
        Err(err) => return Err(FailsafeError::io("Failed to read state", err)),
    };

    if content.trim().is_empty() {
        tracing::warn!(path = %path.display(), "Empty state file, starting empty");
        return Ok(FailsafeState::default());
    }

    serde_json::from_str(&content).map_err(|err| FailsafeError::json("Failed to parse state", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn missing_file_is_empty_state() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = StateStore::load(&temp_dir.path().join("state.json"));

        assert_eq!(store.state(), &FailsafeState::default());
        assert!(store.state().last_initialization.is_none());
    }

    #[test]
    fn corrupt_file_is_empty_state() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "[1, 2").expect("write");

        let store = StateStore::load(&path);
        assert!(store.activations().is_empty());
    }

    #[test]
    fn activations_append_in_order_and_survive_reload() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config").join("state.json");
        let mut store = StateStore::load(&path);

        for minute in 0..3 {
            let mut activation = Activation::new(RuleId::UninitializedDetection, at(minute))
                .with_count("changes_count", minute as usize);
            activation.record(ActionTaken::NotificationShown);
            store.record_activation(activation).expect("record");
        }

        let reloaded = StateStore::load(&path);
        let timestamps: Vec<_> = reloaded.activations().iter().map(|a| a.timestamp).collect();
        assert_eq!(timestamps, vec![at(0), at(1), at(2)]);
        assert_eq!(reloaded.activations()[2].counts["changes_count"], 2);
        assert_eq!(
            reloaded.activations()[0].actions_taken,
            vec![ActionTaken::NotificationShown]
        );
    }

    #[test]
    fn load_twice_is_idempotent() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        let mut store = StateStore::load(&path);
        store.mark_initialized(at(5)).expect("mark");

        assert_eq!(StateStore::load(&path).state(), StateStore::load(&path).state());
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"activation_log": [], "file_change_history": [1, 2]}"#,
        )
        .expect("write");

        let mut store = StateStore::load(&path);
        store.mark_initialized(at(1)).expect("mark");

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["file_change_history"], serde_json::json!([1, 2]));
        assert!(raw["last_initialization"].is_string());
    }

    #[test]
    fn in_memory_store_never_touches_disk() {
        let mut store = StateStore::new_in_memory();
        store
            .record_activation(Activation::new(RuleId::PostCompletionDetection, at(0)))
            .expect("record");
        assert_eq!(store.activations().len(), 1);
    }

    #[test]
    fn completion_check_is_written_through() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        let mut store = StateStore::load(&path);

        store.mark_completion_check(at(7)).expect("mark");

        assert_eq!(StateStore::load(&path).state().last_completion_check, Some(at(7)));
    }

    #[test]
    fn legacy_state_file_keeps_stamp_and_history() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{
                "last_emad_initialization": "2026-03-01T12:00:00",
                "last_completion_check": null,
                "project_completion_status": {},
                "failsafe_activations": [
                    {
                        "timestamp": "2026-03-01T12:05:00.123456",
                        "failsafe": "uninitialized_detection",
                        "reasons": ["File modifications detected without active companion session"],
                        "changes_count": 4,
                        "actions_taken": ["notification_shown", "initialization_prompted"]
                    },
                    {
                        "timestamp": "2026-03-01T13:00:00",
                        "failsafe": "post_completion_detection",
                        "completed_tasks": 1,
                        "post_completion_changes": 6,
                        "actions_taken": ["alert_shown"]
                    }
                ],
                "file_change_history": []
            }"#,
        )
        .expect("write");

        let mut store = StateStore::load(&path);

        assert!(store.state().last_initialization.is_some());
        let log = store.activations();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].rule, RuleId::UninitializedDetection);
        assert_eq!(log[0].counts["changes_count"], 4);
        assert_eq!(log[1].counts["post_completion_changes"], 6);
        assert_eq!(log[1].actions_taken, vec![ActionTaken::AlertShown]);
        assert!(store.state().extra.contains_key("project_completion_status"));

        store.mark_completion_check(at(30)).expect("rewrite");
        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["activation_log"].as_array().map(Vec::len), Some(2));
        assert!(raw.get("failsafe_activations").is_none());
        assert_eq!(StateStore::load(&path).activations(), store.activations());
    }

    #[test]
    fn action_display_matches_serialized_form() {
        let json = serde_json::to_string(&ActionTaken::StatusClarificationPrompted).expect("json");
        assert_eq!(json, format!("\"{}\"", ActionTaken::StatusClarificationPrompted));
    }
}
