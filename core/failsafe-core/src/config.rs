//! Configuration document loading, merging and persistence.
//!
//! The on-disk document is kept as a raw [`serde_json::Value`] so keys the
//! watchdog does not know about survive a rewrite. A typed [`FailsafeConfig`]
//! view is derived from it after every load or update.
//!
//! ## Merge Semantics
//!
//! The effective document is `merge(defaults, user)`: objects merge
//! recursively, any other user value replaces the default outright, and keys
//! present on only one side are kept. Every default key is therefore present
//! in the effective document.
//!
//! ## Fault Policy
//!
//! Read or parse failures are logged and the compiled-in defaults are used.
//! A malformed user file is never overwritten by `load`.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use crate::error::{FailsafeError, Result};
use crate::storage::write_json_atomic;

// ═══════════════════════════════════════════════════════════════════════════════
// Rule Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// The two detection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    /// File activity without the companion process running.
    UninitializedDetection,
    /// File activity after a task has been marked complete.
    PostCompletionDetection,
}

impl RuleId {
    pub const ALL: [RuleId; 2] = [RuleId::UninitializedDetection, RuleId::PostCompletionDetection];

    /// Top-level key of this rule's block in the configuration document.
    pub fn config_key(self) -> &'static str {
        match self {
            RuleId::UninitializedDetection => "uninitialized_detection",
            RuleId::PostCompletionDetection => "post_completion_detection",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed View
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailsafeConfig {
    pub uninitialized_detection: UninitializedConfig,
    pub post_completion_detection: PostCompletionConfig,
    pub general: GeneralConfig,
    pub companion: CompanionConfig,
}

impl FailsafeConfig {
    pub fn rule_enabled(&self, rule: RuleId) -> bool {
        match rule {
            RuleId::UninitializedDetection => self.uninitialized_detection.enabled,
            RuleId::PostCompletionDetection => self.post_completion_detection.enabled,
        }
    }

    pub fn check_interval(&self, rule: RuleId) -> StdDuration {
        let secs = match rule {
            RuleId::UninitializedDetection => self.uninitialized_detection.check_interval_seconds,
            RuleId::PostCompletionDetection => {
                self.post_completion_detection.check_interval_seconds
            }
        };
        StdDuration::from_secs(secs.max(1))
    }
}

/// Rule A settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UninitializedConfig {
    pub enabled: bool,
    pub name: String,
    pub check_interval_seconds: u64,
    pub initialization_timeout_hours: f64,
    pub file_change_threshold: usize,
    pub auto_enable_conditions: UninitializedConditions,
    pub response_actions: UninitializedActions,
}

impl Default for UninitializedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "Uninitialized Companion Detection".to_string(),
            check_interval_seconds: 300,
            initialization_timeout_hours: 24.0,
            file_change_threshold: 3,
            auto_enable_conditions: UninitializedConditions::default(),
            response_actions: UninitializedActions::default(),
        }
    }
}

impl UninitializedConfig {
    pub fn initialization_timeout(&self) -> chrono::Duration {
        hours(self.initialization_timeout_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UninitializedConditions {
    pub new_project_detection: bool,
    pub git_init_detection: bool,
    pub multiple_changes_without_companion: bool,
}

impl Default for UninitializedConditions {
    fn default() -> Self {
        Self {
            new_project_detection: true,
            git_init_detection: true,
            multiple_changes_without_companion: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UninitializedActions {
    pub show_notification: bool,
    pub prompt_initialization: bool,
    /// Reserved; not acted on.
    pub pause_monitoring: bool,
    pub auto_start_companion: bool,
}

impl Default for UninitializedActions {
    fn default() -> Self {
        Self {
            show_notification: true,
            prompt_initialization: true,
            pause_monitoring: false,
            auto_start_companion: false,
        }
    }
}

/// Rule B settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCompletionConfig {
    pub enabled: bool,
    pub name: String,
    pub check_interval_seconds: u64,
    pub completion_grace_period_hours: f64,
    pub significant_change_threshold: usize,
    pub auto_enable_conditions: PostCompletionConditions,
    pub response_actions: PostCompletionActions,
}

impl Default for PostCompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "Post-Completion Development Detection".to_string(),
            check_interval_seconds: 600,
            completion_grace_period_hours: 2.0,
            significant_change_threshold: 5,
            auto_enable_conditions: PostCompletionConditions::default(),
            response_actions: PostCompletionActions::default(),
        }
    }
}

impl PostCompletionConfig {
    pub fn grace_period(&self) -> chrono::Duration {
        hours(self.completion_grace_period_hours)
    }
}

/// Declared for compatibility with existing documents; no evaluation reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCompletionConditions {
    pub high_priority_completion: bool,
    pub multiple_completion_cycles: bool,
    pub user_confusion_indicators: bool,
}

impl Default for PostCompletionConditions {
    fn default() -> Self {
        Self {
            high_priority_completion: true,
            multiple_completion_cycles: true,
            user_confusion_indicators: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCompletionActions {
    pub alert_post_completion: bool,
    pub prompt_status_clarification: bool,
    pub offer_reopen_options: bool,
    pub suggest_feature_branch: bool,
}

impl Default for PostCompletionActions {
    fn default() -> Self {
        Self {
            alert_post_completion: true,
            prompt_status_clarification: true,
            offer_reopen_options: true,
            suggest_feature_branch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub notification_method: String,
    pub persistence_enabled: bool,
    pub performance_monitoring: bool,
    pub retry_delay_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            notification_method: "console".to_string(),
            persistence_enabled: true,
            performance_monitoring: true,
            retry_delay_seconds: 60,
        }
    }
}

impl GeneralConfig {
    pub fn notification_method(&self) -> NotificationMethod {
        NotificationMethod::parse(&self.notification_method)
    }

    pub fn retry_delay(&self) -> StdDuration {
        StdDuration::from_secs(self.retry_delay_seconds.max(1))
    }
}

/// Where notifications are delivered. The console always receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMethod {
    Console,
    Popup,
    Both,
}

impl NotificationMethod {
    /// Lenient parse; anything unrecognized means console only.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "popup" => NotificationMethod::Popup,
            "both" => NotificationMethod::Both,
            _ => NotificationMethod::Console,
        }
    }

    pub fn includes_popup(self) -> bool {
        matches!(self, NotificationMethod::Popup | NotificationMethod::Both)
    }
}

/// How to find and launch the companion process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Substring searched for in live process arguments.
    pub process_marker: String,
    pub interpreter: String,
    pub runner_script: String,
    pub test_script: String,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            process_marker: "emad-background-runner.py".to_string(),
            interpreter: "python3".to_string(),
            runner_script: "emad-background-runner.py".to_string(),
            test_script: "emad-auto-sync.py".to_string(),
        }
    }
}

/// Upper bound for configured spans, well inside chrono's range.
const MAX_SPAN_MILLIS: f64 = 1e18;

fn hours(value: f64) -> chrono::Duration {
    if value.is_nan() || value <= 0.0 {
        return chrono::Duration::zero();
    }
    let millis = (value * 3_600_000.0).round().min(MAX_SPAN_MILLIS);
    chrono::Duration::milliseconds(millis as i64)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Document Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// The compiled-in default document.
pub fn default_document() -> Value {
    serde_json::to_value(FailsafeConfig::default()).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Recursively merges `user` over `default`. User leaves win.
pub fn merge(default: &Value, user: &Value) -> Value {
    match (default, user) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut result = base.clone();
            for (key, value) in overlay {
                let merged = match result.get(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    }
                    _ => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        _ => user.clone(),
    }
}

/// Sets `value` at a dotted path, creating intermediate objects as needed.
///
/// Intermediate values that are not objects are replaced by empty objects.
pub fn set_dotted(document: &mut Value, path: &str, value: Value) -> Result<()> {
    let keys: Vec<&str> = path.split('.').collect();
    if keys.iter().any(|key| key.is_empty()) {
        return Err(FailsafeError::InvalidSettingPath(path.to_string()));
    }

    let (leaf, parents) = keys
        .split_last()
        .ok_or_else(|| FailsafeError::InvalidSettingPath(path.to_string()))?;

    let mut current = document;
    for key in parents {
        current = ensure_object(current)
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(leaf.to_string(), value);
    Ok(())
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Derives the typed view. Leaves with the wrong type fall back to their
/// defaults one by one; every valid user value is kept.
fn typed_view(document: &Value) -> FailsafeConfig {
    if let Ok(config) = serde_json::from_value(document.clone()) {
        return config;
    }

    let defaults = default_document();
    let mut repaired = document.clone();
    repair_leaves(&defaults, &defaults, &mut repaired, &mut Vec::new());

    match serde_json::from_value(repaired) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Configuration has invalid field types; using defaults");
            FailsafeConfig::default()
        }
    }
}

/// Replaces each leaf of `document` that the typed view rejects with the
/// corresponding leaf of `default_node`.
fn repair_leaves<'a>(
    defaults: &Value,
    default_node: &'a Value,
    document: &mut Value,
    path: &mut Vec<&'a str>,
) {
    let (Value::Object(expected), Value::Object(actual)) = (default_node, document) else {
        return;
    };

    for (key, default_child) in expected {
        let Some(child) = actual.get_mut(key) else {
            continue;
        };
        path.push(key.as_str());

        if default_child.is_object() {
            if child.is_object() {
                repair_leaves(defaults, default_child, child, path);
            } else {
                tracing::warn!(setting = %path.join("."), "Setting is not an object; using defaults");
                *child = default_child.clone();
            }
        } else if !leaf_accepted(defaults, path, child) {
            tracing::warn!(setting = %path.join("."), value = %child, "Setting has the wrong type; using default");
            *child = default_child.clone();
        }

        path.pop();
    }
}

/// Whether the typed view accepts `value` at `path` with everything else default.
fn leaf_accepted(defaults: &Value, path: &[&str], value: &Value) -> bool {
    let mut candidate = defaults.clone();
    set_dotted(&mut candidate, &path.join("."), value.clone()).is_ok()
        && serde_json::from_value::<FailsafeConfig>(candidate).is_ok()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns the effective configuration and mirrors it to disk on every change.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    document: Value,
    config: FailsafeConfig,
    file_path: Option<PathBuf>,
}

impl ConfigStore {
    /// Defaults only, never persisted. Used by tests.
    pub fn new_in_memory() -> Self {
        Self::from_document(default_document(), None)
    }

    fn from_document(document: Value, file_path: Option<PathBuf>) -> Self {
        let config = typed_view(&document);
        Self {
            document,
            config,
            file_path,
        }
    }

    /// Loads the effective configuration from `file_path`.
    ///
    /// A missing file is created with the defaults. Any fault is logged and
    /// the defaults are returned; this never fails.
    pub fn load(file_path: &Path) -> Self {
        let defaults = default_document();

        if !file_path.exists() {
            let store = Self::from_document(defaults, Some(file_path.to_path_buf()));
            if let Err(err) = store.save() {
                tracing::error!(error = %err, path = %file_path.display(), "Failed to write default configuration");
            }
            return store;
        }

        match read_document(file_path) {
            Ok(user) => {
                let merged = merge(&defaults, &user);
                Self::from_document(merged, Some(file_path.to_path_buf()))
            }
            Err(err) => {
                tracing::error!(error = %err, path = %file_path.display(), "Failed to load configuration; using defaults");
                Self::from_document(defaults, Some(file_path.to_path_buf()))
            }
        }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn config(&self) -> &FailsafeConfig {
        &self.config
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Writes the current document. No-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        match &self.file_path {
            Some(path) => write_json_atomic(path, &self.document),
            None => Ok(()),
        }
    }

    /// Sets a dotted-path leaf and persists.
    ///
    /// The in-memory change is kept even when the write fails.
    pub fn update(&mut self, path: &str, value: Value) -> Result<()> {
        set_dotted(&mut self.document, path, value)?;
        self.config = typed_view(&self.document);
        self.save()
    }

    /// Turns a rule off and persists the change.
    pub fn disable_rule(&mut self, rule: RuleId) -> Result<()> {
        self.update(&format!("{}.enabled", rule.config_key()), Value::Bool(false))
    }
}

fn read_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .map_err(|err| FailsafeError::io("Failed to read configuration", err))?;
    serde_json::from_str(&content)
        .map_err(|err| FailsafeError::json("Failed to parse configuration", err))
}
