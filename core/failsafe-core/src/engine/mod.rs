//! Detection rules.
//!
//! Each rule is a pure function of its configuration block, the environment
//! and (for Rule A) the last initialization time. Rules never mutate state;
//! a positive result is handed to the dispatcher by the caller.

pub mod post_completion;
pub mod uninitialized;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use std::fmt;

use crate::config::{FailsafeConfig, RuleId};
use crate::probe::{CompletionStatus, Environment, FileChange};

/// Why Rule A fired. One tick may collect several.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerReason {
    ActivityWithoutSession,
    NoRecentInitialization { timeout_hours: f64 },
    NewProjectDetected,
    RepositoryInitDetected,
    BulkChangesWithoutActivity,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::ActivityWithoutSession => {
                write!(f, "File modifications detected without active companion session")
            }
            TriggerReason::NoRecentInitialization { timeout_hours } => write!(
                f,
                "No recent companion initialization within {} hours",
                timeout_hours
            ),
            TriggerReason::NewProjectDetected => write!(f, "New project directory detected"),
            TriggerReason::RepositoryInitDetected => {
                write!(f, "Repository initialization detected")
            }
            TriggerReason::BulkChangesWithoutActivity => {
                write!(f, "Multiple file changes without companion activity")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UninitializedFinding {
    pub reasons: Vec<TriggerReason>,
    pub changes: Vec<FileChange>,
    pub companion_running: bool,
}

/// A change made after a completed task's grace period ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftEntry {
    pub change: FileChange,
    pub task_name: String,
    /// Time between the task's completion and the change.
    pub elapsed: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct PostCompletionFinding {
    pub completion: CompletionStatus,
    pub drift: Vec<DriftEntry>,
}

/// A positive decision from one rule.
#[derive(Debug, Clone)]
pub enum Detection {
    Uninitialized(UninitializedFinding),
    PostCompletion(PostCompletionFinding),
}

impl Detection {
    pub fn rule(&self) -> RuleId {
        match self {
            Detection::Uninitialized(_) => RuleId::UninitializedDetection,
            Detection::PostCompletion(_) => RuleId::PostCompletionDetection,
        }
    }
}

/// Runs the named rule once.
pub fn evaluate_rule(
    rule: RuleId,
    config: &FailsafeConfig,
    env: &dyn Environment,
    last_initialization: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Detection> {
    match rule {
        RuleId::UninitializedDetection => uninitialized::evaluate(
            &config.uninitialized_detection,
            env,
            last_initialization,
            now,
        )
        .map(Detection::Uninitialized),
        RuleId::PostCompletionDetection => {
            post_completion::evaluate(&config.post_completion_detection, env, now)
                .map(Detection::PostCompletion)
        }
    }
}
