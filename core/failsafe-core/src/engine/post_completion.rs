//! Rule B: development activity after a task was marked complete.

use chrono::{DateTime, Utc};

use super::{DriftEntry, PostCompletionFinding};
use crate::config::PostCompletionConfig;
use crate::probe::{CompletionStatus, Environment, FileChange};

/// Evaluates one tick. Returns `None` when disabled, when no task is complete,
/// or when drift stays below the significance threshold.
pub fn evaluate(
    config: &PostCompletionConfig,
    env: &dyn Environment,
    now: DateTime<Utc>,
) -> Option<PostCompletionFinding> {
    if !config.enabled {
        return None;
    }

    tracing::debug!("Evaluating post-completion-drift rule");

    let completion = env.completion_status();
    if !completion.is_completed {
        return None;
    }

    let changes = env.recent_file_changes(now);
    let drift = find_drift(&completion, &changes, config.grace_period());

    tracing::debug!(
        completed_tasks = completion.completed_tasks.len(),
        recent_changes = changes.len(),
        drift = drift.len(),
        "Post-completion drift computed"
    );

    if drift.len() < config.significant_change_threshold {
        return None;
    }

    Some(PostCompletionFinding { completion, drift })
}

/// Pairs every timestamped completed task with every change made strictly
/// after its completion time plus the grace period.
pub fn find_drift(
    completion: &CompletionStatus,
    changes: &[FileChange],
    grace_period: chrono::Duration,
) -> Vec<DriftEntry> {
    let mut drift = Vec::new();

    for task in &completion.completed_tasks {
        let Some(completed_at) = task.completion_time else {
            continue;
        };
        // A grace period reaching past the representable range never ends.
        let Some(cutoff) = completed_at.checked_add_signed(grace_period) else {
            continue;
        };

        for change in changes.iter().filter(|c| c.modified > cutoff) {
            drift.push(DriftEntry {
                change: change.clone(),
                task_name: task.name.clone(),
                elapsed: change.modified - completed_at,
            });
        }
    }

    drift
}
