//! Rule A: development activity without the companion process.

use chrono::{DateTime, Utc};

use super::{TriggerReason, UninitializedFinding};
use crate::config::UninitializedConfig;
use crate::probe::Environment;

/// Change count above which "bulk changes" fires on its own.
pub const BULK_CHANGE_THRESHOLD: usize = 10;

/// Evaluates one tick. Returns `None` when the rule is disabled or nothing fired.
pub fn evaluate(
    config: &UninitializedConfig,
    env: &dyn Environment,
    last_initialization: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<UninitializedFinding> {
    if !config.enabled {
        return None;
    }

    tracing::debug!("Evaluating uninitialized-activity rule");

    let companion_running = env.is_companion_running();
    let changes = env.recent_file_changes(now);
    let over_threshold = changes.len() >= config.file_change_threshold;

    let mut reasons = Vec::new();

    if over_threshold && !companion_running {
        reasons.push(TriggerReason::ActivityWithoutSession);
    }

    let init_stale = match last_initialization {
        None => true,
        // A timeout reaching past the representable range never goes stale.
        Some(at) => now
            .checked_sub_signed(config.initialization_timeout())
            .is_some_and(|cutoff| at < cutoff),
    };
    if over_threshold && init_stale {
        reasons.push(TriggerReason::NoRecentInitialization {
            timeout_hours: config.initialization_timeout_hours,
        });
    }

    let conditions = &config.auto_enable_conditions;
    if conditions.new_project_detection && env.detect_new_project(now) {
        reasons.push(TriggerReason::NewProjectDetected);
    }

    if conditions.git_init_detection && env.detect_repository_init(now) {
        reasons.push(TriggerReason::RepositoryInitDetected);
    }

    if conditions.multiple_changes_without_companion
        && changes.len() > BULK_CHANGE_THRESHOLD
        && !companion_running
    {
        reasons.push(TriggerReason::BulkChangesWithoutActivity);
    }

    if reasons.is_empty() {
        return None;
    }

    Some(UninitializedFinding {
        reasons,
        changes,
        companion_running,
    })
}
