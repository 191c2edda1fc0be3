//! Periodic monitoring loops, one background thread per rule.
//!
//! Each loop evaluates its rule, dispatches on a positive result, then waits
//! for the rule's `check_interval_seconds` (re-read every cycle). A failed or
//! panicking tick is logged and retried after `general.retry_delay_seconds`.
//! Waits are interruptible so `stop` takes effect immediately.

use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::RuleId;
use crate::context::FailsafeContext;
use crate::dispatch::Dispatcher;
use crate::engine::evaluate_rule;
use crate::error::{FailsafeError, Result};
use crate::probe::Environment;
use crate::state::Activation;

fn thread_name(rule: RuleId) -> &'static str {
    match rule {
        RuleId::UninitializedDetection => "failsafe-uninitialized",
        RuleId::PostCompletionDetection => "failsafe-post-completion",
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn reset(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn trigger(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }

    /// Sleeps up to `timeout`. Returns true once stop has been requested.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

struct Shared {
    ctx: Arc<FailsafeContext>,
    env: Arc<dyn Environment>,
    dispatcher: Arc<Dispatcher>,
    stop: StopSignal,
}

impl Shared {
    fn tick(&self, rule: RuleId, now: DateTime<Utc>) -> Result<Option<Activation>> {
        let config = self.ctx.config();
        if !config.rule_enabled(rule) {
            tracing::trace!(rule = %rule, "Rule disabled; skipping tick");
            return Ok(None);
        }
        if rule == RuleId::PostCompletionDetection {
            if let Err(err) = self.ctx.mark_completion_check(now) {
                tracing::warn!(error = %err, "Failed to persist completion check time");
            }
        }

        let detection = evaluate_rule(
            rule,
            &config,
            self.env.as_ref(),
            self.ctx.last_initialization(),
            now,
        );
        match detection {
            Some(detection) => self
                .dispatcher
                .dispatch(&detection, self.env.as_ref(), now)
                .map(Some),
            None => Ok(None),
        }
    }

    fn monitor(&self, rule: RuleId) {
        tracing::info!(rule = %rule, "Monitor started");
        loop {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.tick(rule, Utc::now())));
            let wait = match outcome {
                Ok(Ok(_)) => self.ctx.config().check_interval(rule),
                Ok(Err(err)) => {
                    tracing::error!(rule = %rule, error = %err, "Monitor tick failed");
                    self.ctx.config().general.retry_delay()
                }
                Err(_) => {
                    tracing::error!(rule = %rule, "Monitor tick panicked");
                    self.ctx.config().general.retry_delay()
                }
            };
            if self.stop.wait(wait) {
                break;
            }
        }
        tracing::info!(rule = %rule, "Monitor stopped");
    }
}

/// Owns the monitoring threads.
pub struct Supervisor {
    shared: Arc<Shared>,
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(
        ctx: Arc<FailsafeContext>,
        env: Arc<dyn Environment>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx,
                env,
                dispatcher,
                stop: StopSignal::default(),
            }),
            running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns one loop per enabled rule. Calling it again while running
    /// does nothing.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Supervisor already running");
            return Ok(());
        }
        self.shared.stop.reset();

        let config = self.shared.ctx.config();
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for rule in RuleId::ALL {
            if !config.rule_enabled(rule) {
                tracing::info!(rule = %rule, "Rule disabled; not scheduled");
                continue;
            }
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(thread_name(rule).to_string())
                .spawn(move || shared.monitor(rule))
                .map_err(|err| FailsafeError::io("Failed to spawn monitor thread", err))?;
            handles.push(handle);
        }

        tracing::info!(monitors = handles.len(), "Failsafe monitoring started");
        Ok(())
    }

    /// Asks every loop to exit at its next wait.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stopping failsafe monitoring");
        }
        self.shared.stop.trigger();
    }

    /// Blocks until every spawned loop has exited.
    pub fn join(&self) {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let name = handle.thread().name().unwrap_or("monitor").to_string();
            if handle.join().is_err() {
                tracing::warn!(thread = %name, "Monitor thread panicked");
            }
        }
    }

    /// Evaluates one rule synchronously and dispatches if it fires.
    pub fn run_once(&self, rule: RuleId, now: DateTime<Utc>) -> Result<Option<Activation>> {
        self.shared.tick(rule, now)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::dispatch::companion::fake::FakeCommandRunner;
    use crate::dispatch::notify::recording::RecordingNotifier;
    use crate::dispatch::{NotificationChannels, ScriptedPrompter};
    use crate::engine::testing::{change_at, FakeEnvironment};
    use crate::probe::{CompletedTask, CompletionStatus};
    use crate::state::StateStore;
    use crate::storage::StoragePaths;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::time::Instant;

    fn supervisor(env: FakeEnvironment) -> (tempfile::TempDir, Arc<FailsafeContext>, Supervisor) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let ctx = Arc::new(FailsafeContext::with_stores(
            StoragePaths::new(temp_dir.path()),
            ConfigStore::new_in_memory(),
            StateStore::new_in_memory(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&ctx),
            NotificationChannels::new(
                Box::new(RecordingNotifier::default()),
                Box::new(RecordingNotifier::default()),
            ),
            Box::new(ScriptedPrompter::default()),
            Box::new(FakeCommandRunner::default()),
        ));
        let supervisor = Supervisor::new(Arc::clone(&ctx), Arc::new(env), dispatcher);
        (temp_dir, ctx, supervisor)
    }

    #[test]
    fn run_once_records_activation_when_rule_fires() {
        let now = Utc::now();
        let (_dir, ctx, supervisor) = supervisor(FakeEnvironment::with_changes(now, 4));

        let activation = supervisor
            .run_once(RuleId::UninitializedDetection, now)
            .expect("tick")
            .expect("fires");

        assert_eq!(activation.rule, RuleId::UninitializedDetection);
        assert_eq!(ctx.state().activations.len(), 1);
    }

    #[test]
    fn run_once_is_quiet_below_threshold() {
        let now = Utc::now();
        let (_dir, ctx, supervisor) = supervisor(FakeEnvironment::with_changes(now, 2));

        assert!(supervisor
            .run_once(RuleId::UninitializedDetection, now)
            .expect("tick")
            .is_none());
        assert!(ctx.state().activations.is_empty());
    }

    #[test]
    fn post_completion_tick_stamps_check_time() {
        let now = Utc::now();
        let mut env = FakeEnvironment::default();
        env.completion = CompletionStatus {
            is_completed: true,
            completed_tasks: vec![CompletedTask {
                path: "task-ship.json".to_string(),
                name: "Ship".to_string(),
                completion_time: Some(now - ChronoDuration::hours(3)),
            }],
            active_tasks: Vec::new(),
        };
        env.changes = (0..5)
            .map(|i| change_at(&format!("src/{}.rs", i), now - ChronoDuration::minutes(i)))
            .collect();
        let (_dir, ctx, supervisor) = supervisor(env);

        let activation = supervisor
            .run_once(RuleId::PostCompletionDetection, now)
            .expect("tick")
            .expect("fires");

        assert_eq!(activation.counts.get("post_completion_changes"), Some(&5));
        assert_eq!(ctx.state().last_completion_check, Some(now));
    }

    #[test]
    fn disabled_rule_tick_probes_nothing() {
        let now = Utc::now();
        let (_dir, ctx, supervisor) = supervisor(FakeEnvironment::with_changes(now, 20));
        ctx.disable_rule(RuleId::UninitializedDetection).expect("disable");

        assert!(supervisor
            .run_once(RuleId::UninitializedDetection, now)
            .expect("tick")
            .is_none());
        assert!(ctx.state().activations.is_empty());
    }

    #[test]
    fn start_is_idempotent_and_stop_wakes_loops() {
        let (_dir, ctx, supervisor) = supervisor(FakeEnvironment::default());
        ctx.update_setting("uninitialized_detection.check_interval_seconds", json!(3600))
            .expect("update");

        supervisor.start().expect("start");
        supervisor.start().expect("second start");
        assert!(supervisor.is_running());
        assert_eq!(supervisor.handles.lock().unwrap().len(), 2);

        let started = Instant::now();
        supervisor.stop();
        supervisor.join();

        assert!(!supervisor.is_running());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn start_skips_disabled_rules() {
        let (_dir, ctx, supervisor) = supervisor(FakeEnvironment::default());
        ctx.disable_rule(RuleId::PostCompletionDetection).expect("disable");

        supervisor.start().expect("start");
        let names: Vec<String> = supervisor
            .handles
            .lock()
            .unwrap()
            .iter()
            .filter_map(|h| h.thread().name().map(str::to_string))
            .collect();
        supervisor.stop();
        supervisor.join();

        assert_eq!(names, vec!["failsafe-uninitialized".to_string()]);
    }

    #[test]
    fn stop_signal_wait_returns_early() {
        let signal = Arc::new(StopSignal::default());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.trigger();

        assert!(waiter.join().expect("join"));
        assert!(!StopSignal::default().wait(Duration::from_millis(1)));
    }
}
