//! Response dispatch for fired rules.
//!
//! On every firing the dispatcher logs a warning, builds an [`Activation`],
//! runs whichever responses the rule's `response_actions` enable, and appends
//! the activation to the persisted log. Nothing in here is fatal: failed
//! notifications, prompts and companion commands are reported on the console
//! and recorded as actions.

pub mod companion;
pub mod notify;
pub mod prompt;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{FailsafeConfig, RuleId};
use crate::context::FailsafeContext;
use crate::engine::{Detection, PostCompletionFinding, UninitializedFinding};
use crate::error::{FailsafeError, Result};
use crate::probe::Environment;
use crate::state::{ActionTaken, Activation};

pub use companion::{CommandOutput, CommandRunner, Companion, SystemCommandRunner};
pub use notify::{ConsoleNotifier, DesktopNotifier, NotificationChannels, Notifier};
pub use prompt::{Prompter, ScriptedPrompter, Selection, StdinPrompter};

const FEATURE_BRANCH_HINT: &str = "git checkout -b feature/post-completion-updates";

/// Rule A remediation menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationChoice {
    StartCompanion,
    RunSelfTest,
    ShowStatus,
    DisableRule,
    Continue,
}

impl InitializationChoice {
    const MENU: [InitializationChoice; 5] = [
        InitializationChoice::StartCompanion,
        InitializationChoice::RunSelfTest,
        InitializationChoice::ShowStatus,
        InitializationChoice::DisableRule,
        InitializationChoice::Continue,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InitializationChoice::StartCompanion => "Start companion background runner",
            InitializationChoice::RunSelfTest => "Run companion test cycle",
            InitializationChoice::ShowStatus => "View companion status",
            InitializationChoice::DisableRule => "Ignore (disable this failsafe)",
            InitializationChoice::Continue => "Continue without companion",
        }
    }
}

/// Rule B clarification menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationChoice {
    ReopenProject,
    SuggestFeatureBranch,
    ConfirmOverride,
    DisableRule,
    Continue,
}

impl ClarificationChoice {
    pub fn label(self) -> &'static str {
        match self {
            ClarificationChoice::ReopenProject => "Reopen project (mark as in progress)",
            ClarificationChoice::SuggestFeatureBranch => "Create new feature branch",
            ClarificationChoice::ConfirmOverride => "Confirm completion override",
            ClarificationChoice::DisableRule => "Disable post-completion detection",
            ClarificationChoice::Continue => "Continue as-is",
        }
    }
}

pub struct Dispatcher {
    ctx: Arc<FailsafeContext>,
    channels: NotificationChannels,
    prompter: Box<dyn Prompter>,
    companion: Companion,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<FailsafeContext>,
        channels: NotificationChannels,
        prompter: Box<dyn Prompter>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        let companion = Companion::new(ctx.paths(), &ctx.config().companion, runner);
        Self {
            ctx,
            channels,
            prompter,
            companion,
        }
    }

    /// Responds to a detection and appends the resulting activation.
    ///
    /// The returned error only reports that the activation could not be
    /// written; the in-memory log has it regardless.
    pub fn dispatch(
        &self,
        detection: &Detection,
        env: &dyn Environment,
        now: DateTime<Utc>,
    ) -> Result<Activation> {
        let config = self.ctx.config();
        let activation = match detection {
            Detection::Uninitialized(finding) => {
                self.respond_uninitialized(&config, finding, env, now)
            }
            Detection::PostCompletion(finding) => {
                self.respond_post_completion(&config, finding, now)
            }
        };

        self.ctx.record_activation(activation.clone())?;
        Ok(activation)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Rule A
    // ─────────────────────────────────────────────────────────────────────────────

    fn respond_uninitialized(
        &self,
        config: &FailsafeConfig,
        finding: &UninitializedFinding,
        env: &dyn Environment,
        now: DateTime<Utc>,
    ) -> Activation {
        let actions = &config.uninitialized_detection.response_actions;
        let reasons: Vec<String> = finding.reasons.iter().map(|r| r.to_string()).collect();

        tracing::warn!(
            rule = %RuleId::UninitializedDetection,
            changes = finding.changes.len(),
            companion_running = finding.companion_running,
            "Failsafe activated: uninitialized companion detection"
        );
        tracing::warn!(reasons = %reasons.join(", "), "Trigger reasons");

        let mut activation = Activation::new(RuleId::UninitializedDetection, now)
            .with_count("changes_count", finding.changes.len());
        activation.reasons = reasons;

        if actions.show_notification {
            self.channels.deliver(
                config.general.notification_method(),
                "Companion Initialization Required",
                &format!(
                    "Development activity detected without active companion process.\n\
                     Reasons: {}\n\
                     Files changed: {}",
                    activation.reasons.join(", "),
                    finding.changes.len()
                ),
            );
            activation.record(ActionTaken::NotificationShown);
        }

        if actions.auto_start_companion && !finding.companion_running {
            let outcome = self.start_companion(now);
            activation.record(outcome);
        }

        if actions.prompt_initialization {
            activation.record(ActionTaken::InitializationPrompted);
            let outcome = self.prompt_initialization(env, now);
            activation.record(outcome);
        }

        activation
    }

    fn prompt_initialization(&self, env: &dyn Environment, now: DateTime<Utc>) -> ActionTaken {
        let labels: Vec<&str> = InitializationChoice::MENU.iter().map(|c| c.label()).collect();
        let selection = self
            .prompter
            .prompt("Companion Initialization Options:", &labels);

        match selection {
            Selection::Chosen(index) => match InitializationChoice::MENU.get(index) {
                Some(InitializationChoice::StartCompanion) => self.start_companion(now),
                Some(InitializationChoice::RunSelfTest) => self.run_self_test(),
                Some(InitializationChoice::ShowStatus) => self.show_status(env),
                Some(InitializationChoice::DisableRule) => {
                    self.disable_rule(RuleId::UninitializedDetection)
                }
                Some(InitializationChoice::Continue) => {
                    println!("Continuing without companion initialization...");
                    ActionTaken::ContinuedWithoutAction
                }
                None => invalid_choice(),
            },
            Selection::Invalid => invalid_choice(),
            Selection::Cancelled => cancelled(),
        }
    }

    fn start_companion(&self, now: DateTime<Utc>) -> ActionTaken {
        match self.companion.start() {
            Ok(output) if output.success => {
                println!("Companion background runner started successfully");
                if let Err(err) = self.ctx.mark_initialized(now) {
                    tracing::error!(error = %err, "Failed to persist initialization time");
                }
                ActionTaken::CompanionStarted
            }
            Ok(output) => {
                println!("Failed to start companion: {}", output.stderr.trim());
                ActionTaken::CompanionStartFailed
            }
            Err(FailsafeError::ScriptNotFound(path)) => {
                println!("Companion background runner not found at {}", path.display());
                ActionTaken::CompanionStartFailed
            }
            Err(err) => {
                println!("Error starting companion: {}", err);
                ActionTaken::CompanionStartFailed
            }
        }
    }

    fn run_self_test(&self) -> ActionTaken {
        match self.companion.self_test() {
            Ok(output) => {
                println!("Companion Test Results:");
                println!("{}", output.stdout);
                if !output.stderr.is_empty() {
                    println!("Errors:");
                    println!("{}", output.stderr);
                }
            }
            Err(FailsafeError::ScriptNotFound(path)) => {
                println!("Companion test script not found at {}", path.display());
            }
            Err(err) => println!("Error running companion test: {}", err),
        }
        ActionTaken::CompanionTestRun
    }

    fn show_status(&self, env: &dyn Environment) -> ActionTaken {
        let running = env.is_companion_running();
        println!(
            "Companion Status: {}",
            if running { "Running" } else { "Not Running" }
        );
        match self.ctx.last_initialization() {
            Some(at) => println!(
                "Last Initialization: {}",
                at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!("Last Initialization: Never"),
        }
        ActionTaken::CompanionStatusShown
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Rule B
    // ─────────────────────────────────────────────────────────────────────────────

    fn respond_post_completion(
        &self,
        config: &FailsafeConfig,
        finding: &PostCompletionFinding,
        now: DateTime<Utc>,
    ) -> Activation {
        let actions = &config.post_completion_detection.response_actions;
        let completed = finding.completion.completed_tasks.len();
        let active = finding.completion.active_tasks.len();

        tracing::warn!(
            rule = %RuleId::PostCompletionDetection,
            completed_tasks = completed,
            post_completion_changes = finding.drift.len(),
            "Failsafe activated: post-completion development detection"
        );

        let mut activation = Activation::new(RuleId::PostCompletionDetection, now)
            .with_count("completed_tasks", completed)
            .with_count("post_completion_changes", finding.drift.len());
        activation.reasons = drift_reasons(finding);

        if actions.alert_post_completion {
            self.channels.deliver(
                config.general.notification_method(),
                "Post-Completion Development Detected",
                &format!(
                    "Development activity detected after project completion.\n\
                     Completed tasks: {}\n\
                     Recent changes: {}",
                    completed,
                    finding.drift.len()
                ),
            );
            activation.record(ActionTaken::AlertShown);
        }

        if actions.prompt_status_clarification {
            activation.record(ActionTaken::StatusClarificationPrompted);
            println!("\nProject Status Clarification:");
            println!("Completed tasks: {}", completed);
            println!("Active tasks: {}", active);
            println!("\nRecent development activity detected after completion.");
            let outcome = self.prompt_clarification(config);
            activation.record(outcome);
        }

        activation
    }

    fn prompt_clarification(&self, config: &FailsafeConfig) -> ActionTaken {
        let actions = &config.post_completion_detection.response_actions;
        let mut menu = Vec::with_capacity(5);
        if actions.offer_reopen_options {
            menu.push(ClarificationChoice::ReopenProject);
        }
        if actions.suggest_feature_branch {
            menu.push(ClarificationChoice::SuggestFeatureBranch);
        }
        menu.extend([
            ClarificationChoice::ConfirmOverride,
            ClarificationChoice::DisableRule,
            ClarificationChoice::Continue,
        ]);

        let labels: Vec<&str> = menu.iter().map(|c| c.label()).collect();
        match self.prompter.prompt("Options:", &labels) {
            Selection::Chosen(index) => match menu.get(index) {
                Some(ClarificationChoice::ReopenProject) => {
                    println!("Project reopened and marked as in progress");
                    ActionTaken::ProjectReopened
                }
                Some(ClarificationChoice::SuggestFeatureBranch) => {
                    println!("Consider creating: {}", FEATURE_BRANCH_HINT);
                    ActionTaken::FeatureBranchSuggested
                }
                Some(ClarificationChoice::ConfirmOverride) => {
                    println!("Completion override confirmed. Continuing...");
                    ActionTaken::CompletionOverrideConfirmed
                }
                Some(ClarificationChoice::DisableRule) => {
                    self.disable_rule(RuleId::PostCompletionDetection)
                }
                Some(ClarificationChoice::Continue) => {
                    println!("Continuing as-is...");
                    ActionTaken::ContinuedWithoutAction
                }
                None => invalid_choice(),
            },
            Selection::Invalid => invalid_choice(),
            Selection::Cancelled => cancelled(),
        }
    }

    fn disable_rule(&self, rule: RuleId) -> ActionTaken {
        match self.ctx.disable_rule(rule) {
            Ok(()) => println!("{} disabled", rule),
            Err(err) => {
                tracing::error!(error = %err, rule = %rule, "Failed to persist disabled rule");
                println!("{} disabled for this session (could not save: {})", rule, err);
            }
        }
        ActionTaken::RuleDisabled
    }
}

fn invalid_choice() -> ActionTaken {
    println!("Invalid choice. Continuing...");
    ActionTaken::ContinuedWithoutAction
}

fn cancelled() -> ActionTaken {
    println!("\nPrompt cancelled. Continuing...");
    ActionTaken::PromptCancelled
}

/// One reason per completed task that saw drift, in first-seen order.
fn drift_reasons(finding: &PostCompletionFinding) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut reasons = Vec::new();
    for entry in &finding.drift {
        if seen.insert(entry.task_name.as_str()) {
            let count = finding
                .drift
                .iter()
                .filter(|d| d.task_name == entry.task_name)
                .count();
            reasons.push(format!(
                "{} change(s) after completed task '{}'",
                count, entry.task_name
            ));
        }
    }
    reasons
}
