//! # failsafe-core
//!
//! Detection engine for the project failsafe watchdog.
//!
//! Two rules watch a project root in the background:
//!
//! - **Uninitialized activity**: files are changing but the companion process
//!   is not running, or it has not been initialized recently.
//! - **Post-completion drift**: files are changing after a task marker was
//!   declared complete and its grace period has elapsed.
//!
//! ## Design Principles
//!
//! - **Synchronous**: plain threads, no async runtime.
//! - **Graceful degradation**: probes report "no evidence" on faults; a
//!   corrupt configuration or state file falls back to defaults.
//! - **Pluggable edges**: the environment, notifications, prompts and external
//!   commands sit behind traits so the engine runs against fakes in tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use failsafe_core::*;
//! use std::sync::Arc;
//!
//! let paths = StoragePaths::new(".");
//! let ctx = Arc::new(FailsafeContext::open(paths.clone()));
//! let marker = ctx.config().companion.process_marker.clone();
//! let env: Arc<dyn Environment> = Arc::new(LocalEnvironment::new(paths, marker));
//! let dispatcher = Arc::new(Dispatcher::new(
//!     Arc::clone(&ctx),
//!     NotificationChannels::default(),
//!     Box::new(StdinPrompter::new()),
//!     Box::new(SystemCommandRunner),
//! ));
//! let supervisor = Supervisor::new(ctx, env, dispatcher);
//! supervisor.start()?;
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod probe;
pub mod state;
pub mod storage;
pub mod supervisor;

pub use config::{ConfigStore, FailsafeConfig, NotificationMethod, RuleId};
pub use context::FailsafeContext;
pub use dispatch::{
    CommandOutput, CommandRunner, ConsoleNotifier, DesktopNotifier, Dispatcher,
    NotificationChannels, Notifier, Prompter, ScriptedPrompter, Selection, StdinPrompter,
    SystemCommandRunner,
};
pub use engine::{evaluate_rule, Detection, TriggerReason};
pub use error::{FailsafeError, Result};
pub use probe::{CompletionStatus, Environment, FileChange, LocalEnvironment};
pub use state::{ActionTaken, Activation, FailsafeState, StateStore};
pub use storage::StoragePaths;
pub use supervisor::Supervisor;
