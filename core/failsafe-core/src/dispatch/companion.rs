//! Launching and exercising the companion process.
//!
//! Both operations are fire-and-forget external commands: their exit status
//! and output are reported to the user but not interpreted further.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::CompanionConfig;
use crate::error::{FailsafeError, Result};
use crate::storage::StoragePaths;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| FailsafeError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                details: err.to_string(),
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Companion scripts resolved against the project root.
pub struct Companion {
    interpreter: String,
    runner_script: PathBuf,
    test_script: PathBuf,
    runner: Box<dyn CommandRunner>,
}

impl Companion {
    pub fn new(paths: &StoragePaths, config: &CompanionConfig, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            runner_script: paths.script(&config.runner_script),
            test_script: paths.script(&config.test_script),
            runner,
        }
    }

    /// `<interpreter> <runner_script> start`
    pub fn start(&self) -> Result<CommandOutput> {
        self.invoke(&self.runner_script, "start")
    }

    /// `<interpreter> <test_script> --test`
    pub fn self_test(&self) -> Result<CommandOutput> {
        self.invoke(&self.test_script, "--test")
    }

    fn invoke(&self, script: &Path, arg: &str) -> Result<CommandOutput> {
        if !script.is_file() {
            return Err(FailsafeError::ScriptNotFound(script.to_path_buf()));
        }
        let args = vec![script.to_string_lossy().into_owned(), arg.to_string()];
        tracing::info!(program = %self.interpreter, script = %script.display(), arg, "Running companion command");
        self.runner.run(&self.interpreter, &args)
    }
}
