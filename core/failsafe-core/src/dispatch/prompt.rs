//! Interactive menu prompts.
//!
//! [`StdinPrompter`] is used by the binary; [`ScriptedPrompter`] replays a
//! fixed list of answers for tests and non-interactive runs.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of presenting a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based index into the options shown.
    Chosen(usize),
    /// Input did not name an option.
    Invalid,
    /// End of input or interrupt.
    Cancelled,
}

pub trait Prompter: Send + Sync {
    fn prompt(&self, heading: &str, options: &[&str]) -> Selection;
}

impl<P: Prompter + ?Sized> Prompter for Arc<P> {
    fn prompt(&self, heading: &str, options: &[&str]) -> Selection {
        (**self).prompt(heading, options)
    }
}

/// Parses a 1-based menu answer.
pub fn parse_selection(input: &str, option_count: usize) -> Selection {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=option_count).contains(&n) => Selection::Chosen(n - 1),
        _ => Selection::Invalid,
    }
}

/// Reads answers from standard input.
///
/// Prompts from concurrent rule loops are serialized so menus never interleave.
#[derive(Default)]
pub struct StdinPrompter {
    guard: Mutex<()>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for StdinPrompter {
    fn prompt(&self, heading: &str, options: &[&str]) -> Selection {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        println!("\n{}", heading);
        for (i, option) in options.iter().enumerate() {
            println!("{}. {}", i + 1, option);
        }
        print!("\nSelect option (1-{}): ", options.len());
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => Selection::Cancelled,
            Ok(_) => parse_selection(&line, options.len()),
            Err(err) => {
                tracing::debug!(error = %err, "Prompt input failed");
                Selection::Cancelled
            }
        }
    }
}

/// Replays queued selections; cancels once the queue runs dry.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Selection>>,
    shown: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Selection>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            shown: Mutex::new(Vec::new()),
        }
    }

    /// Menus presented so far, as lists of option labels.
    pub fn shown(&self) -> Vec<Vec<String>> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&self, _heading: &str, options: &[&str]) -> Selection {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.iter().map(|o| o.to_string()).collect());
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Selection::Cancelled)
    }
}
