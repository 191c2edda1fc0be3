//! Notification channels.
//!
//! The console channel always fires. The desktop channel is best-effort:
//! failures are logged at debug level and otherwise ignored.

use crate::config::NotificationMethod;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

const BANNER_WIDTH: usize = 60;

/// Prints a framed banner to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str) {
        println!("{}", render_banner(title, message));
    }
}

pub fn render_banner(title: &str, message: &str) -> String {
    let rule = "=".repeat(BANNER_WIDTH);
    format!("\n{rule}\n{title}\n{rule}\n{message}\n{rule}\n")
}

/// Desktop popup via the platform notification service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        match notify_rust::Notification::new()
            .summary(title)
            .body(message)
            .show()
        {
            Ok(_) => tracing::debug!(%title, "Desktop notification sent"),
            Err(err) => tracing::debug!(%title, error = %err, "Could not show popup notification"),
        }
    }
}

/// Routes a notification to the channels selected by configuration.
pub struct NotificationChannels {
    console: Box<dyn Notifier>,
    popup: Box<dyn Notifier>,
}

impl Default for NotificationChannels {
    fn default() -> Self {
        Self::new(Box::new(ConsoleNotifier), Box::new(DesktopNotifier))
    }
}

impl NotificationChannels {
    pub fn new(console: Box<dyn Notifier>, popup: Box<dyn Notifier>) -> Self {
        Self { console, popup }
    }

    pub fn deliver(&self, method: NotificationMethod, title: &str, message: &str) {
        self.console.notify(title, message);
        if method.includes_popup() {
            self.popup.notify(title, message);
        }
    }
}
