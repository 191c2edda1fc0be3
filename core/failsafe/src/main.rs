//! failsafe: background watchdog for a project directory.
//!
//! Watches for development activity that happens without the companion
//! process, and for activity that continues after tasks were marked complete.
//!
//! ## Modes
//!
//! - `--test`: one-shot diagnostics of every probe
//! - `--start`: monitor until Ctrl-C

mod logging;

use chrono::Utc;
use clap::Parser;
use failsafe_core::{
    Dispatcher, Environment, FailsafeContext, LocalEnvironment, NotificationChannels,
    StdinPrompter, StoragePaths, Supervisor, SystemCommandRunner,
};
use fs_err as fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "failsafe")]
#[command(about = "Project failsafe watchdog")]
#[command(version)]
struct Cli {
    /// Project root to watch
    #[arg(long, visible_alias = "emad-path", value_name = "DIR", default_value = ".")]
    path: PathBuf,

    /// Run each probe once and print the results; takes precedence over --start
    #[arg(long, visible_alias = "check")]
    test: bool,

    /// Start monitoring until interrupted
    #[arg(long)]
    start: bool,
}

fn main() {
    let cli = Cli::parse();

    if !cli.test && !cli.start {
        print_usage();
        return;
    }

    let root = match resolve_root(&cli.path) {
        Ok(root) => root,
        Err(err) => {
            eprintln!("Cannot watch {}: {}", cli.path.display(), err);
            std::process::exit(1);
        }
    };

    let paths = StoragePaths::new(&root);
    // Logging comes first so configuration and state load problems are reported.
    let _logging_guard = logging::init(
        &paths.logs_dir(),
        &logging::configured_level(&paths.config_file()),
    );
    let ctx = Arc::new(FailsafeContext::open(paths.clone()));
    let config = ctx.config();
    tracing::info!(root = %root.display(), "Failsafe context loaded");

    let env: Arc<dyn Environment> = Arc::new(LocalEnvironment::new(
        paths,
        config.companion.process_marker.clone(),
    ));

    if cli.test {
        run_diagnostics(&ctx, env.as_ref());
    } else if let Err(err) = run_monitor(ctx, env) {
        tracing::error!(error = %err, "Failsafe monitoring failed");
        std::process::exit(1);
    }
}

fn resolve_root(path: &Path) -> std::io::Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    fs::canonicalize(expanded)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn run_diagnostics(ctx: &FailsafeContext, env: &dyn Environment) {
    let now = Utc::now();
    println!("Running Failsafe Diagnostics");
    println!("{}", "=".repeat(40));

    println!("Recent file changes: {}", env.recent_file_changes(now).len());
    println!("Companion running: {}", yes_no(env.is_companion_running()));
    println!(
        "Project completed: {}",
        yes_no(env.completion_status().is_completed)
    );
    println!(
        "Repository recently initialized: {}",
        yes_no(env.detect_repository_init(now))
    );
    println!("New project detected: {}", yes_no(env.detect_new_project(now)));
    println!("Recorded activations: {}", ctx.state().activations.len());

    println!("Diagnostics completed");
}

fn run_monitor(ctx: Arc<FailsafeContext>, env: Arc<dyn Environment>) -> failsafe_core::Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&ctx),
        NotificationChannels::default(),
        Box::new(StdinPrompter::new()),
        Box::new(SystemCommandRunner),
    ));
    let supervisor = Arc::new(Supervisor::new(ctx, env, dispatcher));

    {
        let supervisor = Arc::clone(&supervisor);
        let interrupts = AtomicUsize::new(0);
        if let Err(err) = ctrlc::set_handler(move || {
            // A loop blocked on a menu prompt cannot observe stop; a second
            // interrupt exits outright.
            if interrupts.fetch_add(1, Ordering::SeqCst) > 0 {
                std::process::exit(130);
            }
            println!("\nStopping failsafe monitoring...");
            supervisor.stop();
        }) {
            tracing::warn!(error = %err, "Could not install Ctrl-C handler");
        }
    }

    println!("Starting failsafe monitoring...");
    supervisor.start()?;
    supervisor.join();
    tracing::info!("Failsafe monitoring stopped");
    Ok(())
}

fn print_usage() {
    println!("Project Failsafe Watchdog");
    println!("Use --start to begin monitoring or --test to run diagnostics");
}
