//! Terminal output with three verbosity levels.
//!
//! - **Quiet**: errors and the final result only
//! - **Normal**: one line per step, spinners while rows are evaluated
//! - **Verbose**: sub-steps, timings and debug logging

use color_eyre::owo_colors::OwoColorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Verbosity Control
// ============================================================================

static VERBOSITY: AtomicU8 = AtomicU8::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Verbosity {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
}

impl Verbosity {
    pub fn current() -> Self {
        match VERBOSITY.load(Ordering::Relaxed) {
            0 => Verbosity::Quiet,
            2 => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }

    pub fn set(level: Verbosity) {
        VERBOSITY.store(level as u8, Ordering::Relaxed);
    }

    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    pub fn show_normal(&self) -> bool {
        *self >= Verbosity::Normal
    }

    pub fn show_verbose(&self) -> bool {
        *self >= Verbosity::Verbose
    }

    /// Log directive used when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "applyq_core=debug,applyq_cli=debug,warn",
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the verbosity's
/// directive. Returns false, after a warning, if a subscriber was already set.
pub fn init_tracing(verbosity: Verbosity) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()));
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
    {
        Ok(()) => true,
        Err(e) => {
            warning(&format!("Logging is disabled: {e}"));
            false
        }
    }
}

pub mod symbols {
    pub const SUCCESS: &str = "✓";
    pub const FAILURE: &str = "✗";
    pub const WARNING: &str = "⚠";
    pub const INFO: &str = "→";
}

/// Format a duration for display (e.g., "1.2s", "150ms")
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Operation
// ============================================================================

/// A top-level command run against one project, e.g. `Running 'sales'`.
pub struct Operation {
    verb: String,
    target: String,
    start_time: Instant,
}

impl Operation {
    pub fn new(verb: &str, target: &str) -> Self {
        if Verbosity::current().show_normal() {
            eprintln!("{} '{}'", verb, target);
        }

        Self {
            verb: verb.to_string(),
            target: target.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn success(self) {
        let message = format!("{} '{}'", past_tense(&self.verb), self.target);
        match Verbosity::current() {
            Verbosity::Quiet => {}
            Verbosity::Normal => eprintln!("{}", message.bold()),
            Verbosity::Verbose => eprintln!(
                "{} {}",
                message.bold(),
                format!("({})", format_duration(self.start_time.elapsed())).dimmed()
            ),
        }
    }

    /// Reports the failure; the error itself is printed by `main`.
    pub fn failure(self) {
        eprintln!(
            "{} {} '{}' failed",
            symbols::FAILURE.red().bold(),
            self.verb,
            self.target
        );
    }

    pub fn print_details(items: &[(&str, String)]) {
        if !Verbosity::current().show_normal() {
            return;
        }
        eprintln!("{}", "────────────────────────────────".dimmed());
        for (label, value) in items {
            eprintln!("  {} {}: {}", "•".dimmed(), label, value);
        }
    }
}

// ============================================================================
// Step
// ============================================================================

/// One step of an operation, e.g. `Binding pipeline` / `Pipeline bound`.
pub struct Step {
    progress_message: String,
    completion_message: String,
    spinner: Option<LiveSpinner>,
    start_time: Option<Instant>,
}

impl Step {
    pub fn with_messages(progress: &str, completion: &str) -> Self {
        Self {
            progress_message: progress.to_string(),
            completion_message: completion.to_string(),
            spinner: None,
            start_time: None,
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        if Verbosity::current().show_verbose() {
            eprintln!("  {} {}...", symbols::INFO.blue(), self.progress_message);
        }
    }

    /// Like `start`, with a spinner in normal mode for steps that touch every row.
    pub fn start_with_spinner(&mut self) {
        self.start_time = Some(Instant::now());
        match Verbosity::current() {
            Verbosity::Quiet => {}
            Verbosity::Normal => self.spinner = Some(LiveSpinner::new(&self.progress_message)),
            Verbosity::Verbose => {
                eprintln!("  {} {}...", symbols::INFO.blue(), self.progress_message)
            }
        }
    }

    pub fn done(mut self) {
        self.finish(true, None);
    }

    /// `  ✓ Rows read (42 rows)`
    pub fn done_with_info(mut self, info: &str) {
        self.finish(true, Some(info));
    }

    pub fn fail(mut self) {
        self.finish(false, None);
    }

    fn finish(&mut self, success: bool, info: Option<&str>) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish();
        }

        let verbosity = Verbosity::current();
        if verbosity == Verbosity::Quiet {
            return;
        }

        let symbol = if success {
            symbols::SUCCESS.green().to_string()
        } else {
            symbols::FAILURE.red().to_string()
        };
        let info = info
            .map(|i| format!(" {}", format!("({})", i).dimmed()))
            .unwrap_or_default();
        let timing = match (verbosity, self.start_time) {
            (Verbosity::Verbose, Some(start)) => format!(
                " {}",
                format!("({})", format_duration(start.elapsed())).dimmed()
            ),
            _ => String::new(),
        };

        eprintln!("  {} {}{}{}", symbol, self.completion_message, info, timing);
    }

    pub fn verbose_substep(message: &str) {
        if Verbosity::current().show_verbose() {
            eprintln!("    {} {}", symbols::INFO.dimmed(), message.dimmed());
        }
    }
}

// ============================================================================
// LiveSpinner
// ============================================================================

pub struct LiveSpinner {
    progress_bar: ProgressBar,
}

impl LiveSpinner {
    pub fn new(message: &str) -> Self {
        if !std::io::stderr().is_terminal() {
            eprintln!("  {} {}...", symbols::INFO.blue(), message);
            return Self {
                progress_bar: ProgressBar::hidden(),
            };
        }

        let progress_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("  {spinner:.blue} {msg}")
        {
            progress_bar.set_style(style);
        }
        progress_bar.set_message(message.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(80));
        Self { progress_bar }
    }

    pub fn finish(self) {
        self.progress_bar.finish_and_clear();
    }
}

// ============================================================================
// Standalone Output Functions
// ============================================================================

pub fn warning(message: &str) {
    if Verbosity::current().show_normal() {
        eprintln!("{} {}", symbols::WARNING.yellow().bold(), message);
    }
}

pub fn info(message: &str) {
    if Verbosity::current().show_normal() {
        eprintln!("{} {}", symbols::INFO.blue(), message);
    }
}

fn past_tense(verb: &str) -> String {
    let lower = verb.to_lowercase();
    match lower.as_str() {
        "running" => "Ran",
        "explaining" => "Explained",
        "checking" => "Checked",
        _ => return format!("{}ed", lower.trim_end_matches("ing")),
    }
    .to_string()
}
