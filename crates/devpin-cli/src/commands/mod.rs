pub mod completions;
pub mod env;
pub mod init;
pub mod inspect;
pub mod lock;
pub mod man_pages;
pub mod resolve;
pub mod shell;

use devpin_core::{CoreError, ErrorKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MALFORMED_SPEC: u8 = 2;
pub const EXIT_UNRESOLVED_DEPENDENCY: u8 = 3;
pub const EXIT_PLATFORM_UNSUPPORTED: u8 = 4;
pub const EXIT_STORE_ERROR: u8 = 5;

/// A failed command: the message for stderr and the process exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        let code = match e.kind() {
            ErrorKind::MalformedSpec => EXIT_MALFORMED_SPEC,
            ErrorKind::UnresolvedDependency => EXIT_UNRESOLVED_DEPENDENCY,
            ErrorKind::PlatformUnsupported => EXIT_PLATFORM_UNSUPPORTED,
            ErrorKind::Store => EXIT_STORE_ERROR,
            ErrorKind::Other => EXIT_FAILURE,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        Self {
            code: EXIT_FAILURE,
            message,
        }
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::from(format!("JSON serialization failed: {e}")))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

/// Colour a status word for terminal output.
pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "ok" | "locked" | "written" => Style::new().green().apply_to(status).to_string(),
        "drift" => Style::new().red().bold().apply_to(status).to_string(),
        "unlocked" => Style::new().yellow().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

/// Dim a store path so package names stand out.
pub fn dim(text: &str) -> String {
    console::Style::new().dim().apply_to(text).to_string()
}
