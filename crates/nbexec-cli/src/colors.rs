//! Terminal color constants and utilities for CLI output.

use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

/// Colored check or cross for a pass/fail outcome.
pub fn mark(success: bool) -> String {
    if success {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    }
}

/// Color for an accuracy percentage.
pub fn for_accuracy(accuracy: f64) -> &'static str {
    if accuracy >= 100.0 {
        GREEN
    } else if accuracy > 0.0 {
        YELLOW
    } else {
        RED
    }
}

/// Flush stdout so progress printed without a newline shows up immediately.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
