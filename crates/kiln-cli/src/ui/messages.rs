//! Status message functions for terminal output.

use owo_colors::OwoColorize;

use super::{colors_enabled, quiet};

/// Print a success message to stderr.
pub fn success(message: &str) {
    if quiet() {
        return;
    }
    if colors_enabled() {
        eprintln!("{} {}", "✓".green().bold(), message);
    } else {
        eprintln!("✓ {}", message);
    }
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    if quiet() {
        return;
    }
    if colors_enabled() {
        eprintln!("{} {}", "ℹ".blue().bold(), message);
    } else {
        eprintln!("ℹ {}", message);
    }
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    if quiet() {
        return;
    }
    if colors_enabled() {
        eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
    } else {
        eprintln!("⚠ {}", message);
    }
}

/// Print an error message to stderr, even under `--quiet`.
pub fn error(message: &str) {
    if colors_enabled() {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    } else {
        eprintln!("✗ {}", message);
    }
}

/// Print a rebuild lifecycle line to stdout exactly as given.
///
/// The same text is pushed to browsers, so no glyph or color is added.
/// Browsers still receive it under `--quiet`.
pub fn log(message: &str) {
    if quiet() {
        return;
    }
    println!("{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        success("Success message");
        info("Info message");
        warning("Warning message");
        error("Error message");
        log("🔥 Rebuilding...");
    }
}
