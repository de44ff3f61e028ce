//! Miette diagnostic conversion for CLI errors.

use miette::Report;

use crate::error::CliError;

/// Convert a `CliError` into a miette `Report` for display.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(e) => miette::miette!(
            help = "Check kiln.toml, the \"kiln\" field of package.json and KILN_* variables",
            "Configuration error: {}",
            e
        ),
        CliError::Bind { port, source } => miette::miette!(
            help = format!("Stop the process using port {port} or pick another one"),
            "Failed to bind port {}: {}",
            port,
            source
        ),
        _ => miette::miette!("{}", err),
    }
}
