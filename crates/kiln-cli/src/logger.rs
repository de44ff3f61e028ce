//! Logging setup for the kiln CLI.
//!
//! Diagnostics go through `tracing`; user-facing status lines go through
//! [`crate::ui`]. The filter is chosen from the global flags:
//!
//! 1. `--verbose`: debug for every kiln crate
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`, when set
//! 4. info for every kiln crate
//!
//! ```rust,no_run
//! use kiln_cli::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("Starting build");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "kiln_cli=debug,kiln_config=debug,kiln_compiler=debug";
const QUIET_FILTER: &str = "error";
const DEFAULT_FILTER: &str = "kiln_cli=info,kiln_config=info,kiln_compiler=info";

/// Initialize the global tracing subscriber. Call once, before logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize the global subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && crate::ui::should_use_color())
        .with_writer(std::io::stderr)
        .compact();

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
