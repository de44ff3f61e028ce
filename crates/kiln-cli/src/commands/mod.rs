//! Command implementations.
//!
//! Each command has an `execute` entry point used by `main`, wired to the
//! file-based config loader and the shell-command compiler, and a lower
//! level function that takes both as parameters.

pub mod build;
pub mod run;
pub mod watch;

pub use build::{build, execute as build_execute};
pub use run::{app_port, execute as run_execute, run, DEFAULT_APP_PORT};
pub use watch::{execute as watch_execute, watch, WatchOptions, WatchSession, WatchTarget};
