//! Command-line interface definition.
//!
//! - `kiln build <root> [mode]` - compile once (production by default)
//! - `kiln watch <root> [mode]` - rebuild on change and notify browsers
//! - `kiln run <root> [mode]` - `watch` plus an application server


use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kiln_config::BuildMode;

use crate::ui;

/// kiln - build, watch and serve a project during development
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Build, watch and serve a project during development",
    long_about = "kiln drives a project's build command. It compiles once for production,\n\
                  or keeps the output fresh while you edit and tells connected browsers\n\
                  to reload after every rebuild."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress status output and logs except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the project once
    ///
    /// Runs the configured build command and exits. Defaults to production
    /// mode.
    Build(ProjectArgs),

    /// Rebuild on every source change
    ///
    /// Performs an initial build, then rebuilds whenever files under the app
    /// directory change. Connected browsers receive log lines and a reload
    /// request on port 3001. Output directories are emptied on exit.
    Watch(ProjectArgs),

    /// Serve the app and rebuild on every source change
    ///
    /// Starts the application server on $PORT (default 3000) and runs watch
    /// mode alongside it.
    Run(ProjectArgs),
}

/// Arguments shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root directory
    #[arg(value_name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Build mode: development or production
    ///
    /// Unrecognized values fall back to the command's default mode.
    #[arg(value_name = "MODE")]
    pub mode: Option<String>,
}

impl ProjectArgs {
    /// The requested mode, or `default` when none was given.
    ///
    /// An unrecognized mode is reported with a warning and ignored.
    pub fn mode_or(&self, default: BuildMode) -> BuildMode {
        if let Some(arg) = self.mode.as_deref() {
            if arg.parse::<BuildMode>().is_err() {
                ui::warning(&format!("Unknown mode '{}', using {}", arg, default));
            }
        }
        BuildMode::from_arg(self.mode.as_deref(), default)
    }
}
