//! kiln CLI - development-mode build orchestrator.
//!
//! The CLI drives a project's build command in three ways:
//!
//! - `build` compiles once
//! - `watch` rebuilds on every source change and tells connected browsers
//!   what happened over a WebSocket channel on port 3001
//! - `run` does what `watch` does and also serves the built application
//!
//! # Modules
//!
//! - [`cli`] - argument definitions
//! - [`commands`] - the three orchestrators
//! - [`dev`] - notification channel, lifecycle adapter, module registry,
//!   exit guard and application server
//! - [`error`] - error types and miette conversion
//! - [`logger`] - tracing setup
//! - [`ui`] - status lines

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
