//! # kiln-compiler
//!
//! The compiler side of kiln: the [`Compiler`] contract the orchestrator
//! drives, the [`RebuildEvent`] stream a watch session reports through, and
//! [`CommandCompiler`], which compiles a project by running its configured
//! shell command and rebuilds whenever the source tree changes.
//!
//! ```no_run
//! use kiln_compiler::{CommandCompiler, Compiler, RebuildEvent};
//! use kiln_config::{load_config, BuildMode};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("./my-app".as_ref())?;
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let _handle = CommandCompiler::new()
//!     .watch(&config, BuildMode::Development, tx)
//!     .await?;
//!
//! while let Some(event) = rx.recv().await {
//!     if let RebuildEvent::Finished { duration } = event {
//!         println!("rebuilt in {:?}", duration);
//!     }
//! }
//! # Ok(()) }
//! ```

pub mod command;
pub mod compiler;
pub mod error;
pub mod event;
pub mod watcher;

pub use command::CommandCompiler;
pub use compiler::{Compiler, RebuildSender, WatchHandle};
pub use error::{CompileError, Result};
pub use event::{FileChangeKind, RebuildEvent};
pub use watcher::{ChangeBatch, SourceWatcher, WatchFilter};
