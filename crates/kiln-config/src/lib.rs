//! Project configuration for kiln.
//!
//! Resolves a project root into a [`BuildConfiguration`]: the absolute
//! directories the compiler writes to, the source tree to watch and the
//! shell command that performs the build.
//!
//! ```no_run
//! use kiln_config::{ConfigLoader, FileConfigLoader};
//!
//! let config = FileConfigLoader.load("./my-app".as_ref()).unwrap();
//! println!("server output: {}", config.server_output_directory.display());
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod mode;

// Re-export main types
pub use config::*;
pub use discovery::{load_config, ConfigDiscovery, ConfigLoader, FileConfigLoader};
pub use error::*;
pub use mode::*;
