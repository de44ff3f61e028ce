//! Build command implementation.

use std::path::Path;
use std::time::Instant;

use kiln_compiler::{CommandCompiler, Compiler};
use kiln_config::{BuildMode, ConfigLoader, FileConfigLoader};

use crate::cli::ProjectArgs;
use crate::error::Result;
use crate::ui;

/// Execute the build command. Defaults to production mode.
pub async fn execute(args: ProjectArgs) -> Result<()> {
    let mode = args.mode_or(BuildMode::Production);
    build(&args.root, mode, &FileConfigLoader, &CommandCompiler::new()).await
}

/// Load the configuration for `root` and compile it once.
///
/// # Errors
///
/// Fails on the first configuration or compile error.
pub async fn build(
    root: &Path,
    mode: BuildMode,
    loader: &dyn ConfigLoader,
    compiler: &dyn Compiler,
) -> Result<()> {
    ui::info(&format!("Building app in {} mode...", mode));

    let start = Instant::now();
    let config = loader.load(root)?;
    compiler.build(&config, mode).await?;

    ui::success(&format!("Built in {}", ui::format_duration(start.elapsed())));
    Ok(())
}
