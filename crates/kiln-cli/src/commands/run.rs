//! Run command implementation: application server plus watch mode.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_compiler::{CommandCompiler, Compiler};
use kiln_config::{BuildMode, ConfigLoader, FileConfigLoader};

use crate::cli::ProjectArgs;
use crate::commands::watch::{watch, WatchOptions, WatchTarget};
use crate::dev::{purge, shutdown_signal, AppServer, ModuleRegistry, RebuildHook};
use crate::error::{CliError, Result};
use crate::ui;

/// Application server port when `PORT` is not set.
pub const DEFAULT_APP_PORT: u16 = 3000;

/// Execute the run command. Defaults to development mode.
pub async fn execute(args: ProjectArgs) -> Result<()> {
    let mode = args.mode_or(BuildMode::Development);
    let port = app_port()?;
    run(
        &args.root,
        mode,
        port,
        &FileConfigLoader,
        &CommandCompiler::new(),
        WatchOptions::default(),
        shutdown_signal(),
    )
    .await
}

/// Port for the application server, from `PORT` or [`DEFAULT_APP_PORT`].
///
/// # Errors
///
/// Returns `CliError::InvalidArgument` if `PORT` is set but not a port number.
pub fn app_port() -> Result<u16> {
    match std::env::var("PORT") {
        Ok(value) => value.trim().parse().map_err(|_| {
            CliError::InvalidArgument(format!("PORT must be a port number, got '{}'", value))
        }),
        Err(_) => Ok(DEFAULT_APP_PORT),
    }
}

/// Serve the server output on `port` and watch the project.
///
/// Every rebuild start purges the module registry for the server output
/// directory, after any hook already present in `options`.
pub async fn run(
    root: &Path,
    mode: BuildMode,
    port: u16,
    loader: &dyn ConfigLoader,
    compiler: &dyn Compiler,
    options: WatchOptions,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let config = loader.load(root)?;
    let registry = Arc::new(ModuleRegistry::new());

    let server = AppServer::bind(&config, mode, Arc::clone(&registry), port, options.notify_port).await?;
    ui::success(&format!(
        "App server started at http://localhost:{}",
        server.local_addr().port()
    ));

    let options = WatchOptions {
        on_rebuild_start: Some(purge_hook(
            registry,
            config.server_output_directory.clone(),
            options.on_rebuild_start,
        )),
        ..options
    };

    let result = watch(WatchTarget::Config(config), mode, loader, compiler, options, shutdown).await;
    server.shutdown().await;
    result
}

fn purge_hook(registry: Arc<ModuleRegistry>, server_dir: PathBuf, inner: Option<RebuildHook>) -> RebuildHook {
    Arc::new(move || {
        if let Some(inner) = &inner {
            inner();
        }
        purge(&registry, &server_dir);
    })
}
