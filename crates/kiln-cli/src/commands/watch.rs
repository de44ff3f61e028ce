//! Watch command implementation.
//!
//! A watch session wires the compiler's rebuild stream to the notification
//! channel and registers exit cleanup:
//!
//! 1. Resolve the configuration (unless one is passed in)
//! 2. Start the notification channel
//! 3. Start the compiler's watch mode (initial build + watcher)
//! 4. Register the exit guard: dispose the watcher, empty output directories
//! 5. Forward rebuild events to browsers until shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use kiln_compiler::{CommandCompiler, Compiler};
use kiln_config::{BuildConfiguration, BuildMode, ConfigLoader, FileConfigLoader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::ProjectArgs;
use crate::dev::{
    empty_dir, shutdown_signal, ClientRegistry, ExitGuard, NotificationChannel, RebuildHook,
    RebuildLifecycle, DEFAULT_NOTIFY_PORT, LOG_MARKER,
};
use crate::error::Result;
use crate::ui;

/// What to watch: a project root to load, or an already loaded configuration.
#[derive(Debug, Clone)]
pub enum WatchTarget {
    Root(PathBuf),
    Config(BuildConfiguration),
}

impl From<PathBuf> for WatchTarget {
    fn from(root: PathBuf) -> Self {
        WatchTarget::Root(root)
    }
}

impl From<BuildConfiguration> for WatchTarget {
    fn from(config: BuildConfiguration) -> Self {
        WatchTarget::Config(config)
    }
}

pub struct WatchOptions {
    /// Port of the notification channel
    pub notify_port: u16,
    /// Called at the start of every rebuild
    pub on_rebuild_start: Option<RebuildHook>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            notify_port: DEFAULT_NOTIFY_PORT,
            on_rebuild_start: None,
        }
    }
}

/// Execute the watch command. Defaults to development mode.
pub async fn execute(args: ProjectArgs) -> Result<()> {
    let mode = args.mode_or(BuildMode::Development);
    watch(
        WatchTarget::Root(args.root),
        mode,
        &FileConfigLoader,
        &CommandCompiler::new(),
        WatchOptions::default(),
        shutdown_signal(),
    )
    .await
}

/// Run a watch session until `shutdown` resolves or the compiler stops
/// reporting events, then run exit cleanup.
pub async fn watch(
    target: WatchTarget,
    mode: BuildMode,
    loader: &dyn ConfigLoader,
    compiler: &dyn Compiler,
    options: WatchOptions,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    WatchSession::start(target, mode, loader, compiler, options)
        .await?
        .wait(shutdown)
        .await;
    Ok(())
}

/// A running watch session.
///
/// Dropping the session runs its exit guard.
pub struct WatchSession {
    config: BuildConfiguration,
    channel: NotificationChannel,
    guard: Arc<ExitGuard>,
    adapter: JoinHandle<()>,
}

impl WatchSession {
    /// Start watching.
    ///
    /// A failing initial build is reported and the session keeps running.
    ///
    /// # Errors
    ///
    /// Fails if the configuration cannot be loaded, the notification port
    /// cannot be bound, or the compiler cannot start watching.
    pub async fn start(
        target: WatchTarget,
        mode: BuildMode,
        loader: &dyn ConfigLoader,
        compiler: &dyn Compiler,
        options: WatchOptions,
    ) -> Result<Self> {
        ui::info(&format!("Watching app in {} mode...", mode));

        let start = Instant::now();
        let config = match target {
            WatchTarget::Root(root) => loader.load(&root)?,
            WatchTarget::Config(config) => config,
        };

        let channel = NotificationChannel::start(options.notify_port).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut handle = compiler.watch(&config, mode, events_tx).await?;
        let initial_error = handle.initial_error().map(|e| e.to_string());

        let guard = Arc::new(ExitGuard::new());
        guard.register("dispose watcher", move || {
            handle.dispose();
            Ok(())
        });
        let output_dirs: Vec<PathBuf> = config
            .output_directories()
            .iter()
            .map(|dir| dir.to_path_buf())
            .collect();
        guard.register("empty output directories", move || {
            for dir in &output_dirs {
                empty_dir(dir)?;
            }
            Ok(())
        });

        let lifecycle = RebuildLifecycle::new(channel.registry().clone(), start)
            .with_rebuild_hook(options.on_rebuild_start);
        let adapter = tokio::spawn(lifecycle.run(events_rx));

        match initial_error {
            None => ui::log(&format!(
                "{}Built in {}",
                LOG_MARKER,
                ui::format_duration(start.elapsed())
            )),
            Some(error) => ui::error(&format!("Initial build failed: {}", error)),
        }

        Ok(Self {
            config,
            channel,
            guard,
            adapter,
        })
    }

    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    pub fn notify_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    pub fn registry(&self) -> &ClientRegistry {
        self.channel.registry()
    }

    pub fn exit_guard(&self) -> Arc<ExitGuard> {
        Arc::clone(&self.guard)
    }

    /// Wait for `shutdown` or the end of the rebuild stream, then close.
    pub async fn wait(mut self, shutdown: impl Future<Output = ()>) {
        tokio::select! {
            _ = shutdown => ui::info("Shutting down..."),
            _ = &mut self.adapter => tracing::debug!("Rebuild stream ended, closing watch session"),
        }
        self.close().await;
    }

    /// Run exit cleanup and stop the notification channel.
    pub async fn close(self) {
        self.guard.run();
        self.adapter.abort();
        self.channel.shutdown().await;
    }
}
