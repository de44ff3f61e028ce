//! Rebuild lifecycle adapter.
//!
//! Consumes the compiler's [`RebuildEvent`] stream for one watch session,
//! prints a console line for each step and pushes the same text to browsers,
//! followed by a reload request after every successful rebuild.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use kiln_compiler::RebuildEvent;
use tokio::sync::mpsc;

use crate::dev::{ClientRegistry, NotificationChannel, NotificationEvent, LOG_MARKER};
use crate::ui;

/// Callback run at the start of every rebuild, before anything is logged.
pub type RebuildHook = Arc<dyn Fn() + Send + Sync>;

/// Where notifications go.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &NotificationEvent);
}

impl EventSink for ClientRegistry {
    fn send(&self, event: &NotificationEvent) {
        self.broadcast(event);
    }
}

impl EventSink for NotificationChannel {
    fn send(&self, event: &NotificationEvent) {
        self.broadcast(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Rebuilding,
}

pub struct RebuildLifecycle<S> {
    sink: S,
    on_rebuild_start: Option<RebuildHook>,
    state: LifecycleState,
    /// Start of the current rebuild, or of the session before the first one
    started_at: Instant,
    cwd: Option<PathBuf>,
    echo: bool,
}

impl<S: EventSink> RebuildLifecycle<S> {
    /// `session_start` is used for elapsed time until the first rebuild starts.
    pub fn new(sink: S, session_start: Instant) -> Self {
        Self {
            sink,
            on_rebuild_start: None,
            state: LifecycleState::Idle,
            started_at: session_start,
            cwd: std::env::current_dir().ok(),
            echo: true,
        }
    }

    pub fn with_rebuild_hook(mut self, hook: Option<RebuildHook>) -> Self {
        self.on_rebuild_start = hook;
        self
    }

    /// Directory file paths are shown relative to.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Whether lines are also printed to the console.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn handle(&mut self, event: RebuildEvent) {
        match event {
            RebuildEvent::Started => {
                self.started_at = Instant::now();
                self.state = LifecycleState::Rebuilding;
                if let Some(hook) = &self.on_rebuild_start {
                    hook();
                }
                self.log("Rebuilding...");
            }
            RebuildEvent::FileChanged { path, kind } => {
                let shown = self.display_path(&path);
                self.log(&format!("{}: {}", kind, shown.display()));
            }
            RebuildEvent::Finished { duration } => {
                self.state = LifecycleState::Idle;
                tracing::debug!(compiler_ms = duration.as_millis() as u64, "Rebuild finished");
                self.log(&format!(
                    "Rebuilt in {}",
                    ui::format_duration(self.started_at.elapsed())
                ));
                self.sink.send(&NotificationEvent::Reload);
            }
            RebuildEvent::Failed { error } => {
                self.state = LifecycleState::Idle;
                self.log(&format!("Rebuild failed: {}", error));
            }
        }
    }

    /// Handle events until the compiler side of the stream goes away.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<RebuildEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        tracing::debug!("Rebuild event stream ended");
    }

    fn log(&self, message: &str) {
        let message = format!("{}{}", LOG_MARKER, message);
        if self.echo {
            ui::log(&message);
        }
        self.sink.send(&NotificationEvent::Log { message });
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        self.cwd
            .as_deref()
            .and_then(|cwd| path.strip_prefix(cwd).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf())
    }
}
