//! The compiler contract driven by the build, watch and run commands.

use std::fmt;

use async_trait::async_trait;
use kiln_config::{BuildConfiguration, BuildMode};
use tokio::sync::mpsc;

use crate::error::{CompileError, Result};
use crate::event::RebuildEvent;

/// Where a watch session reports its rebuild cycles.
///
/// Unbounded so the compiler never waits on whoever consumes the events.
pub type RebuildSender = mpsc::UnboundedSender<RebuildEvent>;

/// Anything that can compile a project once or keep it compiled.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile the project once.
    async fn build(&self, config: &BuildConfiguration, mode: BuildMode) -> Result<()>;

    /// Run the initial build, then keep rebuilding on source changes until
    /// the returned handle is disposed.
    ///
    /// A failing initial build does not fail the session; it is reported
    /// through [`WatchHandle::initial_error`]. Only setup failures (for
    /// example a missing app directory) are returned as `Err`.
    async fn watch(
        &self,
        config: &BuildConfiguration,
        mode: BuildMode,
        events: RebuildSender,
    ) -> Result<WatchHandle>;
}

type Disposer = Box<dyn FnOnce() + Send>;

/// A live watch session.
///
/// Disposing stops the watcher and any pending rebuild. Dropping the handle
/// disposes it.
pub struct WatchHandle {
    initial_error: Option<CompileError>,
    disposer: Option<Disposer>,
}

impl WatchHandle {
    pub fn new(initial_error: Option<CompileError>, dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            initial_error,
            disposer: Some(Box::new(dispose)),
        }
    }

    /// The error of the initial build, if it failed.
    pub fn initial_error(&self) -> Option<&CompileError> {
        self.initial_error.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer.is_none()
    }

    /// Stop watching. Later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.disposer.take() {
            dispose();
            tracing::debug!("Watch session disposed");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("initial_error", &self.initial_error)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispose_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut handle = WatchHandle::new(None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.dispose();
        handle.dispose();
        assert!(handle.is_disposed());
        drop(handle);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_disposes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = WatchHandle::new(None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exposes_initial_error() {
        let handle = WatchHandle::new(Some(CompileError::Custom("boom".into())), || {});
        assert_eq!(handle.initial_error().map(|e| e.to_string()), Some("boom".to_string()));
    }
}
