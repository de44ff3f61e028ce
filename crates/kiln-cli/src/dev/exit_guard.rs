//! Cleanup that runs exactly once when a watch session ends.
//!
//! Handlers run in registration order on the first call to
//! [`ExitGuard::run`], whether that call comes from a shutdown signal, the
//! end of the watch loop or the guard being dropped. A handler that fails or
//! panics is logged and the remaining handlers still run.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{CliError, Result, ResultExt};

type Handler = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Default)]
pub struct ExitGuard {
    handlers: Mutex<Vec<(String, Handler)>>,
    ran: AtomicBool,
}

impl ExitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cleanup handler. If the guard already ran, the handler runs now.
    pub fn register(&self, name: impl Into<String>, handler: impl FnOnce() -> Result<()> + Send + 'static) {
        let name = name.into();
        if self.has_run() {
            run_handler(&name, Box::new(handler));
            return;
        }
        self.handlers.lock().push((name, Box::new(handler)));
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::SeqCst)
    }

    /// Run every handler once.
    ///
    /// # Returns
    ///
    /// `true` if this call ran the handlers, `false` if an earlier one did
    pub fn run(&self) -> bool {
        if self.ran.swap(true, Ordering::SeqCst) {
            return false;
        }

        let handlers = std::mem::take(&mut *self.handlers.lock());
        for (name, handler) in handlers {
            run_handler(&name, handler);
        }
        true
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.run();
    }
}

fn run_handler(name: &str, handler: Handler) {
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => tracing::debug!(handler = name, "Exit handler finished"),
        Ok(Err(e)) => tracing::warn!(handler = name, "Exit handler failed: {}", e),
        Err(_) => tracing::warn!(handler = name, "Exit handler panicked"),
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
///
/// Creates the directory if it does not exist.
///
/// # Errors
///
/// Returns `CliError::InvalidArgument` if `dir` exists but is not a
/// directory, `CliError::FileNotFound` if it vanishes while being emptied,
/// or the failed removal or creation with the offending path.
pub fn empty_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(CliError::InvalidArgument(format!(
                "Output path exists but is not a directory: {}",
                dir.display()
            )));
        }

        for entry in fs::read_dir(dir).with_path(dir)? {
            let path = entry?.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.context(format!("Failed to remove {}", path.display()))?;
        }
    } else {
        fs::create_dir_all(dir)
            .context(format!("Failed to create output directory {}", dir.display()))?;
    }

    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counter(guard: &ExitGuard, name: &str) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&calls);
        guard.register(name, move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        calls
    }

    #[test]
    fn test_runs_once_under_repeated_triggers() {
        let guard = ExitGuard::new();
        let calls = counter(&guard, "count");

        assert!(guard.run());
        assert!(!guard.run());
        drop(guard);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_handlers() {
        let guard = ExitGuard::new();
        let calls = counter(&guard, "count");
        drop(guard);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let guard = ExitGuard::new();
        guard.register("fails", || Err(CliError::Custom("nope".into())));
        guard.register("panics", || panic!("handler panic"));
        let calls = counter(&guard, "count");

        guard.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_after_run_runs_immediately() {
        let guard = ExitGuard::new();
        guard.run();
        let calls = counter(&guard, "late");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_dir_keeps_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("build");
        fs::create_dir_all(dir.join("routes")).unwrap();
        fs::write(dir.join("index.js"), "x").unwrap();
        fs::write(dir.join("routes/a.js"), "y").unwrap();

        empty_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_dir_creates_missing() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("public/build");

        empty_dir(&dir).unwrap();

        assert!(dir.is_dir());
    }

    #[test]
    fn test_empty_dir_rejects_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("build");
        fs::write(&file, "x").unwrap();

        assert!(matches!(empty_dir(&file), Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_dir_names_path_it_cannot_create() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("file"), "x").unwrap();
        let dir = temp.path().join("file/build");

        let err = empty_dir(&dir).unwrap_err();
        assert!(matches!(err, CliError::Custom(_)));
        assert!(err.to_string().starts_with(&format!(
            "Failed to create output directory {}: I/O error:",
            dir.display()
        )));
    }
}
