//! Rebuild lifecycle events.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

impl FileChangeKind {
    /// Human readable label, e.g. `File changed`.
    pub fn label(&self) -> &'static str {
        match self {
            FileChangeKind::Created => "File created",
            FileChangeKind::Changed => "File changed",
            FileChangeKind::Deleted => "File deleted",
        }
    }
}

impl fmt::Display for FileChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One step of a watch session, in the order the compiler reports them.
///
/// A cycle is `Started`, zero or more `FileChanged`, then exactly one of
/// `Finished` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildEvent {
    Started,
    FileChanged { path: PathBuf, kind: FileChangeKind },
    Finished { duration: Duration },
    Failed { error: String },
}

impl RebuildEvent {
    pub fn file(kind: FileChangeKind, path: impl Into<PathBuf>) -> Self {
        RebuildEvent::FileChanged {
            path: path.into(),
            kind,
        }
    }
}
