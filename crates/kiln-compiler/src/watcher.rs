//! Source tree watching.
//!
//! Raw notify events are classified into [`FileChangeKind`]s, filtered
//! against the watched roots and ignore rules, and forwarded over a bounded
//! channel. [`ChangeBatch`] folds the changes seen during one debounce window
//! into a single per-path summary.

use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use kiln_config::BuildConfiguration;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CompileError, Result};
use crate::event::FileChangeKind;

/// Capacity of the raw change channel between notify and the rebuild loop.
const CHANGE_CHANNEL_CAPACITY: usize = 100;

/// Decides which paths are relevant to a rebuild.
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    roots: Vec<PathBuf>,
    ignore_patterns: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl WatchFilter {
    pub fn new(roots: Vec<PathBuf>, ignore_patterns: Vec<String>) -> Self {
        Self {
            roots,
            ignore_patterns,
            excluded: Vec::new(),
        }
    }

    /// Filter for a project: its watch roots and ignore patterns, with both
    /// output directories excluded so the compiler's own writes never
    /// trigger another rebuild.
    pub fn from_config(config: &BuildConfiguration) -> Self {
        let mut filter = Self::new(config.watch_roots(), config.watch.ignore.clone());
        for dir in config.output_directories() {
            filter = filter.exclude(dir);
        }
        filter
    }

    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check if a path should be ignored.
    ///
    /// Ignored are paths outside every root, paths under an excluded
    /// directory, hidden files or directories, and paths matching an ignore
    /// pattern. `*.ext` patterns match by suffix; any other pattern matches a
    /// path component or a leading relative path.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let Some(root) = self.roots.iter().find(|root| path.starts_with(root)) else {
            return true;
        };

        if self.excluded.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        let rel_path = match path.strip_prefix(root) {
            Ok(p) => p,
            Err(_) => return true,
        };

        let is_hidden = rel_path.components().any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        });
        if is_hidden {
            return true;
        }

        let path_str = rel_path.to_string_lossy();
        self.ignore_patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                path_str.ends_with(suffix)
            } else {
                rel_path.starts_with(pattern)
                    || rel_path
                        .components()
                        .any(|c| c.as_os_str() == pattern.as_str())
            }
        })
    }
}

/// Translate a notify event into per-path changes.
///
/// Access and metadata-only events produce nothing.
pub fn classify(event: &Event) -> Vec<(PathBuf, FileChangeKind)> {
    let each = |kind: FileChangeKind| {
        event
            .paths
            .iter()
            .map(|p| (p.clone(), kind))
            .collect::<Vec<_>>()
    };

    match event.kind {
        EventKind::Create(_) => each(FileChangeKind::Created),
        EventKind::Remove(_) => each(FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(FileChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                (from.clone(), FileChangeKind::Deleted),
                (to.clone(), FileChangeKind::Created),
            ],
            _ => each(FileChangeKind::Changed),
        },
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    FileChangeKind::Created
                } else {
                    FileChangeKind::Deleted
                };
                (p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) => each(FileChangeKind::Changed),
        _ => Vec::new(),
    }
}

/// Changes collected during one debounce window, at most one per path,
/// in first-seen order.
#[derive(Debug, Default)]
pub struct ChangeBatch {
    changes: IndexMap<PathBuf, FileChangeKind>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another change for `path` into the batch.
    pub fn record(&mut self, path: PathBuf, kind: FileChangeKind) {
        use FileChangeKind::*;

        match (self.changes.get(&path).copied(), kind) {
            (Some(Created), Changed) => {}
            (Some(Created), Deleted) => {
                // Never existed as far as the compiler is concerned
                self.changes.shift_remove(&path);
            }
            (Some(Deleted), Created) => {
                self.changes.insert(path, Changed);
            }
            (_, kind) => {
                self.changes.insert(path, kind);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn into_changes(self) -> Vec<(PathBuf, FileChangeKind)> {
        self.changes.into_iter().collect()
    }
}

/// Recursive watcher over a set of source roots.
///
/// Dropping it stops delivery; the receiver then yields `None`.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl SourceWatcher {
    /// Start watching every root of `filter`.
    ///
    /// The first root is required; later roots that do not exist are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::WatchPathNotFound` if the first root is missing,
    /// or `CompileError::Watch` if the backend cannot be set up.
    pub fn start(filter: WatchFilter) -> Result<(Self, mpsc::Receiver<(PathBuf, FileChangeKind)>)> {
        let mut roots = Vec::new();
        for (index, root) in filter.roots().iter().enumerate() {
            if root.is_dir() {
                roots.push(root.clone());
            } else if index == 0 {
                return Err(CompileError::WatchPathNotFound(root.clone()));
            } else {
                tracing::warn!("Skipping missing watch path {}", root.display());
            }
        }

        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("File watcher error: {}", e);
                    return;
                }
            };

            for (path, kind) in classify(&event) {
                if filter.should_ignore(&path) {
                    tracing::trace!("Ignoring change to {}", path.display());
                    continue;
                }
                // Runs on the notify thread, outside the runtime
                if tx.blocking_send((path, kind)).is_err() {
                    return;
                }
            }
        })?;

        for root in &roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            tracing::debug!("Watching {}", root.display());
        }

        Ok((
            Self {
                _watcher: watcher,
                roots,
            },
            rx,
        ))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn filter(patterns: &[&str]) -> WatchFilter {
        WatchFilter::new(
            vec![PathBuf::from("/project/app")],
            patterns.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[test]
    fn test_should_ignore_directory_pattern() {
        let filter = filter(&["node_modules"]);

        assert!(filter.should_ignore(Path::new("/project/app/node_modules/pkg/index.js")));
        assert!(filter.should_ignore(Path::new("/project/app/lib/node_modules/a.js")));
        assert!(!filter.should_ignore(Path::new("/project/app/node_modules_extra/a.js")));
        assert!(!filter.should_ignore(Path::new("/project/app/routes/index.tsx")));
    }

    #[test]
    fn test_should_ignore_extension() {
        let filter = filter(&["*.log"]);

        assert!(filter.should_ignore(Path::new("/project/app/debug.log")));
        assert!(!filter.should_ignore(Path::new("/project/app/root.tsx")));
    }

    #[test]
    fn test_should_ignore_hidden_files() {
        let filter = filter(&[]);

        assert!(filter.should_ignore(Path::new("/project/app/.DS_Store")));
        assert!(filter.should_ignore(Path::new("/project/app/.cache/entry.js")));
        assert!(filter.should_ignore(Path::new("/project/app/routes/.hidden/file.js")));
    }

    #[test]
    fn test_should_ignore_outside_roots() {
        let filter = filter(&[]);

        assert!(filter.should_ignore(Path::new("/project/package.json")));
        assert!(filter.should_ignore(Path::new("/other/app/root.tsx")));
    }

    #[test]
    fn test_extra_roots_are_watched() {
        let filter = WatchFilter::new(
            vec![PathBuf::from("/project/app"), PathBuf::from("/project/shared")],
            Vec::new(),
        );

        assert!(!filter.should_ignore(Path::new("/project/shared/utils.ts")));
    }

    #[test]
    fn test_output_directories_are_excluded() {
        let mut config = BuildConfiguration::with_defaults("/project", "make");
        config.app_directory = PathBuf::from("/project");
        let filter = WatchFilter::from_config(&config);

        assert!(filter.should_ignore(Path::new("/project/build/index.js")));
        assert!(filter.should_ignore(Path::new("/project/public/build/entry.js")));
        assert!(!filter.should_ignore(Path::new("/project/routes/index.tsx")));
    }

    #[test]
    fn test_classify_events() {
        let path = PathBuf::from("/project/app/root.tsx");

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert_eq!(classify(&created), vec![(path.clone(), FileChangeKind::Created)]);

        let changed =
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.clone());
        assert_eq!(classify(&changed), vec![(path.clone(), FileChangeKind::Changed)]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        assert_eq!(classify(&removed), vec![(path.clone(), FileChangeKind::Deleted)]);

        let touched = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)))
            .add_path(path.clone());
        assert!(classify(&touched).is_empty());
    }

    #[test]
    fn test_classify_rename() {
        let from = PathBuf::from("/project/app/a.tsx");
        let to = PathBuf::from("/project/app/b.tsx");
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(from.clone())
            .add_path(to.clone());

        assert_eq!(
            classify(&event),
            vec![(from, FileChangeKind::Deleted), (to, FileChangeKind::Created)]
        );
    }

    #[test]
    fn test_batch_coalesces_per_path() {
        let a = PathBuf::from("/app/a.ts");
        let b = PathBuf::from("/app/b.ts");
        let c = PathBuf::from("/app/c.ts");
        let d = PathBuf::from("/app/d.ts");

        let mut batch = ChangeBatch::new();
        batch.record(a.clone(), FileChangeKind::Created);
        batch.record(b.clone(), FileChangeKind::Created);
        batch.record(c.clone(), FileChangeKind::Deleted);
        batch.record(d.clone(), FileChangeKind::Changed);
        batch.record(a.clone(), FileChangeKind::Changed);
        batch.record(b.clone(), FileChangeKind::Deleted);
        batch.record(c.clone(), FileChangeKind::Created);
        batch.record(d.clone(), FileChangeKind::Deleted);

        assert_eq!(
            batch.into_changes(),
            vec![
                (a, FileChangeKind::Created),
                (c, FileChangeKind::Changed),
                (d, FileChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn test_batch_created_then_deleted_is_empty() {
        let mut batch = ChangeBatch::new();
        batch.record(PathBuf::from("/app/tmp.ts"), FileChangeKind::Created);
        batch.record(PathBuf::from("/app/tmp.ts"), FileChangeKind::Deleted);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_missing_app_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("app");
        let result = SourceWatcher::start(WatchFilter::new(vec![missing.clone()], Vec::new()));

        match result {
            Err(CompileError::WatchPathNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected WatchPathNotFound, got {:?}", other.map(|_| ())),
        }
    }
}
