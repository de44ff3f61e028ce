//! Cache of loaded server output.
//!
//! The application server reads built files through a [`ModuleRegistry`], so
//! a file is read from disk once and then served from memory. After a rebuild
//! starts, [`purge`] evicts everything under the server output directory so
//! the next request loads the fresh build.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

/// One cached file.
#[derive(Debug)]
pub struct LoadedModule {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    /// MIME type derived from the file extension
    pub content_type: &'static str,
    pub loaded_at: SystemTime,
}

impl LoadedModule {
    fn new(path: PathBuf, contents: Vec<u8>) -> Self {
        Self {
            content_type: content_type_for(&path),
            path,
            contents,
            loaded_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<PathBuf, Arc<LoadedModule>>>,
    /// Bumped by every invalidation. A read that overlaps one is not cached.
    generation: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached module for `path`, reading and caching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read; nothing is cached.
    /// If an invalidation ran while the file was being read, the contents
    /// are returned but not cached, since they may predate the rebuild.
    pub async fn load(&self, path: &Path) -> std::io::Result<Arc<LoadedModule>> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(module) = self.get(path) {
            return Ok(module);
        }

        let contents = tokio::fs::read(path).await?;
        let module = Arc::new(LoadedModule::new(path.to_path_buf(), contents));

        let mut modules = self.modules.write();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(path = %path.display(), "Registry purged during read, not caching");
            return Ok(module);
        }
        // A concurrent load may have won; keep whichever landed first
        let entry = modules
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::clone(&module));
        Ok(Arc::clone(entry))
    }

    pub fn get(&self, path: &Path) -> Option<Arc<LoadedModule>> {
        self.modules.read().get(path).cloned()
    }

    /// Cache `contents` for `path`, replacing any previous entry.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: Vec<u8>) -> Arc<LoadedModule> {
        let path = path.into();
        let module = Arc::new(LoadedModule::new(path.clone(), contents));
        self.modules.write().insert(path, Arc::clone(&module));
        module
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.modules.read().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// Evict every entry whose path, as a string, starts with `prefix`.
    ///
    /// This is a plain string comparison: `/app/build` also matches
    /// `/app/build-old/x.js`.
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut modules = self.modules.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = modules.len();
        modules.retain(|path, _| !path.to_string_lossy().starts_with(prefix));
        before - modules.len()
    }
}

/// Evict all cached server output under `server_output_directory`.
pub fn purge(registry: &ModuleRegistry, server_output_directory: &Path) -> usize {
    let removed = registry.invalidate_prefix(&server_output_directory.to_string_lossy());
    tracing::debug!(
        removed,
        dir = %server_output_directory.display(),
        "Purged module registry"
    );
    removed
}

/// MIME type served for a file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

    match extension {
        "html" => "text/html; charset=utf-8",
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "css" => "text/css",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
