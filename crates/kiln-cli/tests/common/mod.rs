//! Shared fixtures for the kiln-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kiln_compiler::{CompileError, Compiler, RebuildEvent, RebuildSender, WatchHandle};
use kiln_config::{BuildConfiguration, BuildMode, ConfigLoader};
use tempfile::TempDir;

/// A project laid out with the default directories and some build output.
pub struct Project {
    pub temp: TempDir,
    pub config: BuildConfiguration,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = BuildConfiguration::with_defaults(temp.path(), "true");

        fs::create_dir_all(&config.app_directory).unwrap();
        fs::create_dir_all(&config.server_output_directory).unwrap();
        fs::create_dir_all(config.assets_output_directory.join("_shared")).unwrap();
        fs::write(config.app_directory.join("root.tsx"), "export default 1").unwrap();
        fs::write(
            config.server_output_directory.join("index.html"),
            "<html><body>v1</body></html>",
        )
        .unwrap();
        fs::write(config.assets_output_directory.join("_shared/entry.js"), "1").unwrap();

        Self { temp, config }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn loader(&self) -> StaticLoader {
        StaticLoader(self.config.clone())
    }
}

/// Returns the same configuration for every root.
pub struct StaticLoader(pub BuildConfiguration);

impl ConfigLoader for StaticLoader {
    fn load(&self, _root: &Path) -> kiln_config::Result<BuildConfiguration> {
        Ok(self.0.clone())
    }
}

/// Compiler whose rebuild events are pushed by the test.
#[derive(Default)]
pub struct ScriptedCompiler {
    pub builds: AtomicUsize,
    pub watches: AtomicUsize,
    pub disposed: Arc<AtomicBool>,
    pub fail_initial_build: bool,
    sender: Arc<Mutex<Option<RebuildSender>>>,
}

impl ScriptedCompiler {
    pub fn failing_initial_build() -> Self {
        Self {
            fail_initial_build: true,
            ..Self::default()
        }
    }

    pub fn is_watching(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    pub fn emit(&self, event: RebuildEvent) {
        let sender = self.sender.lock().unwrap();
        sender
            .as_ref()
            .expect("watch has not started")
            .send(event)
            .expect("event stream closed");
    }

    /// End the rebuild stream as a compiler that stopped watching would.
    pub fn close_stream(&self) {
        self.sender.lock().unwrap().take();
    }

    pub async fn wait_until_watching(&self) {
        for _ in 0..500 {
            if self.is_watching() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("compiler never started watching");
    }
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    async fn build(&self, _config: &BuildConfiguration, _mode: BuildMode) -> Result<(), CompileError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn watch(
        &self,
        _config: &BuildConfiguration,
        _mode: BuildMode,
        events: RebuildSender,
    ) -> Result<WatchHandle, CompileError> {
        self.watches.fetch_add(1, Ordering::SeqCst);
        *self.sender.lock().unwrap() = Some(events);

        let initial_error = self
            .fail_initial_build
            .then(|| CompileError::Custom("initial build exploded".to_string()));
        let disposed = Arc::clone(&self.disposed);
        let sender = Arc::clone(&self.sender);
        Ok(WatchHandle::new(initial_error, move || {
            disposed.store(true, Ordering::SeqCst);
            sender.lock().unwrap().take();
        }))
    }
}

pub fn is_empty_dir(dir: &Path) -> bool {
    dir.is_dir() && fs::read_dir(dir).unwrap().next().is_none()
}
