//! Raw project settings and the resolved build configuration.
//!
//! [`ProjectConfig`] is what users write (relative paths, optional
//! command). [`BuildConfiguration`] is what the rest of kiln consumes: every
//! directory absolute, every required field present.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Project settings as written in `kiln.toml` or the `kiln` field of
/// `package.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Source tree the compiler reads and the watcher observes.
    pub app_directory: PathBuf,

    /// Where browser assets are written.
    pub assets_build_directory: PathBuf,

    /// Where server build output is written.
    pub server_build_directory: PathBuf,

    /// URL prefix the assets directory is served under.
    pub public_path: String,

    pub build: BuildSection,

    pub watch: WatchSection,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            app_directory: default_app_directory(),
            assets_build_directory: default_assets_build_directory(),
            server_build_directory: default_server_build_directory(),
            public_path: default_public_path(),
            build: BuildSection::default(),
            watch: WatchSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Shell command that compiles the app into the output directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Patterns to ignore: `*.ext` suffixes or path segments.
    pub ignore: Vec<String>,

    /// Quiet period before a batch of changes triggers a rebuild.
    pub debounce_ms: u64,

    /// Extra directories to watch besides the app directory.
    pub paths: Vec<PathBuf>,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            ignore: default_watch_ignore(),
            debounce_ms: default_debounce_ms(),
            paths: Vec::new(),
        }
    }
}

/// Watch settings with every path resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub ignore: Vec<String>,
    pub debounce_ms: u64,
    pub paths: Vec<PathBuf>,
}

/// Fully resolved configuration for one kiln invocation.
///
/// Every directory is absolute. The value is not mutated after it has been
/// loaded; commands that share it clone it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub root_directory: PathBuf,
    pub app_directory: PathBuf,
    pub assets_output_directory: PathBuf,
    pub server_output_directory: PathBuf,
    pub public_path: String,
    pub build_command: String,
    pub watch: WatchSettings,
}

impl BuildConfiguration {
    /// Resolve raw project settings against an absolute project root.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` when no build command is set and
    /// `ConfigError::InvalidValue` for a malformed public path.
    pub fn resolve(root: &Path, project: ProjectConfig) -> Result<Self> {
        let build_command = project
            .build
            .command
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "build.command".to_string(),
                hint: "Add a [build] section with `command = \"...\"` to kiln.toml".to_string(),
            })?;

        let public_path = normalize_public_path(&project.public_path)?;

        Ok(Self {
            root_directory: root.to_path_buf(),
            app_directory: resolve_path(root, &project.app_directory),
            assets_output_directory: resolve_path(root, &project.assets_build_directory),
            server_output_directory: resolve_path(root, &project.server_build_directory),
            public_path,
            build_command,
            watch: WatchSettings {
                ignore: project.watch.ignore,
                debounce_ms: project.watch.debounce_ms,
                paths: project
                    .watch
                    .paths
                    .iter()
                    .map(|p| resolve_path(root, p))
                    .collect(),
            },
        })
    }

    /// Convenience constructor using the default layout under `root`.
    pub fn with_defaults(root: impl Into<PathBuf>, build_command: impl Into<String>) -> Self {
        let root = root.into();
        let defaults = ProjectConfig::default();
        Self {
            app_directory: resolve_path(&root, &defaults.app_directory),
            assets_output_directory: resolve_path(&root, &defaults.assets_build_directory),
            server_output_directory: resolve_path(&root, &defaults.server_build_directory),
            public_path: defaults.public_path,
            build_command: build_command.into(),
            watch: WatchSettings {
                ignore: defaults.watch.ignore,
                debounce_ms: defaults.watch.debounce_ms,
                paths: Vec::new(),
            },
            root_directory: root,
        }
    }

    /// Every directory the watcher should observe.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.app_directory.clone()];
        for path in &self.watch.paths {
            if !roots.contains(path) {
                roots.push(path.clone());
            }
        }
        roots
    }

    /// Directories the compiler writes to.
    pub fn output_directories(&self) -> [&Path; 2] {
        [
            self.assets_output_directory.as_path(),
            self.server_output_directory.as_path(),
        ]
    }
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf().clean()
    } else {
        root.join(path).clean()
    }
}

fn normalize_public_path(raw: &str) -> Result<String> {
    if !raw.starts_with('/') {
        return Err(ConfigError::InvalidValue {
            field: "public_path".to_string(),
            hint: Some(format!("Public path must start with '/', got '{}'", raw)),
        });
    }
    if raw.ends_with('/') {
        Ok(raw.to_string())
    } else {
        Ok(format!("{}/", raw))
    }
}

pub fn default_app_directory() -> PathBuf {
    PathBuf::from("app")
}

pub fn default_assets_build_directory() -> PathBuf {
    PathBuf::from("public/build")
}

pub fn default_server_build_directory() -> PathBuf {
    PathBuf::from("build")
}

pub fn default_public_path() -> String {
    "/build/".to_string()
}

pub fn default_debounce_ms() -> u64 {
    100
}

pub fn default_watch_ignore() -> Vec<String> {
    vec!["node_modules".to_string(), "*.log".to_string()]
}
