//! File-based config discovery.
//!
//! Looks for settings in the project root and merges them over the defaults:
//!
//! 1. built-in defaults
//! 2. the `kiln` field of `package.json`
//! 3. `kiln.toml`
//! 4. `KILN_*` environment variables (`KILN_BUILD__COMMAND`, ...)

use std::fs;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde_json::Value;

use crate::config::{BuildConfiguration, ProjectConfig};
use crate::error::{ConfigError, Result};

pub const CONFIG_FILE_NAME: &str = "kiln.toml";
pub const PACKAGE_JSON_FIELD: &str = "kiln";
pub const ENV_PREFIX: &str = "KILN_";

/// Resolves a project root into a [`BuildConfiguration`].
///
/// Commands receive a loader instead of calling [`load_config`] directly so
/// tests can hand them a ready-made configuration.
pub trait ConfigLoader: Send + Sync {
    fn load(&self, root: &Path) -> Result<BuildConfiguration>;
}

/// Loader backed by the project's config files and environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileConfigLoader;

impl ConfigLoader for FileConfigLoader {
    fn load(&self, root: &Path) -> Result<BuildConfiguration> {
        load_config(root)
    }
}

/// Load and resolve the configuration for the project at `root`.
///
/// # Errors
///
/// Fails when `root` does not exist or is not a directory, when a config
/// source cannot be parsed, or when a required field is missing.
pub fn load_config(root: &Path) -> Result<BuildConfiguration> {
    let root = resolve_root(root)?;
    let project = ConfigDiscovery::new(&root).load()?;
    let config = BuildConfiguration::resolve(&root, project)?;

    tracing::debug!(
        root = %config.root_directory.display(),
        assets = %config.assets_output_directory.display(),
        server = %config.server_output_directory.display(),
        "Resolved build configuration"
    );

    Ok(config)
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(ConfigError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ConfigError::NotADirectory(root.to_path_buf()));
    }
    Ok(root.canonicalize()?)
}

/// Finds and merges the config sources of one project root.
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of `kiln.toml` if the project has one.
    pub fn find_toml(&self) -> Option<PathBuf> {
        let path = self.root.join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }

    /// The `kiln` object from `package.json`, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `package.json` is not valid
    /// JSON or the `kiln` field is not an object.
    pub fn package_json_settings(&self) -> Result<Option<Value>> {
        let path = self.root.join("package.json");
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: "package.json".to_string(),
                hint: Some(format!("Invalid JSON: {}", e)),
            })?;

        match parsed.get(PACKAGE_JSON_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(value @ Value::Object(_)) => Ok(Some(value.clone())),
            Some(_) => Err(ConfigError::InvalidValue {
                field: PACKAGE_JSON_FIELD.to_string(),
                hint: Some("The 'kiln' field in package.json must be an object".to_string()),
            }),
        }
    }

    /// Build the layered figment for this root.
    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(ProjectConfig::default()));

        if let Some(settings) = self.package_json_settings()? {
            figment = figment.merge(Serialized::defaults(settings));
        }

        if let Some(path) = self.find_toml() {
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load the merged, unresolved project settings.
    pub fn load(&self) -> Result<ProjectConfig> {
        self.figment()?.extract().map_err(|e| ConfigError::InvalidValue {
            field: if e.path.is_empty() {
                "config".to_string()
            } else {
                e.path.join(".")
            },
            hint: Some(e.to_string()),
        })
    }
}
