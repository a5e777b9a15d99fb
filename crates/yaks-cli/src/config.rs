//! Run configuration loaded from `yaks-config.yaml`.
//!
//! The configuration is looked up next to the test source: inside the
//! directory for a group run, in the containing directory for a single file.
//! A missing file yields defaults.
//!
//! ```yaml
//! config:
//!   namespace:
//!     temporary: true
//!   runtime:
//!     cucumber:
//!       tags: ["@smoke"]
//! pre:
//!   - run: kubectl apply -f infra.yaml
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use yaks_common::DEFAULT_TIMEOUT;

use crate::{Error, Result};

/// File name of the run configuration
pub const CONFIG_FILE: &str = "yaks-config.yaml";

/// Suffix of the test sources picked up by a group run
pub const FEATURE_SUFFIX: &str = ".feature";

fn default_true() -> bool {
    true
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

/// Configuration of one source or directory of sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Directory relative paths are resolved against, defaults to the source directory
    #[serde(default)]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub config: Config,
    /// Steps run before the tests
    #[serde(default)]
    pub pre: Vec<StepConfig>,
    /// Steps run after the tests, whatever their outcome
    #[serde(default)]
    pub post: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Descend into subdirectories of a group run
    #[serde(default)]
    pub recursive: bool,
    /// Wait timeout of each test as a duration string (e.g. `30m`)
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub namespace: NamespaceConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursive: false,
            timeout: default_timeout(),
            namespace: NamespaceConfig::default(),
            operator: OperatorConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceConfig {
    /// Target namespace, empty means the invocation's namespace
    #[serde(default)]
    pub name: String,
    /// Run in a freshly created namespace
    #[serde(default)]
    pub temporary: bool,
    /// Delete the temporary namespace once the run waited for its tests
    #[serde(default = "default_true")]
    pub auto_remove: bool,
    #[serde(default)]
    pub recursive: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            temporary: false,
            auto_remove: true,
            recursive: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Role manifests applied next to a namespace-local operator
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Files mounted into the test runtime
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvConfig>,
    /// Secret whose entries are exposed to the test runtime
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub selenium: SeleniumConfig,
    #[serde(default, rename = "testcontainers")]
    pub test_containers: TestContainersConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub cucumber: CucumberConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeleniumConfig {
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestContainersConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Runtime settings rendered into `yaks.settings.yaml` when non-empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loggers: Vec<LoggerConfig>,
}

impl SettingsConfig {
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty() && self.dependencies.is_empty() && self.loggers.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyConfig {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releases: Option<RepositoryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<RepositoryPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update_policy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub name: String,
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CucumberConfig {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub glue: Vec<String>,
    #[serde(default)]
    pub options: String,
}

/// A pre or post step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub name: String,
    /// Path of a script to execute
    #[serde(default)]
    pub script: String,
    /// Inline commands, run as a bash script
    #[serde(default)]
    pub run: String,
    /// Conjunction of `os=<name>`, `env:<NAME>` and `env:<NAME>=<value>` clauses
    #[serde(default, rename = "if")]
    pub condition: String,
    #[serde(default)]
    pub timeout: String,
}

impl RunConfig {
    /// Load a configuration file, returning defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no run configuration found, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Whether a group run descends into subdirectories
    pub fn is_recursive(&self) -> bool {
        self.config.recursive || self.config.namespace.recursive
    }

    /// Namespace the tests of this configuration run in
    pub fn namespace(&self) -> &str {
        &self.config.namespace.name
    }

    /// Resolve a configured file against the base directory
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// Location of the configuration governing `source`
pub fn config_file_for(source: &Path) -> PathBuf {
    base_dir_of(source).join(CONFIG_FILE)
}

/// Directory of a source: the source itself for a directory, else its parent
pub fn base_dir_of(source: &Path) -> PathBuf {
    if source.is_dir() {
        return source.to_path_buf();
    }
    match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Load the configuration nearest to `source`.
///
/// Fills the base directory when unset and lets a non-temporary configuration
/// without namespace inherit `default_namespace`.
pub fn load_run_config(source: &Path, default_namespace: &str) -> Result<RunConfig> {
    let mut config = RunConfig::load(&config_file_for(source))?;

    if config.base_dir.as_os_str().is_empty() {
        config.base_dir = base_dir_of(source);
    }

    let namespace = &mut config.config.namespace;
    if namespace.name.is_empty() && !namespace.temporary {
        namespace.name = default_namespace.to_string();
    }

    Ok(config)
}
