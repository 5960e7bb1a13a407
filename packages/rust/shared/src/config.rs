//! Application configuration for manifestgen.
//!
//! User config lives at `~/.manifestgen/manifestgen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ManifestGenError, Result};
use crate::types::{
    DEFAULT_BASE_URL, DEFAULT_COMPONENTS, DEFAULT_MANIFEST_FILE, DEFAULT_NAMESPACE,
    DEFAULT_REGISTRY, Options, SourceLocator,
};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "manifestgen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".manifestgen";

/// Default release API root (GitHub REST API for the upstream repository).
pub const DEFAULT_API_URL: &str = "https://api.github.com/repos/fluxcd/flux2";

// ---------------------------------------------------------------------------
// Config structs (matching manifestgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Install defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Release API settings.
    #[serde(default)]
    pub release: ReleaseConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Target namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Release version or `latest`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Release root URL, or a local kustomization directory.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Output file name.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Logical path prefix for the rendered manifest.
    #[serde(default)]
    pub target_path: String,

    /// Fetch deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Components to install.
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    /// Additional components.
    #[serde(default)]
    pub components_extra: Vec<String>,

    /// Image registry.
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Whether to include network policies.
    #[serde(default = "default_true")]
    pub network_policy: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            version: default_version(),
            base_url: default_base_url(),
            manifest_file: default_manifest_file(),
            target_path: String::new(),
            timeout_secs: default_timeout_secs(),
            components: default_components(),
            components_extra: Vec::new(),
            registry: default_registry(),
            network_policy: true,
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}
fn default_version() -> String {
    "latest".into()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_components() -> Vec<String> {
    DEFAULT_COMPONENTS.iter().map(|c| (*c).to_string()).collect()
}
fn default_registry() -> String {
    DEFAULT_REGISTRY.into()
}
fn default_true() -> bool {
    true
}

/// `[release]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Root of the release-hosting API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

// ---------------------------------------------------------------------------
// Options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

impl TryFrom<&AppConfig> for Options {
    type Error = ManifestGenError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let d = &config.defaults;
        let source = SourceLocator::parse(&d.base_url, &d.version)?;
        Ok(Self {
            source,
            namespace: d.namespace.clone(),
            target_path: d.target_path.clone(),
            manifest_file: d.manifest_file.clone(),
            timeout: Duration::from_secs(d.timeout_secs),
            components: d.components.clone(),
            components_extra: d.components_extra.clone(),
            registry: d.registry.clone(),
            name_prefix: None,
            network_policy: d.network_policy,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.manifestgen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ManifestGenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.manifestgen/manifestgen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestGenError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ManifestGenError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ManifestGenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ManifestGenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ManifestGenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
