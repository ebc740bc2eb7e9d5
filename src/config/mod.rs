//! Configuration management for the addon registry
//!
//! Handles configuration loading for discovery, registry generation, the
//! runtime loader and logging. Files may be TOML or JSON (picked by
//! extension); CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::module::registry::discovery::{DEFAULT_ENTRY_FILE, DEFAULT_MANIFEST_FILE};
use crate::utils::DEFAULT_INIT_TIMEOUT;

/// Output format of the generated registry artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Rust source exposing `list_module_names()` / `load_module()` / `registry()`
    #[default]
    Rust,
    /// Data-only JSON listing
    Json,
}

impl ArtifactFormat {
    pub fn default_file_name(&self) -> &'static str {
        match self {
            ArtifactFormat::Rust => "registry.rs",
            ArtifactFormat::Json => "registry.json",
        }
    }
}

impl std::str::FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rust" | "rs" => Ok(ArtifactFormat::Rust),
            "json" => Ok(ArtifactFormat::Json),
            other => Err(format!("unknown artifact format: {}", other)),
        }
    }
}

/// Runtime loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Upper bound for a single `initialize` hook
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    /// Concurrent module constructions (1 = strictly sequential)
    #[serde(default = "default_max_parallel_loads")]
    pub max_parallel_loads: usize,
}

fn default_init_timeout_secs() -> u64 {
    DEFAULT_INIT_TIMEOUT.as_secs()
}

fn default_max_parallel_loads() -> usize {
    1
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: default_init_timeout_secs(),
            max_parallel_loads: default_max_parallel_loads(),
        }
    }
}

impl LoaderConfig {
    pub fn init_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.init_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "addon_registry=debug"); RUST_LOG wins
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Directory whose immediate subdirectories are modules
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    /// Manifest file name inside each module directory
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Entry-point file name inside each module directory
    #[serde(default = "default_entry_file")]
    pub entry_file: String,

    /// Where the registry artifact is written
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub format: ArtifactFormat,

    /// Rust path of the module that contains one submodule per addon
    #[serde(default = "default_addons_path")]
    pub addons_path: String,

    /// Treat every diagnostic as an error
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("addons")
}

fn default_manifest_file() -> String {
    DEFAULT_MANIFEST_FILE.to_string()
}

fn default_entry_file() -> String {
    DEFAULT_ENTRY_FILE.to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("src/generated/registry.rs")
}

fn default_addons_path() -> String {
    "crate::addons".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            modules_dir: default_modules_dir(),
            manifest_file: default_manifest_file(),
            entry_file: default_entry_file(),
            output: default_output(),
            format: ArtifactFormat::default(),
            addons_path: default_addons_path(),
            strict: false,
            loader: LoaderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from a TOML or JSON file (by extension)
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ResolverConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ResolverConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.modules_dir, PathBuf::from("addons"));
        assert_eq!(config.manifest_file, "module.toml");
        assert_eq!(config.entry_file, "mod.rs");
        assert_eq!(config.format, ArtifactFormat::Rust);
        assert_eq!(config.loader.max_parallel_loads, 1);
        assert_eq!(config.loader.init_timeout(), DEFAULT_INIT_TIMEOUT);
        assert!(!config.strict);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ResolverConfig = toml::from_str(
            r#"
modules_dir = "erp/addons"
format = "json"

[loader]
init_timeout_secs = 5
"#,
        )
        .unwrap();
        assert_eq!(config.modules_dir, PathBuf::from("erp/addons"));
        assert_eq!(config.format, ArtifactFormat::Json);
        assert_eq!(config.loader.init_timeout_secs, 5);
        assert_eq!(config.loader.max_parallel_loads, 1);
        assert_eq!(config.addons_path, "crate::addons");
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        let mut config = ResolverConfig::default();
        config.strict = true;
        config.logging.filter = Some("debug".to_string());

        config.to_json_file(&path).unwrap();
        assert_eq!(ResolverConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("RS".parse::<ArtifactFormat>().unwrap(), ArtifactFormat::Rust);
        assert_eq!("json".parse::<ArtifactFormat>().unwrap(), ArtifactFormat::Json);
        assert!("yaml".parse::<ArtifactFormat>().is_err());
    }
}
