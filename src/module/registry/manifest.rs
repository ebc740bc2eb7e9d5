//! Module manifest parsing
//!
//! Handles parsing `module.toml` manifests. The manifest is data only: the
//! resolver never executes module code to learn a module's name or
//! dependencies.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::module::traits::ModuleError;

/// Module manifest (module.toml structure)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name (unique slug, graph node key)
    pub name: String,
    /// Module version
    #[serde(default = "default_version")]
    pub version: String,
    /// Human-readable name shown in the apps list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// One-line summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Application category (e.g. "Human Resources")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Module author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Modules that must be loaded before this one, in declared order
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Data models contributed by this module
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    /// Navigation menus contributed by this module
    #[serde(default)]
    pub menus: Vec<MenuDescriptor>,
    /// Routes contributed by this module
    #[serde(default)]
    pub routes: Vec<RouteDescriptor>,
    /// Whether an operator may install the module
    #[serde(default = "default_true")]
    pub installable: bool,
    /// Install automatically once all dependencies are installed
    #[serde(default)]
    pub auto_install: bool,
    /// Whether the module is a top-level application
    #[serde(default)]
    pub application: bool,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_true() -> bool {
    true
}

/// Data model contributed by a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Technical model name (e.g. "hr.employee")
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

/// Field of a contributed data model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    /// Target model for relational fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

fn default_field_type() -> String {
    "char".to_string()
}

/// Navigation menu entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuDescriptor {
    pub label: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Ordering key within the parent menu
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    /// Label of the parent menu, if nested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

fn default_sequence() -> u32 {
    10
}

/// Route contributed to the application surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// URL path, must start with '/'
    pub path: String,
    /// UI component rendered for the path
    pub component: String,
}

impl RouteDescriptor {
    pub fn new(path: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            component: component.into(),
        }
    }
}

impl ModuleManifest {
    /// Create a manifest with only a name and dependencies
    pub fn new<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            version: default_version(),
            display_name: None,
            summary: None,
            description: None,
            category: None,
            author: None,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            models: Vec::new(),
            menus: Vec::new(),
            routes: Vec::new(),
            installable: true,
            auto_install: false,
            application: false,
        }
    }

    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModuleError::InvalidManifest(format!(
                "Failed to read manifest file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse manifest from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ModuleError> {
        let mut manifest: ModuleManifest = toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })?;

        manifest.name = manifest.name.trim().to_string();
        if manifest.name.is_empty() {
            return Err(ModuleError::InvalidManifest(
                "Module name cannot be empty".to_string(),
            ));
        }

        for dep in manifest.dependencies.iter_mut() {
            *dep = dep.trim().to_string();
        }
        manifest.dependencies.retain(|d| !d.is_empty());

        Ok(manifest)
    }

    /// Serialize back to TOML (used by tooling that scaffolds modules)
    pub fn to_toml_string(&self) -> Result<String, ModuleError> {
        toml::to_string_pretty(self)
            .map_err(|e| ModuleError::SerializationError(format!("manifest TOML: {}", e)))
    }

    /// Name shown to users, falling back to the slug
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}
