//! Module system traits and interfaces
//!
//! Defines the surface every addon exposes to the runtime loader and the
//! error type shared by the whole module subsystem.

use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::module::registry::manifest::{ModuleManifest, RouteDescriptor};

/// Runtime load state of a single module
///
/// `Pending -> Loading -> Loaded | LoadFailed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// Listed in the registry, not attempted yet
    Pending,
    /// Factory is running
    Loading,
    /// Constructed, validated and initialized
    Loaded,
    /// Construction, validation or initialization failed
    LoadFailed(String),
}

impl ModuleState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModuleState::Loaded)
    }
}

bitflags! {
    /// Optional lifecycle hooks an addon implements.
    ///
    /// Hooks that are not advertised here are never invoked by the loader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleHooks: u8 {
        const INITIALIZE = 0b0000_0001;
        const CLEANUP = 0b0000_0010;
        const ALL = Self::INITIALIZE.bits() | Self::CLEANUP.bits();
    }
}

/// UI component contributed by an addon to the application shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiComponent {
    /// Component identifier (e.g. "EmployeeList")
    pub name: String,
    /// Slot the component is mounted into (e.g. "sidebar", "dashboard")
    pub slot: String,
}

impl UiComponent {
    pub fn new(name: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: slot.into(),
        }
    }
}

/// Addon implementation surface
///
/// `manifest()` and `routes()` are mandatory. `initialize` and `cleanup`
/// are only called when advertised through `hooks()`.
#[async_trait]
pub trait Addon: Send + Sync {
    /// Manifest the addon was built from
    fn manifest(&self) -> &ModuleManifest;

    /// Routes contributed to the application surface
    fn routes(&self) -> Vec<RouteDescriptor>;

    /// UI components contributed to the application shell
    fn components(&self) -> Vec<UiComponent> {
        Vec::new()
    }

    /// Lifecycle hooks this addon implements
    fn hooks(&self) -> LifecycleHooks {
        LifecycleHooks::empty()
    }

    /// Called once after every dependency has been initialized
    async fn initialize(&mut self, _context: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called on shutdown, before any of this addon's dependencies
    async fn cleanup(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Context handed to an addon's `initialize` hook
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Unique id of this module instance
    pub module_id: String,
    /// Registry name of the module
    pub module_name: String,
    /// Position of the module in the load order
    pub load_index: usize,
    /// Module configuration (key-value pairs from config file)
    pub config: HashMap<String, String>,
}

impl ModuleContext {
    pub fn new(
        module_id: String,
        module_name: String,
        load_index: usize,
        config: HashMap<String, String>,
    ) -> Self {
        Self {
            module_id,
            module_name,
            load_index,
            config,
        }
    }

    /// Get a configuration value
    pub fn get_config(&self, key: &str) -> Option<&String> {
        self.config.get(key)
    }

    /// Get a configuration value with default
    pub fn get_config_or(&self, key: &str, default: &str) -> String {
        self.config
            .get(key)
            .map(|s| s.as_str())
            .unwrap_or(default)
            .to_string()
    }
}

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Modules directory not available: {0}")]
    ModulesDirUnavailable(String),

    #[error("Module operation failed: {0}")]
    OperationError(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Module export invalid: {0}")]
    InvalidExport(String),

    #[error("Module initialization failed: {0}")]
    InitializationError(String),

    #[error("Module cleanup failed: {0}")]
    CleanupError(String),

    #[error("Timeout waiting for module {0}")]
    Timeout(String),

    #[error("Module loading cancelled")]
    Cancelled,

    #[error("Strict mode: {} diagnostic(s) reported: {}", .0.len(), .0.join("; "))]
    StrictModeViolation(Vec<String>),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}
