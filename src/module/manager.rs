//! Module manager for orchestrating all modules
//!
//! Handles the application-level lifecycle: load and initialize every
//! registered module, expose the aggregated surface, and clean up in
//! reverse load order on shutdown.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::LoaderConfig;
use crate::module::api::surface::AppSurface;
use crate::module::loader::{LoadFailure, LoadedModule, ModuleLoader, ModuleRegistry};
use crate::module::traits::{LifecycleHooks, ModuleError, ModuleState};
use crate::utils::with_cleanup_timeout;

/// Module manager coordinates all loaded modules
pub struct ModuleManager {
    registry: ModuleRegistry,
    loader: ModuleLoader,
    /// Loaded modules in load order
    modules: Vec<LoadedModule>,
    states: BTreeMap<String, ModuleState>,
    failures: Vec<LoadFailure>,
    surface: AppSurface,
    started: bool,
}

impl ModuleManager {
    /// Create a new module manager
    pub fn new(registry: ModuleRegistry, config: LoaderConfig) -> Self {
        Self::with_loader(registry, ModuleLoader::new(config))
    }

    /// Create a manager around a preconfigured loader
    pub fn with_loader(registry: ModuleRegistry, loader: ModuleLoader) -> Self {
        let states = registry
            .list_module_names()
            .iter()
            .map(|name| (name.clone(), ModuleState::Pending))
            .collect();
        Self {
            registry,
            loader,
            modules: Vec::new(),
            states,
            failures: Vec::new(),
            surface: AppSurface::new(),
            started: false,
        }
    }

    /// Load and initialize all modules, then build the surface.
    ///
    /// Individual module failures are recorded, never returned; the only
    /// error is calling `start` twice without `shutdown`.
    pub async fn start(&mut self) -> Result<&AppSurface, ModuleError> {
        if self.started {
            return Err(ModuleError::OperationError(
                "module manager already started".to_string(),
            ));
        }
        info!("Starting module manager");

        let report = self.loader.load_all(&self.registry).await;
        if report.cancelled {
            warn!("Module loading was cancelled");
        }

        self.surface = AppSurface::aggregate(&report.loaded);
        self.modules = report.loaded;
        self.states = report.states;
        self.failures = report.failures;
        self.started = true;

        info!(
            "Module manager started: {} loaded, {} failed",
            self.modules.len(),
            self.failures.len()
        );
        Ok(&self.surface)
    }

    /// Run `cleanup` hooks in reverse load order and drop all modules.
    ///
    /// Cleanup failures and timeouts are logged; every module still gets
    /// its turn.
    pub async fn shutdown(&mut self) -> Result<(), ModuleError> {
        info!("Shutting down module manager");

        while let Some(LoadedModule { name, mut addon, .. }) = self.modules.pop() {
            if !addon.hooks().contains(LifecycleHooks::CLEANUP) {
                continue;
            }
            // A panicking hook only ends its own task
            let task = tokio::spawn(async move { addon.cleanup().await });
            let abort = task.abort_handle();
            match with_cleanup_timeout(task).await {
                Ok(Ok(Ok(()))) => info!("Module {} cleaned up", name),
                Ok(Ok(Err(e))) => warn!("Error cleaning up module {}: {}", name, e),
                Ok(Err(e)) => warn!("Cleanup task for module {} failed: {}", name, e),
                Err(_) => {
                    abort.abort();
                    warn!("Timeout cleaning up module {}", name);
                }
            }
        }

        self.surface = AppSurface::new();
        for state in self.states.values_mut() {
            *state = ModuleState::Pending;
        }
        self.started = false;

        info!("Module manager shut down");
        Ok(())
    }

    pub fn surface(&self) -> &AppSurface {
        &self.surface
    }

    /// Names of loaded modules in load order
    pub fn loaded_module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn state_of(&self, name: &str) -> Option<&ModuleState> {
        self.states.get(name)
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Token that stops an in-progress `start`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.loader.cancellation_token()
    }
}
