//! Addon module system
//!
//! Build step: discover module manifests, build the dependency graph,
//! compute a load order and generate the static registry. Runtime: load
//! modules from the registry, run their lifecycle hooks and aggregate
//! their routes and components into one application surface.

pub mod api;
pub mod codegen;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod traits;
pub mod validation;

pub use api::{AppSurface, SurfaceWarning};
pub use codegen::RegistryGenerator;
pub use loader::{LoadReport, ModuleFactory, ModuleLoader, ModuleRegistry};
pub use manager::ModuleManager;
pub use registry::{
    Diagnostic, ModuleDependencies, ModuleDiscovery, ModuleManifest, Resolution,
};
pub use traits::{Addon, LifecycleHooks, ModuleContext, ModuleError, ModuleState, UiComponent};
