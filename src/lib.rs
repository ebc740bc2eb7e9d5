//! Addon registry - dependency resolution and registry generation for
//! addon modules
//!
//! Each addon lives in its own directory with a data-only `module.toml`
//! manifest and an entry file. This crate:
//!
//! 1. Discovers manifests under a modules directory
//! 2. Builds the dependency graph and a dependency-first load order,
//!    reporting unknown dependencies and cycles instead of failing
//! 3. Generates a static registry (Rust source or JSON) the host imports
//! 4. Loads modules at runtime in that order, runs their lifecycle hooks
//!    and aggregates their routes and components
//!
//! ## Design Principles
//!
//! 1. **Manifests are data**: resolution never executes module code
//! 2. **Total ordering**: every included module appears exactly once
//! 3. **Failure isolation**: one broken module never stops the others
//! 4. **Deterministic output**: identical inputs produce identical artifacts

pub mod config;
pub mod module;
pub mod utils;

pub use config::{ArtifactFormat, LoaderConfig, LoggingConfig, ResolverConfig};
pub use module::{
    Addon, AppSurface, ModuleDependencies, ModuleError, ModuleManager, ModuleRegistry,
    RegistryGenerator, Resolution,
};
