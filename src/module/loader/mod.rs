//! Module loading system
//!
//! Runtime registry of module factories plus the loader that constructs and
//! initializes them in dependency order.

pub mod loader;
pub mod registry;

pub use loader::{LoadFailure, LoadReport, LoadedModule, ModuleLoader};
pub use registry::{ModuleFactory, ModuleRegistry};
