//! Module registry and discovery
//!
//! Handles module discovery, manifest parsing, dependency resolution and
//! reconciliation with persisted module records.

pub mod dependencies;
pub mod diagnostics;
pub mod discovery;
pub mod manifest;
pub mod records;
pub mod sort;

pub use dependencies::{DependencyGraph, ModuleDependencies, Resolution, ResolutionReport};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use discovery::{DiscoveredModule, DiscoveryReport, ModuleDiscovery};
pub use manifest::{
    FieldDescriptor, MenuDescriptor, ModelDescriptor, ModuleManifest, RouteDescriptor,
};
pub use records::{reconcile, JsonRecordStore, ModuleRecord, ModuleRecordStore, Reconciliation};
pub use sort::{topological_sort, SortOutcome};
