//! Module validation framework
//!
//! Structural lint for module manifests.

pub mod manifest_validator;

pub use manifest_validator::{ManifestValidator, ValidationResult};
