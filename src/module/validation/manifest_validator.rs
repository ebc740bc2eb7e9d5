//! Manifest validation framework
//!
//! Lints module manifests for structure. Lint failures are reported as
//! diagnostics; only an unusable name keeps a module out of the graph.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::module::registry::manifest::ModuleManifest;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Manifest is valid
    Valid,
    /// Manifest is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Manifest validator
pub struct ManifestValidator {
    /// Longest accepted module name
    max_name_len: usize,
}

impl ManifestValidator {
    /// Create a new manifest validator
    pub fn new() -> Self {
        Self { max_name_len: 64 }
    }

    /// Validate a module manifest
    pub fn validate(&self, manifest: &ModuleManifest) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_name(&manifest.name) {
            errors.push(format!(
                "Invalid module name: {} (must be alphanumeric with dashes/underscores)",
                manifest.name
            ));
        }

        if manifest.version.is_empty() {
            errors.push("Module version cannot be empty".to_string());
        } else if !self.is_valid_version(&manifest.version) {
            errors.push(format!(
                "Invalid version format: {} (expected semantic versioning)",
                manifest.version
            ));
        }

        if let Err(dep_errors) = self.validate_dependencies(manifest) {
            errors.extend(dep_errors);
        }

        for route in &manifest.routes {
            if !route.path.starts_with('/') {
                errors.push(format!("Route path must start with '/': {}", route.path));
            }
            if route.component.trim().is_empty() {
                errors.push(format!("Route {} has no component", route.path));
            }
        }

        let mut model_names = HashSet::new();
        for model in &manifest.models {
            if !model_names.insert(model.name.as_str()) {
                errors.push(format!("Duplicate model: {}", model.name));
            }
        }

        if errors.is_empty() {
            debug!("Manifest validation passed for module: {}", manifest.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Manifest validation failed for module {}: {:?}",
                manifest.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    /// Validate module name format
    #[inline]
    pub fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        // Must start with alphanumeric
        if !name.chars().next().map_or(false, |c| c.is_alphanumeric()) {
            return false;
        }

        name.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    }

    /// Validate version format (semantic versioning)
    ///
    /// Accepts: major.minor[.patch][-prerelease][+build]
    #[inline]
    fn is_valid_version(&self, version: &str) -> bool {
        let base = version.split('+').next().unwrap_or_default();
        let version_part = base.split('-').next().unwrap_or_default();

        let nums: Vec<&str> = version_part.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return false;
        }

        nums.iter().all(|n| {
            !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n.parse::<u32>().is_ok()
        })
    }

    /// Validate dependency declarations
    fn validate_dependencies(&self, manifest: &ModuleManifest) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for dep_name in &manifest.dependencies {
            if !self.is_valid_name(dep_name) {
                errors.push(format!("Invalid dependency name: {}", dep_name));
            }
            if !seen.insert(dep_name.as_str()) {
                errors.push(format!("Dependency listed twice: {}", dep_name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new()
    }
}
