//! Module discovery
//!
//! Scans the modules root and reads the manifest of every immediate
//! subdirectory that looks like a module (manifest file + entry-point file).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::module::registry::diagnostics::{Diagnostic, DiagnosticKind};
use crate::module::registry::manifest::ModuleManifest;
use crate::module::traits::ModuleError;
use crate::module::validation::{ManifestValidator, ValidationResult};

/// Default manifest file name inside a module directory
pub const DEFAULT_MANIFEST_FILE: &str = "module.toml";
/// Default entry-point file name inside a module directory
pub const DEFAULT_ENTRY_FILE: &str = "mod.rs";

/// Discovered module information
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    /// Module directory path
    pub directory: PathBuf,
    /// Module manifest
    pub manifest: ModuleManifest,
    /// Path to the module entry point
    pub entry_point: PathBuf,
}

/// Result of a scan: usable modules plus everything worth reporting
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Modules in directory-name order
    pub modules: Vec<DiscoveredModule>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DiscoveryReport {
    /// Diagnostics that kept a directory out of the resolved set
    pub fn excluded(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.excludes_module())
    }
}

/// Module discovery scanner
pub struct ModuleDiscovery {
    /// Base directory to scan for modules
    modules_dir: PathBuf,
    manifest_file: String,
    entry_file: String,
    validator: ManifestValidator,
}

impl ModuleDiscovery {
    /// Create a new module discovery scanner
    pub fn new<P: AsRef<Path>>(modules_dir: P) -> Self {
        Self {
            modules_dir: modules_dir.as_ref().to_path_buf(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
            validator: ManifestValidator::new(),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(&config.modules_dir)
            .with_manifest_file(&config.manifest_file)
            .with_entry_file(&config.entry_file)
    }

    pub fn with_manifest_file(mut self, file_name: impl Into<String>) -> Self {
        self.manifest_file = file_name.into();
        self
    }

    pub fn with_entry_file(mut self, file_name: impl Into<String>) -> Self {
        self.entry_file = file_name.into();
        self
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Discover all modules in the modules directory
    ///
    /// Only a missing or unreadable root is fatal. Anything wrong with a
    /// single module directory excludes just that directory and is recorded
    /// in the report.
    pub fn discover_modules(&self) -> Result<DiscoveryReport, ModuleError> {
        info!("Discovering modules in {:?}", self.modules_dir);

        if !self.modules_dir.is_dir() {
            return Err(ModuleError::ModulesDirUnavailable(format!(
                "{} does not exist or is not a directory",
                self.modules_dir.display()
            )));
        }

        let entries = fs::read_dir(&self.modules_dir).map_err(|e| {
            ModuleError::ModulesDirUnavailable(format!(
                "Failed to read {}: {}",
                self.modules_dir.display(),
                e
            ))
        })?;

        let mut directories = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_dir() && !is_hidden(&path) {
                        directories.push(path);
                    }
                }
                Err(e) => warn!("Failed to read directory entry: {}", e),
            }
        }
        // read_dir order is platform dependent
        directories.sort();

        let mut report = DiscoveryReport::default();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for path in directories {
            let dir_name = dir_label(&path);
            let discovered = match self.read_module_dir(&path, &dir_name) {
                Ok(Some(module)) => module,
                Ok(None) => continue,
                Err(diagnostic) => {
                    warn!("Excluding {}: {}", path.display(), diagnostic);
                    report.diagnostics.push(diagnostic);
                    continue;
                }
            };

            let name = discovered.manifest.name.clone();
            if let Some(kept) = seen.get(&name) {
                let diagnostic = Diagnostic::error(
                    name.clone(),
                    DiagnosticKind::DuplicateModule {
                        directory: path.display().to_string(),
                        kept: kept.display().to_string(),
                    },
                );
                warn!("{}", diagnostic);
                report.diagnostics.push(diagnostic);
                continue;
            }

            match self.validator.validate(&discovered.manifest) {
                ValidationResult::Valid => {}
                ValidationResult::Invalid(errors) => {
                    let invalid_name = !self.validator.is_valid_name(&name);
                    let kind = DiagnosticKind::InvalidManifest { errors };
                    if invalid_name {
                        report.diagnostics.push(Diagnostic::error(name, kind));
                        continue;
                    }
                    report.diagnostics.push(Diagnostic::warning(name.clone(), kind));
                }
            }

            debug!(
                "Discovered module {} v{} in {:?}",
                name, discovered.manifest.version, discovered.directory
            );
            seen.insert(name, path);
            report.modules.push(discovered);
        }

        info!(
            "Discovered {} modules ({} excluded)",
            report.modules.len(),
            report.excluded().count()
        );
        Ok(report)
    }

    /// Discover a specific module by directory name
    pub fn discover_module(&self, module_dir_name: &str) -> Result<DiscoveredModule, ModuleError> {
        let module_dir = self.modules_dir.join(module_dir_name);
        match self.read_module_dir(&module_dir, module_dir_name) {
            Ok(Some(module)) => Ok(module),
            Ok(None) => Err(ModuleError::ModuleNotFound(format!(
                "{} (no {} in {:?})",
                module_dir_name, self.manifest_file, module_dir
            ))),
            Err(diagnostic) => Err(ModuleError::InvalidManifest(diagnostic.to_string())),
        }
    }

    /// Read one candidate directory.
    ///
    /// `Ok(None)` means the directory is not a module at all.
    fn read_module_dir(
        &self,
        path: &Path,
        dir_name: &str,
    ) -> Result<Option<DiscoveredModule>, Diagnostic> {
        let manifest_path = path.join(&self.manifest_file);
        let entry_point = path.join(&self.entry_file);

        match (manifest_path.is_file(), entry_point.is_file()) {
            (false, false) => {
                debug!("No {} found in {:?}, skipping", self.manifest_file, path);
                Ok(None)
            }
            (true, false) => Err(Diagnostic::error(
                dir_name,
                DiagnosticKind::MissingEntryPoint {
                    expected: entry_point.display().to_string(),
                },
            )),
            (false, true) => Err(Diagnostic::error(
                dir_name,
                DiagnosticKind::MissingManifest {
                    expected: manifest_path.display().to_string(),
                },
            )),
            (true, true) => {
                let manifest = ModuleManifest::from_file(&manifest_path).map_err(|e| {
                    Diagnostic::error(
                        dir_name,
                        DiagnosticKind::MalformedManifest {
                            reason: e.to_string(),
                        },
                    )
                })?;
                Ok(Some(DiscoveredModule {
                    directory: path.to_path_buf(),
                    manifest,
                    entry_point,
                }))
            }
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}

fn dir_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_module(root: &Path, dir: &str, manifest: Option<&str>, entry: bool) {
        let module_dir = root.join(dir);
        fs::create_dir_all(&module_dir).unwrap();
        if let Some(manifest) = manifest {
            fs::write(module_dir.join(DEFAULT_MANIFEST_FILE), manifest).unwrap();
        }
        if entry {
            fs::write(module_dir.join(DEFAULT_ENTRY_FILE), "// entry\n").unwrap();
        }
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let discovery = ModuleDiscovery::new(temp.path().join("absent"));
        assert!(matches!(
            discovery.discover_modules(),
            Err(ModuleError::ModulesDirUnavailable(_))
        ));
    }

    #[test]
    fn test_valid_module_predicate() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "base", Some(r#"name = "base""#), true);
        write_module(temp.path(), "no_entry", Some(r#"name = "no_entry""#), false);
        write_module(temp.path(), "no_manifest", None, true);
        write_module(temp.path(), "assets", None, false);
        write_module(temp.path(), ".git", Some(r#"name = "git""#), true);
        fs::write(temp.path().join("README.md"), "not a module").unwrap();

        let report = ModuleDiscovery::new(temp.path()).discover_modules().unwrap();

        let names: Vec<_> = report.modules.iter().map(|m| m.manifest.name.as_str()).collect();
        assert_eq!(names, vec!["base"]);
        assert_eq!(report.excluded().count(), 2);
        assert!(report.diagnostics.iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::MissingEntryPoint { .. }
        ) && d.module.as_deref() == Some("no_entry")));
        assert!(report.diagnostics.iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::MissingManifest { .. }
        ) && d.module.as_deref() == Some("no_manifest")));
    }

    #[test]
    fn test_malformed_manifest_does_not_abort_scan() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "a_broken", Some("name = [oops"), true);
        write_module(temp.path(), "b_nameless", Some(r#"version = "1.0.0""#), true);
        write_module(temp.path(), "c_good", Some(r#"name = "good""#), true);

        let report = ModuleDiscovery::new(temp.path()).discover_modules().unwrap();

        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].manifest.name, "good");
        let malformed: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| matches!(d.kind, DiagnosticKind::MalformedManifest { .. }))
            .collect();
        assert_eq!(malformed.len(), 2);
    }

    #[test]
    fn test_duplicate_name_keeps_first_directory() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "crm", Some(r#"name = "crm""#), true);
        write_module(temp.path(), "crm_copy", Some(r#"name = "crm""#), true);

        let report = ModuleDiscovery::new(temp.path()).discover_modules().unwrap();

        assert_eq!(report.modules.len(), 1);
        assert!(report.modules[0].directory.ends_with("crm"));
        assert!(matches!(
            report.diagnostics[0].kind,
            DiagnosticKind::DuplicateModule { .. }
        ));
    }

    #[test]
    fn test_lint_failures_warn_but_invalid_names_exclude() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "odd", Some("name = \"odd\"\nversion = \"one\""), true);
        write_module(temp.path(), "spaced", Some(r#"name = "has space""#), true);

        let report = ModuleDiscovery::new(temp.path()).discover_modules().unwrap();

        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].manifest.name, "odd");
        assert_eq!(report.excluded().count(), 1);
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[test]
    fn test_custom_file_names() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("stock");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("addon.toml"), r#"name = "stock""#).unwrap();
        fs::write(dir.join("lib.rs"), "").unwrap();

        let discovery = ModuleDiscovery::new(temp.path())
            .with_manifest_file("addon.toml")
            .with_entry_file("lib.rs");
        let module = discovery.discover_module("stock").unwrap();
        assert_eq!(module.manifest.name, "stock");
        assert!(module.entry_point.ends_with("lib.rs"));
    }
}
