//! Installed-module records
//!
//! Mirrors the per-module rows kept by the application database. The
//! resolver only reads them, to reconcile declared modules with what an
//! operator actually installed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::module::registry::dependencies::Resolution;
use crate::module::traits::ModuleError;

/// One persisted module row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub installed: bool,
    #[serde(default = "default_true")]
    pub installable: bool,
    #[serde(default)]
    pub application: bool,
    #[serde(default)]
    pub auto_install: bool,
    /// JSON array of dependency names, as stored
    #[serde(default = "empty_json_array")]
    pub dependencies: String,
    /// JSON array of model descriptors, as stored
    #[serde(default = "empty_json_array")]
    pub models: String,
    /// RFC 3339 install timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

fn default_true() -> bool {
    true
}

fn empty_json_array() -> String {
    "[]".to_string()
}

impl ModuleRecord {
    /// Decode the stored dependency list
    pub fn dependency_names(&self) -> Result<Vec<String>, ModuleError> {
        Ok(serde_json::from_str(&self.dependencies)?)
    }
}

/// Read access to persisted module records
pub trait ModuleRecordStore {
    fn records(&self) -> Result<Vec<ModuleRecord>, ModuleError>;
}

/// Records kept in a JSON file (an array of [`ModuleRecord`])
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ModuleRecordStore for JsonRecordStore {
    fn records(&self) -> Result<Vec<ModuleRecord>, ModuleError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ModuleError::OperationError(format!(
                "Failed to read module records {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let records: Vec<ModuleRecord> = serde_json::from_str(&contents)?;
        debug!("Read {} module records from {:?}", records.len(), self.path);
        Ok(records)
    }
}

/// Difference between declared modules and persisted records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reconciliation {
    /// Declared on disk, no installed record
    NotInstalled { module: String },
    /// Installed record for a module no longer declared
    Orphaned { module: String },
    /// Stored dependency list differs from the manifest
    DependencyDrift {
        module: String,
        recorded: Vec<String>,
        declared: Vec<String>,
    },
    /// Installed module whose declared dependency is not installed
    MissingInstalledDependency { module: String, dependency: String },
    /// `auto_install` module whose dependencies are all installed
    AutoInstallCandidate { module: String },
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reconciliation::NotInstalled { module } => write!(f, "{}: not installed", module),
            Reconciliation::Orphaned { module } => {
                write!(f, "{}: installed but no longer declared", module)
            }
            Reconciliation::DependencyDrift {
                module,
                recorded,
                declared,
            } => write!(
                f,
                "{}: recorded dependencies [{}] differ from manifest [{}]",
                module,
                recorded.join(", "),
                declared.join(", ")
            ),
            Reconciliation::MissingInstalledDependency { module, dependency } => {
                write!(f, "{}: dependency {} is not installed", module, dependency)
            }
            Reconciliation::AutoInstallCandidate { module } => {
                write!(f, "{}: ready for automatic install", module)
            }
        }
    }
}

/// Compare a resolution with persisted records.
///
/// Results follow load order for declared modules, then record name order
/// for orphans.
pub fn reconcile(resolution: &Resolution, records: &[ModuleRecord]) -> Vec<Reconciliation> {
    let by_name: BTreeMap<&str, &ModuleRecord> =
        records.iter().map(|r| (r.name.as_str(), r)).collect();
    let installed: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.installed)
        .map(|r| r.name.as_str())
        .collect();

    let mut out = Vec::new();

    for manifest in resolution.ordered_manifests() {
        let name = manifest.name.as_str();
        match by_name.get(name) {
            Some(record) if record.installed => {
                match record.dependency_names() {
                    Ok(recorded) if recorded != manifest.dependencies => {
                        out.push(Reconciliation::DependencyDrift {
                            module: name.to_string(),
                            recorded,
                            declared: manifest.dependencies.clone(),
                        });
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Unreadable dependencies on record {}: {}", name, e),
                }
                for dep in &manifest.dependencies {
                    if !installed.contains(dep.as_str()) {
                        out.push(Reconciliation::MissingInstalledDependency {
                            module: name.to_string(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
            _ => {
                if manifest.auto_install
                    && manifest.installable
                    && manifest
                        .dependencies
                        .iter()
                        .all(|d| installed.contains(d.as_str()))
                {
                    out.push(Reconciliation::AutoInstallCandidate {
                        module: name.to_string(),
                    });
                } else {
                    out.push(Reconciliation::NotInstalled {
                        module: name.to_string(),
                    });
                }
            }
        }
    }

    for name in &installed {
        if !resolution.manifests.contains_key(*name) {
            out.push(Reconciliation::Orphaned {
                module: name.to_string(),
            });
        }
    }

    out
}
