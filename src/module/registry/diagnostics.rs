//! Resolution diagnostics
//!
//! Recoverable and structural problems are collected here instead of being
//! raised, so a caller can decide whether to proceed or run strict.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How loudly a diagnostic should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Resolution continued with the module included
    Warning,
    /// The module was excluded from the resolved set
    Error,
}

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Manifest unreadable, not valid TOML or missing `name`
    MalformedManifest { reason: String },
    /// Directory has a manifest but no entry-point file
    MissingEntryPoint { expected: String },
    /// Directory has an entry-point file but no manifest
    MissingManifest { expected: String },
    /// Another directory already declared this module name
    DuplicateModule { directory: String, kept: String },
    /// Manifest parsed but failed a lint rule
    InvalidManifest { errors: Vec<String> },
    /// Dependency names a module that is not in the scanned set
    UnknownDependency { dependency: String },
    /// Modules whose dependencies form a loop, in traversal order
    DependencyCycle { members: Vec<String> },
}

/// One diagnostic produced while resolving modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Module (or directory) the diagnostic is about
    pub module: Option<String>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn warning(module: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Warning,
            module: Some(module.into()),
            kind,
        }
    }

    pub fn error(module: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            severity: Severity::Error,
            module: Some(module.into()),
            kind,
        }
    }

    pub fn cycle(members: Vec<String>) -> Self {
        Self {
            severity: Severity::Warning,
            module: None,
            kind: DiagnosticKind::DependencyCycle { members },
        }
    }

    /// Whether this diagnostic excluded a module from the resolved set
    pub fn excludes_module(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.module.as_deref().unwrap_or("?");
        match &self.kind {
            DiagnosticKind::MalformedManifest { reason } => {
                write!(f, "{}: malformed manifest: {}", module, reason)
            }
            DiagnosticKind::MissingEntryPoint { expected } => {
                write!(f, "{}: missing entry point {}", module, expected)
            }
            DiagnosticKind::MissingManifest { expected } => {
                write!(f, "{}: missing manifest {}", module, expected)
            }
            DiagnosticKind::DuplicateModule { directory, kept } => write!(
                f,
                "{}: duplicate module name in {} (keeping {})",
                module, directory, kept
            ),
            DiagnosticKind::InvalidManifest { errors } => {
                write!(f, "{}: {}", module, errors.join("; "))
            }
            DiagnosticKind::UnknownDependency { dependency } => {
                write!(f, "{} depends on undeclared module {}", module, dependency)
            }
            DiagnosticKind::DependencyCycle { members } => {
                write!(f, "dependency cycle: {}", members.join(" -> "))?;
                if let Some(first) = members.first() {
                    write!(f, " -> {}", first)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_dependency_message() {
        let d = Diagnostic::warning(
            "P",
            DiagnosticKind::UnknownDependency {
                dependency: "Q".to_string(),
            },
        );
        assert_eq!(d.to_string(), "P depends on undeclared module Q");
        assert!(!d.excludes_module());
    }

    #[test]
    fn test_cycle_message_lists_every_member() {
        let d = Diagnostic::cycle(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(d.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn test_serializes_with_flattened_kind() {
        let d = Diagnostic::error(
            "broken",
            DiagnosticKind::MalformedManifest {
                reason: "bad toml".to_string(),
            },
        );
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["kind"], "malformed_manifest");
        assert_eq!(json["reason"], "bad toml");
    }
}
