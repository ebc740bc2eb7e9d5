//! Module dependency resolution
//!
//! Builds the dependency graph from manifests and determines load order.
//! Unknown dependencies and cycles are reported, never fatal.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::module::registry::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::module::registry::discovery::{DiscoveredModule, ModuleDiscovery};
use crate::module::registry::manifest::ModuleManifest;
use crate::module::registry::sort::topological_sort;
use crate::module::traits::ModuleError;

/// Directed graph where an edge `a -> b` means "a depends on b".
///
/// Every module is a node, even with no edges. Rebuilt on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// node -> dependencies, in declared order, without duplicates
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph, dropping edges to modules not in `manifests`.
    ///
    /// Each dropped edge produces an `UnknownDependency` warning.
    pub fn build(manifests: &BTreeMap<String, ModuleManifest>) -> (Self, Vec<Diagnostic>) {
        let mut edges = BTreeMap::new();
        let mut diagnostics = Vec::new();

        for (name, manifest) in manifests {
            let mut deps: Vec<String> = Vec::with_capacity(manifest.dependencies.len());
            for dep in &manifest.dependencies {
                if !manifests.contains_key(dep) {
                    let diagnostic = Diagnostic::warning(
                        name.clone(),
                        DiagnosticKind::UnknownDependency {
                            dependency: dep.clone(),
                        },
                    );
                    warn!("{}", diagnostic);
                    diagnostics.push(diagnostic);
                    continue;
                }
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }
            edges.insert(name.clone(), deps);
        }

        (Self { edges }, diagnostics)
    }

    /// Module names in lexicographic order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// All edges as (dependent, dependency) pairs
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(m, deps)| deps.iter().map(move |d| (m.as_str(), d.as_str())))
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules that directly depend on `name`
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.edges()
            .filter(|(_, dep)| *dep == name)
            .map(|(m, _)| m)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

/// Dependency resolution result
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Modules in load order (dependencies first)
    pub load_order: Vec<String>,
    /// Graph the order was computed from
    pub graph: DependencyGraph,
    /// Manifests of every resolved module
    pub manifests: BTreeMap<String, ModuleManifest>,
    /// Module directories, when resolved from disk
    pub directories: BTreeMap<String, PathBuf>,
    /// Detected cycles, every member listed
    pub cycles: Vec<Vec<String>>,
    /// Everything reported along the way, in pipeline order
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    /// Position of `name` in the load order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.load_order.iter().position(|n| n == name)
    }

    pub fn manifest(&self, name: &str) -> Option<&ModuleManifest> {
        self.manifests.get(name)
    }

    /// Manifests in load order
    pub fn ordered_manifests(&self) -> impl Iterator<Item = &ModuleManifest> {
        self.load_order.iter().filter_map(|n| self.manifests.get(n))
    }

    /// Whether `name` takes part in a reported cycle
    pub fn in_cycle(&self, name: &str) -> bool {
        self.cycles.iter().any(|c| c.iter().any(|m| m == name))
    }

    /// Diagnostics that excluded a module
    pub fn excluded(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.excludes_module())
    }

    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Treat every diagnostic as an error
    pub fn into_strict(self) -> Result<Self, ModuleError> {
        if self.diagnostics.is_empty() {
            Ok(self)
        } else {
            Err(ModuleError::StrictModeViolation(
                self.diagnostics.iter().map(ToString::to_string).collect(),
            ))
        }
    }

    pub fn summary(&self) -> ResolutionSummary<'_> {
        ResolutionSummary { resolution: self }
    }
}

/// Human-readable report of a resolution run
pub struct ResolutionSummary<'a> {
    resolution: &'a Resolution,
}

impl fmt::Display for ResolutionSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.resolution;
        writeln!(f, "Included modules ({}):", r.load_order.len())?;
        for (i, name) in r.load_order.iter().enumerate() {
            let version = r.manifests.get(name).map(|m| m.version.as_str()).unwrap_or("?");
            writeln!(f, "  {:>3}. {} v{}", i + 1, name, version)?;
        }

        let excluded: Vec<_> = r.excluded().collect();
        if !excluded.is_empty() {
            writeln!(f, "Excluded modules ({}):", excluded.len())?;
            for d in excluded {
                writeln!(f, "  - {}", d)?;
            }
        }

        if !r.cycles.is_empty() {
            writeln!(f, "Cycles ({}):", r.cycles.len())?;
            for cycle in &r.cycles {
                writeln!(f, "  - {}", cycle.join(" -> "))?;
            }
        }

        let warnings: Vec<_> = r
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .filter(|d| !matches!(d.kind, DiagnosticKind::DependencyCycle { .. }))
            .collect();
        if !warnings.is_empty() {
            writeln!(f, "Warnings ({}):", warnings.len())?;
            for d in warnings {
                writeln!(f, "  - {}", d)?;
            }
        }
        Ok(())
    }
}

/// Serializable view used for `--json` output
#[derive(Debug, Serialize)]
pub struct ResolutionReport<'a> {
    pub load_order: &'a [String],
    pub cycles: &'a [Vec<String>],
    pub diagnostics: &'a [Diagnostic],
}

impl<'a> From<&'a Resolution> for ResolutionReport<'a> {
    fn from(r: &'a Resolution) -> Self {
        Self {
            load_order: &r.load_order,
            cycles: &r.cycles,
            diagnostics: &r.diagnostics,
        }
    }
}

/// Dependency resolver
pub struct ModuleDependencies;

impl ModuleDependencies {
    /// Scan `config.modules_dir` and resolve everything found there.
    ///
    /// Fails only when the modules directory itself is unusable.
    pub fn resolve_dir(config: &ResolverConfig) -> Result<Resolution, ModuleError> {
        let report = ModuleDiscovery::from_config(config).discover_modules()?;
        let mut resolution = Self::resolve(&report.modules);

        let mut diagnostics = report.diagnostics;
        diagnostics.append(&mut resolution.diagnostics);
        resolution.diagnostics = diagnostics;

        if config.strict {
            return resolution.into_strict();
        }
        Ok(resolution)
    }

    /// Resolve module dependencies and determine load order
    pub fn resolve(discovered_modules: &[DiscoveredModule]) -> Resolution {
        let mut resolution = Self::resolve_manifests(
            discovered_modules.iter().map(|m| m.manifest.clone()),
        );
        for module in discovered_modules {
            if resolution.manifests.contains_key(&module.manifest.name) {
                resolution
                    .directories
                    .entry(module.manifest.name.clone())
                    .or_insert_with(|| module.directory.clone());
            }
        }
        resolution
    }

    /// Resolve in-memory manifests; the first manifest wins on duplicate names
    pub fn resolve_manifests<I>(manifests: I) -> Resolution
    where
        I: IntoIterator<Item = ModuleManifest>,
    {
        let mut diagnostics = Vec::new();
        let mut by_name: BTreeMap<String, ModuleManifest> = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for manifest in manifests {
            if !seen.insert(manifest.name.clone()) {
                diagnostics.push(Diagnostic::error(
                    manifest.name.clone(),
                    DiagnosticKind::DuplicateModule {
                        directory: "<manifest>".to_string(),
                        kept: manifest.name.clone(),
                    },
                ));
                continue;
            }
            by_name.insert(manifest.name.clone(), manifest);
        }

        let (graph, mut graph_diagnostics) = DependencyGraph::build(&by_name);
        diagnostics.append(&mut graph_diagnostics);
        debug!(
            "Dependency graph: {} nodes, {} edges",
            graph.len(),
            graph.edge_count()
        );

        let outcome = topological_sort(&graph);
        for cycle in &outcome.cycles {
            diagnostics.push(Diagnostic::cycle(cycle.clone()));
        }

        info!(
            "Dependency resolution complete: {} modules, {} cycle(s)",
            outcome.load_order.len(),
            outcome.cycles.len()
        );

        Resolution {
            load_order: outcome.load_order,
            graph,
            manifests: by_name,
            directories: BTreeMap::new(),
            cycles: outcome.cycles,
            diagnostics,
        }
    }
}
