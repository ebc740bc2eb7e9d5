//! Registry artifact generation
//!
//! Renders a resolved load order into a file the host application compiles
//! or reads at start-up. Output depends only on the resolution, so
//! regenerating an unchanged module set yields identical bytes.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{ArtifactFormat, ResolverConfig};
use crate::module::registry::dependencies::Resolution;
use crate::module::traits::ModuleError;
use crate::utils::atomic_write;

const GENERATED_BY: &str = "addon-registry";

/// Rust keywords that can be used as raw identifiers
const RAW_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "abstract", "become", "box", "do", "final", "macro", "override", "priv", "try", "typeof",
    "unsized", "virtual", "yield", "gen",
];

/// Keywords that cannot be raw identifiers
const RESERVED_IDENTS: &[&str] = &["self", "Self", "super", "crate", "_"];

/// Registry artifact generator
pub struct RegistryGenerator<'a> {
    resolution: &'a Resolution,
    format: ArtifactFormat,
    /// Rust path of the parent module of all addon modules
    addons_path: String,
}

#[derive(Serialize)]
struct JsonArtifact<'a> {
    generated_by: &'static str,
    fingerprint: String,
    modules: Vec<JsonModule<'a>>,
}

#[derive(Serialize)]
struct JsonModule<'a> {
    name: &'a str,
    version: &'a str,
    dependencies: &'a [String],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    in_cycle: bool,
}

impl<'a> RegistryGenerator<'a> {
    pub fn new(resolution: &'a Resolution, format: ArtifactFormat) -> Self {
        Self {
            resolution,
            format,
            addons_path: "crate::addons".to_string(),
        }
    }

    pub fn from_config(resolution: &'a Resolution, config: &ResolverConfig) -> Self {
        Self::new(resolution, config.format).with_addons_path(&config.addons_path)
    }

    pub fn with_addons_path(mut self, path: impl Into<String>) -> Self {
        self.addons_path = path.into().trim_end_matches("::").to_string();
        self
    }

    /// SHA-256 over the load order and the edge set
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for name in &self.resolution.load_order {
            hasher.update(b"module ");
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        for (module, dep) in self.resolution.graph.edges() {
            hasher.update(b"edge ");
            hasher.update(module.as_bytes());
            hasher.update(b" ");
            hasher.update(dep.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Render the artifact
    pub fn render(&self) -> Result<String, ModuleError> {
        match self.format {
            ArtifactFormat::Rust => self.render_rust(),
            ArtifactFormat::Json => self.render_json(),
        }
    }

    /// Render and write the artifact atomically, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<(), ModuleError> {
        let content = self.render()?;
        atomic_write(path, content.as_bytes()).map_err(|e| {
            ModuleError::OperationError(format!(
                "Failed to write registry artifact {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(
            "Wrote registry with {} modules to {:?}",
            self.resolution.load_order.len(),
            path
        );
        Ok(())
    }

    /// Whether the artifact at `path` matches what would be generated now
    pub fn is_up_to_date(&self, path: &Path) -> Result<bool, ModuleError> {
        let expected = self.render()?;
        match std::fs::read_to_string(path) {
            Ok(existing) => Ok(existing == expected),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing artifact at {:?}", path);
                Ok(false)
            }
            Err(e) => Err(ModuleError::OperationError(format!(
                "Failed to read registry artifact {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn render_json(&self) -> Result<String, ModuleError> {
        let modules = self
            .resolution
            .load_order
            .iter()
            .map(|name| JsonModule {
                name,
                version: self
                    .resolution
                    .manifest(name)
                    .map(|m| m.version.as_str())
                    .unwrap_or(""),
                dependencies: self.resolution.graph.dependencies_of(name),
                in_cycle: self.resolution.in_cycle(name),
            })
            .collect();
        let artifact = JsonArtifact {
            generated_by: GENERATED_BY,
            fingerprint: self.fingerprint(),
            modules,
        };
        let mut out = serde_json::to_string_pretty(&artifact)?;
        out.push('\n');
        Ok(out)
    }

    fn render_rust(&self) -> Result<String, ModuleError> {
        let order = &self.resolution.load_order;
        let idents = module_idents(order)?;
        let mut out = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(out, "// @generated by {}. Do not edit by hand.", GENERATED_BY);
        let _ = writeln!(out, "// Regenerate with `{} generate`.", GENERATED_BY);
        let _ = writeln!(out, "// fingerprint: {}", self.fingerprint());
        for cycle in &self.resolution.cycles {
            let _ = writeln!(
                out,
                concat!(
                    "// warning: dependency cycle {}; ",
                    "relative order of these modules is not guaranteed"
                ),
                cycle.join(" -> ")
            );
        }
        out.push('\n');
        out.push_str("use addon_registry::module::loader::ModuleRegistry;\n");
        out.push_str("use addon_registry::module::traits::{Addon, ModuleError};\n\n");

        out.push_str("/// Module names in dependency-safe load order.\n");
        out.push_str("pub const MODULE_NAMES: &[&str] = &[\n");
        for name in order {
            let _ = writeln!(out, "    {:?},", name);
        }
        out.push_str("];\n\n");

        out.push_str("/// Module names in dependency-safe load order.\n");
        out.push_str("pub fn list_module_names() -> &'static [&'static str] {\n");
        out.push_str("    MODULE_NAMES\n");
        out.push_str("}\n\n");

        out.push_str("/// Construct the implementation of module `name`.\n");
        out.push_str("pub fn load_module(name: &str) -> Result<Box<dyn Addon>, ModuleError> {\n");
        out.push_str("    match name {\n");
        for name in order {
            let _ = writeln!(
                out,
                "        {:?} => Ok({}::{}::module()),",
                name, self.addons_path, idents[name.as_str()]
            );
        }
        out.push_str("        _ => Err(ModuleError::ModuleNotFound(name.to_string())),\n");
        out.push_str("    }\n");
        out.push_str("}\n\n");

        out.push_str("/// Registry handed to the runtime loader.\n");
        out.push_str("pub fn registry() -> ModuleRegistry {\n");
        out.push_str("    let mut registry = ModuleRegistry::new();\n");
        for name in order {
            let deps = self
                .resolution
                .graph
                .dependencies_of(name)
                .iter()
                .map(|d| format!("{:?}", d))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "    registry.register({:?}, &[{}], {}::{}::module);",
                name, deps, self.addons_path, idents[name.as_str()]
            );
        }
        out.push_str("    registry\n");
        out.push_str("}\n");
        Ok(out)
    }
}

/// Identifier of every module, rejecting names that map to the same one
fn module_idents(names: &[String]) -> Result<BTreeMap<&str, String>, ModuleError> {
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    let mut idents = BTreeMap::new();
    for name in names {
        let ident = rust_ident(name);
        if let Some(owner) = owners.get(&ident) {
            return Err(ModuleError::OperationError(format!(
                "modules {} and {} both map to Rust identifier {}",
                owner, name, ident
            )));
        }
        owners.insert(ident.clone(), name.as_str());
        idents.insert(name.as_str(), ident);
    }
    Ok(idents)
}

/// Turn a module name into the identifier of its Rust module
pub fn rust_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        ident.insert_str(0, "m_");
    }
    if RESERVED_IDENTS.contains(&ident.as_str()) {
        ident.push('_');
    } else if RAW_KEYWORDS.contains(&ident.as_str()) {
        ident.insert_str(0, "r#");
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::dependencies::ModuleDependencies;
    use crate::module::registry::manifest::ModuleManifest;

    fn resolution() -> Resolution {
        ModuleDependencies::resolve_manifests(vec![
            ModuleManifest::new("base", Vec::<String>::new()),
            ModuleManifest::new("hr", ["base"]),
            ModuleManifest::new("hr-payroll", ["hr", "base"]),
        ])
    }

    #[test]
    fn test_rust_artifact_contents() {
        let r = resolution();
        let text = RegistryGenerator::new(&r, ArtifactFormat::Rust).render().unwrap();

        assert!(text.starts_with("// @generated by addon-registry"));
        assert!(text.contains(concat!(
            "pub const MODULE_NAMES: &[&str] = &[\n",
            "    \"base\",\n    \"hr\",\n    \"hr-payroll\",\n];"
        )));
        assert!(text.contains("\"hr-payroll\" => Ok(crate::addons::hr_payroll::module()),"));
        assert!(text.contains(concat!(
            "registry.register(\"hr-payroll\", &[\"hr\", \"base\"], ",
            "crate::addons::hr_payroll::module);"
        )));
        assert!(text.contains("_ => Err(ModuleError::ModuleNotFound(name.to_string())),"));
    }

    #[test]
    fn test_json_artifact_contents() {
        let r = resolution();
        let text = RegistryGenerator::new(&r, ArtifactFormat::Json).render().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["generated_by"], "addon-registry");
        let names: Vec<_> = value["modules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["base", "hr", "hr-payroll"]);
        assert!(value["modules"][0].get("in_cycle").is_none());
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = resolution();
        let b = resolution();
        for format in [ArtifactFormat::Rust, ArtifactFormat::Json] {
            assert_eq!(
                RegistryGenerator::new(&a, format).render().unwrap(),
                RegistryGenerator::new(&b, format).render().unwrap()
            );
        }
    }

    #[test]
    fn test_fingerprint_tracks_edges() {
        let a = resolution();
        let b = ModuleDependencies::resolve_manifests(vec![
            ModuleManifest::new("base", Vec::<String>::new()),
            ModuleManifest::new("hr", ["base"]),
            ModuleManifest::new("hr-payroll", ["hr"]),
        ]);
        assert_eq!(a.load_order, b.load_order);
        assert_ne!(
            RegistryGenerator::new(&a, ArtifactFormat::Rust).fingerprint(),
            RegistryGenerator::new(&b, ArtifactFormat::Rust).fingerprint()
        );
    }

    #[test]
    fn test_cycle_is_noted_in_header() {
        let r = ModuleDependencies::resolve_manifests(vec![
            ModuleManifest::new("x", ["y"]),
            ModuleManifest::new("y", ["x"]),
        ]);
        let text = RegistryGenerator::new(&r, ArtifactFormat::Rust).render().unwrap();
        assert!(text.contains("// warning: dependency cycle x -> y;"));
    }

    #[test]
    fn test_write_and_check() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("generated/registry.rs");
        let r = resolution();
        let generator =
            RegistryGenerator::new(&r, ArtifactFormat::Rust).with_addons_path("erp::addons::");

        assert!(!generator.is_up_to_date(&path).unwrap());
        generator.write_to(&path).unwrap();
        assert!(generator.is_up_to_date(&path).unwrap());
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("erp::addons::base::module"));

        std::fs::write(&path, "stale").unwrap();
        assert!(!generator.is_up_to_date(&path).unwrap());
    }

    #[test]
    fn test_rust_ident() {
        assert_eq!(rust_ident("hr"), "hr");
        assert_eq!(rust_ident("point-of-sale"), "point_of_sale");
        assert_eq!(rust_ident("3d_viewer"), "m_3d_viewer");
        assert_eq!(rust_ident("type"), "r#type");
        assert_eq!(rust_ident("self"), "self_");
    }

    #[test]
    fn test_colliding_identifiers_are_rejected() {
        let r = ModuleDependencies::resolve_manifests(vec![
            ModuleManifest::new("sale-stock", Vec::<String>::new()),
            ModuleManifest::new("sale_stock", Vec::<String>::new()),
        ]);
        assert_eq!(r.load_order.len(), 2);

        let err = RegistryGenerator::new(&r, ArtifactFormat::Rust).render().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sale-stock") && message.contains("sale_stock"));
        assert!(message.contains("Rust identifier sale_stock"));

        // JSON artifacts carry names only
        assert!(RegistryGenerator::new(&r, ArtifactFormat::Json).render().is_ok());

        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("registry.rs");
        assert!(RegistryGenerator::new(&r, ArtifactFormat::Rust).write_to(&path).is_err());
        assert!(!path.exists());
    }
}
