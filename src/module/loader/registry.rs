//! Runtime module registry
//!
//! Explicit mapping from module name to factory, in load order. Built by the
//! generated `registry()` function or from a [`Resolution`] at start-up.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::module::registry::dependencies::Resolution;
use crate::module::traits::{Addon, ModuleError};

/// Constructs one addon implementation
pub type ModuleFactory = Arc<dyn Fn() -> Result<Box<dyn Addon>, ModuleError> + Send + Sync>;

#[derive(Clone)]
struct RegistryEntry {
    dependencies: Vec<String>,
    factory: Option<ModuleFactory>,
}

/// Registry of module factories in load order
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    order: Vec<String>,
    entries: HashMap<String, RegistryEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an infallible factory; later registrations go later in the order
    pub fn register<F>(&mut self, name: &str, dependencies: &[&str], factory: F)
    where
        F: Fn() -> Box<dyn Addon> + Send + Sync + 'static,
    {
        self.register_fallible(name, dependencies, move || Ok(factory()));
    }

    /// Register a factory that may fail
    pub fn register_fallible<F>(&mut self, name: &str, dependencies: &[&str], factory: F)
    where
        F: Fn() -> Result<Box<dyn Addon>, ModuleError> + Send + Sync + 'static,
    {
        let entry = RegistryEntry {
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            factory: Some(Arc::new(factory)),
        };
        self.insert(name, entry);
    }

    /// Build a registry following `resolution.load_order`.
    ///
    /// Names without a factory stay listed and fail at load time.
    pub fn from_resolution(
        resolution: &Resolution,
        mut factories: HashMap<String, ModuleFactory>,
    ) -> Self {
        let mut registry = Self::new();
        for name in &resolution.load_order {
            let factory = factories.remove(name);
            if factory.is_none() {
                warn!("No factory registered for module {}", name);
            }
            let entry = RegistryEntry {
                dependencies: resolution.graph.dependencies_of(name).to_vec(),
                factory,
            };
            registry.insert(name, entry);
        }
        for name in factories.keys() {
            warn!("Factory for {} ignored: module is not in the resolved set", name);
        }
        registry
    }

    fn insert(&mut self, name: &str, entry: RegistryEntry) {
        if self.entries.insert(name.to_string(), entry).is_some() {
            warn!("Module {} registered twice, keeping the latest factory", name);
        } else {
            self.order.push(name.to_string());
        }
    }

    /// Module names in load order
    pub fn list_module_names(&self) -> &[String] {
        &self.order
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.entries
            .get(name)
            .map(|e| e.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Construct the implementation of `name`.
    ///
    /// A panicking factory is reported as a load error for that module only.
    pub fn load_module(&self, name: &str) -> Result<Box<dyn Addon>, ModuleError> {
        let factory = self.factory(name)?;
        debug!("Constructing module {}", name);
        invoke_factory(name, &factory)
    }

    pub(crate) fn factory(&self, name: &str) -> Result<ModuleFactory, ModuleError> {
        self.entries
            .get(name)
            .and_then(|e| e.factory.clone())
            .ok_or_else(|| ModuleError::ModuleNotFound(name.to_string()))
    }
}

/// Run a factory, turning a panic into an error
pub(crate) fn invoke_factory(
    name: &str,
    factory: &ModuleFactory,
) -> Result<Box<dyn Addon>, ModuleError> {
    match catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(result) => result,
        Err(panic) => Err(ModuleError::InitializationError(format!(
            "factory for {} panicked: {}",
            name,
            panic_message(panic.as_ref())
        ))),
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for name in &self.order {
            list.entry(&(name, self.dependencies_of(name)));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::dependencies::ModuleDependencies;
    use crate::module::registry::manifest::{ModuleManifest, RouteDescriptor};

    struct Plain(ModuleManifest);

    impl Addon for Plain {
        fn manifest(&self) -> &ModuleManifest {
            &self.0
        }

        fn routes(&self) -> Vec<RouteDescriptor> {
            Vec::new()
        }
    }

    fn plain(name: &'static str) -> impl Fn() -> Box<dyn Addon> + Send + Sync + 'static {
        move || Box::new(Plain(ModuleManifest::new(name, Vec::<String>::new()))) as Box<dyn Addon>
    }

    #[test]
    fn test_register_preserves_order() {
        let mut registry = ModuleRegistry::new();
        registry.register("base", &[], plain("base"));
        registry.register("hr", &["base"], plain("hr"));

        assert_eq!(registry.list_module_names(), &["base".to_string(), "hr".to_string()]);
        assert_eq!(registry.dependencies_of("hr"), &["base".to_string()]);
        assert_eq!(registry.load_module("hr").unwrap().manifest().name, "hr");
    }

    #[test]
    fn test_unknown_module_is_typed_error() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.load_module("ghost"),
            Err(ModuleError::ModuleNotFound(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_panicking_factory_is_contained() {
        let mut registry = ModuleRegistry::new();
        registry.register("boom", &[], || -> Box<dyn Addon> { panic!("no database") });

        let err = registry.load_module("boom").err().unwrap();
        assert!(err.to_string().contains("no database"));
    }

    #[test]
    fn test_from_resolution_lists_modules_without_factories() {
        let resolution = ModuleDependencies::resolve_manifests(vec![
            ModuleManifest::new("base", Vec::<String>::new()),
            ModuleManifest::new("crm", ["base"]),
        ]);
        let mut factories: HashMap<String, ModuleFactory> = HashMap::new();
        let base = plain("base");
        factories.insert(
            "base".to_string(),
            Arc::new(move || -> Result<Box<dyn Addon>, ModuleError> { Ok(base()) }),
        );

        let registry = ModuleRegistry::from_resolution(&resolution, factories);

        assert_eq!(registry.len(), 2);
        assert!(registry.load_module("base").is_ok());
        assert!(matches!(
            registry.load_module("crm"),
            Err(ModuleError::ModuleNotFound(_))
        ));
    }
}
