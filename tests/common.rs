//! Shared helpers for integration tests
//!
//! Builds scratch module trees on disk and provides scripted addons that
//! record their lifecycle calls.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use addon_registry::config::ResolverConfig;
use addon_registry::module::registry::manifest::{ModuleManifest, RouteDescriptor};
use addon_registry::module::traits::{
    Addon, LifecycleHooks, ModuleContext, ModuleError, UiComponent,
};
use async_trait::async_trait;
use tempfile::TempDir;

/// Temporary modules directory
pub struct ModuleTree {
    pub temp_dir: TempDir,
    pub modules_dir: PathBuf,
}

impl ModuleTree {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let modules_dir = temp_dir.path().join("addons");
        std::fs::create_dir_all(&modules_dir).unwrap();
        Self {
            temp_dir,
            modules_dir,
        }
    }

    /// Add a complete module (manifest and entry file)
    pub fn add_module(&self, name: &str, dependencies: &[&str]) -> PathBuf {
        let manifest = ModuleManifest::new(name, dependencies.iter().copied());
        self.add_raw(name, &manifest.to_toml_string().unwrap(), true)
    }

    /// Add a directory with arbitrary manifest text
    pub fn add_raw(&self, dir_name: &str, manifest: &str, with_entry: bool) -> PathBuf {
        let dir = self.modules_dir.join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("module.toml"), manifest).unwrap();
        if with_entry {
            std::fs::write(dir.join("mod.rs"), "pub fn module() {}\n").unwrap();
        }
        dir
    }

    /// Add a directory containing only an entry file
    pub fn add_entry_only(&self, dir_name: &str) -> PathBuf {
        let dir = self.modules_dir.join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("mod.rs"), "pub fn module() {}\n").unwrap();
        dir
    }

    pub fn config(&self) -> ResolverConfig {
        ResolverConfig {
            modules_dir: self.modules_dir.clone(),
            output: self.temp_dir.path().join("generated").join("registry.rs"),
            ..ResolverConfig::default()
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Shared log of lifecycle events, e.g. `"init:base"`, `"cleanup:hr"`
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Scripted addon for loader tests
#[derive(Clone)]
pub struct ScriptedAddon {
    pub manifest: ModuleManifest,
    pub routes: Vec<RouteDescriptor>,
    pub hooks: LifecycleHooks,
    pub fail_init: bool,
    pub fail_cleanup: bool,
    pub init_delay: Option<Duration>,
    pub panic_in_init: bool,
    pub panic_in_routes: bool,
    /// Receives `construct-start:<name>` / `construct-end:<name>` from the factory
    pub construction_log: Option<EventLog>,
    pub log: EventLog,
}

impl ScriptedAddon {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            manifest: ModuleManifest::new(name, Vec::<String>::new()),
            routes: vec![RouteDescriptor::new(format!("/{}", name), format!("{}View", name))],
            hooks: LifecycleHooks::ALL,
            fail_init: false,
            fail_cleanup: false,
            init_delay: None,
            panic_in_init: false,
            panic_in_routes: false,
            construction_log: None,
            log: log.clone(),
        }
    }

    pub fn with_routes(mut self, routes: &[(&str, &str)]) -> Self {
        self.routes = routes
            .iter()
            .map(|(p, c)| RouteDescriptor::new(*p, *c))
            .collect();
        self
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub fn slow_init(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn panicking_init(mut self) -> Self {
        self.panic_in_init = true;
        self
    }

    pub fn panicking_routes(mut self) -> Self {
        self.panic_in_routes = true;
        self
    }

    /// Log construction and make it take long enough to overlap with others
    pub fn tracking_construction(mut self, log: &EventLog) -> Self {
        self.construction_log = Some(log.clone());
        self
    }

    /// Factory closure suitable for `ModuleRegistry::register`
    pub fn factory(self) -> impl Fn() -> Box<dyn Addon> + Send + Sync + 'static {
        move || {
            if let Some(log) = &self.construction_log {
                let name = &self.manifest.name;
                log.lock().unwrap().push(format!("construct-start:{}", name));
                std::thread::sleep(Duration::from_millis(20));
                log.lock().unwrap().push(format!("construct-end:{}", name));
            }
            Box::new(self.clone()) as Box<dyn Addon>
        }
    }

    fn record(&self, event: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", event, self.manifest.name));
    }
}

#[async_trait]
impl Addon for ScriptedAddon {
    fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        if self.panic_in_routes {
            panic!("{} has no routes table", self.manifest.name);
        }
        self.routes.clone()
    }

    fn components(&self) -> Vec<UiComponent> {
        vec![UiComponent::new(format!("{}Menu", self.manifest.name), "sidebar")]
    }

    fn hooks(&self) -> LifecycleHooks {
        self.hooks
    }

    async fn initialize(&mut self, context: &ModuleContext) -> Result<(), ModuleError> {
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
        }
        self.record("init");
        if self.panic_in_init {
            panic!("{} lost its database handle", self.manifest.name);
        }
        assert_eq!(context.module_name, self.manifest.name);
        if self.fail_init {
            return Err(ModuleError::InitializationError(format!(
                "{} refused to start",
                self.manifest.name
            )));
        }
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), ModuleError> {
        self.record("cleanup");
        if self.fail_cleanup {
            return Err(ModuleError::CleanupError(format!(
                "{} left resources behind",
                self.manifest.name
            )));
        }
        Ok(())
    }
}
