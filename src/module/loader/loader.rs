//! Module loader implementation
//!
//! Constructs every registered module, validates its exports and runs
//! `initialize` hooks in load order. A module that fails at any step is
//! marked `LoadFailed` and skipped; the rest still load.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::module::loader::registry::{
    invoke_factory, panic_message, ModuleFactory, ModuleRegistry,
};
use crate::module::registry::dependencies::Resolution;
use crate::module::traits::{Addon, LifecycleHooks, ModuleContext, ModuleError, ModuleState};
use crate::utils::with_custom_timeout;

/// A module that was constructed, validated and initialized
pub struct LoadedModule {
    pub name: String,
    /// Instance id handed to `initialize`
    pub module_id: String,
    /// Position in the registry order
    pub load_index: usize,
    pub addon: Box<dyn Addon>,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("module_id", &self.module_id)
            .field("load_index", &self.load_index)
            .finish()
    }
}

/// A module that did not make it to `Loaded`
#[derive(Debug)]
pub struct LoadFailure {
    pub name: String,
    pub error: ModuleError,
}

/// Outcome of [`ModuleLoader::load_all`]
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Loaded modules in load order
    pub loaded: Vec<LoadedModule>,
    /// Failures in load order
    pub failures: Vec<LoadFailure>,
    /// Final state of every registered module
    pub states: BTreeMap<String, ModuleState>,
    /// Whether loading stopped early because of cancellation
    pub cancelled: bool,
}

impl LoadReport {
    pub fn state_of(&self, name: &str) -> Option<&ModuleState> {
        self.states.get(name)
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.loaded.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Constructed module waiting for its `initialize` hook
struct Constructed {
    index: usize,
    name: String,
    addon: Box<dyn Addon>,
}

/// Module loader for loading and initializing modules
pub struct ModuleLoader {
    config: LoaderConfig,
    /// Per-module configuration passed through `ModuleContext`
    module_configs: HashMap<String, HashMap<String, String>>,
    cancel: CancellationToken,
}

impl ModuleLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            module_configs: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_module_configs(
        mut self,
        module_configs: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        self.module_configs = module_configs;
        self
    }

    /// Read `<module dir>/config.toml` for every resolved module found on disk
    pub fn with_module_configs_from(mut self, resolution: &Resolution) -> Self {
        for (name, directory) in &resolution.directories {
            match Self::load_module_config(name, directory.join("config.toml")) {
                Ok(config) if !config.is_empty() => {
                    self.module_configs.insert(name.clone(), config);
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring config for module {}: {}", name, e),
            }
        }
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops loading: no new module starts once it is cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Load all modules of `registry`.
    ///
    /// Construction runs sequentially or, when `max_parallel_loads > 1`,
    /// concurrently while still respecting dependencies. `initialize` hooks
    /// always run afterwards in registry order.
    pub async fn load_all(&self, registry: &ModuleRegistry) -> LoadReport {
        info!("Loading {} modules", registry.len());

        let mut report = LoadReport::default();
        for name in registry.list_module_names() {
            report.states.insert(name.clone(), ModuleState::Pending);
        }

        let constructed = if self.config.max_parallel_loads > 1 {
            self.construct_concurrent(registry, &mut report).await
        } else {
            self.construct_sequential(registry, &mut report)
        };

        self.initialize_in_order(constructed, &mut report).await;

        // Anything never attempted (cancellation) or whose worker died is
        // reported as failed
        for name in registry.list_module_names() {
            match report.states.get(name).cloned() {
                Some(ModuleState::Pending) => fail(&mut report, name, ModuleError::Cancelled),
                Some(ModuleState::Loading) => fail(
                    &mut report,
                    name,
                    ModuleError::OperationError(format!("load task for {} aborted", name)),
                ),
                _ => {}
            }
        }
        report.cancelled = self.cancel.is_cancelled();
        report
            .failures
            .sort_by_key(|f| registry.list_module_names().iter().position(|n| *n == f.name));

        info!(
            "Loaded {} of {} modules ({} failed)",
            report.loaded.len(),
            registry.len(),
            report.failures.len()
        );
        report
    }

    fn construct_sequential(
        &self,
        registry: &ModuleRegistry,
        report: &mut LoadReport,
    ) -> Vec<Constructed> {
        let mut constructed = Vec::new();

        for (index, name) in registry.list_module_names().iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Loading cancelled before module {}", name);
                break;
            }
            self.warn_on_failed_dependencies(registry, name, report);
            report.states.insert(name.clone(), ModuleState::Loading);

            match registry
                .factory(name)
                .and_then(|factory| construct_module(name, &factory))
            {
                Ok(addon) => constructed.push(Constructed {
                    index,
                    name: name.clone(),
                    addon,
                }),
                Err(e) => fail(report, name, e),
            }
        }

        constructed
    }

    /// Construct modules on blocking workers, starting each one only after
    /// every dependency that precedes it in the load order has finished.
    async fn construct_concurrent(
        &self,
        registry: &ModuleRegistry,
        report: &mut LoadReport,
    ) -> Vec<Constructed> {
        let names = registry.list_module_names();
        let position: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        // Back edges of a cycle point to later modules and are ignored, so
        // the counts can always reach zero.
        let mut remaining = vec![0usize; names.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        for (i, name) in names.iter().enumerate() {
            for dep in registry.dependencies_of(name) {
                if let Some(&j) = position.get(dep.as_str()) {
                    if j < i {
                        remaining[i] += 1;
                        dependents[j].push(i);
                    }
                }
            }
        }

        let mut ready: BTreeSet<usize> =
            (0..names.len()).filter(|&i| remaining[i] == 0).collect();
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, usize> = HashMap::new();
        let mut constructed = Vec::new();
        let max_parallel = self.config.max_parallel_loads.max(1);

        loop {
            while tasks.len() < max_parallel && !self.cancel.is_cancelled() {
                let Some(index) = ready.pop_first() else { break };
                let name = names[index].clone();
                self.warn_on_failed_dependencies(registry, &name, report);
                report.states.insert(name.clone(), ModuleState::Loading);

                match registry.factory(&name) {
                    Ok(factory) => {
                        let handle =
                            tasks.spawn_blocking(move || construct_module(&name, &factory));
                        in_flight.insert(handle.id(), index);
                    }
                    Err(e) => {
                        fail(report, &name, e);
                        release(index, &dependents, &mut remaining, &mut ready);
                    }
                }
            }

            if tasks.is_empty() {
                if ready.is_empty() || self.cancel.is_cancelled() {
                    break;
                }
                continue;
            }

            let (id, result) = match tasks.join_next_with_id().await {
                Some(Ok((id, result))) => (id, result),
                Some(Err(e)) => {
                    let task_id = e.id();
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        e.to_string()
                    };
                    (
                        task_id,
                        Err(ModuleError::InitializationError(format!(
                            "load task aborted: {}",
                            reason
                        ))),
                    )
                }
                None => break,
            };
            let Some(index) = in_flight.remove(&id) else {
                error!("Finished load task {} is not tracked", id);
                continue;
            };

            let name = &names[index];
            match result {
                Ok(addon) => constructed.push(Constructed {
                    index,
                    name: name.clone(),
                    addon,
                }),
                Err(e) => fail(report, name, e),
            }
            // Dependents still run once a dependency failed, with a warning
            release(index, &dependents, &mut remaining, &mut ready);
        }

        constructed.sort_by_key(|c| c.index);
        constructed
    }

    async fn initialize_in_order(&self, constructed: Vec<Constructed>, report: &mut LoadReport) {
        let timeout = self.config.init_timeout();

        for Constructed {
            index,
            name,
            mut addon,
        } in constructed
        {
            if self.cancel.is_cancelled() {
                fail(report, &name, ModuleError::Cancelled);
                continue;
            }

            let module_id = format!("{}_{}", name, uuid::Uuid::new_v4());
            let context = ModuleContext::new(
                module_id.clone(),
                name.clone(),
                index,
                self.module_configs.get(&name).cloned().unwrap_or_default(),
            );
            debug!("Initializing module {}", name);

            // Own task so a panicking hook fails this module only
            let task = tokio::spawn(async move {
                let result = if addon.hooks().contains(LifecycleHooks::INITIALIZE) {
                    addon.initialize(&context).await
                } else {
                    Ok(())
                };
                (addon, result)
            });
            let abort = task.abort_handle();

            let addon = match with_custom_timeout(task, timeout).await {
                Ok(Ok((addon, Ok(())))) => addon,
                Ok(Ok((_, Err(e)))) => {
                    fail(report, &name, e);
                    continue;
                }
                Ok(Err(e)) => {
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        e.to_string()
                    };
                    fail(
                        report,
                        &name,
                        ModuleError::InitializationError(format!(
                            "{} panicked in initialize: {}",
                            name, reason
                        )),
                    );
                    continue;
                }
                Err(_) => {
                    abort.abort();
                    fail(
                        report,
                        &name,
                        ModuleError::Timeout(format!("{} initialize after {:?}", name, timeout)),
                    );
                    continue;
                }
            };

            info!("Module {} loaded", name);
            report.states.insert(name.clone(), ModuleState::Loaded);
            report.loaded.push(LoadedModule {
                name,
                module_id,
                load_index: index,
                addon,
            });
        }
    }

    fn warn_on_failed_dependencies(
        &self,
        registry: &ModuleRegistry,
        name: &str,
        report: &LoadReport,
    ) {
        for dep in registry.dependencies_of(name) {
            if let Some(ModuleState::LoadFailed(_)) = report.states.get(dep) {
                warn!("Loading module {} although its dependency {} failed", name, dep);
            }
        }
    }

    /// Load module configuration from file
    ///
    /// TOML tables are flattened to dot-separated keys; files that are not
    /// TOML are read as `key=value` lines.
    pub fn load_module_config<P: AsRef<Path>>(
        module_name: &str,
        config_path: P,
    ) -> Result<HashMap<String, String>, ModuleError> {
        if !config_path.as_ref().exists() {
            debug!("No config file for module {}, using defaults", module_name);
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            ModuleError::OperationError(format!("Failed to read config file: {}", e))
        })?;

        if let Ok(table) = toml::from_str::<toml::Table>(&contents) {
            let mut config = HashMap::new();
            Self::flatten_toml_value(String::new(), &toml::Value::Table(table), &mut config);
            return Ok(config);
        }

        let mut config = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Ok(config)
    }

    /// Flatten TOML value to string hashmap
    fn flatten_toml_value(
        prefix: String,
        value: &toml::Value,
        result: &mut HashMap<String, String>,
    ) {
        use toml::Value;

        match value {
            Value::String(s) => {
                result.insert(prefix, s.clone());
            }
            Value::Integer(i) => {
                result.insert(prefix, i.to_string());
            }
            Value::Float(f) => {
                result.insert(prefix, f.to_string());
            }
            Value::Boolean(b) => {
                result.insert(prefix, b.to_string());
            }
            Value::Array(arr) => {
                let values: Vec<String> = arr
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        _ => v.to_string(),
                    })
                    .collect();
                result.insert(prefix, values.join(","));
            }
            Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml_value(new_prefix, val, result);
                }
            }
            Value::Datetime(dt) => {
                result.insert(prefix, dt.to_string());
            }
        }
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

/// Build one module and check its exports, containing panics from module code
fn construct_module(name: &str, factory: &ModuleFactory) -> Result<Box<dyn Addon>, ModuleError> {
    let addon = invoke_factory(name, factory)?;
    match catch_unwind(AssertUnwindSafe(|| validate_exports(name, addon))) {
        Ok(result) => result,
        Err(panic) => Err(ModuleError::InvalidExport(format!(
            "module {} panicked while exposing its exports: {}",
            name,
            panic_message(panic.as_ref())
        ))),
    }
}

/// Check the mandatory surface of a freshly constructed module
fn validate_exports(name: &str, addon: Box<dyn Addon>) -> Result<Box<dyn Addon>, ModuleError> {
    let declared = &addon.manifest().name;
    if declared != name {
        return Err(ModuleError::InvalidExport(format!(
            "module {} exports manifest for {}",
            name, declared
        )));
    }
    for route in addon.routes() {
        if !route.path.starts_with('/') {
            return Err(ModuleError::InvalidExport(format!(
                "module {} route {:?} does not start with '/'",
                name, route.path
            )));
        }
        if route.component.trim().is_empty() {
            return Err(ModuleError::InvalidExport(format!(
                "module {} route {} has no component",
                name, route.path
            )));
        }
    }
    Ok(addon)
}

fn fail(report: &mut LoadReport, name: &str, error: ModuleError) {
    error!("Module {} failed to load: {}", name, error);
    report
        .states
        .insert(name.to_string(), ModuleState::LoadFailed(error.to_string()));
    report.failures.push(LoadFailure {
        name: name.to_string(),
        error,
    });
}

/// Mark `index` finished and queue dependents whose dependencies are all done
fn release(
    index: usize,
    dependents: &[Vec<usize>],
    remaining: &mut [usize],
    ready: &mut BTreeSet<usize>,
) {
    for &dependent in &dependents[index] {
        remaining[dependent] -= 1;
        if remaining[dependent] == 0 {
            ready.insert(dependent);
        }
    }
}
