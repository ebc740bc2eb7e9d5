//! Aggregated application surface
//!
//! Routes, menus, UI components and models contributed by every loaded
//! module, merged into one structure for the host application.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::module::loader::LoadedModule;
use crate::module::registry::manifest::{MenuDescriptor, ModelDescriptor};
use crate::module::traits::Addon;

/// Route mounted on the application surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedRoute {
    pub path: String,
    pub component: String,
    /// Module that registered the route
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedMenu {
    pub module: String,
    #[serde(flatten)]
    pub menu: MenuDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedComponent {
    pub module: String,
    pub name: String,
    pub slot: String,
}

/// Non-fatal conflict found while aggregating
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceWarning {
    /// A later module replaced a route registered by an earlier one
    DuplicateRoute {
        path: String,
        previous: String,
        replacement: String,
    },
}

/// Combined surface of all loaded modules
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppSurface {
    routes: BTreeMap<String, MountedRoute>,
    menus: Vec<MountedMenu>,
    components: Vec<MountedComponent>,
    models: BTreeMap<String, Vec<ModelDescriptor>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<SurfaceWarning>,
}

impl AppSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate the surface of `modules`, registering them in the given order
    pub fn aggregate(modules: &[LoadedModule]) -> Self {
        let mut surface = Self::new();
        for module in modules {
            surface.register(&module.name, module.addon.as_ref());
        }
        debug!(
            "Aggregated {} routes, {} menus, {} components",
            surface.routes.len(),
            surface.menus.len(),
            surface.components.len()
        );
        surface
    }

    /// Merge one module's contributions; a duplicate route path is replaced
    pub fn register(&mut self, module: &str, addon: &dyn Addon) {
        for route in addon.routes() {
            let mounted = MountedRoute {
                path: route.path.clone(),
                component: route.component,
                module: module.to_string(),
            };
            if let Some(previous) = self.routes.insert(route.path.clone(), mounted) {
                warn!(
                    "Route {} from module {} replaces the one from module {}",
                    route.path, module, previous.module
                );
                self.warnings.push(SurfaceWarning::DuplicateRoute {
                    path: route.path,
                    previous: previous.module,
                    replacement: module.to_string(),
                });
            }
        }

        let manifest = addon.manifest();
        self.menus
            .extend(manifest.menus.iter().cloned().map(|menu| MountedMenu {
                module: module.to_string(),
                menu,
            }));
        // Stable sort keeps registration order for equal keys
        self.menus
            .sort_by(|a, b| {
                (a.menu.sequence, &a.menu.label).cmp(&(b.menu.sequence, &b.menu.label))
            });

        self.components
            .extend(addon.components().into_iter().map(|c| MountedComponent {
                module: module.to_string(),
                name: c.name,
                slot: c.slot,
            }));

        if !manifest.models.is_empty() {
            self.models
                .entry(module.to_string())
                .or_default()
                .extend(manifest.models.iter().cloned());
        }
    }

    /// Routes sorted by path
    pub fn routes(&self) -> impl Iterator<Item = &MountedRoute> {
        self.routes.values()
    }

    pub fn route(&self, path: &str) -> Option<&MountedRoute> {
        self.routes.get(path)
    }

    /// Menus ordered by `(sequence, label)`
    pub fn menus(&self) -> &[MountedMenu] {
        &self.menus
    }

    pub fn components(&self) -> &[MountedComponent] {
        &self.components
    }

    pub fn components_in<'a>(
        &'a self,
        slot: &'a str,
    ) -> impl Iterator<Item = &'a MountedComponent> {
        self.components.iter().filter(move |c| c.slot == slot)
    }

    pub fn models_of(&self, module: &str) -> &[ModelDescriptor] {
        self.models.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn warnings(&self) -> &[SurfaceWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.menus.is_empty() && self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::manifest::{ModuleManifest, RouteDescriptor};
    use crate::module::traits::UiComponent;

    struct Fixed {
        manifest: ModuleManifest,
        routes: Vec<RouteDescriptor>,
    }

    impl Addon for Fixed {
        fn manifest(&self) -> &ModuleManifest {
            &self.manifest
        }

        fn routes(&self) -> Vec<RouteDescriptor> {
            self.routes.clone()
        }

        fn components(&self) -> Vec<UiComponent> {
            vec![UiComponent::new(format!("{}Widget", self.manifest.name), "dashboard")]
        }
    }

    fn fixed(name: &str, routes: &[(&str, &str)]) -> Fixed {
        Fixed {
            manifest: ModuleManifest::new(name, Vec::<String>::new()),
            routes: routes
                .iter()
                .map(|(p, c)| RouteDescriptor::new(*p, *c))
                .collect(),
        }
    }

    #[test]
    fn test_empty_surface() {
        let surface = AppSurface::aggregate(&[]);
        assert!(surface.is_empty());
        assert!(surface.warnings().is_empty());
    }

    #[test]
    fn test_duplicate_route_last_wins() {
        let mut surface = AppSurface::new();
        surface.register("crm", &fixed("crm", &[("/leads", "LeadList")]));
        surface.register("sale", &fixed("sale", &[("/leads", "SaleLeads"), ("/orders", "Orders")]));

        assert_eq!(surface.route("/leads").unwrap().component, "SaleLeads");
        assert_eq!(surface.routes().count(), 2);
        assert_eq!(
            surface.warnings(),
            &[SurfaceWarning::DuplicateRoute {
                path: "/leads".into(),
                previous: "crm".into(),
                replacement: "sale".into(),
            }]
        );
    }

    #[test]
    fn test_menus_sorted_by_sequence_then_label() {
        let mut hr = fixed("hr", &[]);
        hr.manifest.menus = vec![
            MenuDescriptor {
                label: "Employees".into(),
                path: "/hr".into(),
                icon: None,
                sequence: 20,
                parent: None,
            },
            MenuDescriptor {
                label: "Departments".into(),
                path: "/hr/departments".into(),
                icon: None,
                sequence: 20,
                parent: None,
            },
        ];
        let mut base = fixed("base", &[]);
        base.manifest.menus = vec![MenuDescriptor {
            label: "Settings".into(),
            path: "/settings".into(),
            icon: None,
            sequence: 5,
            parent: None,
        }];

        let mut surface = AppSurface::new();
        surface.register("hr", &hr);
        surface.register("base", &base);

        let labels: Vec<_> = surface.menus().iter().map(|m| m.menu.label.as_str()).collect();
        assert_eq!(labels, vec!["Settings", "Departments", "Employees"]);
        assert_eq!(surface.components_in("dashboard").count(), 2);
    }
}
