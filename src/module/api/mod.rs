//! Application surface exposed by loaded modules

pub mod surface;

pub use surface::{AppSurface, MountedComponent, MountedMenu, MountedRoute, SurfaceWarning};
