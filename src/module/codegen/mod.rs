//! Registry artifact generation
//!
//! Turns a resolved load order into the static registry the host
//! application imports.

pub mod generator;

pub use generator::{rust_ident, RegistryGenerator};
