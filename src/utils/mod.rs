//! Utility modules shared by the resolver, generator and loader

pub mod fs;
pub mod logging;
pub mod timeout;

pub use fs::atomic_write;
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use timeout::{
    with_cleanup_timeout, with_custom_timeout, DEFAULT_CLEANUP_TIMEOUT, DEFAULT_INIT_TIMEOUT,
};
