//! Configuration module.

pub mod cache;
pub mod env;
pub mod logging;

pub use cache::*;
pub use env::*;
pub use logging::init_tracing;
