//! # PulseGuard Config
//!
//! Configuration management for the PulseGuard liveness monitor.

mod error;
mod loader;
mod schema;
mod store;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use store::ConfigStore;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
