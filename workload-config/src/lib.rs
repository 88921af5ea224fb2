//! Configuration management for the workload API.
//!
//! Provides environment detection, layered configuration loading from YAML
//! files and environment variables, secret handling, and the shared policy
//! types consumed by the service.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
