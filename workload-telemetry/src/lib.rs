//! Logging and metrics set-up shared by the workload binaries and tests.

pub mod metrics;
pub mod tracing;
