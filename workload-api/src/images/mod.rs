//! Image pulling into a local content store.
//!
//! Routes depend on the [`ImagePuller`] trait, [`registry::OciRegistryPuller`]
//! is the implementation talking to registries over the OCI distribution API.

mod base;
pub mod registry;

pub use base::*;
