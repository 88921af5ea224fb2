//! Kubernetes integration for the workload API.
//!
//! Routes and the deletion protocol depend on the traits in [`base`]:
//! [`ControlPlane`] is the small capability set the deletion protocol needs
//! (issue a delete, check existence), [`K8sClient`] adds the pass-through
//! calls used by the create and read endpoints.
//!
//! The default client, [`http::HttpK8sClient`], is backed by the [`kube`]
//! crate and uses the ambient configuration (in-cluster or `~/.kube/config`).
//! It is also where raw client errors are classified, so "not found" never
//! travels further as an error.
//!
//! [`resources`] builds the objects the service creates.

mod base;
pub mod http;
pub mod resources;

pub use base::*;
