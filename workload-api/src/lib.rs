//! Workload API service.
//!
//! Creates, inspects and deletes single container deployments and their pods
//! on a Kubernetes cluster, and pulls container images into a local content
//! store. Deletions are only reported once the cluster confirms the objects
//! are gone, see [`deletion`].

pub mod concurrency;
pub mod config;
pub mod deletion;
pub mod images;
pub mod k8s;
pub mod metrics;
pub mod routes;
pub mod startup;
