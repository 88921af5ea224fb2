use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Secret};
use std::fmt;
use thiserror::Error;

/// Errors emitted by the Kubernetes integration.
#[derive(Debug, Error)]
pub enum K8sError {
    /// A serialization or deserialization error while building or parsing
    /// Kubernetes resources.
    #[error("An error occurred in serde when dealing with K8s: {0}")]
    Serde(#[from] serde_json::error::Error),
    /// An error returned by the [`kube`] client when talking to the API
    /// server.
    #[error("An error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),
}

/// Kinds of objects whose deletion the service confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Deployment,
    Secret,
    Pod,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::Secret => "secret",
            ResourceKind::Pod => "pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named object in the managed namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Whether an object is still visible through the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// Result of asking the API server to delete an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The delete was accepted, the object may linger until garbage collected.
    Issued,
    /// There was nothing to delete.
    NotFound,
}

/// A failed control plane call, classified by whether retrying can help.
///
/// "Not found" is never an error at this level: it surfaces as
/// [`Presence::Absent`] or [`DeleteOutcome::NotFound`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Throttling, unavailability or connection problems.
    #[error("transient control plane error: {0}")]
    Transient(#[source] K8sError),
    /// Anything that will not go away by asking again.
    #[error("control plane error: {0}")]
    Fatal(#[source] K8sError),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// The narrow capability set the deletion protocol depends on.
///
/// Implementations must be safe to call concurrently from independent
/// deletion jobs.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Asks the API server to delete `resource`.
    async fn issue_delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, GatewayError>;

    /// Checks whether `resource` is still visible.
    async fn exists(&self, resource: &ResourceRef) -> Result<Presence, GatewayError>;
}

/// Client interface describing the Kubernetes operations used by the API.
///
/// Everything besides the [`ControlPlane`] capabilities is plain
/// pass-through used by the read and create endpoints.
#[async_trait]
pub trait K8sClient: ControlPlane {
    /// Creates a [`Secret`] in the managed namespace.
    async fn create_secret(&self, secret: &Secret) -> Result<(), K8sError>;

    /// Creates a [`Deployment`] and returns the object stored by the server.
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, K8sError>;

    /// Lists all deployments.
    async fn list_deployments(&self) -> Result<Vec<Deployment>, K8sError>;

    /// Lists deployments whose name is exactly `name`.
    async fn list_deployments_by_name(&self, name: &str) -> Result<Vec<Deployment>, K8sError>;

    /// Returns the named deployment, `None` if it does not exist.
    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, K8sError>;

    /// Lists pods matching a label selector and an optional field selector.
    async fn list_pods(
        &self,
        label_selector: &str,
        field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, K8sError>;
}
