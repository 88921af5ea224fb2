use thiserror::Error;

use crate::k8s::resources::image_pull_secret_name;
use crate::k8s::{ResourceKind, ResourceRef};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("the {0} name must not be empty")]
    EmptyName(ResourceKind),
}

/// Identifies what a delete request must remove and confirm gone.
///
/// The dependent is never supplied by callers: it is derived from the
/// primary name when the creation-time record says one was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    kind: ResourceKind,
    primary_name: String,
    dependent_name: Option<String>,
}

impl ResourceHandle {
    fn new(kind: ResourceKind, name: &str) -> Result<Self, HandleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HandleError::EmptyName(kind));
        }

        Ok(Self {
            kind,
            primary_name: name.to_owned(),
            dependent_name: None,
        })
    }

    /// Handle for a deployment, coupled with its image pull secret when
    /// `has_image_pull_secret` is set.
    pub fn for_deployment(name: &str, has_image_pull_secret: bool) -> Result<Self, HandleError> {
        let mut handle = Self::new(ResourceKind::Deployment, name)?;
        if has_image_pull_secret {
            handle.dependent_name = Some(image_pull_secret_name(&handle.primary_name));
        }

        Ok(handle)
    }

    pub fn for_pod(name: &str) -> Result<Self, HandleError> {
        Self::new(ResourceKind::Pod, name)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    pub fn dependent_name(&self) -> Option<&str> {
        self.dependent_name.as_deref()
    }

    pub fn primary(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.primary_name.clone())
    }

    /// The coupled credential object, always a secret.
    pub fn dependent(&self) -> Option<ResourceRef> {
        self.dependent_name
            .as_ref()
            .map(|name| ResourceRef::new(ResourceKind::Secret, name.clone()))
    }
}
