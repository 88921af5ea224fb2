#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use workload_api::k8s::{
    ControlPlane, DeleteOutcome, GatewayError, K8sClient, K8sError, Presence, ResourceKind,
    ResourceRef,
};

/// Number of existence checks a terminating object keeps answering
/// `Present` to when it never goes away.
pub const FOREVER: usize = usize::MAX;

fn k8s_error(message: &str) -> K8sError {
    let err = serde_json::from_str::<()>(message).unwrap_err();
    K8sError::Serde(err)
}

#[derive(Default)]
struct State {
    deployments: BTreeMap<String, Deployment>,
    secrets: BTreeMap<String, Secret>,
    pods: BTreeMap<String, Pod>,
    /// Deleted objects still visible, with the checks left before they vanish.
    terminating: BTreeMap<ResourceRef, usize>,
    /// Checks an object survives once its delete was issued.
    lingering: BTreeMap<ResourceRef, usize>,
    rejected_deletes: BTreeSet<ResourceRef>,
    fail_create_deployment: bool,
    deletes: Vec<ResourceRef>,
    exists_calls: BTreeMap<ResourceRef, usize>,
}

/// In-memory cluster emulating asynchronous garbage collection.
#[derive(Default)]
pub struct MockK8sClient {
    state: Mutex<State>,
}

impl MockK8sClient {
    /// Keeps `resource` visible for `checks` existence checks after its
    /// delete was issued.
    pub fn linger(&self, resource: ResourceRef, checks: usize) {
        self.state.lock().unwrap().lingering.insert(resource, checks);
    }

    pub fn reject_delete(&self, resource: ResourceRef) {
        self.state.lock().unwrap().rejected_deletes.insert(resource);
    }

    pub fn fail_create_deployment(&self) {
        self.state.lock().unwrap().fail_create_deployment = true;
    }

    pub fn insert_secret(&self, name: &str) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert(name.to_string(), secret);
    }

    pub fn has_deployment(&self, name: &str) -> bool {
        self.state.lock().unwrap().deployments.contains_key(name)
    }

    pub fn has_secret(&self, name: &str) -> bool {
        self.state.lock().unwrap().secrets.contains_key(name)
    }

    /// Deletes issued so far, in order.
    pub fn deletes(&self) -> Vec<ResourceRef> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn exists_calls(&self, resource: &ResourceRef) -> usize {
        self.state
            .lock()
            .unwrap()
            .exists_calls
            .get(resource)
            .copied()
            .unwrap_or_default()
    }
}

fn pod_for(deployment: &Deployment) -> Option<Pod> {
    let name = deployment.metadata.name.as_ref()?;
    let labels = deployment
        .spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .labels
        .clone();

    Some(Pod {
        metadata: ObjectMeta {
            name: Some(format!("{name}-0")),
            labels,
            ..ObjectMeta::default()
        },
        ..Pod::default()
    })
}

fn selector_pair(selector: &str) -> Option<(&str, &str)> {
    selector.split_once('=')
}

impl State {
    fn remove(&mut self, resource: &ResourceRef) -> bool {
        match resource.kind {
            ResourceKind::Deployment => self.deployments.remove(&resource.name).is_some(),
            ResourceKind::Secret => self.secrets.remove(&resource.name).is_some(),
            ResourceKind::Pod => self.pods.remove(&resource.name).is_some(),
        }
    }

    fn contains(&self, resource: &ResourceRef) -> bool {
        match resource.kind {
            ResourceKind::Deployment => self.deployments.contains_key(&resource.name),
            ResourceKind::Secret => self.secrets.contains_key(&resource.name),
            ResourceKind::Pod => self.pods.contains_key(&resource.name),
        }
    }
}

#[async_trait]
impl ControlPlane for MockK8sClient {
    async fn issue_delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(resource.clone());

        if state.rejected_deletes.contains(resource) {
            return Err(GatewayError::Fatal(k8s_error("forbidden")));
        }

        if state.remove(resource) {
            let checks = state.lingering.get(resource).copied().unwrap_or_default();
            if checks > 0 {
                state.terminating.insert(resource.clone(), checks);
            }
            return Ok(DeleteOutcome::Issued);
        }

        if state.terminating.contains_key(resource) {
            return Ok(DeleteOutcome::Issued);
        }

        Ok(DeleteOutcome::NotFound)
    }

    async fn exists(&self, resource: &ResourceRef) -> Result<Presence, GatewayError> {
        let mut state = self.state.lock().unwrap();
        *state.exists_calls.entry(resource.clone()).or_default() += 1;

        if state.contains(resource) {
            return Ok(Presence::Present);
        }

        if let Some(checks) = state.terminating.get_mut(resource) {
            if *checks != FOREVER {
                *checks -= 1;
            }
            if *checks == 0 {
                state.terminating.remove(resource);
            }
            return Ok(Presence::Present);
        }

        Ok(Presence::Absent)
    }
}

#[async_trait]
impl K8sClient for MockK8sClient {
    async fn create_secret(&self, secret: &Secret) -> Result<(), K8sError> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert(name, secret.clone());

        Ok(())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, K8sError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_deployment {
            return Err(k8s_error("admission webhook denied the request"));
        }

        let name = deployment.metadata.name.clone().unwrap_or_default();
        if let Some(pod) = pod_for(deployment) {
            let pod_name = pod.metadata.name.clone().unwrap_or_default();
            state.pods.insert(pod_name, pod);
        }
        state.deployments.insert(name, deployment.clone());

        Ok(deployment.clone())
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, K8sError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployments
            .values()
            .cloned()
            .collect())
    }

    async fn list_deployments_by_name(&self, name: &str) -> Result<Vec<Deployment>, K8sError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployments
            .get(name)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, K8sError> {
        Ok(self.state.lock().unwrap().deployments.get(name).cloned())
    }

    async fn list_pods(
        &self,
        label_selector: &str,
        field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, K8sError> {
        let (label_key, label_value) =
            selector_pair(label_selector).ok_or_else(|| k8s_error("bad label selector"))?;
        let pod_name = field_selector
            .and_then(selector_pair)
            .map(|(_, value)| value);

        let pods = self
            .state
            .lock()
            .unwrap()
            .pods
            .values()
            .filter(|pod| {
                let labelled = pod
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(label_key))
                    .is_some_and(|value| value == label_value);
                let named = pod_name.is_none_or(|name| pod.metadata.name.as_deref() == Some(name));

                labelled && named
            })
            .cloned()
            .collect();

        Ok(pods)
    }
}
