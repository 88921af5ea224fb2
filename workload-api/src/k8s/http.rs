use crate::k8s::{
    ControlPlane, DeleteOutcome, GatewayError, K8sClient, K8sError, Presence, ResourceKind,
    ResourceRef,
};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// How a failed API call should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    NotFound,
    Transient,
    Fatal,
}

fn classify_status_code(code: u16) -> ErrorClass {
    match code {
        404 => ErrorClass::NotFound,
        408 | 429 | 500 | 502 | 503 | 504 => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

fn classify(err: &kube::Error) -> ErrorClass {
    match err {
        kube::Error::Api(response) => classify_status_code(response.code),
        kube::Error::HyperError(_) | kube::Error::Service(_) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

fn into_gateway_error(err: kube::Error, class: ErrorClass) -> GatewayError {
    match class {
        ErrorClass::Transient => GatewayError::Transient(err.into()),
        ErrorClass::NotFound | ErrorClass::Fatal => GatewayError::Fatal(err.into()),
    }
}

async fn delete_in<K>(
    api: &Api<K>,
    name: &str,
    params: &DeleteParams,
) -> Result<DeleteOutcome, GatewayError>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, params).await {
        Ok(_) => Ok(DeleteOutcome::Issued),
        Err(err) => match classify(&err) {
            ErrorClass::NotFound => Ok(DeleteOutcome::NotFound),
            class => Err(into_gateway_error(err, class)),
        },
    }
}

async fn exists_in<K>(api: &Api<K>, name: &str) -> Result<Presence, GatewayError>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.get_opt(name).await {
        Ok(Some(_)) => Ok(Presence::Present),
        Ok(None) => Ok(Presence::Absent),
        Err(err) => match classify(&err) {
            ErrorClass::NotFound => Ok(Presence::Absent),
            class => Err(into_gateway_error(err, class)),
        },
    }
}

/// HTTP-based implementation of [`K8sClient`].
///
/// All calls are scoped to the namespace the client was created for.
#[derive(Debug)]
pub struct HttpK8sClient {
    secrets_api: Api<Secret>,
    deployments_api: Api<Deployment>,
    pods_api: Api<Pod>,
}

impl HttpK8sClient {
    /// Creates a client from the ambient kube configuration.
    pub async fn new(namespace: &str) -> Result<HttpK8sClient, K8sError> {
        let client = Client::try_default().await?;

        Ok(Self::with_client(client, namespace))
    }

    pub fn with_client(client: Client, namespace: &str) -> HttpK8sClient {
        let secrets_api: Api<Secret> = Api::namespaced(client.clone(), namespace);
        let deployments_api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
        let pods_api: Api<Pod> = Api::namespaced(client, namespace);

        HttpK8sClient {
            secrets_api,
            deployments_api,
            pods_api,
        }
    }
}

#[async_trait]
impl ControlPlane for HttpK8sClient {
    async fn issue_delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, GatewayError> {
        debug!(%resource, "issuing delete");

        match resource.kind {
            // Foreground propagation removes the owned replica sets and pods
            // before the deployment object itself disappears.
            ResourceKind::Deployment => {
                delete_in(
                    &self.deployments_api,
                    &resource.name,
                    &DeleteParams::foreground(),
                )
                .await
            }
            ResourceKind::Secret => {
                delete_in(&self.secrets_api, &resource.name, &DeleteParams::default()).await
            }
            ResourceKind::Pod => {
                delete_in(&self.pods_api, &resource.name, &DeleteParams::default()).await
            }
        }
    }

    async fn exists(&self, resource: &ResourceRef) -> Result<Presence, GatewayError> {
        match resource.kind {
            ResourceKind::Deployment => exists_in(&self.deployments_api, &resource.name).await,
            ResourceKind::Secret => exists_in(&self.secrets_api, &resource.name).await,
            ResourceKind::Pod => exists_in(&self.pods_api, &resource.name).await,
        }
    }
}

#[async_trait]
impl K8sClient for HttpK8sClient {
    async fn create_secret(&self, secret: &Secret) -> Result<(), K8sError> {
        debug!(name = ?secret.metadata.name, "creating secret");

        self.secrets_api
            .create(&PostParams::default(), secret)
            .await?;

        Ok(())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, K8sError> {
        debug!(name = ?deployment.metadata.name, "creating deployment");

        let created = self
            .deployments_api
            .create(&PostParams::default(), deployment)
            .await?;

        Ok(created)
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, K8sError> {
        let list = self.deployments_api.list(&ListParams::default()).await?;

        Ok(list.items)
    }

    async fn list_deployments_by_name(&self, name: &str) -> Result<Vec<Deployment>, K8sError> {
        let params = ListParams::default().fields(&format!("metadata.name={name}"));
        let list = self.deployments_api.list(&params).await?;

        Ok(list.items)
    }

    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>, K8sError> {
        let deployment = self.deployments_api.get_opt(name).await?;

        Ok(deployment)
    }

    async fn list_pods(
        &self,
        label_selector: &str,
        field_selector: Option<&str>,
    ) -> Result<Vec<Pod>, K8sError> {
        let mut params = ListParams::default().labels(label_selector);
        if let Some(field_selector) = field_selector {
            params = params.fields(field_selector);
        }
        let list = self.pods_api.list(&params).await?;

        Ok(list.items)
    }
}
