use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::StatusCode,
    post,
    web::{Data, Json, Path},
};
use k8s_openapi::api::apps::v1::Deployment;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;
use workload_config::SerializableSecretString;

use crate::concurrency::shutdown::ShutdownTx;
use crate::config::ApiConfig;
use crate::deletion::{
    DeletionError, DeletionOptions, PollPolicy, ResourceHandle, delete_and_confirm,
};
use crate::k8s::resources::{
    RegistryLogin, WorkloadSpec, build_deployment, build_image_pull_secret,
    image_pull_secret_name, recorded_image_pull_secret,
};
use crate::k8s::{K8sClient, K8sError, ResourceKind, ResourceRef};
use crate::routes::{
    DeleteResponse, ErrorMessage, MessageResponse, deletion_status_code, json_error_response,
};

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Invalid deployment request: {0}")]
    InvalidRequest(String),

    #[error("Deployment not found")]
    DeploymentNotFound,

    #[error(transparent)]
    K8s(#[from] K8sError),

    #[error(transparent)]
    Deletion(#[from] DeletionError),
}

impl ResponseError for DeploymentError {
    fn status_code(&self) -> StatusCode {
        match self {
            DeploymentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DeploymentError::DeploymentNotFound => StatusCode::NOT_FOUND,
            DeploymentError::K8s(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DeploymentError::Deletion(err) => deletion_status_code(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let deletion_error = match self {
            DeploymentError::Deletion(err) => Some(err),
            _ => None,
        };

        json_error_response(self.status_code(), self.to_string(), deletion_error)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    #[schema(example = "nginx", required = true)]
    pub deployment_name: String,
    #[schema(example = "web", required = true)]
    pub deployment_label: String,
    #[schema(example = "nginx", required = true)]
    pub container_name: String,
    #[schema(example = "docker.io", required = true)]
    pub container_registry_server: String,
    #[schema(example = "nginx", required = true)]
    pub container_image_name: String,
    #[schema(example = "1.27", required = true)]
    pub container_image_tag: String,
    #[schema(example = "80", required = true)]
    pub container_port: String,
    #[schema(example = "1", required = true)]
    pub replica_count: String,
    #[serde(default)]
    pub registry_type: RegistryType,
    #[serde(default)]
    pub registry_username: Option<String>,
    #[serde(default)]
    pub registry_password: Option<SerializableSecretString>,
    #[serde(default)]
    #[schema(example = "250m")]
    pub cpu: Option<String>,
    #[serde(default)]
    #[schema(example = "128Mi")]
    pub memory: Option<String>,
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, DeploymentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DeploymentError::InvalidRequest(format!(
            "{field} must not be empty"
        )));
    }

    Ok(value)
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

impl CreateDeploymentRequest {
    /// Validates the request and turns it into the deployment to create.
    pub fn workload_spec(&self) -> Result<WorkloadSpec, DeploymentError> {
        let name = required("deploymentName", &self.deployment_name)?;
        let server = required("containerRegistryServer", &self.container_registry_server)?;
        let image = required("containerImageName", &self.container_image_name)?;
        let tag = required("containerImageTag", &self.container_image_tag)?;

        let container_port = self
            .container_port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port > 0)
            .ok_or_else(|| {
                DeploymentError::InvalidRequest(
                    "containerPort must be an integer between 1 and 65535".to_owned(),
                )
            })?;
        let replicas = self
            .replica_count
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|replicas| *replicas >= 0)
            .ok_or_else(|| {
                DeploymentError::InvalidRequest(
                    "replicaCount must be a non negative integer".to_owned(),
                )
            })?;

        let image_pull_secret =
            (self.registry_type == RegistryType::Private).then(|| image_pull_secret_name(name));

        Ok(WorkloadSpec {
            name: name.to_owned(),
            label: required("deploymentLabel", &self.deployment_label)?.to_owned(),
            container_name: required("containerName", &self.container_name)?.to_owned(),
            image: format!("{server}/{image}:{tag}"),
            container_port,
            replicas,
            image_pull_secret,
            cpu: optional(&self.cpu),
            memory: optional(&self.memory),
        })
    }

    /// Registry login for private registries.
    pub fn registry_login(&self) -> Result<Option<RegistryLogin<'_>>, DeploymentError> {
        if self.registry_type == RegistryType::Public {
            return Ok(None);
        }

        let username = self.registry_username.as_deref().unwrap_or_default();
        let password = self
            .registry_password
            .as_ref()
            .map(|password| password.expose_secret())
            .unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(DeploymentError::InvalidRequest(
                "registryUsername and registryPassword are required for private registries"
                    .to_owned(),
            ));
        }

        Ok(Some(RegistryLogin {
            server: self.container_registry_server.trim(),
            username,
            password,
        }))
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadDeploymentsResponse {
    #[schema(value_type = Vec<Object>)]
    pub deployments: Vec<Deployment>,
}

#[utoipa::path(
    summary = "Create a deployment",
    description = "Creates a single container deployment. For private registries an image pull secret is created first and referenced by the pods.",
    context_path = "/v1",
    request_body = CreateDeploymentRequest,
    responses(
        (status = 200, description = "Deployment created successfully", body = MessageResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Deployments"
)]
#[post("/deployments")]
pub async fn create_deployment(
    k8s_client: Data<dyn K8sClient>,
    request: Json<CreateDeploymentRequest>,
) -> Result<impl Responder, DeploymentError> {
    let request = request.into_inner();
    let spec = request.workload_spec()?;
    let login = request.registry_login()?;

    if let (Some(secret_name), Some(login)) = (&spec.image_pull_secret, &login) {
        let secret = build_image_pull_secret(secret_name, login)?;
        k8s_client.create_secret(&secret).await?;
        info!(secret = %secret_name, "created image pull secret");
    }

    let deployment = build_deployment(&spec)?;
    let created = match k8s_client.create_deployment(&deployment).await {
        Ok(created) => created,
        Err(err) => {
            if let Some(secret_name) = &spec.image_pull_secret {
                // Best effort, the secret would otherwise be orphaned.
                let secret = ResourceRef::new(ResourceKind::Secret, secret_name.clone());
                if let Err(cleanup_err) = k8s_client.issue_delete(&secret).await {
                    warn!(%secret, error = %cleanup_err, "failed to remove image pull secret");
                }
            }

            return Err(err.into());
        }
    };

    let name = created.metadata.name.unwrap_or(spec.name);
    info!(deployment = %name, "created deployment");

    Ok(Json(MessageResponse {
        message: format!("Created deployment {name}"),
    }))
}

#[utoipa::path(
    summary = "List deployments",
    description = "Returns every deployment in the managed namespace.",
    context_path = "/v1",
    responses(
        (status = 200, description = "Deployments listed successfully", body = ReadDeploymentsResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Deployments"
)]
#[get("/deployments")]
pub async fn read_all_deployments(
    k8s_client: Data<dyn K8sClient>,
) -> Result<impl Responder, DeploymentError> {
    let deployments = k8s_client.list_deployments().await?;

    Ok(Json(ReadDeploymentsResponse { deployments }))
}

#[utoipa::path(
    summary = "Read a deployment",
    description = "Returns the deployment with the given name.",
    context_path = "/v1",
    params(
        ("deployment_name" = String, Path, description = "Name of the deployment"),
    ),
    responses(
        (status = 200, description = "Deployment found", body = ReadDeploymentsResponse),
        (status = 404, description = "Deployment not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Deployments"
)]
#[get("/deployments/{deployment_name}")]
pub async fn read_deployment(
    k8s_client: Data<dyn K8sClient>,
    deployment_name: Path<String>,
) -> Result<impl Responder, DeploymentError> {
    let deployment_name = deployment_name.into_inner();

    let deployments = k8s_client
        .list_deployments_by_name(deployment_name.trim())
        .await?;
    if deployments.is_empty() {
        return Err(DeploymentError::DeploymentNotFound);
    }

    Ok(Json(ReadDeploymentsResponse { deployments }))
}

#[utoipa::path(
    summary = "Delete a deployment",
    description = "Deletes a deployment and its image pull secret, then waits until neither is visible anymore. Deleting a missing deployment succeeds.",
    context_path = "/v1",
    params(
        ("deployment_name" = String, Path, description = "Name of the deployment"),
    ),
    responses(
        (status = 200, description = "Deployment deleted and confirmed gone", body = DeleteResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Deletion failed or was not confirmed in time, timeouts carry a Retry-After header", body = ErrorMessage)
    ),
    tag = "Deployments"
)]
#[delete("/deployments/{deployment_name}")]
pub async fn delete_deployment(
    config: Data<ApiConfig>,
    k8s_client: Data<dyn K8sClient>,
    shutdown_tx: Data<ShutdownTx>,
    deployment_name: Path<String>,
) -> Result<impl Responder, DeploymentError> {
    let deployment_name = deployment_name.into_inner();
    let k8s_client = k8s_client.into_inner();

    // Validate before talking to the cluster.
    let handle = ResourceHandle::for_deployment(&deployment_name, false)
        .map_err(DeletionError::from)?;

    // A deployment that is already gone may have left its secret behind.
    let has_image_pull_secret = match k8s_client.get_deployment(handle.primary_name()).await? {
        Some(deployment) => recorded_image_pull_secret(&deployment).is_some(),
        None => true,
    };
    let handle = ResourceHandle::for_deployment(handle.primary_name(), has_image_pull_secret)
        .map_err(DeletionError::from)?;

    let options = DeletionOptions {
        policy: PollPolicy::new(
            config.deletion.poll_interval(),
            config.deletion.deployment_timeout(),
        ),
        track_dependent: config.deletion.track_image_pull_secret,
    };
    let name = handle.primary_name().to_owned();
    let report =
        delete_and_confirm(k8s_client.as_ref(), handle, options, shutdown_tx.subscribe()).await?;

    Ok(Json(DeleteResponse::new(
        format!("Deleted deployment {name}"),
        &report,
    )))
}
