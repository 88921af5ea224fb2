use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::StatusCode,
    web::{Data, Json, Path},
};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::concurrency::shutdown::ShutdownTx;
use crate::config::ApiConfig;
use crate::deletion::{
    DeletionError, DeletionOptions, PollPolicy, ResourceHandle, delete_and_confirm,
};
use crate::k8s::resources::{APP_LABEL, OWNER_LABEL};
use crate::k8s::{K8sClient, K8sError};
use crate::routes::{
    DeleteResponse, ErrorMessage, deletion_status_code, json_error_response,
};

#[derive(Debug, Error)]
pub enum PodError {
    #[error("Invalid pod request: {0}")]
    InvalidRequest(String),

    #[error("Pod or replicas not found")]
    PodNotFound,

    #[error(transparent)]
    K8s(#[from] K8sError),

    #[error(transparent)]
    Deletion(#[from] DeletionError),
}

impl ResponseError for PodError {
    fn status_code(&self) -> StatusCode {
        match self {
            PodError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PodError::PodNotFound => StatusCode::NOT_FOUND,
            PodError::K8s(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PodError::Deletion(err) => deletion_status_code(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let deletion_error = match self {
            PodError::Deletion(err) => Some(err),
            _ => None,
        };

        json_error_response(self.status_code(), self.to_string(), deletion_error)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadPodsResponse {
    #[schema(value_type = Vec<Object>)]
    pub pods: Vec<Pod>,
}

fn non_empty(field: &str, value: &str) -> Result<String, PodError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PodError::InvalidRequest(format!("{field} must not be empty")));
    }

    Ok(value.to_owned())
}

fn found(pods: Vec<Pod>) -> Result<Json<ReadPodsResponse>, PodError> {
    if pods.is_empty() {
        return Err(PodError::PodNotFound);
    }

    Ok(Json(ReadPodsResponse { pods }))
}

#[utoipa::path(
    summary = "List the pods of an app",
    description = "Returns the pods carrying the given app label.",
    context_path = "/v1",
    params(
        ("label" = String, Path, description = "Value of the app label"),
    ),
    responses(
        (status = 200, description = "Pods found", body = ReadPodsResponse),
        (status = 404, description = "No pod carries the label", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pods"
)]
#[get("/pods/{label}")]
pub async fn read_pods_by_label(
    k8s_client: Data<dyn K8sClient>,
    label: Path<String>,
) -> Result<impl Responder, PodError> {
    let label = non_empty("label", &label.into_inner())?;

    let pods = k8s_client
        .list_pods(&format!("{APP_LABEL}={label}"), None)
        .await?;

    found(pods)
}

#[utoipa::path(
    summary = "Read a pod of a deployment",
    description = "Returns the named pod when it belongs to the given deployment.",
    context_path = "/v1",
    params(
        ("deployment_name" = String, Path, description = "Name of the owning deployment"),
        ("pod_name" = String, Path, description = "Name of the pod"),
    ),
    responses(
        (status = 200, description = "Pod found", body = ReadPodsResponse),
        (status = 404, description = "Pod not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Pods"
)]
#[get("/deployments/{deployment_name}/pods/{pod_name}")]
pub async fn read_deployment_pod(
    k8s_client: Data<dyn K8sClient>,
    path: Path<(String, String)>,
) -> Result<impl Responder, PodError> {
    let (deployment_name, pod_name) = path.into_inner();
    let deployment_name = non_empty("deployment name", &deployment_name)?;
    let pod_name = non_empty("pod name", &pod_name)?;

    let pods = k8s_client
        .list_pods(
            &format!("{OWNER_LABEL}={deployment_name}"),
            Some(&format!("metadata.name={pod_name}")),
        )
        .await?;

    found(pods)
}

#[utoipa::path(
    summary = "Delete a pod",
    description = "Deletes a pod and waits until it is no longer visible. Deleting a missing pod succeeds.",
    context_path = "/v1",
    params(
        ("pod_name" = String, Path, description = "Name of the pod"),
    ),
    responses(
        (status = 200, description = "Pod deleted and confirmed gone", body = DeleteResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Deletion failed or was not confirmed in time, timeouts carry a Retry-After header", body = ErrorMessage)
    ),
    tag = "Pods"
)]
#[delete("/pods/{pod_name}")]
pub async fn delete_pod(
    config: Data<ApiConfig>,
    k8s_client: Data<dyn K8sClient>,
    shutdown_tx: Data<ShutdownTx>,
    pod_name: Path<String>,
) -> Result<impl Responder, PodError> {
    let handle = ResourceHandle::for_pod(&pod_name.into_inner()).map_err(DeletionError::from)?;
    let name = handle.primary_name().to_owned();

    let options = DeletionOptions {
        policy: PollPolicy::new(config.deletion.poll_interval(), config.deletion.pod_timeout()),
        track_dependent: false,
    };
    let k8s_client = k8s_client.into_inner();
    let report =
        delete_and_confirm(k8s_client.as_ref(), handle, options, shutdown_tx.subscribe()).await?;

    Ok(Json(DeleteResponse::new(format!("Deleted pod {name}"), &report)))
}
