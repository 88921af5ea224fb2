use actix_web::{
    HttpResponse,
    http::{
        StatusCode,
        header::{ContentType, RETRY_AFTER},
    },
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::deletion::{DeletionError, DeletionReport};

pub mod deployments;
pub mod health_check;
pub mod images;
pub mod metrics;
pub mod pods;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    #[schema(example = "an error occurred in the api")]
    pub error: String,
    /// Time a failed or timed out deletion spent polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 60000)]
    pub elapsed_ms: Option<u64>,
    /// Objects of a timed out deletion not confirmed absent, as `kind/name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = json!(["secret/nginx-image-pull-secret"]))]
    pub lingering: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Created deployment nginx")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    #[schema(example = "Deleted deployment nginx")]
    pub message: String,
    /// Time between issuing the delete and confirming it.
    #[schema(example = 1500)]
    pub elapsed_ms: u64,
    /// Objects confirmed absent, as `kind/name`.
    #[schema(example = json!(["deployment/nginx", "secret/nginx-image-pull-secret"]))]
    pub deleted: Vec<String>,
}

impl DeleteResponse {
    fn new(message: String, report: &DeletionReport) -> Self {
        Self {
            message,
            elapsed_ms: report.elapsed.as_millis() as u64,
            deleted: report
                .confirmed_absent
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

pub(crate) fn deletion_status_code(err: &DeletionError) -> StatusCode {
    match err {
        DeletionError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        DeletionError::IssueFailed { .. }
        | DeletionError::TimedOut { .. }
        | DeletionError::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the JSON error response.
///
/// Deletion errors also report how long the job ran, and timeouts name the
/// objects still present and tell clients when to retry.
pub(crate) fn json_error_response(
    status: StatusCode,
    message: String,
    deletion_error: Option<&DeletionError>,
) -> HttpResponse {
    let elapsed_ms = deletion_error
        .and_then(DeletionError::elapsed)
        .map(|elapsed| elapsed.as_millis() as u64);
    let lingering = match deletion_error {
        Some(err @ DeletionError::TimedOut { .. }) => Some(
            err.lingering()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        ),
        _ => None,
    };
    let error_message = ErrorMessage {
        error: message,
        elapsed_ms,
        lingering,
    };
    let body = serde_json::to_string(&error_message).expect("failed to serialize error message");

    let mut response = HttpResponse::build(status);
    response.insert_header(ContentType::json());
    if let Some(DeletionError::TimedOut { timeout, .. }) = deletion_error {
        response.insert_header((RETRY_AFTER, timeout.as_secs().max(1)));
    }

    response.body(body)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use actix_web::body::to_bytes;

    use super::*;
    use crate::deletion::poller::Observation;
    use crate::k8s::{GatewayError, K8sError, ResourceKind, ResourceRef};

    async fn body(response: HttpResponse) -> ErrorMessage {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn time_out_body_names_lingering_objects() {
        let deployment = ResourceRef::new(ResourceKind::Deployment, "web");
        let secret = ResourceRef::new(ResourceKind::Secret, "web-image-pull-secret");
        let err = DeletionError::TimedOut {
            resource: deployment.clone(),
            elapsed: Duration::from_millis(1500),
            timeout: Duration::from_millis(1500),
            last_observed: BTreeMap::from([
                (deployment, Observation::Absent),
                (secret, Observation::Unknown),
            ]),
            cancelled: false,
        };

        let response =
            json_error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), Some(&err));

        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("1")
        );
        let body = body(response).await;
        assert_eq!(body.elapsed_ms, Some(1500));
        assert_eq!(
            body.lingering,
            Some(vec!["secret/web-image-pull-secret".to_string()])
        );
    }

    #[actix_web::test]
    async fn failed_body_reports_elapsed_only() {
        let err = DeletionError::Failed {
            resource: ResourceRef::new(ResourceKind::Pod, "web-0"),
            elapsed: Duration::from_millis(250),
            source: GatewayError::Fatal(K8sError::Serde(
                serde_json::from_str::<()>("not json").unwrap_err(),
            )),
        };

        let body = body(json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.to_string(),
            Some(&err),
        ))
        .await;

        assert_eq!(body.elapsed_ms, Some(250));
        assert!(body.lingering.is_none());
    }

    #[actix_web::test]
    async fn plain_errors_carry_only_the_message() {
        let response = json_error_response(StatusCode::NOT_FOUND, "gone".to_string(), None);

        let bytes = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], br#"{"error":"gone"}"#);
    }
}
