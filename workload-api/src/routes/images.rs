use actix_web::{
    HttpResponse, Responder, ResponseError, http::StatusCode, post,
    web::{Data, Json},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use workload_config::SerializableSecretString;

use crate::images::{
    ImagePullError, ImagePullRequest, ImagePuller, ImageReference, RegistryCredentials,
};
use crate::routes::{ErrorMessage, json_error_response};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Pull(#[from] ImagePullError),
}

impl ResponseError for ImageError {
    fn status_code(&self) -> StatusCode {
        match self {
            ImageError::Pull(
                ImagePullError::InvalidReference(_) | ImagePullError::MissingCredentials,
            ) => StatusCode::BAD_REQUEST,
            ImageError::Pull(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error_response(self.status_code(), self.to_string(), None)
    }
}

fn default_is_public() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullImageRequest {
    #[schema(example = "docker.io", required = true)]
    pub registry: String,
    #[schema(example = "nginx", required = true)]
    pub image: String,
    #[schema(example = "1.27", required = true)]
    pub tag: String,
    #[serde(default = "default_is_public")]
    #[schema(example = true)]
    pub is_public: bool,
    #[serde(default)]
    pub registry_username: Option<String>,
    #[serde(default)]
    pub registry_password: Option<SerializableSecretString>,
}

impl PullImageRequest {
    pub fn into_pull_request(self) -> Result<ImagePullRequest, ImagePullError> {
        let reference = ImageReference::new(&self.registry, &self.image, &self.tag)?;
        if self.is_public {
            return Ok(ImagePullRequest {
                reference,
                credentials: None,
            });
        }

        let username = self
            .registry_username
            .map(|username| username.trim().to_owned())
            .filter(|username| !username.is_empty());
        let password = self
            .registry_password
            .filter(|password| !password.is_empty());
        let (Some(username), Some(password)) = (username, password) else {
            return Err(ImagePullError::MissingCredentials);
        };

        Ok(ImagePullRequest {
            reference,
            credentials: Some(RegistryCredentials { username, password }),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PullImageResponse {
    #[schema(example = "Pulled image registry-1.docker.io/library/nginx:1.27")]
    pub message: String,
    /// Digest of the pulled manifest.
    pub digest: String,
    /// Number of layers stored.
    pub layers: usize,
}

#[utoipa::path(
    summary = "Pull an image",
    description = "Downloads the linux/amd64 manifest, config and layers of an image into the local content store. Private images need registry credentials.",
    context_path = "/v1",
    request_body = PullImageRequest,
    responses(
        (status = 200, description = "Image pulled successfully", body = PullImageResponse),
        (status = 400, description = "Bad request", body = ErrorMessage),
        (status = 500, description = "Registry or storage failure", body = ErrorMessage)
    ),
    tag = "Images"
)]
#[post("/images/pull")]
pub async fn pull_image(
    image_puller: Data<dyn ImagePuller>,
    request: Json<PullImageRequest>,
) -> Result<impl Responder, ImageError> {
    let request = request.into_inner().into_pull_request()?;

    let pulled = image_puller.pull(&request).await?;
    info!(
        image = %pulled.reference,
        digest = %pulled.digest,
        layers = pulled.layers,
        bytes = pulled.bytes_downloaded,
        "pulled image"
    );

    Ok(Json(PullImageResponse {
        message: format!("Pulled image {}", pulled.reference),
        digest: pulled.digest,
        layers: pulled.layers,
    }))
}
