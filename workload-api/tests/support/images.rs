#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use workload_api::images::{ImagePullError, ImagePullRequest, ImagePuller, PulledImage};

/// Image name the fake answers with a registry 404.
pub const MISSING_IMAGE: &str = "does-not-exist";

pub const FAKE_DIGEST: &str =
    "sha256:2cbb7d2a3e1a1b7f6a2d6d9c1bbf4c2a3b7d2e9f0c1d2e3f4a5b6c7d8e9f0a1b";

/// Records pull requests and reports a two layer image without any network.
#[derive(Default)]
pub struct FakeImagePuller {
    pulled: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeImagePuller {
    /// References pulled so far, each with the username it was pulled with.
    pub fn pulled(&self) -> Vec<(String, Option<String>)> {
        self.pulled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImagePuller for FakeImagePuller {
    async fn pull(&self, request: &ImagePullRequest) -> Result<PulledImage, ImagePullError> {
        let reference = request.reference.to_string();
        if request.reference.repository().ends_with(MISSING_IMAGE) {
            return Err(ImagePullError::UnexpectedStatus {
                status: 404,
                url: format!("{}/manifests/{}", request.reference.api_base(), request.reference.tag()),
            });
        }

        let username = request
            .credentials
            .as_ref()
            .map(|credentials| credentials.username.clone());
        self.pulled.lock().unwrap().push((reference.clone(), username));

        Ok(PulledImage {
            reference,
            digest: FAKE_DIGEST.to_string(),
            layers: 2,
            bytes_downloaded: 1024,
        })
    }
}
