use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::images::{
    BlobDigest, ImagePullError, ImagePullRequest, ImagePuller, PulledImage, RegistryCredentials,
};

/// String to set as the user agent in registry requests.
static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

const TARGET_OS: &str = "linux";
const TARGET_ARCHITECTURE: &str = "amd64";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    digest: String,
    #[serde(default)]
    size: u64,
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    architecture: String,
    os: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    media_type: Option<String>,
    #[serde(default)]
    manifests: Vec<Descriptor>,
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

impl ManifestDocument {
    fn is_index(&self, content_type: Option<&str>) -> bool {
        let media_type = self.media_type.as_deref().or(content_type);
        matches!(media_type, Some(OCI_INDEX | DOCKER_MANIFEST_LIST))
            || (self.config.is_none() && !self.manifests.is_empty())
    }

    fn platform_digest(&self) -> Option<&str> {
        self.manifests
            .iter()
            .find(|manifest| {
                manifest.platform.as_ref().is_some_and(|platform| {
                    platform.os == TARGET_OS && platform.architecture == TARGET_ARCHITECTURE
                })
            })
            .map(|manifest| manifest.digest.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer { realm: String, params: Vec<(String, String)> },
}

fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, rest) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut params: HashMap<String, String> = HashMap::new();
    let mut rest = rest.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let after_key = after_key.trim_start();
        let (value, remaining) = if let Some(quoted) = after_key.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            let end = after_key.find(',').unwrap_or(after_key.len());
            (&after_key[..end], &after_key[end..])
        };
        params.insert(key.trim().to_ascii_lowercase(), value.to_owned());
        rest = remaining.trim_start().trim_start_matches(',').trim_start();
    }

    let realm = params.remove("realm")?;
    let mut params: Vec<_> = params.into_iter().collect();
    params.sort();

    Some(Challenge::Bearer { realm, params })
}

/// Authorization attached to registry requests once a challenge was answered.
#[derive(Debug, Clone, Default)]
enum Authorization {
    #[default]
    Anonymous,
    Basic,
    Bearer(String),
}

/// Pulls images through the OCI distribution API into a content addressed
/// blob store under `content_dir/blobs/sha256`.
#[derive(Debug)]
pub struct OciRegistryPuller {
    client: Client,
    content_dir: PathBuf,
}

impl OciRegistryPuller {
    pub fn new(content_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, ImagePullError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(CLIENT_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            content_dir: content_dir.into(),
        })
    }

    fn blobs_dir(&self) -> PathBuf {
        self.content_dir.join("blobs").join("sha256")
    }

    fn authorize(
        &self,
        request: RequestBuilder,
        authorization: &Authorization,
        credentials: Option<&RegistryCredentials>,
    ) -> RequestBuilder {
        match (authorization, credentials) {
            (Authorization::Bearer(token), _) => request.bearer_auth(token),
            (Authorization::Basic, Some(credentials)) => {
                request.basic_auth(&credentials.username, Some(credentials.password()))
            }
            _ => request,
        }
    }

    async fn fetch_token(
        &self,
        realm: &str,
        params: &[(String, String)],
        credentials: Option<&RegistryCredentials>,
    ) -> Result<String, ImagePullError> {
        let mut request = self.client.get(realm).query(params);
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(credentials.password()));
        }

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ImagePullError::Unauthorized(realm.to_owned()));
        }
        let response = ensure_success(response)?;
        let token: TokenResponse = response.json().await?;

        token
            .token
            .or(token.access_token)
            .ok_or_else(|| ImagePullError::Unauthorized(realm.to_owned()))
    }

    /// Sends a GET to `url`, answering at most one authentication challenge.
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        authorization: &mut Authorization,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<Response, ImagePullError> {
        let build = |authorization: &Authorization| {
            let mut request = self.client.get(url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            self.authorize(request, authorization, credentials)
        };

        let response = build(&*authorization).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(response);
        }

        let challenge = challenge_of(response.headers())
            .ok_or_else(|| ImagePullError::Unauthorized(url.to_owned()))?;
        debug!(?challenge, "answering registry challenge");

        *authorization = match challenge {
            Challenge::Basic if credentials.is_some() => Authorization::Basic,
            Challenge::Basic => return Err(ImagePullError::MissingCredentials),
            Challenge::Bearer { realm, params } => {
                Authorization::Bearer(self.fetch_token(&realm, &params, credentials).await?)
            }
        };

        let response = build(&*authorization).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ImagePullError::Unauthorized(url.to_owned()));
        }

        ensure_success(response)
    }

    async fn fetch_manifest(
        &self,
        url: &str,
        authorization: &mut Authorization,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<(ManifestDocument, Vec<u8>, BlobDigest), ImagePullError> {
        let accept = [OCI_INDEX, OCI_MANIFEST, DOCKER_MANIFEST_LIST, DOCKER_MANIFEST].join(", ");
        let response = self
            .get(url, Some(&accept), authorization, credentials)
            .await?;

        let advertised = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|value| value.to_str().ok())
            .map(BlobDigest::parse)
            .transpose()?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response.bytes().await?.to_vec();
        let digest = BlobDigest::of(&body);
        if let Some(advertised) = advertised {
            advertised.verify(&digest)?;
        }

        let document: ManifestDocument = serde_json::from_slice(&body)?;
        if document.is_index(content_type.as_deref()) {
            return Ok((document, body, digest));
        }

        if document.config.is_none() {
            return Err(ImagePullError::UnsupportedManifest(
                content_type.unwrap_or_else(|| "unknown media type".to_owned()),
            ));
        }

        Ok((document, body, digest))
    }

    /// Downloads `digest` unless the store already has it. Returns the number
    /// of bytes downloaded.
    async fn fetch_blob(
        &self,
        api_base: &str,
        digest: &str,
        authorization: &mut Authorization,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<u64, ImagePullError> {
        let expected = BlobDigest::parse(digest)?;
        let target = self.blobs_dir().join(expected.hex());
        if fs::try_exists(&target).await? {
            debug!(%digest, "blob already present");
            return Ok(0);
        }

        let url = format!("{api_base}/blobs/{digest}");
        let mut response = self.get(&url, None, authorization, credentials).await?;

        let partial = self.blobs_dir().join(format!(".{}.{}", expected.hex(), Uuid::new_v4()));
        let mut file = fs::File::create(&partial).await?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;

        let result: Result<(), ImagePullError> = async {
            while let Some(chunk) = response.chunk().await? {
                hasher.update(&chunk);
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;

            expected.verify(&BlobDigest::from_hasher(hasher))
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&partial).await;
            return Err(err);
        }

        fs::rename(&partial, &target).await?;

        Ok(written)
    }

    async fn store(&self, digest: &BlobDigest, content: &[u8]) -> Result<(), ImagePullError> {
        write_atomically(&self.blobs_dir(), digest, content).await
    }
}

async fn write_atomically(
    dir: &Path,
    digest: &BlobDigest,
    content: &[u8],
) -> Result<(), ImagePullError> {
    let partial = dir.join(format!(".{}.{}", digest.hex(), Uuid::new_v4()));
    fs::write(&partial, content).await?;
    fs::rename(&partial, dir.join(digest.hex())).await?;

    Ok(())
}

fn challenge_of(headers: &HeaderMap) -> Option<Challenge> {
    headers
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_challenge)
}

fn ensure_success(response: Response) -> Result<Response, ImagePullError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ImagePullError::UnexpectedStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }

    Ok(response)
}

#[async_trait]
impl ImagePuller for OciRegistryPuller {
    async fn pull(&self, request: &ImagePullRequest) -> Result<PulledImage, ImagePullError> {
        let reference = &request.reference;
        let credentials = request.credentials.as_ref();
        let api_base = reference.api_base();
        let mut authorization = Authorization::default();

        fs::create_dir_all(self.blobs_dir()).await?;

        let manifest_url = format!("{api_base}/manifests/{}", reference.tag());
        let (mut manifest, mut body, mut digest) = self
            .fetch_manifest(&manifest_url, &mut authorization, credentials)
            .await?;

        if manifest.is_index(None) {
            let platform_digest = manifest
                .platform_digest()
                .ok_or(ImagePullError::NoMatchingPlatform)?
                .to_owned();
            self.store(&digest, &body).await?;

            let url = format!("{api_base}/manifests/{platform_digest}");
            (manifest, body, digest) = self
                .fetch_manifest(&url, &mut authorization, credentials)
                .await?;
            BlobDigest::parse(&platform_digest)?.verify(&digest)?;
        }

        let Some(config) = manifest.config.as_ref() else {
            return Err(ImagePullError::UnsupportedManifest(
                "nested image index".to_owned(),
            ));
        };

        let mut bytes_downloaded = 0;
        for blob in std::iter::once(config).chain(manifest.layers.iter()) {
            debug!(digest = %blob.digest, size = blob.size, "fetching blob");
            bytes_downloaded += self
                .fetch_blob(&api_base, &blob.digest, &mut authorization, credentials)
                .await?;
        }
        self.store(&digest, &body).await?;

        info!(%reference, %digest, layers = manifest.layers.len(), "pulled image");

        Ok(PulledImage {
            reference: reference.to_string(),
            digest: digest.to_string(),
            layers: manifest.layers.len(),
            bytes_downloaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#;

        assert_eq!(
            parse_challenge(header),
            Some(Challenge::Bearer {
                realm: "https://auth.docker.io/token".to_owned(),
                params: vec![
                    ("scope".to_owned(), "repository:library/nginx:pull".to_owned()),
                    ("service".to_owned(), "registry.docker.io".to_owned()),
                ],
            })
        );
    }

    #[test]
    fn parses_basic_and_rejects_unknown_challenges() {
        assert_eq!(
            parse_challenge(r#"Basic realm="registry""#),
            Some(Challenge::Basic)
        );
        assert_eq!(parse_challenge("Negotiate"), None);
        assert_eq!(parse_challenge(r#"Bearer service="x""#), None);
    }

    #[test]
    fn picks_linux_amd64_from_index() {
        let index = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {"digest": "sha256:aa", "size": 1, "platform": {"architecture": "arm64", "os": "linux"}},
                {"digest": "sha256:bb", "size": 1, "platform": {"architecture": "amd64", "os": "linux"}}
            ]
        }"#;
        let document: ManifestDocument = serde_json::from_str(index).unwrap();

        assert!(document.is_index(None));
        assert_eq!(document.platform_digest(), Some("sha256:bb"));
    }

    #[test]
    fn image_manifest_is_not_an_index() {
        let manifest = r#"{
            "schemaVersion": 2,
            "config": {"digest": "sha256:cc", "size": 10},
            "layers": [{"digest": "sha256:dd", "size": 20}]
        }"#;
        let document: ManifestDocument = serde_json::from_str(manifest).unwrap();

        assert!(!document.is_index(Some(OCI_MANIFEST)));
        assert_eq!(document.layers.len(), 1);
    }

    #[tokio::test]
    async fn stored_blobs_are_content_addressed() {
        let dir = std::env::temp_dir().join(format!("workload-api-blobs-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).await.unwrap();
        let digest = BlobDigest::of(b"manifest");

        write_atomically(&dir, &digest, b"manifest").await.unwrap();

        let stored = fs::read(dir.join(digest.hex())).await.unwrap();
        assert_eq!(stored, b"manifest");
        fs::remove_dir_all(&dir).await.unwrap();
    }
}
