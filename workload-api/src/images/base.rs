use async_trait::async_trait;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use workload_config::SerializableSecretString;

const DOCKER_HUB_ALIASES: [&str; 2] = ["docker.io", "index.docker.io"];
const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
const SHA256_PREFIX: &str = "sha256:";

#[derive(Debug, Error)]
pub enum ImagePullError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("registry credentials are required to pull a private image")]
    MissingCredentials,

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry responded with status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("registry refused the credentials for {0}")]
    Unauthorized(String),

    #[error("unsupported manifest: {0}")]
    UnsupportedManifest(String),

    #[error("the image index has no linux/amd64 manifest")]
    NoMatchingPlatform,

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("digest mismatch, expected {expected} but content hashes to {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("failed to store image content: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse registry response: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A `registry/repository:tag` reference, normalized for the distribution
/// API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    scheme: &'static str,
    registry: String,
    repository: String,
    tag: String,
}

impl ImageReference {
    /// Builds a reference from the pieces of a pull request.
    ///
    /// Docker Hub names are rewritten to the host serving the API and
    /// single component repositories get the `library/` prefix.
    pub fn new(registry: &str, image: &str, tag: &str) -> Result<Self, ImagePullError> {
        let (scheme, registry) = match registry.trim() {
            r if r.starts_with("http://") => ("http", &r["http://".len()..]),
            r if r.starts_with("https://") => ("https", &r["https://".len()..]),
            r => ("https", r),
        };
        let registry = registry.trim_end_matches('/');
        let image = image.trim().trim_matches('/');
        let tag = tag.trim();

        if registry.is_empty() || registry.contains('/') {
            return Err(ImagePullError::InvalidReference(format!(
                "invalid registry `{registry}`"
            )));
        }
        if image.is_empty() {
            return Err(ImagePullError::InvalidReference(
                "image name must not be empty".to_owned(),
            ));
        }
        if tag.is_empty() || tag.contains('/') {
            return Err(ImagePullError::InvalidReference(format!(
                "invalid tag `{tag}`"
            )));
        }

        let (registry, repository) = if DOCKER_HUB_ALIASES.contains(&registry) {
            let repository = if image.contains('/') {
                image.to_owned()
            } else {
                format!("library/{image}")
            };
            (DOCKER_HUB_REGISTRY.to_owned(), repository)
        } else {
            (registry.to_owned(), image.to_owned())
        };

        Ok(Self {
            scheme,
            registry,
            repository,
            tag: tag.to_owned(),
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Base URL of the repository in the distribution API.
    pub fn api_base(&self) -> String {
        format!("{}://{}/v2/{}", self.scheme, self.registry, self.repository)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: SerializableSecretString,
}

impl RegistryCredentials {
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[derive(Debug, Clone)]
pub struct ImagePullRequest {
    pub reference: ImageReference,
    /// Set for private images only.
    pub credentials: Option<RegistryCredentials>,
}

/// What a successful pull stored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledImage {
    pub reference: String,
    /// Digest of the platform specific manifest.
    pub digest: String,
    pub layers: usize,
    pub bytes_downloaded: u64,
}

/// Something able to fetch an image into local content storage.
#[async_trait]
pub trait ImagePuller: Send + Sync {
    async fn pull(&self, request: &ImagePullRequest) -> Result<PulledImage, ImagePullError>;
}

/// A validated `sha256:<hex>` content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDigest {
    hex: String,
}

impl BlobDigest {
    pub fn parse(digest: &str) -> Result<Self, ImagePullError> {
        let hex = digest
            .strip_prefix(SHA256_PREFIX)
            .ok_or_else(|| ImagePullError::InvalidDigest(digest.to_owned()))?;

        let is_hex = hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if hex.len() != 64 || !is_hex {
            return Err(ImagePullError::InvalidDigest(digest.to_owned()));
        }

        Ok(Self {
            hex: hex.to_owned(),
        })
    }

    pub fn of(content: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(content))
    }

    pub fn from_hasher(hasher: Sha256) -> Self {
        Self {
            hex: hex::encode(hasher.finalize()),
        }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Fails unless `actual` is this digest.
    pub fn verify(&self, actual: &BlobDigest) -> Result<(), ImagePullError> {
        if self != actual {
            return Err(ImagePullError::DigestMismatch {
                expected: self.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for BlobDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SHA256_PREFIX}{}", self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_hub_references_are_normalized() {
        let reference = ImageReference::new("docker.io", "nginx", "1.27").unwrap();

        assert_eq!(reference.registry(), "registry-1.docker.io");
        assert_eq!(reference.repository(), "library/nginx");
        assert_eq!(
            reference.api_base(),
            "https://registry-1.docker.io/v2/library/nginx"
        );

        let reference = ImageReference::new("docker.io", "bitnami/redis", "7").unwrap();
        assert_eq!(reference.repository(), "bitnami/redis");
    }

    #[test]
    fn private_registries_keep_their_host_and_scheme() {
        let reference =
            ImageReference::new("http://localhost:5000/", "team/app", "v1").unwrap();

        assert_eq!(reference.api_base(), "http://localhost:5000/v2/team/app");
        assert_eq!(reference.to_string(), "localhost:5000/team/app:v1");
    }

    #[test]
    fn incomplete_references_are_rejected() {
        assert!(ImageReference::new("", "app", "v1").is_err());
        assert!(ImageReference::new("ghcr.io", " ", "v1").is_err());
        assert!(ImageReference::new("ghcr.io", "app", "").is_err());
        assert!(ImageReference::new("ghcr.io/org", "app", "v1").is_err());
    }

    #[test]
    fn digests_are_parsed_and_verified() {
        let content = b"layer";
        let computed = BlobDigest::of(content);
        let parsed = BlobDigest::parse(&computed.to_string()).unwrap();

        parsed.verify(&computed).unwrap();
        assert!(matches!(
            parsed.verify(&BlobDigest::of(b"other")),
            Err(ImagePullError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn malformed_digests_are_rejected() {
        assert!(BlobDigest::parse("sha512:abcd").is_err());
        assert!(BlobDigest::parse("sha256:xyz").is_err());
        assert!(BlobDigest::parse(&format!("sha256:{}", "A".repeat(64))).is_err());
    }
}
