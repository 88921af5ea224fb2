use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use workload_config::Config;
use workload_config::shared::DeletionConfig;

/// Complete configuration for the workload API service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Application server settings.
    pub application: ApplicationSettings,
    /// Cluster the service manages.
    pub kubernetes: KubernetesSettings,
    /// Policy for confirming deletions.
    #[serde(default)]
    pub deletion: DeletionConfig,
    /// Local image content store.
    pub images: ImageSettings,
}

impl Config for ApiConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesSettings {
    /// Namespace every object is created in and deleted from.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageSettings {
    /// Root of the content addressed blob store.
    pub content_dir: PathBuf,
    /// Budget for a single registry request.
    pub pull_timeout_ms: u64,
}

impl ImageSettings {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}
