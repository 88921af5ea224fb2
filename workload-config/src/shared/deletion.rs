use serde::{Deserialize, Serialize};
use std::time::Duration;
#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

use crate::shared::ValidationError;

/// Policy applied when confirming that a deleted resource is actually gone.
///
/// Deletion in Kubernetes is asynchronous: the API server accepts the delete
/// and garbage collection removes the object later. These values bound how
/// long, and how often, the service checks before giving up.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct DeletionConfig {
    /// Delay between two existence checks.
    #[cfg_attr(feature = "utoipa", schema(example = 500))]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Budget for confirming a deployment (and its pull secret) is gone.
    #[cfg_attr(feature = "utoipa", schema(example = 60000))]
    #[serde(default = "default_deployment_timeout_ms")]
    pub deployment_timeout_ms: u64,
    /// Budget for confirming a pod is gone.
    #[cfg_attr(feature = "utoipa", schema(example = 30000))]
    #[serde(default = "default_pod_timeout_ms")]
    pub pod_timeout_ms: u64,
    /// Whether the image pull secret of a deployment is polled together with
    /// the deployment. The secret is deleted either way.
    #[serde(default = "default_track_image_pull_secret")]
    pub track_image_pull_secret: bool,
}

impl DeletionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deployment_timeout(&self) -> Duration {
        Duration::from_millis(self.deployment_timeout_ms)
    }

    pub fn pod_timeout(&self) -> Duration {
        Duration::from_millis(self.pod_timeout_ms)
    }

    /// Checks that every duration is positive and the interval fits in each
    /// timeout.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::PollIntervalZero);
        }

        for (field, timeout_ms) in [
            ("deployment_timeout_ms", self.deployment_timeout_ms),
            ("pod_timeout_ms", self.pod_timeout_ms),
        ] {
            if timeout_ms == 0 {
                return Err(ValidationError::TimeoutZero(field));
            }

            if self.poll_interval_ms > timeout_ms {
                return Err(ValidationError::IntervalExceedsTimeout {
                    field,
                    interval_ms: self.poll_interval_ms,
                    timeout_ms,
                });
            }
        }

        Ok(())
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            deployment_timeout_ms: default_deployment_timeout_ms(),
            pod_timeout_ms: default_pod_timeout_ms(),
            track_image_pull_secret: default_track_image_pull_secret(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_deployment_timeout_ms() -> u64 {
    60_000
}

fn default_pod_timeout_ms() -> u64 {
    30_000
}

fn default_track_image_pull_secret() -> bool {
    true
}
