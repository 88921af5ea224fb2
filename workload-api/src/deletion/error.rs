use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::deletion::handle::HandleError;
use crate::deletion::poller::Observation;
use crate::k8s::{GatewayError, ResourceRef};

/// Terminal failures of a delete-and-confirm operation.
#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("invalid deletion request: {0}")]
    InvalidArgument(#[from] HandleError),

    #[error("failed to issue delete for {resource}: {source}")]
    IssueFailed {
        resource: ResourceRef,
        #[source]
        source: GatewayError,
    },

    #[error("{}", timed_out_message(.resource, .elapsed, .timeout, .cancelled))]
    TimedOut {
        resource: ResourceRef,
        elapsed: Duration,
        timeout: Duration,
        last_observed: BTreeMap<ResourceRef, Observation>,
        cancelled: bool,
    },

    #[error("failed to confirm deletion of {resource}: {source}")]
    Failed {
        resource: ResourceRef,
        elapsed: Duration,
        #[source]
        source: GatewayError,
    },
}

fn timed_out_message(
    resource: &ResourceRef,
    elapsed: &Duration,
    timeout: &Duration,
    cancelled: &bool,
) -> String {
    let elapsed_ms = elapsed.as_millis();
    if *cancelled {
        return format!("deletion of {resource} was cancelled by shutdown after {elapsed_ms} ms");
    }

    format!(
        "deletion of {resource} was not confirmed within {} ms, waited {elapsed_ms} ms",
        timeout.as_millis()
    )
}

impl DeletionError {
    /// Whether invoking the same delete again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeletionError::TimedOut { .. } => true,
            DeletionError::IssueFailed { source, .. } => source.is_transient(),
            DeletionError::InvalidArgument(_) | DeletionError::Failed { .. } => false,
        }
    }

    /// Tracked objects that were not confirmed absent when the job timed out.
    pub fn lingering(&self) -> Vec<&ResourceRef> {
        match self {
            DeletionError::TimedOut { last_observed, .. } => last_observed
                .iter()
                .filter(|(_, observation)| **observation != Observation::Absent)
                .map(|(resource, _)| resource)
                .collect(),
            _ => vec![],
        }
    }

    /// Time spent polling before the job gave up.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            DeletionError::TimedOut { elapsed, .. } | DeletionError::Failed { elapsed, .. } => {
                Some(*elapsed)
            }
            DeletionError::InvalidArgument(_) | DeletionError::IssueFailed { .. } => None,
        }
    }
}
