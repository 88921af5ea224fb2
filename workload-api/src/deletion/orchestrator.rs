use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::concurrency::shutdown::ShutdownRx;
use crate::deletion::error::DeletionError;
use crate::deletion::handle::ResourceHandle;
use crate::deletion::poller::{DeletionJob, DeletionOutcome, DeletionReport};
use crate::deletion::policy::PollPolicy;
use crate::k8s::{ControlPlane, DeleteOutcome};
use crate::metrics::{DeletionOutcomeLabel, record_deletion};

/// Per-request knobs of a delete-and-confirm operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionOptions {
    pub policy: PollPolicy,
    /// Poll the dependent together with the primary.
    pub track_dependent: bool,
}

/// Deletes the objects named by `handle` and waits until the control plane
/// no longer reports them.
///
/// The dependent is deleted before the primary. A failure to issue either
/// delete returns [`DeletionError::IssueFailed`] without polling. Objects
/// that are already gone count as deleted.
pub async fn delete_and_confirm<G>(
    gateway: &G,
    handle: ResourceHandle,
    options: DeletionOptions,
    mut shutdown_rx: ShutdownRx,
) -> Result<DeletionReport, DeletionError>
where
    G: ControlPlane + ?Sized,
{
    let span = info_span!(
        "delete_and_confirm",
        job_id = %Uuid::new_v4(),
        kind = %handle.kind(),
        name = handle.primary_name(),
        dependent = handle.dependent_name(),
    );

    async move {
        let kind = handle.kind();
        let issued_at = tokio::time::Instant::now();

        let mut to_delete = Vec::with_capacity(2);
        to_delete.extend(handle.dependent());
        to_delete.push(handle.primary());

        for resource in to_delete {
            match gateway.issue_delete(&resource).await {
                Ok(DeleteOutcome::Issued) => info!(%resource, "delete issued"),
                Ok(DeleteOutcome::NotFound) => info!(%resource, "already deleted"),
                Err(err) => {
                    error!(%resource, error = %err, "failed to issue delete");
                    record_deletion(kind, DeletionOutcomeLabel::IssueFailed, issued_at.elapsed());

                    return Err(DeletionError::IssueFailed {
                        resource,
                        source: err,
                    });
                }
            }
        }

        let mut job = DeletionJob::start(handle, options.policy, options.track_dependent);
        let outcome = job.poll(gateway, &mut shutdown_rx).await;

        into_result(job, outcome, options.policy.timeout)
    }
    .instrument(span)
    .await
}

fn into_result(
    job: DeletionJob,
    outcome: DeletionOutcome,
    timeout: Duration,
) -> Result<DeletionReport, DeletionError> {
    let kind = job.handle().kind();

    match outcome {
        DeletionOutcome::Completed(report) => {
            info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                ticks = report.ticks,
                transient_errors = report.transient_errors,
                "deletion confirmed"
            );
            record_deletion(kind, DeletionOutcomeLabel::Completed, report.elapsed);

            Ok(report)
        }
        DeletionOutcome::TimedOut {
            elapsed,
            ticks,
            last_observed,
            cancelled,
        } => {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                ticks,
                cancelled,
                last_observed = ?last_observed,
                "deletion not confirmed in time"
            );
            record_deletion(kind, DeletionOutcomeLabel::TimedOut, elapsed);

            Err(DeletionError::TimedOut {
                resource: job.handle().primary(),
                elapsed,
                timeout,
                last_observed,
                cancelled,
            })
        }
        DeletionOutcome::Failed {
            resource,
            error,
            elapsed,
        } => {
            error!(%resource, error = %error, "existence check failed");
            record_deletion(kind, DeletionOutcomeLabel::Failed, elapsed);

            Err(DeletionError::Failed {
                resource,
                elapsed,
                source: error,
            })
        }
    }
}
