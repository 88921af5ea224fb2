use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::deletion::handle::ResourceHandle;
use crate::deletion::policy::{PollOutcome, PollPolicy, Tick, poll_until};
use crate::k8s::{ControlPlane, GatewayError, Presence, ResourceRef};

/// Last known state of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Present,
    Absent,
    /// No conclusive answer yet, every check so far failed transiently.
    Unknown,
}

/// What the poller has seen of every tracked object so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub observations: BTreeMap<ResourceRef, Observation>,
    pub transient_errors: u32,
}

impl PresenceSnapshot {
    fn unknown(tracked: &[ResourceRef]) -> Self {
        Self {
            observations: tracked
                .iter()
                .map(|resource| (resource.clone(), Observation::Unknown))
                .collect(),
            transient_errors: 0,
        }
    }

    /// Tracked objects not confirmed absent.
    pub fn lingering(&self) -> Vec<ResourceRef> {
        self.observations
            .iter()
            .filter(|(_, observation)| **observation != Observation::Absent)
            .map(|(resource, _)| resource.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Polling,
    Completed,
    TimedOut,
    Failed,
}

/// Summary of a confirmed deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub elapsed: Duration,
    pub confirmed_absent: Vec<ResourceRef>,
    pub ticks: u32,
    pub transient_errors: u32,
}

#[derive(Debug)]
pub enum DeletionOutcome {
    Completed(DeletionReport),
    TimedOut {
        elapsed: Duration,
        ticks: u32,
        last_observed: BTreeMap<ResourceRef, Observation>,
        cancelled: bool,
    },
    Failed {
        resource: ResourceRef,
        error: GatewayError,
        elapsed: Duration,
    },
}

/// One delete request being confirmed.
///
/// Created once the delete calls were issued, owned by the request that
/// created it and discarded with the outcome.
#[derive(Debug)]
pub struct DeletionJob {
    handle: ResourceHandle,
    tracked: Vec<ResourceRef>,
    policy: PollPolicy,
    started_at: Instant,
    state: JobState,
}

impl DeletionJob {
    /// Starts the clock for `handle`. The dependent is only tracked when the
    /// handle has one and `track_dependent` is set.
    pub fn start(handle: ResourceHandle, policy: PollPolicy, track_dependent: bool) -> Self {
        let mut tracked = vec![handle.primary()];
        if track_dependent {
            tracked.extend(handle.dependent());
        }

        Self {
            handle,
            tracked,
            policy,
            started_at: Instant::now(),
            state: JobState::Polling,
        }
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Polls `gateway` until every tracked object is absent, a fatal error
    /// occurs, the deadline passes or shutdown is signaled.
    pub async fn poll<G>(&mut self, gateway: &G, shutdown_rx: &mut ShutdownRx) -> DeletionOutcome
    where
        G: ControlPlane + ?Sized,
    {
        let tracked = self.tracked.as_slice();
        let outcome = poll_until(self.policy, self.started_at, shutdown_rx, |previous| {
            check_tracked(gateway, tracked, previous)
        })
        .await;

        let (state, outcome) = match outcome {
            PollOutcome::Converged {
                value,
                elapsed,
                ticks,
            } => (
                JobState::Completed,
                DeletionOutcome::Completed(DeletionReport {
                    elapsed,
                    confirmed_absent: value.observations.into_keys().collect(),
                    ticks,
                    transient_errors: value.transient_errors,
                }),
            ),
            PollOutcome::TimedOut {
                last,
                elapsed,
                ticks,
                cancelled,
            } => {
                let last = last.unwrap_or_else(|| PresenceSnapshot::unknown(tracked));
                (
                    JobState::TimedOut,
                    DeletionOutcome::TimedOut {
                        elapsed,
                        ticks,
                        last_observed: last.observations,
                        cancelled,
                    },
                )
            }
            PollOutcome::Aborted {
                error: (resource, error),
                elapsed,
                ..
            } => (
                JobState::Failed,
                DeletionOutcome::Failed {
                    resource,
                    error,
                    elapsed,
                },
            ),
        };

        self.state = state;

        outcome
    }
}

/// One tick: checks every tracked object concurrently and decides once all
/// checks returned.
///
/// A transient failure keeps the previous observation of that object and
/// makes the tick inconclusive.
async fn check_tracked<G>(
    gateway: &G,
    tracked: &[ResourceRef],
    previous: Option<PresenceSnapshot>,
) -> Tick<PresenceSnapshot, PresenceSnapshot, (ResourceRef, GatewayError)>
where
    G: ControlPlane + ?Sized,
{
    let results = join_all(tracked.iter().map(|resource| gateway.exists(resource))).await;

    let mut snapshot = previous.unwrap_or_else(|| PresenceSnapshot::unknown(tracked));
    let mut all_absent = true;

    for (resource, result) in tracked.iter().zip(results) {
        let observation = match result {
            Ok(Presence::Absent) => Observation::Absent,
            Ok(Presence::Present) => {
                all_absent = false;
                Observation::Present
            }
            Err(GatewayError::Transient(err)) => {
                warn!(%resource, error = %err, "existence check failed, retrying on next tick");
                all_absent = false;
                snapshot.transient_errors += 1;
                continue;
            }
            Err(err) => return Tick::Abort((resource.clone(), err)),
        };

        snapshot.observations.insert(resource.clone(), observation);
    }

    if all_absent {
        return Tick::Done(snapshot);
    }

    debug!(lingering = ?snapshot.lingering(), "resources still present");

    Tick::Pending(snapshot)
}
