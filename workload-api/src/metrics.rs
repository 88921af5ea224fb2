use std::sync::Once;
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};

use crate::k8s::ResourceKind;

static REGISTER_METRICS: Once = Once::new();

pub const WORKLOAD_DELETIONS_TOTAL: &str = "workload_deletions_total";
pub const WORKLOAD_DELETION_DURATION_SECONDS: &str = "workload_deletion_duration_seconds";
pub const KIND_LABEL: &str = "kind";
pub const OUTCOME_LABEL: &str = "outcome";

/// Terminal outcome label of a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcomeLabel {
    Completed,
    TimedOut,
    Failed,
    IssueFailed,
}

impl DeletionOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionOutcomeLabel::Completed => "completed",
            DeletionOutcomeLabel::TimedOut => "timed_out",
            DeletionOutcomeLabel::Failed => "failed",
            DeletionOutcomeLabel::IssueFailed => "issue_failed",
        }
    }
}

/// Registers descriptions of the metrics emitted by the API. Safe to call
/// more than once.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            WORKLOAD_DELETIONS_TOTAL,
            Unit::Count,
            "Total number of deletions by resource kind and terminal outcome"
        );

        describe_histogram!(
            WORKLOAD_DELETION_DURATION_SECONDS,
            Unit::Seconds,
            "Time between issuing a delete and reaching a terminal outcome"
        );
    });
}

pub fn record_deletion(kind: ResourceKind, outcome: DeletionOutcomeLabel, elapsed: Duration) {
    counter!(
        WORKLOAD_DELETIONS_TOTAL,
        KIND_LABEL => kind.as_str(),
        OUTCOME_LABEL => outcome.as_str()
    )
    .increment(1);

    histogram!(WORKLOAD_DELETION_DURATION_SECONDS, KIND_LABEL => kind.as_str())
        .record(elapsed.as_secs_f64());
}
