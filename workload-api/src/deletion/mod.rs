//! Delete-and-confirm protocol for workload resources.
//!
//! Deleting an object in Kubernetes only asks for it to be garbage collected.
//! [`orchestrator::delete_and_confirm`] issues the deletes for a
//! [`handle::ResourceHandle`] and then runs a [`poller::DeletionJob`], which
//! checks on a fixed cadence until every tracked object is gone, a check
//! fails for good, or the time budget runs out.

pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod poller;
pub mod policy;

#[cfg(test)]
mod testing;

pub use error::DeletionError;
pub use handle::{HandleError, ResourceHandle};
pub use orchestrator::{DeletionOptions, delete_and_confirm};
pub use poller::DeletionReport;
pub use policy::PollPolicy;
