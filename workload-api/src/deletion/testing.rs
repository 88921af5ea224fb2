use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::k8s::{ControlPlane, DeleteOutcome, GatewayError, K8sError, Presence, ResourceRef};

/// Scripted answer of the fake control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Present,
    Absent,
    Issued,
    NotFound,
    Transient,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Delete(ResourceRef),
    Exists(ResourceRef),
}

pub fn k8s_error() -> K8sError {
    K8sError::Serde(serde_json::from_str::<()>("not json").unwrap_err())
}

/// In-memory control plane answering from per-object scripts.
///
/// Each existence check consumes the next scripted reply, the last one
/// repeats forever. Unscripted objects are absent and deletes are issued.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    exists: Mutex<HashMap<ResourceRef, VecDeque<Reply>>>,
    deletes: Mutex<HashMap<ResourceRef, Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_exists(self, resource: &ResourceRef, replies: &[Reply]) -> Self {
        self.exists
            .lock()
            .unwrap()
            .insert(resource.clone(), replies.iter().copied().collect());
        self
    }

    /// Present for `times` checks, then `then` forever.
    pub fn present_for(self, resource: &ResourceRef, times: usize, then: Reply) -> Self {
        let mut replies = vec![Reply::Present; times];
        replies.push(then);
        self.script_exists(resource, &replies)
    }

    pub fn script_delete(self, resource: &ResourceRef, reply: Reply) -> Self {
        self.deletes.lock().unwrap().insert(resource.clone(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn exists_calls(&self, resource: &ResourceRef) -> usize {
        self.calls()
            .into_iter()
            .filter(|call| *call == Call::Exists(resource.clone()))
            .count()
    }

    fn next_exists(&self, resource: &ResourceRef) -> Reply {
        let mut exists = self.exists.lock().unwrap();
        let Some(replies) = exists.get_mut(resource) else {
            return Reply::Absent;
        };

        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().copied().unwrap_or(Reply::Absent)
        }
    }
}

fn into_error(reply: Reply) -> GatewayError {
    match reply {
        Reply::Transient => GatewayError::Transient(k8s_error()),
        _ => GatewayError::Fatal(k8s_error()),
    }
}

#[async_trait]
impl ControlPlane for ScriptedGateway {
    async fn issue_delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(resource.clone()));

        let reply = self
            .deletes
            .lock()
            .unwrap()
            .get(resource)
            .copied()
            .unwrap_or(Reply::Issued);

        match reply {
            Reply::Issued => Ok(DeleteOutcome::Issued),
            Reply::NotFound => Ok(DeleteOutcome::NotFound),
            other => Err(into_error(other)),
        }
    }

    async fn exists(&self, resource: &ResourceRef) -> Result<Presence, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Exists(resource.clone()));

        match self.next_exists(resource) {
            Reply::Present => Ok(Presence::Present),
            Reply::Absent => Ok(Presence::Absent),
            other => Err(into_error(other)),
        }
    }
}
