//! In-flight asynchronous mutations

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// What kind of mutation an [`Operation`] tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Scale,
    Pause,
    Resume,
    Backup,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Scale => "scale",
            OperationKind::Pause => "pause",
            OperationKind::Resume => "resume",
            OperationKind::Backup => "backup",
        };
        write!(f, "{s}")
    }
}

/// Poller state machine: `Submitted -> Polling -> {Succeeded, Failed, TimedOut}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OperationPhase {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl OperationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationPhase::Succeeded | OperationPhase::Failed | OperationPhase::TimedOut
        )
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One asynchronous mutation, owned by the poller until it reaches a terminal phase
#[derive(Clone, Debug)]
pub struct Operation {
    pub resource: &'static str,
    pub resource_id: String,
    pub kind: OperationKind,
    pub started_at: Instant,
    pub phase: OperationPhase,
    pub polls: u32,
    pub last_status: Option<String>,
}

impl Operation {
    /// Start tracking an operation. For creates the id is usually the
    /// resource name until the service hands back a real id via [`Operation::bind`].
    pub fn new(resource: &'static str, resource_id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            resource,
            resource_id: resource_id.into(),
            kind,
            started_at: Instant::now(),
            phase: OperationPhase::Submitted,
            polls: 0,
            last_status: None,
        }
    }

    pub fn bind(&mut self, resource_id: impl Into<String>) {
        self.resource_id = resource_id.into();
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Move to `next`. Terminal phases are sticky.
    pub fn transition(&mut self, next: OperationPhase) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = next;
        true
    }
}
