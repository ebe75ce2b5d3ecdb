//! Progress reporting for long-running operations
//!
//! The engine never decides where progress goes. It emits [`ProgressEvent`]s
//! into an injected [`ProgressSink`]; the binary uses [`TracingSink`], tests
//! use [`MemorySink`].

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::model::{Operation, OperationKind, OperationPhase};

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub resource: &'static str,
    pub resource_id: String,
    pub operation: OperationKind,
    pub phase: OperationPhase,
    pub elapsed: Duration,
    pub polls: u32,
    /// Last observed status, or the message of a swallowed retryable error
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn from_operation(op: &Operation, detail: Option<String>) -> Self {
        Self {
            resource: op.resource,
            resource_id: op.resource_id.clone(),
            operation: op.kind,
            phase: op.phase,
            elapsed: op.elapsed(),
            polls: op.polls,
            detail,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Forwards events to `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        let elapsed_secs = event.elapsed.as_secs();
        let detail = event.detail.as_deref().unwrap_or("");
        match event.phase {
            OperationPhase::Submitted => info!(
                resource = event.resource,
                id = %event.resource_id,
                operation = %event.operation,
                "Operation submitted"
            ),
            OperationPhase::Polling => debug!(
                resource = event.resource,
                id = %event.resource_id,
                operation = %event.operation,
                polls = event.polls,
                status = detail,
                "Operation polling, elapsed {elapsed_secs}s"
            ),
            OperationPhase::Succeeded => info!(
                resource = event.resource,
                id = %event.resource_id,
                operation = %event.operation,
                "Operation succeeded after {elapsed_secs}s"
            ),
            OperationPhase::Failed | OperationPhase::TimedOut => warn!(
                resource = event.resource,
                id = %event.resource_id,
                operation = %event.operation,
                phase = %event.phase,
                status = detail,
                "Operation did not succeed after {elapsed_secs}s"
            ),
        }
    }
}

/// Records every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn phases(&self) -> Vec<OperationPhase> {
        self.events().into_iter().map(|e| e.phase).collect()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
