//! Operation poller
//!
//! Drives one accepted asynchronous mutation to settlement:
//!
//! ```text
//! Submitted -> Polling -> { Succeeded, Failed, TimedOut }
//! ```
//!
//! The initiating call is retried while its errors are retryable; a fatal
//! submit error fails the operation without polling. After submission the
//! status probe runs immediately and then once per interval until the
//! [`TerminalPredicate`] reports a terminal state, a fatal error is seen, the
//! deadline passes, or the caller cancels. Deadline and cancellation both
//! surface as [`Error::OperationTimeout`], never as an API error, because the
//! mutation may still finish on the service side.
//!
//! All waiting goes through `tokio::time`, so tests drive the clock with
//! paused time instead of sleeping.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::progress::{ProgressEvent, ProgressSink};
use crate::config::{DEFAULT_POLL_DEADLINE_SECS, DEFAULT_POLL_INTERVAL_SECS};
use crate::error::{Error, Result};
use crate::model::{Operation, OperationPhase};

/// Fixed-interval polling bounded by an overall deadline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            deadline: Duration::from_secs(DEFAULT_POLL_DEADLINE_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// How long to wait before the next attempt, or `None` once the deadline has passed
    pub fn next_delay(&self, elapsed: Duration) -> Option<Duration> {
        let remaining = self.deadline.checked_sub(elapsed)?;
        if remaining.is_zero() {
            return None;
        }
        Some(self.interval.min(remaining))
    }
}

/// What one probe of the status endpoint saw
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    Status(String),
    /// The resource (or the task) does not exist
    Absent,
}

impl Observation {
    pub fn status(status: impl Into<String>) -> Self {
        Observation::Status(status.into())
    }

    fn describe(&self) -> String {
        match self {
            Observation::Status(s) => s.clone(),
            Observation::Absent => "absent".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Pending,
    Succeeded,
    Failed,
}

/// Decides whether an observation is terminal.
///
/// Status strings are compared case-insensitively; anything not listed is
/// still in progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalPredicate {
    success: Vec<String>,
    failure: Vec<String>,
    absent: Settlement,
}

impl TerminalPredicate {
    /// Succeeds on one of `success`, fails on one of `failure`. A missing
    /// resource is treated as not yet visible.
    pub fn states(success: &[&str], failure: &[&str]) -> Self {
        Self {
            success: success.iter().map(|s| s.to_ascii_uppercase()).collect(),
            failure: failure.iter().map(|s| s.to_ascii_uppercase()).collect(),
            absent: Settlement::Pending,
        }
    }

    /// Succeeds once the resource is gone; every status seen before that is pending
    pub fn deletion() -> Self {
        Self {
            success: Vec::new(),
            failure: Vec::new(),
            absent: Settlement::Succeeded,
        }
    }

    pub fn evaluate(&self, observation: &Observation) -> Settlement {
        match observation {
            Observation::Absent => self.absent,
            Observation::Status(status) => {
                let status = status.to_ascii_uppercase();
                if self.success.contains(&status) {
                    Settlement::Succeeded
                } else if self.failure.contains(&status) {
                    Settlement::Failed
                } else {
                    Settlement::Pending
                }
            }
        }
    }
}

/// Sending half of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cloneable receiving half; cancellation is observed by every clone
#[derive(Clone, Debug)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/signal pair
pub fn cancellation() -> (CancelHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancellationSignal { rx })
}

impl CancellationSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle was dropped uncancelled.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}

#[derive(Clone)]
pub struct OperationPoller {
    policy: RetryPolicy,
    cancel: CancellationSignal,
    sink: Arc<dyn ProgressSink>,
}

impl OperationPoller {
    pub fn new(policy: RetryPolicy, cancel: CancellationSignal, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            policy,
            cancel,
            sink,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn emit(&self, op: &Operation, detail: Option<String>) {
        self.sink.emit(ProgressEvent::from_operation(op, detail));
    }

    fn timed_out(&self, op: &mut Operation, cancelled: bool) -> Error {
        op.transition(OperationPhase::TimedOut);
        self.emit(op, op.last_status.clone());
        Error::OperationTimeout {
            resource: op.resource,
            resource_id: op.resource_id.clone(),
            operation: op.kind,
            elapsed: op.elapsed(),
            last_status: op.last_status.clone(),
            cancelled,
        }
    }

    fn failed(&self, op: &mut Operation, detail: String) {
        op.transition(OperationPhase::Failed);
        self.emit(op, Some(detail));
    }

    /// Sleep until the next attempt. `Err` when the deadline has passed or
    /// the caller cancelled in the meantime.
    async fn pause(&self, op: &mut Operation) -> Result<()> {
        let Some(delay) = self.policy.next_delay(op.elapsed()) else {
            return Err(self.timed_out(op, false));
        };
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.timed_out(op, true)),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Issue the initiating call. Retryable failures are retried on the
    /// policy interval until the deadline; anything else fails the operation.
    pub async fn submit<T, F, Fut>(&self, op: &mut Operation, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.timed_out(op, true));
            }

            let mut cancel = self.cancel.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.timed_out(op, true)),
                r = call() => r,
            };

            match result {
                Ok(value) => {
                    self.emit(op, None);
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        resource = op.resource,
                        id = %op.resource_id,
                        "Submitting {} failed, retrying: {e}",
                        op.kind
                    );
                    op.last_status = Some(e.to_string());
                    self.pause(op).await?;
                }
                Err(e) => {
                    self.failed(op, e.to_string());
                    return Err(e);
                }
            }
        }
    }

    /// Poll `probe` until `predicate` reports a terminal state
    pub async fn wait<F, Fut>(
        &self,
        op: &mut Operation,
        predicate: &TerminalPredicate,
        mut probe: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation>>,
    {
        op.transition(OperationPhase::Polling);

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.timed_out(op, true));
            }

            op.polls += 1;
            let mut cancel = self.cancel.clone();
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.timed_out(op, true)),
                r = probe() => r,
            };

            let observed = match observed {
                Err(e) if e.is_not_found() => Ok(Observation::Absent),
                other => other,
            };

            match observed {
                Ok(observation) => {
                    let status = observation.describe();
                    debug!(id = %op.resource_id, polls = op.polls, status = %status, "Observed status");
                    op.last_status = Some(status.clone());

                    match predicate.evaluate(&observation) {
                        Settlement::Succeeded => {
                            op.transition(OperationPhase::Succeeded);
                            self.emit(op, Some(status));
                            return Ok(());
                        }
                        Settlement::Failed => {
                            self.failed(op, status.clone());
                            return Err(Error::OperationFailed {
                                resource: op.resource,
                                resource_id: op.resource_id.clone(),
                                operation: op.kind,
                                status,
                            });
                        }
                        Settlement::Pending => self.emit(op, Some(status)),
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(id = %op.resource_id, polls = op.polls, "Poll failed, will retry: {e}");
                    self.emit(op, Some(e.to_string()));
                }
                Err(e) => {
                    self.failed(op, e.to_string());
                    return Err(e);
                }
            }

            self.pause(op).await?;
        }
    }

    /// Submit, then wait for settlement. Returns the submit response.
    pub async fn execute<T, S, SFut, P, PFut>(
        &self,
        op: &mut Operation,
        submit: S,
        predicate: &TerminalPredicate,
        probe: P,
    ) -> Result<T>
    where
        S: FnMut() -> SFut,
        SFut: Future<Output = Result<T>>,
        P: FnMut() -> PFut,
        PFut: Future<Output = Result<Observation>>,
    {
        let accepted = self.submit(op, submit).await?;
        self.wait(op, predicate, probe).await?;
        Ok(accepted)
    }
}
