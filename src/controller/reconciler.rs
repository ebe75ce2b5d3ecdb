//! Reconciler facade
//!
//! [`Reconciler`] owns the collaborators of one engine instance: the API
//! binding, the project paths, the feature flags and the poller. The
//! per-resource operations live next to their translation and merge logic in
//! the sibling modules (`cluster`, `vpc`, ...), each as an `impl Reconciler`
//! block.
//!
//! Every public operation is one reconciliation pass: translate, submit,
//! poll, then read the settled state. Reference lookups are cached for the
//! pass and discarded afterwards.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::drift::Drift;
use super::poller::{
    CancellationSignal, Observation, OperationPoller, RetryPolicy, TerminalPredicate,
};
use super::progress::ProgressSink;
use super::reader::{settle_missing, ReadPurpose};
use super::translator::ListingResolver;
use crate::client::payload::{TaskData, TaskType, TASK_FAILED, TASK_SUCCEEDED};
use crate::client::{ApiPaths, ApiRequest, CloudApi, HttpCloudApi};
use crate::config::{EngineConfig, FeatureFlags};
use crate::error::Result;
use crate::model::Operation;

/// What an apply pass did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ApplyAction {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyAction::Created => "created",
            ApplyAction::Updated => "updated",
            ApplyAction::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

/// Result of an apply pass: the settled state plus the drift that was corrected
#[derive(Clone, Debug, PartialEq)]
pub struct Applied<S> {
    pub state: S,
    pub action: ApplyAction,
    pub drifts: Vec<Drift>,
}

impl<S> Applied<S> {
    pub fn created(state: S) -> Self {
        Self {
            state,
            action: ApplyAction::Created,
            drifts: Vec::new(),
        }
    }

    pub fn unchanged(state: S) -> Self {
        Self {
            state,
            action: ApplyAction::Unchanged,
            drifts: Vec::new(),
        }
    }

    pub fn updated(state: S, drifts: Vec<Drift>) -> Self {
        Self {
            state,
            action: ApplyAction::Updated,
            drifts,
        }
    }
}

/// Desired-state reconciliation engine.
///
/// The engine does not lock resource ids. Callers must not run two mutating
/// passes against the same resource concurrently; see
/// [`ResourceLeases`](super::lease::ResourceLeases).
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) api: Arc<dyn CloudApi>,
    pub(crate) paths: ApiPaths,
    pub(crate) features: FeatureFlags,
    pub(crate) poller: OperationPoller,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn CloudApi>,
        config: &EngineConfig,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            api,
            paths: ApiPaths::new(&config.api.account_id, &config.api.project_id),
            features: config.features.clone(),
            poller: OperationPoller::new(config.polling.retry_policy(), cancel, sink),
        }
    }

    /// Engine backed by the HTTP binding
    pub fn from_config(
        config: &EngineConfig,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationSignal,
    ) -> Result<Self> {
        let api = Arc::new(HttpCloudApi::new(config)?);
        Ok(Self::new(api, config, sink, cancel))
    }

    /// Replace the polling cadence taken from the configuration
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.poller = self.poller.with_policy(policy);
        self
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    pub fn paths(&self) -> &ApiPaths {
        &self.paths
    }

    /// Fresh resolver for one pass
    pub(crate) fn resolver(&self) -> ListingResolver {
        ListingResolver::new(self.api.clone(), self.paths.clone())
    }

    pub(crate) async fn fetch_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.api.fetch(path).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch `path` and map a missing resource according to `purpose`
    pub(crate) async fn read_remote<T: DeserializeOwned>(
        &self,
        path: &str,
        purpose: ReadPurpose,
        resource: &'static str,
        id: &str,
    ) -> Result<Option<T>> {
        settle_missing(self.fetch_as(path).await, purpose, resource, id)
    }

    /// Submit through the poller so retryable failures are retried
    pub(crate) async fn submit(&self, op: &mut Operation, request: ApiRequest) -> Result<Value> {
        self.poller
            .submit(op, || self.api.submit(request.clone()))
            .await
    }

    pub(crate) async fn submit_as<T: DeserializeOwned>(
        &self,
        op: &mut Operation,
        request: ApiRequest,
    ) -> Result<T> {
        let value = self.submit(op, request).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn observe_state(&self, path: &str) -> Result<Observation> {
        let value = self.api.fetch(path).await?;
        let state = value
            .pointer("/info/state")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(Observation::status(state))
    }

    /// Poll the `info.state` of the resource at `path`
    pub(crate) async fn await_state(
        &self,
        op: &mut Operation,
        path: &str,
        predicate: &TerminalPredicate,
    ) -> Result<()> {
        self.poller
            .wait(op, predicate, || self.observe_state(path))
            .await
    }

    /// Poll until the resource at `path` is gone
    pub(crate) async fn await_deletion(&self, op: &mut Operation, path: &str) -> Result<()> {
        self.poller
            .wait(op, &TerminalPredicate::deletion(), || self.observe_state(path))
            .await
    }

    async fn latest_task(&self, entity_id: &str, task_type: TaskType) -> Result<Option<TaskData>> {
        let tasks: Vec<TaskData> = self
            .fetch_as(&self.paths.tasks(entity_id, task_type.as_str()))
            .await?;
        Ok(tasks.into_iter().max_by_key(|t| t.info.created_on))
    }

    /// Id of the newest task of this type, recorded before a submit so that an
    /// older finished task is not mistaken for the new one
    pub(crate) async fn task_baseline(
        &self,
        entity_id: &str,
        task_type: TaskType,
    ) -> Result<Option<String>> {
        Ok(self
            .latest_task(entity_id, task_type)
            .await?
            .map(|t| t.info.id))
    }

    async fn observe_task(
        &self,
        entity_id: &str,
        task_type: TaskType,
        baseline: Option<&str>,
    ) -> Result<Observation> {
        match self.latest_task(entity_id, task_type).await? {
            Some(task) if Some(task.info.id.as_str()) != baseline => {
                Ok(Observation::Status(task.info.state))
            }
            _ => {
                debug!(entity_id, task_type = task_type.as_str(), "Task not visible yet");
                Ok(Observation::Absent)
            }
        }
    }

    /// Poll the newest task of `task_type` on `entity_id` until it settles
    pub(crate) async fn await_task(
        &self,
        op: &mut Operation,
        entity_id: &str,
        task_type: TaskType,
        baseline: Option<String>,
    ) -> Result<()> {
        let predicate = TerminalPredicate::states(&[TASK_SUCCEEDED], &[TASK_FAILED]);
        self.poller
            .wait(op, &predicate, || {
                self.observe_task(entity_id, task_type, baseline.as_deref())
            })
            .await
    }
}
