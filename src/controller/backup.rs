//! On-demand backup reconciliation

use tracing::{info, instrument, warn};

use super::drift::{diff_backup, ensure_in_place};
use super::poller::TerminalPredicate;
use super::reader::ReadPurpose;
use super::reconciler::{Applied, Reconciler};
use super::translator::{ensure_valid, resolve_reference, ReferenceKind, ReferenceResolver};
use crate::client::payload::{BackupData, BackupSpecPayload, BACKUP_FAILED, BACKUP_SUCCEEDED};
use crate::client::ApiRequest;
use crate::error::{Error, Result};
use crate::model::{BackupSpec, BackupState, Operation, OperationKind};

const RESOURCE: &str = "backup";

/// Retention the service applies when none is requested
pub const DEFAULT_BACKUP_RETENTION_DAYS: u32 = 1;

pub async fn translate_backup(
    spec: &BackupSpec,
    resolver: &dyn ReferenceResolver,
) -> Result<BackupSpecPayload> {
    ensure_valid(spec.validate())?;
    Ok(BackupSpecPayload {
        cluster_id: resolve_reference(resolver, &spec.cluster, ReferenceKind::Cluster, "cluster")
            .await?,
        description: spec.description.cloned_option(),
        retention_period_in_days: spec.retention_period_in_days.cloned_option(),
    })
}

pub fn merge_backup_state(data: BackupData) -> BackupState {
    let retention = data
        .info
        .retention_period_in_days
        .or(data.spec.retention_period_in_days)
        .unwrap_or(DEFAULT_BACKUP_RETENTION_DAYS);

    BackupState {
        backup_id: data.info.id,
        cluster_id: data.spec.cluster_id,
        description: data.spec.description,
        retention_period_in_days: retention,
        state: data.info.state,
        size_bytes: data.info.actual_size_bytes,
        created_on: data.info.created_on,
        completed_on: data.info.completed_on,
    }
}

impl Reconciler {
    /// Take a backup and wait for it to complete
    #[instrument(skip(self, spec))]
    pub async fn create_backup(&self, spec: &BackupSpec) -> Result<BackupState> {
        let resolver = self.resolver();
        let request = translate_backup(spec, &resolver).await?;
        info!("Backing up cluster {}", request.cluster_id);

        let mut op = Operation::new(RESOURCE, &request.cluster_id, OperationKind::Backup);
        let data: BackupData = self
            .submit_as(&mut op, ApiRequest::post(self.paths.backups(), &request)?)
            .await?;
        let backup_id = data.info.id;
        op.bind(&backup_id);

        let predicate = TerminalPredicate::states(&[BACKUP_SUCCEEDED], &[BACKUP_FAILED]);
        self.await_state(&mut op, &self.paths.backup(&backup_id), &predicate)
            .await?;

        self.refresh_backup(&backup_id).await
    }

    #[instrument(skip(self))]
    pub async fn read_backup(
        &self,
        backup_id: &str,
        purpose: ReadPurpose,
    ) -> Result<Option<BackupState>> {
        let data = self
            .read_remote::<BackupData>(&self.paths.backup(backup_id), purpose, RESOURCE, backup_id)
            .await?;
        Ok(data.map(merge_backup_state))
    }

    pub async fn refresh_backup(&self, backup_id: &str) -> Result<BackupState> {
        self.read_backup(backup_id, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: backup_id.to_string(),
            })
    }

    /// Backups are immutable; any drift is refused
    #[instrument(skip(self, spec))]
    pub async fn update_backup(&self, backup_id: &str, spec: &BackupSpec) -> Result<Applied<BackupState>> {
        let resolver = self.resolver();
        let request = translate_backup(spec, &resolver).await?;
        let current = self.refresh_backup(backup_id).await?;
        ensure_in_place(RESOURCE, &diff_backup(spec, &request.cluster_id, &current))?;
        Ok(Applied::unchanged(current))
    }

    pub async fn apply_backup(
        &self,
        spec: &BackupSpec,
        prior: Option<&BackupState>,
    ) -> Result<Applied<BackupState>> {
        let Some(prior) = prior else {
            return Ok(Applied::created(self.create_backup(spec).await?));
        };
        match self.update_backup(&prior.backup_id, spec).await {
            Err(Error::NotFoundError { .. }) => {
                warn!("Backup {} expired or was removed, taking a new one", prior.backup_id);
                Ok(Applied::created(self.create_backup(spec).await?))
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        let path = self.paths.backup(backup_id);
        if self
            .read_remote::<BackupData>(&path, ReadPurpose::DeletePrecheck, RESOURCE, backup_id)
            .await?
            .is_none()
        {
            return Ok(());
        }

        info!("Deleting backup {}", backup_id);
        let mut op = Operation::new(RESOURCE, backup_id, OperationKind::Delete);
        self.submit(&mut op, ApiRequest::delete(&path)).await?;
        self.await_deletion(&mut op, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{FakeCloud, Reply};
    use crate::config::EngineConfig;
    use crate::controller::poller::CancellationSignal;
    use crate::controller::progress::MemorySink;
    use crate::controller::translator::testing::StaticResolver;
    use crate::model::{CrossReference, Field, OperationPhase};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn spec() -> BackupSpec {
        BackupSpec {
            cluster: CrossReference::by_name("orders"),
            description: Field::Value("before migration".into()),
            retention_period_in_days: Field::Absent,
        }
    }

    fn backup(state: &str) -> Reply {
        Reply::Json(json!({
            "info": {"id": "b-1", "state": state, "retention_period_in_days": 1},
            "spec": {"cluster_id": "c-1", "description": "before migration"}
        }))
    }

    #[tokio::test]
    async fn test_translation_resolves_cluster_by_name() {
        let resolver = StaticResolver::default().with(ReferenceKind::Cluster, "orders", "c-1");
        let request = translate_backup(&spec(), &resolver).await.unwrap();
        assert_eq!(request.cluster_id, "c-1");
        assert_eq!(request.retention_period_in_days, None);
    }

    #[test]
    fn test_merge_defaults_retention() {
        let data: BackupData = serde_json::from_value(json!({
            "info": {"id": "b-1", "state": "SUCCEEDED"},
            "spec": {"cluster_id": "c-1"}
        }))
        .unwrap();
        let state = merge_backup_state(data);
        assert_eq!(state.retention_period_in_days, DEFAULT_BACKUP_RETENTION_DAYS);
        assert_eq!(state.description, None);
    }

    fn reconciler(fake: Arc<FakeCloud>, sink: Arc<MemorySink>) -> Reconciler {
        let mut config = EngineConfig::default();
        config.api.account_id = "acc".into();
        config.api.project_id = "proj".into();
        Reconciler::new(fake, &config, sink, CancellationSignal::never())
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_backup_to_finish() {
        let fake = Arc::new(FakeCloud::new());
        let sink = Arc::new(MemorySink::new());
        let r = reconciler(fake.clone(), sink.clone());
        let clusters = r.paths().clusters();
        fake.on_fetch(
            clusters,
            vec![Reply::Json(json!([{"info": {"id": "c-1"}, "spec": {"name": "orders"}}]))],
        );
        fake.on_submit(Method::POST, r.paths().backups(), vec![backup("IN_PROGRESS")]);
        fake.on_fetch(
            r.paths().backup("b-1"),
            vec![backup("IN_PROGRESS"), backup("SUCCEEDED")],
        );

        let state = r.create_backup(&spec()).await.unwrap();
        assert_eq!(state.backup_id, "b-1");
        assert_eq!(state.state, "SUCCEEDED");
        assert_eq!(sink.phases().last(), Some(&OperationPhase::Succeeded));
    }

    fn listed_clusters(fake: &FakeCloud, r: &Reconciler) {
        fake.on_fetch(
            r.paths().clusters(),
            vec![Reply::Json(json!([
                {"info": {"id": "c-1"}, "spec": {"name": "orders"}},
                {"info": {"id": "c-2"}, "spec": {"name": "billing"}}
            ]))],
        );
    }

    #[tokio::test]
    async fn test_changed_retention_is_refused() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(fake.clone(), Arc::new(MemorySink::new()));
        listed_clusters(&fake, &r);
        fake.on_fetch(r.paths().backup("b-1"), vec![backup("SUCCEEDED")]);

        assert!(r.update_backup("b-1", &spec()).await.is_ok());

        let mut changed = spec();
        changed.retention_period_in_days = Field::Value(7);
        let err = r.update_backup("b-1", &changed).await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_other_cluster_by_name_is_refused() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(fake.clone(), Arc::new(MemorySink::new()));
        listed_clusters(&fake, &r);
        fake.on_fetch(r.paths().backup("b-1"), vec![backup("SUCCEEDED")]);

        let mut moved = spec();
        moved.cluster = CrossReference::by_name("billing");
        match r.update_backup("b-1", &moved).await.unwrap_err() {
            Error::ConfigurationError(issues) => assert_eq!(issues[0].field, "cluster"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(fake.submitted().is_empty());
    }
}
