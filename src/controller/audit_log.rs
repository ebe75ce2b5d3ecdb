//! Database audit log export reconciliation
//!
//! An export config ties a cluster to a telemetry integration. Configs are
//! addressed by `(cluster_id, config_id)`.

use tracing::{info, instrument, warn};

use super::drift::{diff_audit_log, ensure_in_place, Drift};
use super::poller::TerminalPredicate;
use super::reader::ReadPurpose;
use super::reconciler::{Applied, Reconciler};
use super::translator::{ensure_valid, resolve_reference, ReferenceKind, ReferenceResolver};
use crate::client::payload::{
    AuditLogData, AuditLogSpecPayload, LogSettingsPayload, YsqlConfigPayload, AUDIT_LOG_ACTIVE,
    AUDIT_LOG_FAILED,
};
use crate::client::ApiRequest;
use crate::config::FeatureFlags;
use crate::error::{Error, Result};
use crate::model::{
    AuditLogSpec, AuditLogState, Operation, OperationKind, YsqlLogSettings, YsqlLogSettingsState,
};

const RESOURCE: &str = "audit log export";

/// Export payload plus the cluster it is attached to
#[derive(Clone, Debug, PartialEq)]
pub struct AuditLogRequest {
    pub cluster_id: String,
    pub config: AuditLogSpecPayload,
}

fn log_settings_payload(settings: &YsqlLogSettings) -> LogSettingsPayload {
    LogSettingsPayload {
        log_catalog: settings.log_catalog.cloned_option(),
        log_client: settings.log_client.cloned_option(),
        log_level: settings.log_level.cloned_option(),
        log_parameter: settings.log_parameter.cloned_option(),
        log_relation: settings.log_relation.cloned_option(),
        log_statement_once: settings.log_statement_once.cloned_option(),
    }
}

pub async fn translate_audit_log(
    spec: &AuditLogSpec,
    features: &FeatureFlags,
    resolver: &dyn ReferenceResolver,
) -> Result<AuditLogRequest> {
    ensure_valid(spec.validate(features))?;

    let cluster_id =
        resolve_reference(resolver, &spec.cluster, ReferenceKind::Cluster, "cluster").await?;
    let exporter_id = resolve_reference(
        resolver,
        &spec.integration,
        ReferenceKind::Integration,
        "integration",
    )
    .await?;

    Ok(AuditLogRequest {
        cluster_id,
        config: AuditLogSpecPayload {
            exporter_id,
            ysql_config: YsqlConfigPayload {
                log_settings: log_settings_payload(&spec.log_settings),
                statement_classes: spec.statement_classes.clone(),
            },
        },
    })
}

pub fn merge_audit_log_state(data: AuditLogData, cluster_id: &str) -> AuditLogState {
    let settings = data.spec.ysql_config.log_settings;
    let cluster_id = if data.info.cluster_id.is_empty() {
        cluster_id.to_string()
    } else {
        data.info.cluster_id
    };

    AuditLogState {
        config_id: data.info.id,
        cluster_id,
        integration_id: data.spec.exporter_id,
        log_settings: YsqlLogSettingsState {
            log_catalog: settings.log_catalog.unwrap_or(false),
            log_client: settings.log_client.unwrap_or(false),
            log_level: settings.log_level.unwrap_or_default(),
            log_parameter: settings.log_parameter.unwrap_or(false),
            log_relation: settings.log_relation.unwrap_or(false),
            log_statement_once: settings.log_statement_once.unwrap_or(false),
        },
        statement_classes: data.spec.ysql_config.statement_classes,
        state: data.info.state,
    }
}

impl Reconciler {
    /// Attach an export config to a cluster and wait for it to become active
    #[instrument(skip(self, spec))]
    pub async fn create_audit_log(&self, spec: &AuditLogSpec) -> Result<AuditLogState> {
        let resolver = self.resolver();
        let request = translate_audit_log(spec, &self.features, &resolver).await?;
        let cluster_id = request.cluster_id.as_str();
        info!("Enabling audit log export on cluster {}", cluster_id);

        let mut op = Operation::new(RESOURCE, cluster_id, OperationKind::Create);
        let data: AuditLogData = self
            .submit_as(
                &mut op,
                ApiRequest::post(self.paths.audit_log_configs(cluster_id), &request.config)?,
            )
            .await?;
        let config_id = data.info.id;
        op.bind(&config_id);

        let predicate = TerminalPredicate::states(&[AUDIT_LOG_ACTIVE], &[AUDIT_LOG_FAILED]);
        self.await_state(
            &mut op,
            &self.paths.audit_log_config(cluster_id, &config_id),
            &predicate,
        )
        .await?;

        self.refresh_audit_log(cluster_id, &config_id).await
    }

    #[instrument(skip(self))]
    pub async fn read_audit_log(
        &self,
        cluster_id: &str,
        config_id: &str,
        purpose: ReadPurpose,
    ) -> Result<Option<AuditLogState>> {
        let data = self
            .read_remote::<AuditLogData>(
                &self.paths.audit_log_config(cluster_id, config_id),
                purpose,
                RESOURCE,
                config_id,
            )
            .await?;
        Ok(data.map(|d| merge_audit_log_state(d, cluster_id)))
    }

    pub async fn refresh_audit_log(&self, cluster_id: &str, config_id: &str) -> Result<AuditLogState> {
        self.read_audit_log(cluster_id, config_id, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: config_id.to_string(),
            })
    }

    #[instrument(skip(self, spec))]
    pub async fn update_audit_log(
        &self,
        cluster_id: &str,
        config_id: &str,
        spec: &AuditLogSpec,
    ) -> Result<Applied<AuditLogState>> {
        let resolver = self.resolver();
        let request = translate_audit_log(spec, &self.features, &resolver).await?;
        let current = self.refresh_audit_log(cluster_id, config_id).await?;

        let mut drifts = diff_audit_log(spec, &current);
        if request.cluster_id != current.cluster_id {
            drifts.push(Drift {
                field: "cluster".into(),
                desired: request.cluster_id.clone(),
                observed: current.cluster_id.clone(),
                requires_replacement: true,
            });
        }
        ensure_in_place(RESOURCE, &drifts)?;

        // References by name are only comparable once resolved
        if drifts.is_empty() && request.config.exporter_id != current.integration_id {
            drifts.push(Drift {
                field: "integration".into(),
                desired: request.config.exporter_id.clone(),
                observed: current.integration_id.clone(),
                requires_replacement: false,
            });
        }
        if drifts.is_empty() {
            return Ok(Applied::unchanged(current));
        }

        info!("Updating audit log export {} on cluster {}", config_id, cluster_id);
        let path = self.paths.audit_log_config(cluster_id, config_id);
        let mut op = Operation::new(RESOURCE, config_id, OperationKind::Update);
        self.submit(&mut op, ApiRequest::put(&path, &request.config)?)
            .await?;
        let predicate = TerminalPredicate::states(&[AUDIT_LOG_ACTIVE], &[AUDIT_LOG_FAILED]);
        self.await_state(&mut op, &path, &predicate).await?;

        let state = self.refresh_audit_log(cluster_id, config_id).await?;
        Ok(Applied::updated(state, drifts))
    }

    pub async fn apply_audit_log(
        &self,
        spec: &AuditLogSpec,
        prior: Option<&AuditLogState>,
    ) -> Result<Applied<AuditLogState>> {
        let Some(prior) = prior else {
            return Ok(Applied::created(self.create_audit_log(spec).await?));
        };
        match self
            .update_audit_log(&prior.cluster_id, &prior.config_id, spec)
            .await
        {
            Err(Error::NotFoundError { .. }) => {
                warn!(
                    "Audit log export {} on cluster {} is gone, creating it again",
                    prior.config_id, prior.cluster_id
                );
                Ok(Applied::created(self.create_audit_log(spec).await?))
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_audit_log(&self, cluster_id: &str, config_id: &str) -> Result<()> {
        let path = self.paths.audit_log_config(cluster_id, config_id);
        if self
            .read_remote::<AuditLogData>(&path, ReadPurpose::DeletePrecheck, RESOURCE, config_id)
            .await?
            .is_none()
        {
            return Ok(());
        }

        info!("Removing audit log export {} from cluster {}", config_id, cluster_id);
        let mut op = Operation::new(RESOURCE, config_id, OperationKind::Delete);
        self.submit(&mut op, ApiRequest::delete(&path)).await?;
        self.await_deletion(&mut op, &path).await
    }
}
