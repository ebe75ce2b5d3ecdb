//! Telemetry integration reconciliation
//!
//! The service never returns sink credentials, so the settled state carries
//! the caller's blocks forward.

use tracing::{info, instrument};

use super::drift::{diff_integration, ensure_in_place};
use super::reader::ReadPurpose;
use super::reconciler::{Applied, Reconciler};
use super::translator::ensure_valid;
use crate::client::payload::{
    DatadogPayload, GrafanaPayload, IntegrationData, IntegrationSpecPayload, PrometheusPayload,
    SumologicPayload,
};
use crate::client::ApiRequest;
use crate::error::{Error, Result};
use crate::model::{IntegrationSpec, IntegrationState, Operation, OperationKind};

const RESOURCE: &str = "integration";

pub fn translate_integration(spec: &IntegrationSpec) -> Result<IntegrationSpecPayload> {
    ensure_valid(spec.validate())?;
    Ok(IntegrationSpecPayload {
        name: spec.name.clone(),
        sink_type: spec.sink_type,
        datadog_spec: spec.datadog.as_ref().map(|d| DatadogPayload {
            api_key: d.api_key.clone(),
            site: d.site.clone(),
        }),
        grafana_spec: spec.grafana.as_ref().map(|g| GrafanaPayload {
            access_policy_token: g.access_policy_token.clone(),
            zone: g.zone.clone(),
            instance_id: g.instance_id.clone(),
            org_slug: g.org_slug.clone(),
        }),
        sumologic_spec: spec.sumologic.as_ref().map(|s| SumologicPayload {
            access_id: s.access_id.clone(),
            access_key: s.access_key.clone(),
            installation_token: s.installation_token.clone(),
        }),
        prometheus_spec: spec.prometheus.as_ref().map(|p| PrometheusPayload {
            endpoint: p.endpoint.clone(),
        }),
    })
}

pub fn merge_integration_state(data: IntegrationData, spec: &IntegrationSpec) -> IntegrationState {
    IntegrationState {
        integration_id: data.info.id,
        name: data.spec.name,
        sink_type: data.spec.sink_type,
        datadog: spec.datadog.clone(),
        grafana: spec.grafana.clone(),
        sumologic: spec.sumologic.clone(),
        prometheus: spec.prometheus.clone(),
    }
}

impl Reconciler {
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_integration(&self, spec: &IntegrationSpec) -> Result<IntegrationState> {
        let request = translate_integration(spec)?;
        info!("Creating {} integration {}", spec.sink_type, spec.name);

        let mut op = Operation::new(RESOURCE, &spec.name, OperationKind::Create);
        let data: IntegrationData = self
            .submit_as(&mut op, ApiRequest::post(self.paths.integrations(), &request)?)
            .await?;
        Ok(merge_integration_state(data, spec))
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn read_integration(
        &self,
        integration_id: &str,
        spec: &IntegrationSpec,
        purpose: ReadPurpose,
    ) -> Result<Option<IntegrationState>> {
        let data = self
            .read_remote::<IntegrationData>(
                &self.paths.integration(integration_id),
                purpose,
                RESOURCE,
                integration_id,
            )
            .await?;
        Ok(data.map(|d| merge_integration_state(d, spec)))
    }

    pub async fn refresh_integration(
        &self,
        integration_id: &str,
        spec: &IntegrationSpec,
    ) -> Result<IntegrationState> {
        self.read_integration(integration_id, spec, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: integration_id.to_string(),
            })
    }

    /// Update in place. Secrets cannot be read back, so `prior` is compared
    /// against the spec to detect a changed sink block.
    #[instrument(skip(self, spec, prior), fields(name = %spec.name))]
    pub async fn update_integration(
        &self,
        prior: &IntegrationState,
        spec: &IntegrationSpec,
    ) -> Result<Applied<IntegrationState>> {
        let request = translate_integration(spec)?;
        let integration_id = prior.integration_id.as_str();
        let mut current = self.refresh_integration(integration_id, spec).await?;
        current.datadog = prior.datadog.clone();
        current.grafana = prior.grafana.clone();
        current.sumologic = prior.sumologic.clone();
        current.prometheus = prior.prometheus.clone();

        let drifts = diff_integration(spec, &current);
        ensure_in_place(RESOURCE, &drifts)?;
        if drifts.is_empty() {
            return Ok(Applied::unchanged(current));
        }

        info!("Updating integration {}", spec.name);
        let mut op = Operation::new(RESOURCE, integration_id, OperationKind::Update);
        let data: IntegrationData = self
            .submit_as(
                &mut op,
                ApiRequest::put(self.paths.integration(integration_id), &request)?,
            )
            .await?;
        Ok(Applied::updated(merge_integration_state(data, spec), drifts))
    }

    pub async fn apply_integration(
        &self,
        spec: &IntegrationSpec,
        prior: Option<&IntegrationState>,
    ) -> Result<Applied<IntegrationState>> {
        let Some(prior) = prior else {
            return Ok(Applied::created(self.create_integration(spec).await?));
        };
        match self.update_integration(prior, spec).await {
            Err(Error::NotFoundError { .. }) => {
                Ok(Applied::created(self.create_integration(spec).await?))
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_integration(&self, integration_id: &str) -> Result<()> {
        let path = self.paths.integration(integration_id);
        if self
            .read_remote::<IntegrationData>(
                &path,
                ReadPurpose::DeletePrecheck,
                RESOURCE,
                integration_id,
            )
            .await?
            .is_none()
        {
            return Ok(());
        }

        info!("Deleting integration {}", integration_id);
        let mut op = Operation::new(RESOURCE, integration_id, OperationKind::Delete);
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
    use crate::controller::reconciler::ApplyAction;
    use crate::model::{DatadogSpec, SinkType};
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn spec(api_key: &str) -> IntegrationSpec {
        IntegrationSpec {
            name: "dd".into(),
            sink_type: SinkType::Datadog,
            datadog: Some(DatadogSpec {
                api_key: api_key.into(),
                site: "datadoghq.com".into(),
            }),
            grafana: None,
            sumologic: None,
            prometheus: None,
        }
    }

    fn remote() -> Reply {
        // Secrets come back masked
        Reply::Json(json!({
            "info": {"id": "i-1"},
            "spec": {"name": "dd", "type": "DATADOG", "datadog_spec": {"api_key": "****", "site": "datadoghq.com"}}
        }))
    }

    fn reconciler(fake: Arc<FakeCloud>) -> Reconciler {
        let mut config = EngineConfig::default();
        config.api.account_id = "acc".into();
        config.api.project_id = "proj".into();
        Reconciler::new(
            fake,
            &config,
            Arc::new(MemorySink::new()),
            CancellationSignal::never(),
        )
    }

    #[test]
    fn test_translation_sends_only_the_selected_block() {
        let payload = translate_integration(&spec("k")).unwrap();
        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["type"], "DATADOG");
        assert_eq!(body["datadog_spec"]["api_key"], "k");
        assert!(body.get("grafana_spec").is_none());
    }

    #[tokio::test]
    async fn test_create_keeps_secrets_from_spec() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(fake.clone());
        fake.on_submit(Method::POST, r.paths().integrations(), vec![remote()]);

        let state = r.create_integration(&spec("k")).await.unwrap();
        assert_eq!(state.integration_id, "i-1");
        assert_eq!(state.datadog.unwrap().api_key, "k");
    }

    #[tokio::test]
    async fn test_rotated_key_is_pushed() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(fake.clone());
        fake.on_fetch(r.paths().integration("i-1"), vec![remote()]);
        fake.on_submit(Method::PUT, r.paths().integration("i-1"), vec![remote()]);

        let prior = merge_integration_state(
            serde_json::from_value(json!({
                "info": {"id": "i-1"},
                "spec": {"name": "dd", "type": "DATADOG"}
            }))
            .unwrap(),
            &spec("old"),
        );

        let unchanged = r.update_integration(&prior, &spec("old")).await.unwrap();
        assert_eq!(unchanged.action, ApplyAction::Unchanged);

        let applied = r.update_integration(&prior, &spec("new")).await.unwrap();
        assert_eq!(applied.action, ApplyAction::Updated);
        assert_eq!(applied.drifts[0].desired, "<redacted>");
        assert_eq!(fake.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_sink_type_requires_replacement() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(fake.clone());
        fake.on_fetch(r.paths().integration("i-1"), vec![remote()]);
        let prior = IntegrationState {
            integration_id: "i-1".into(),
            name: "dd".into(),
            sink_type: SinkType::Datadog,
            datadog: spec("k").datadog,
            grafana: None,
            sumologic: None,
            prometheus: None,
        };

        let mut changed = spec("k");
        changed.sink_type = SinkType::Prometheus;
        changed.datadog = None;
        changed.prometheus = Some(crate::model::PrometheusSpec {
            endpoint: "https://prom.example/write".into(),
        });
        let err = r.update_integration(&prior, &changed).await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }
}
