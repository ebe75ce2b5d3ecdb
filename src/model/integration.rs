//! Telemetry sink integrations
//!
//! An integration holds the credentials for one external observability sink.
//! The service masks secrets on read, so the settled state keeps the values
//! from the spec.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::validation::{finish, validate_non_empty, SpecValidationError};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SinkType {
    Datadog,
    Grafana,
    Sumologic,
    Prometheus,
}

impl fmt::Display for SinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SinkType::Datadog => "DATADOG",
            SinkType::Grafana => "GRAFANA",
            SinkType::Sumologic => "SUMOLOGIC",
            SinkType::Prometheus => "PROMETHEUS",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IntegrationSpec {
    pub name: String,
    pub sink_type: SinkType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datadog: Option<DatadogSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana: Option<GrafanaSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumologic: Option<SumologicSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct DatadogSpec {
    pub api_key: String,
    pub site: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GrafanaSpec {
    pub access_policy_token: String,
    pub zone: String,
    pub instance_id: String,
    pub org_slug: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SumologicSpec {
    pub access_id: String,
    pub access_key: String,
    pub installation_token: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PrometheusSpec {
    pub endpoint: String,
}

impl IntegrationSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();
        validate_non_empty(&self.name, "name", &mut errors);

        let blocks = [
            (SinkType::Datadog, "datadog", self.datadog.is_some()),
            (SinkType::Grafana, "grafana", self.grafana.is_some()),
            (SinkType::Sumologic, "sumologic", self.sumologic.is_some()),
            (SinkType::Prometheus, "prometheus", self.prometheus.is_some()),
        ];

        for (sink, block, present) in blocks {
            if sink == self.sink_type && !present {
                errors.push(SpecValidationError::new(
                    block,
                    format!("{block} settings are required when sink_type is {sink}"),
                    format!("Add a {block} section."),
                ));
            } else if sink != self.sink_type && present {
                errors.push(SpecValidationError::new(
                    block,
                    format!("{block} settings conflict with sink_type {}", self.sink_type),
                    format!("Remove the {block} section or change sink_type to {sink}."),
                ));
            }
        }

        if let Some(dd) = &self.datadog {
            validate_non_empty(&dd.api_key, "datadog.api_key", &mut errors);
            validate_non_empty(&dd.site, "datadog.site", &mut errors);
        }
        if let Some(g) = &self.grafana {
            validate_non_empty(&g.access_policy_token, "grafana.access_policy_token", &mut errors);
            validate_non_empty(&g.zone, "grafana.zone", &mut errors);
            validate_non_empty(&g.instance_id, "grafana.instance_id", &mut errors);
            validate_non_empty(&g.org_slug, "grafana.org_slug", &mut errors);
        }
        if let Some(s) = &self.sumologic {
            validate_non_empty(&s.access_id, "sumologic.access_id", &mut errors);
            validate_non_empty(&s.access_key, "sumologic.access_key", &mut errors);
            validate_non_empty(&s.installation_token, "sumologic.installation_token", &mut errors);
        }
        if let Some(p) = &self.prometheus {
            if !(p.endpoint.starts_with("http://") || p.endpoint.starts_with("https://")) {
                errors.push(SpecValidationError::new(
                    "prometheus.endpoint",
                    format!("{} is not an http(s) URL", p.endpoint),
                    "Use the full remote-write URL, including the scheme.",
                ));
            }
        }

        finish(errors)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IntegrationState {
    pub integration_id: String,
    pub name: String,
    pub sink_type: SinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datadog: Option<DatadogSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana: Option<GrafanaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumologic: Option<SumologicSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusSpec>,
}
