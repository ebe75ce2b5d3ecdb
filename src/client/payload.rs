//! Wire payloads exchanged with the control-plane API
//!
//! Request bodies are built by the translator; response bodies are the
//! unwrapped `data` member of each reply. Responses default every field so a
//! service that omits a value (instead of sending `null`) still parses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    CloudType, ClusterTier, ClusterType, FaultTolerance, LogLevel, SinkType, StatementClass,
};

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CreateClusterRequest {
    pub cluster_spec: ClusterSpecPayload,
    pub db_credentials: DbCredentials,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ClusterSpecPayload {
    pub name: String,
    pub cluster_info: ClusterInfoPayload,
    pub cloud_info: CloudInfo,
    pub cluster_region_info: Vec<ClusterRegionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_info: Option<SoftwareInfo>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ClusterInfoPayload {
    pub cluster_tier: ClusterTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<ClusterType>,
    pub num_nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_tolerance: Option<FaultTolerance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_faults_to_tolerate: Option<u32>,
    pub node_info: NodeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_connection_pooling: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodeInfo {
    pub num_cores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_iops: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CloudInfo {
    pub code: CloudType,
    pub region: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ClusterRegionInfo {
    pub placement_info: PlacementInfo,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_affinitized: bool,
    #[serde(default)]
    pub accessibility_types: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PlacementInfo {
    pub cloud_info: CloudInfo,
    pub num_nodes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

pub const ACCESSIBILITY_PUBLIC: &str = "PUBLIC";
pub const ACCESSIBILITY_PRIVATE: &str = "PRIVATE";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SoftwareInfo {
    pub track_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DbCredentials {
    pub ysql: UserCredentials,
    pub ycql: UserCredentials,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ClusterData {
    pub info: ClusterInfoData,
    pub spec: ClusterSpecPayload,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusterInfoData {
    pub id: String,
    pub state: String,
    pub software_version: Option<String>,
    pub track_name: Option<String>,
    pub metadata: Metadata,
    pub cluster_endpoints: Vec<ClusterEndpoint>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Metadata {
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusterEndpoint {
    pub region: String,
    pub host: String,
    pub accessibility_type: String,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub const TASK_IN_PROGRESS: &str = "IN_PROGRESS";
pub const TASK_SUCCEEDED: &str = "SUCCEEDED";
pub const TASK_FAILED: &str = "FAILED";

/// Task types recorded by the service for asynchronous cluster work
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskType {
    CreateCluster,
    EditCluster,
    PauseCluster,
    ResumeCluster,
    CreateReadReplica,
    EditReadReplica,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CreateCluster => "CREATE_CLUSTER",
            TaskType::EditCluster => "EDIT_CLUSTER",
            TaskType::PauseCluster => "PAUSE_CLUSTER",
            TaskType::ResumeCluster => "RESUME_CLUSTER",
            TaskType::CreateReadReplica => "CREATE_READ_REPLICA",
            TaskType::EditReadReplica => "EDIT_READ_REPLICA",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TaskData {
    pub info: TaskInfo,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TaskInfo {
    pub id: String,
    pub task_type: String,
    pub entity_id: String,
    pub state: String,
    pub created_on: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// VPCs
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct VpcSpecPayload {
    pub name: String,
    pub cloud: CloudType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub region_specs: Vec<VpcRegionPayload>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct VpcRegionPayload {
    pub region: String,
    pub cidr: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct VpcData {
    pub info: VpcInfo,
    pub spec: VpcSpecPayload,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct VpcInfo {
    pub id: String,
    pub state: String,
    pub cluster_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Allow lists
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AllowListSpecPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub allow_list: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AllowListData {
    pub info: AllowListInfo,
    pub spec: AllowListSpecPayload,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AllowListInfo {
    pub id: String,
    pub cluster_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Read replicas
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReadReplicaPayload {
    pub node_info: NodeInfo,
    pub placement_info: PlacementInfo,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReadReplicasData {
    pub spec: Vec<ReadReplicaPayload>,
    #[serde(default)]
    pub info: ReadReplicasInfo,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReadReplicasInfo {
    pub primary_cluster_id: String,
    pub replicas: Vec<ReadReplicaInfo>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReadReplicaInfo {
    pub region: String,
    pub cluster_id: Option<String>,
    pub endpoint: Option<String>,
}

// ---------------------------------------------------------------------------
// Backups
// ---------------------------------------------------------------------------

pub const BACKUP_SUCCEEDED: &str = "SUCCEEDED";
pub const BACKUP_FAILED: &str = "FAILED";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BackupSpecPayload {
    pub cluster_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_period_in_days: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BackupData {
    pub info: BackupInfo,
    pub spec: BackupSpecPayload,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackupInfo {
    pub id: String,
    pub state: String,
    pub retention_period_in_days: Option<u32>,
    pub actual_size_bytes: Option<u64>,
    pub created_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Integrations
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IntegrationSpecPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub sink_type: SinkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datadog_spec: Option<DatadogPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_spec: Option<GrafanaPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumologic_spec: Option<SumologicPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_spec: Option<PrometheusPayload>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DatadogPayload {
    pub api_key: String,
    pub site: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GrafanaPayload {
    pub access_policy_token: String,
    pub zone: String,
    pub instance_id: String,
    pub org_slug: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SumologicPayload {
    pub access_id: String,
    pub access_key: String,
    pub installation_token: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PrometheusPayload {
    pub endpoint: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IntegrationData {
    pub info: IntegrationInfo,
    pub spec: IntegrationSpecPayload,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IntegrationInfo {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Audit log export
// ---------------------------------------------------------------------------

pub const AUDIT_LOG_ACTIVE: &str = "ACTIVE";
pub const AUDIT_LOG_FAILED: &str = "FAILED";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AuditLogSpecPayload {
    pub exporter_id: String,
    pub ysql_config: YsqlConfigPayload,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct YsqlConfigPayload {
    pub log_settings: LogSettingsPayload,
    pub statement_classes: Vec<StatementClass>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LogSettingsPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_catalog: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_client: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_parameter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_relation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_statement_once: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AuditLogData {
    pub info: AuditLogInfo,
    pub spec: AuditLogSpecPayload,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuditLogInfo {
    pub id: String,
    pub cluster_id: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cluster_data_tolerates_missing_computed_fields() {
        let data: ClusterData = serde_json::from_value(json!({
            "info": {"id": "c-1", "state": "ACTIVE"},
            "spec": {
                "name": "orders",
                "cluster_info": {
                    "cluster_tier": "PAID",
                    "num_nodes": 3,
                    "node_info": {"num_cores": 2}
                },
                "cloud_info": {"code": "AWS", "region": "us-west-2"},
                "cluster_region_info": []
            }
        }))
        .unwrap();

        assert_eq!(data.info.id, "c-1");
        assert!(data.info.cluster_endpoints.is_empty());
        assert!(data.info.metadata.created_on.is_none());
        assert_eq!(data.spec.cluster_info.cluster_type, None);
    }

    #[test]
    fn test_request_omits_unset_optionals() {
        let node = NodeInfo {
            num_cores: 4,
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&node).unwrap(), json!({"num_cores": 4}));

        let integration = IntegrationSpecPayload {
            name: "metrics".into(),
            sink_type: SinkType::Prometheus,
            datadog_spec: None,
            grafana_spec: None,
            sumologic_spec: None,
            prometheus_spec: Some(PrometheusPayload {
                endpoint: "https://prom.example.com".into(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&integration).unwrap(),
            json!({
                "name": "metrics",
                "type": "PROMETHEUS",
                "prometheus_spec": {"endpoint": "https://prom.example.com"}
            })
        );
    }
}
