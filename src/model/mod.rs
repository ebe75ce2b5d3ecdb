//! Resource model
//!
//! Desired-state specifications (`*Spec`) as supplied by callers, and the
//! canonical settled snapshots (`*State`) produced after reconciliation.

pub mod allow_list;
pub mod audit_log;
pub mod backup;
pub mod cluster;
pub mod integration;
pub mod manifest;
pub mod operation;
pub mod read_replica;
pub mod types;
pub mod validation;
pub mod vpc;

#[cfg(test)]
mod tests;

pub use allow_list::{AllowListSpec, AllowListState};
pub use audit_log::{
    AuditLogSpec, AuditLogState, LogLevel, StatementClass, YsqlLogSettings, YsqlLogSettingsState,
};
pub use backup::{BackupSpec, BackupState};
pub use cluster::{ClusterSpec, ClusterState, EndpointState, RegionSpec, RegionState};
pub use integration::{
    DatadogSpec, GrafanaSpec, IntegrationSpec, IntegrationState, PrometheusSpec, SinkType,
    SumologicSpec,
};
pub use manifest::{Manifest, ResourceDocument, ResourceSnapshot};
pub use operation::{Operation, OperationKind, OperationPhase};
pub use read_replica::{
    ReadReplicaRegion, ReadReplicaRegionState, ReadReplicasSpec, ReadReplicasState,
};
pub use types::*;
pub use validation::SpecValidationError;
pub use vpc::{VpcRegionCidr, VpcSpec, VpcState};
