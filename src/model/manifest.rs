//! Multi-resource manifests and the snapshots produced by reconciling them

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::allow_list::{AllowListSpec, AllowListState};
use super::audit_log::{AuditLogSpec, AuditLogState};
use super::backup::{BackupSpec, BackupState};
use super::cluster::{ClusterSpec, ClusterState};
use super::integration::{IntegrationSpec, IntegrationState};
use super::read_replica::{ReadReplicasSpec, ReadReplicasState};
use super::validation::{finish, SpecValidationError};
use super::vpc::{VpcSpec, VpcState};
use crate::config::FeatureFlags;

/// A set of resources reconciled together
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Manifest {
    pub resources: Vec<ResourceDocument>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "kind")]
pub enum ResourceDocument {
    Vpc { name: String, spec: VpcSpec },
    AllowList { name: String, spec: AllowListSpec },
    Integration { name: String, spec: IntegrationSpec },
    Cluster { name: String, spec: ClusterSpec },
    ReadReplicas { name: String, spec: ReadReplicasSpec },
    Backup { name: String, spec: BackupSpec },
    AuditLog { name: String, spec: AuditLogSpec },
}

impl ResourceDocument {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceDocument::Vpc { .. } => "Vpc",
            ResourceDocument::AllowList { .. } => "AllowList",
            ResourceDocument::Integration { .. } => "Integration",
            ResourceDocument::Cluster { .. } => "Cluster",
            ResourceDocument::ReadReplicas { .. } => "ReadReplicas",
            ResourceDocument::Backup { .. } => "Backup",
            ResourceDocument::AuditLog { .. } => "AuditLog",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceDocument::Vpc { name, .. }
            | ResourceDocument::AllowList { name, .. }
            | ResourceDocument::Integration { name, .. }
            | ResourceDocument::Cluster { name, .. }
            | ResourceDocument::ReadReplicas { name, .. }
            | ResourceDocument::Backup { name, .. }
            | ResourceDocument::AuditLog { name, .. } => name,
        }
    }

    /// Stable key used for state files and leases
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    /// Resources in a lower stage may be referenced by higher stages,
    /// so stages are reconciled in order.
    pub fn stage(&self) -> u8 {
        match self {
            ResourceDocument::Vpc { .. }
            | ResourceDocument::AllowList { .. }
            | ResourceDocument::Integration { .. } => 0,
            ResourceDocument::Cluster { .. } => 1,
            ResourceDocument::ReadReplicas { .. }
            | ResourceDocument::Backup { .. }
            | ResourceDocument::AuditLog { .. } => 2,
        }
    }

    pub fn validate(&self, features: &FeatureFlags) -> Result<(), Vec<SpecValidationError>> {
        match self {
            ResourceDocument::Vpc { spec, .. } => spec.validate(),
            ResourceDocument::AllowList { spec, .. } => spec.validate(),
            ResourceDocument::Integration { spec, .. } => spec.validate(),
            ResourceDocument::Cluster { spec, .. } => spec.validate(features),
            ResourceDocument::ReadReplicas { spec, .. } => spec.validate(),
            ResourceDocument::Backup { spec, .. } => spec.validate(),
            ResourceDocument::AuditLog { spec, .. } => spec.validate(features),
        }
    }
}

impl Manifest {
    /// Validate every document, prefixing each error with the document key
    pub fn validate(&self, features: &FeatureFlags) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();
        let mut keys = HashSet::new();

        for doc in &self.resources {
            let key = doc.key();
            if !keys.insert(key.clone()) {
                errors.push(SpecValidationError::new(
                    key.clone(),
                    format!("{key} is declared more than once"),
                    "Give every resource of the same kind a unique name.",
                ));
            }
            if let Err(doc_errors) = doc.validate(features) {
                errors.extend(doc_errors.into_iter().map(|e| SpecValidationError {
                    field: format!("{key}: {}", e.field),
                    ..e
                }));
            }
        }

        finish(errors)
    }

    /// Documents grouped by stage, in stage order
    pub fn stages(&self) -> Vec<Vec<&ResourceDocument>> {
        let mut stages: Vec<Vec<&ResourceDocument>> = Vec::new();
        for doc in &self.resources {
            let stage = doc.stage() as usize;
            if stages.len() <= stage {
                stages.resize_with(stage + 1, Vec::new);
            }
            stages[stage].push(doc);
        }
        stages.retain(|s| !s.is_empty());
        stages
    }
}

/// Last known settled state of one manifest document
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "kind")]
pub enum ResourceSnapshot {
    Vpc(VpcState),
    AllowList(AllowListState),
    Integration(IntegrationState),
    Cluster(ClusterState),
    ReadReplicas(ReadReplicasState),
    Backup(BackupState),
    AuditLog(AuditLogState),
}
