//! Cluster resource
//!
//! A cluster is the main managed entity: a set of database nodes spread across
//! one or more cloud regions. Most attributes may be left out of a manifest,
//! in which case the service picks the value and the settled [`ClusterState`]
//! records it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    CloudType, ClusterTier, ClusterType, Credentials, CrossReference, DesiredState,
    FaultTolerance, Field, NodeConfig, NodeConfigState,
};
use super::validation::{
    finish, validate_credentials, validate_disk_iops, validate_disk_size, validate_feature_gate,
    validate_non_empty, validate_reference, SpecValidationError,
};
use crate::config::FeatureFlags;

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterSpec {
    pub name: String,
    pub cloud_type: CloudType,
    pub cluster_tier: ClusterTier,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub cluster_type: Field<ClusterType>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub fault_tolerance: Field<FaultTolerance>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub num_faults_to_tolerate: Field<u32>,

    /// Region placement; order is significant to the caller and is preserved
    pub regions: Vec<RegionSpec>,

    pub node_config: NodeConfig,

    /// Software track name (e.g. "Stable"), resolved to a track id
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub database_track: Field<String>,

    #[serde(default)]
    pub credentials: Credentials,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_lists: Vec<CrossReference>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub desired_state: Field<DesiredState>,

    /// Built-in connection pooling, gated behind `features.connection_pooling`
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub connection_pooling: Field<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RegionSpec {
    pub region: String,
    pub num_nodes: u32,

    #[serde(default, skip_serializing_if = "CrossReference::is_empty")]
    pub vpc: CrossReference,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub public_access: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub is_preferred: Field<bool>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub is_default: Field<bool>,
}

impl RegionSpec {
    pub fn new(region: impl Into<String>, num_nodes: u32) -> Self {
        Self {
            region: region.into(),
            num_nodes,
            vpc: CrossReference::default(),
            public_access: Field::Absent,
            is_preferred: Field::Absent,
            is_default: Field::Absent,
        }
    }
}

impl ClusterSpec {
    pub fn total_nodes(&self) -> u32 {
        self.regions.iter().map(|r| r.num_nodes).sum()
    }

    pub fn effective_desired_state(&self) -> DesiredState {
        self.desired_state.value().copied().unwrap_or_default()
    }

    /// Validate the spec before anything is sent to the service
    pub fn validate(&self, features: &FeatureFlags) -> Result<(), Vec<SpecValidationError>> {
        let mut errors: Vec<SpecValidationError> = Vec::new();

        validate_non_empty(&self.name, "name", &mut errors);

        // 1. Regions
        if self.regions.is_empty() {
            errors.push(SpecValidationError::new(
                "regions",
                "at least one region is required",
                "Add a regions entry with region and num_nodes.",
            ));
        }

        let mut seen = HashSet::new();
        for (i, region) in self.regions.iter().enumerate() {
            validate_non_empty(&region.region, &format!("regions[{i}].region"), &mut errors);
            if !seen.insert(region.region.as_str()) {
                errors.push(SpecValidationError::new(
                    format!("regions[{i}].region"),
                    format!("region {} is listed more than once", region.region),
                    "List each region once; region names identify placements.",
                ));
            }
            if region.num_nodes == 0 {
                errors.push(SpecValidationError::new(
                    format!("regions[{i}].num_nodes"),
                    "num_nodes must be at least 1",
                    "Set num_nodes to 1 or more for every region.",
                ));
            }
            validate_reference(&region.vpc, &format!("regions[{i}].vpc"), false, &mut errors);
        }

        let preferred = self
            .regions
            .iter()
            .filter(|r| r.is_preferred.value() == Some(&true))
            .count();
        if preferred > 1 {
            errors.push(SpecValidationError::new(
                "regions[].is_preferred",
                "only one region can be preferred",
                "Set is_preferred on at most one region.",
            ));
        }
        let defaults = self
            .regions
            .iter()
            .filter(|r| r.is_default.value() == Some(&true))
            .count();
        if defaults > 1 {
            errors.push(SpecValidationError::new(
                "regions[].is_default",
                "only one region can be the default",
                "Set is_default on at most one region.",
            ));
        }

        // 2. Tier and fault tolerance
        let fault_tolerance = self.fault_tolerance.value().copied();
        if self.cluster_tier == ClusterTier::Free {
            if self.regions.len() > 1 || self.total_nodes() > 1 {
                errors.push(SpecValidationError::new(
                    "regions",
                    "FREE clusters run a single node in a single region",
                    "Use one region with num_nodes 1, or switch cluster_tier to PAID.",
                ));
            }
            if matches!(fault_tolerance, Some(ft) if ft != FaultTolerance::None) {
                errors.push(SpecValidationError::new(
                    "fault_tolerance",
                    "FREE clusters do not support fault tolerance",
                    "Remove fault_tolerance or set it to NONE.",
                ));
            }
        } else {
            self.validate_fault_tolerance(fault_tolerance, &mut errors);
        }

        // 3. Node shape
        if self.node_config.num_cores == 0 {
            errors.push(SpecValidationError::new(
                "node_config.num_cores",
                "num_cores must be at least 1",
                "Set node_config.num_cores to a positive value.",
            ));
        }
        if let Err(e) =
            validate_disk_size(self.cluster_tier, self.node_config.disk_size_gb.cloned_option())
        {
            errors.push(e);
        }
        if let Err(e) = validate_disk_iops(
            self.cloud_type,
            self.cluster_tier,
            self.node_config.disk_iops.cloned_option(),
        ) {
            errors.push(e);
        }

        // 4. Credentials and references
        validate_credentials(&self.credentials, &mut errors);
        for (i, allow_list) in self.allow_lists.iter().enumerate() {
            validate_reference(allow_list, &format!("allow_lists[{i}]"), true, &mut errors);
        }

        // 5. Feature-gated attributes
        validate_feature_gate(
            &self.connection_pooling,
            features.connection_pooling,
            "connection_pooling",
            "connection_pooling",
            &mut errors,
        );

        finish(errors)
    }

    fn validate_fault_tolerance(
        &self,
        fault_tolerance: Option<FaultTolerance>,
        errors: &mut Vec<SpecValidationError>,
    ) {
        let faults = self.num_faults_to_tolerate.value().copied();
        let Some(ft) = fault_tolerance else {
            return;
        };

        if ft == FaultTolerance::None {
            if matches!(faults, Some(f) if f > 0) {
                errors.push(SpecValidationError::new(
                    "num_faults_to_tolerate",
                    "num_faults_to_tolerate must be 0 when fault_tolerance is NONE",
                    "Remove num_faults_to_tolerate or choose NODE, ZONE or REGION fault tolerance.",
                ));
            }
            return;
        }

        let faults = faults.unwrap_or(1);
        if !(1..=3).contains(&faults) {
            errors.push(SpecValidationError::new(
                "num_faults_to_tolerate",
                format!("num_faults_to_tolerate must be between 1 and 3 for {ft} fault tolerance"),
                "Set num_faults_to_tolerate to 1, 2 or 3.",
            ));
            return;
        }

        let required = 2 * faults + 1;
        match ft {
            FaultTolerance::Region => {
                if (self.regions.len() as u32) < required {
                    errors.push(SpecValidationError::new(
                        "regions",
                        format!(
                            "REGION fault tolerance for {faults} fault(s) needs at least {required} regions, got {}",
                            self.regions.len()
                        ),
                        "Add regions or lower num_faults_to_tolerate.",
                    ));
                }
            }
            FaultTolerance::Node | FaultTolerance::Zone => {
                if self.total_nodes() < required {
                    errors.push(SpecValidationError::new(
                        "regions[].num_nodes",
                        format!(
                            "{ft} fault tolerance for {faults} fault(s) needs at least {required} nodes, got {}",
                            self.total_nodes()
                        ),
                        "Increase num_nodes or lower num_faults_to_tolerate.",
                    ));
                }
            }
            FaultTolerance::None => {}
        }
    }
}

/// Settled, canonical view of a cluster
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterState {
    pub cluster_id: String,
    pub name: String,
    pub cloud_type: CloudType,
    pub cluster_tier: ClusterTier,
    pub cluster_type: ClusterType,
    pub fault_tolerance: FaultTolerance,
    pub num_faults_to_tolerate: u32,
    pub regions: Vec<RegionState>,
    pub node_config: NodeConfigState,
    pub database_track: Option<String>,
    pub software_version: Option<String>,
    /// Raw lifecycle state reported by the service (ACTIVE, PAUSED, ...)
    pub state: String,
    pub desired_state: DesiredState,
    pub connection_pooling: Option<bool>,
    pub allow_list_ids: Vec<String>,
    pub endpoints: Vec<EndpointState>,
    /// Never returned by the service; carried from the spec
    #[serde(default)]
    pub credentials: Credentials,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
}

impl ClusterState {
    /// Copy without the timestamps the service regenerates on its own
    pub fn without_timestamps(&self) -> Self {
        Self {
            created_on: None,
            updated_on: None,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RegionState {
    pub region: String,
    pub num_nodes: u32,
    pub vpc_id: Option<String>,
    /// Carried from the spec when the VPC was referenced by name
    pub vpc_name: Option<String>,
    pub public_access: bool,
    pub is_preferred: bool,
    pub is_default: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct EndpointState {
    pub region: String,
    pub host: String,
    pub accessibility: String,
}
