use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CloudType, ClusterTier, CrossReference, Field, NodeConfig, NodeConfigState};
use super::validation::{
    finish, validate_disk_iops, validate_disk_size, validate_non_empty, validate_reference,
    SpecValidationError,
};

/// Read-only replica placements attached to a primary cluster
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReadReplicasSpec {
    pub primary_cluster: CrossReference,

    /// One entry per replica region; order is preserved in the settled state
    pub replicas: Vec<ReadReplicaRegion>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReadReplicaRegion {
    pub region: String,
    pub cloud_type: CloudType,

    #[serde(default = "default_read_replica_nodes")]
    pub num_nodes: u32,

    /// Replication factor inside the region
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub num_replicas: Field<u32>,

    /// Each replica region must name its own VPC, by id or by name
    pub vpc: CrossReference,

    pub node_config: NodeConfig,
}

fn default_read_replica_nodes() -> u32 {
    1
}

impl ReadReplicasSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();
        validate_reference(&self.primary_cluster, "primary_cluster", true, &mut errors);

        if self.replicas.is_empty() {
            errors.push(SpecValidationError::new(
                "replicas",
                "at least one read replica region is required",
                "Add a replicas entry, or delete the read replicas resource.",
            ));
        }

        let mut seen = HashSet::new();
        for (i, replica) in self.replicas.iter().enumerate() {
            let path = format!("replicas[{i}]");
            validate_non_empty(&replica.region, &format!("{path}.region"), &mut errors);
            if !seen.insert(replica.region.as_str()) {
                errors.push(SpecValidationError::new(
                    format!("{path}.region"),
                    format!("region {} is listed more than once", replica.region),
                    "List each replica region once.",
                ));
            }
            if replica.num_nodes == 0 {
                errors.push(SpecValidationError::new(
                    format!("{path}.num_nodes"),
                    "num_nodes must be at least 1",
                    "Set num_nodes to 1 or more.",
                ));
            }
            if let Some(rf) = replica.num_replicas.value() {
                if *rf == 0 || *rf > replica.num_nodes {
                    errors.push(SpecValidationError::new(
                        format!("{path}.num_replicas"),
                        format!(
                            "num_replicas must be between 1 and num_nodes ({}), got {rf}",
                            replica.num_nodes
                        ),
                        "Lower num_replicas or add nodes to the region.",
                    ));
                }
            }
            validate_reference(&replica.vpc, &format!("{path}.vpc"), true, &mut errors);

            // Replicas only exist on PAID clusters
            for e in [
                validate_disk_size(ClusterTier::Paid, replica.node_config.disk_size_gb.cloned_option()),
                validate_disk_iops(
                    replica.cloud_type,
                    ClusterTier::Paid,
                    replica.node_config.disk_iops.cloned_option(),
                ),
            ]
            .into_iter()
            .filter_map(|r| r.err())
            {
                errors.push(SpecValidationError {
                    field: format!("{path}.{}", e.field),
                    ..e
                });
            }
        }

        finish(errors)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReadReplicasState {
    pub primary_cluster_id: String,
    pub replicas: Vec<ReadReplicaRegionState>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ReadReplicaRegionState {
    pub region: String,
    pub cloud_type: CloudType,
    pub num_nodes: u32,
    pub num_replicas: u32,
    pub vpc_id: Option<String>,
    pub vpc_name: Option<String>,
    pub node_config: NodeConfigState,
    pub replica_cluster_id: Option<String>,
    pub endpoint: Option<String>,
}
