//! Drift detection
//!
//! Compares a spec against a settled state. Only attributes the caller set
//! can drift; anything left absent was defaulted by the service and is
//! accepted as observed. Each drift records whether the service can apply the
//! change in place or the resource would have to be replaced.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use super::read_replica::ReadReplicasRequest;
use crate::client::payload::ClusterRegionInfo;
use crate::error::Error;
use crate::model::{
    AllowListSpec, AllowListState, AuditLogSpec, AuditLogState, BackupSpec, BackupState,
    ClusterSpec, ClusterState, Field, IntegrationSpec, IntegrationState,
    NodeConfig, NodeConfigState, ReadReplicasSpec, ReadReplicasState, ReferenceChoice,
    SpecValidationError, VpcSpec, VpcState,
};

const REDACTED: &str = "<redacted>";
const ABSENT: &str = "<absent>";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub field: String,
    pub desired: String,
    pub observed: String,
    pub requires_replacement: bool,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.observed, self.desired)?;
        if self.requires_replacement {
            write!(f, " (requires replacement)")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct DriftSet {
    drifts: Vec<Drift>,
}

impl DriftSet {
    fn push(&mut self, field: impl Into<String>, desired: String, observed: String, replace: bool) {
        self.drifts.push(Drift {
            field: field.into(),
            desired,
            observed,
            requires_replacement: replace,
        });
    }

    /// Record a drift when `desired` is set and differs from `observed`
    fn check<T: PartialEq + fmt::Display>(
        &mut self,
        field: impl Into<String>,
        desired: Option<T>,
        observed: T,
        replace: bool,
    ) {
        if let Some(desired) = desired {
            if desired != observed {
                self.push(field, desired.to_string(), observed.to_string(), replace);
            }
        }
    }

    fn check_node_config(&mut self, prefix: &str, desired: &NodeConfig, observed: &NodeConfigState) {
        self.check(
            format!("{prefix}.num_cores"),
            Some(desired.num_cores),
            observed.num_cores,
            false,
        );
        self.check(
            format!("{prefix}.memory_mb"),
            desired.memory_mb.value().copied(),
            observed.memory_mb,
            false,
        );
        self.check(
            format!("{prefix}.disk_size_gb"),
            desired.disk_size_gb.value().copied(),
            observed.disk_size_gb,
            false,
        );
        self.check(
            format!("{prefix}.disk_iops"),
            // 0 asks for the provider default
            desired.disk_iops.value().copied().filter(|iops| *iops > 0),
            observed.disk_iops.unwrap_or(0),
            false,
        );
    }

    /// Compare a resolved reference id with the observed one
    fn check_resolved(
        &mut self,
        field: impl Into<String>,
        desired: Option<&str>,
        observed: Option<&str>,
        replace: bool,
    ) {
        if let Some(desired) = desired {
            if Some(desired) != observed {
                self.push(
                    field,
                    desired.to_string(),
                    observed.unwrap_or(ABSENT).to_string(),
                    replace,
                );
            }
        }
    }

    /// Report keys declared on only one side
    fn check_membership<'a>(
        &mut self,
        field: &str,
        desired: impl IntoIterator<Item = &'a str>,
        observed: impl IntoIterator<Item = &'a str>,
    ) {
        let desired: BTreeSet<&str> = desired.into_iter().collect();
        let observed: BTreeSet<&str> = observed.into_iter().collect();
        for missing in desired.difference(&observed) {
            self.push(field, missing.to_string(), ABSENT.to_string(), false);
        }
        for extra in observed.difference(&desired) {
            self.push(field, ABSENT.to_string(), extra.to_string(), false);
        }
    }

    fn finish(self) -> Vec<Drift> {
        self.drifts
    }
}

fn display_option<T: fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |v| v.to_string())
}

pub fn diff_cluster(spec: &ClusterSpec, state: &ClusterState) -> Vec<Drift> {
    let mut set = DriftSet::default();

    set.check("name", Some(spec.name.as_str()), state.name.as_str(), false);
    set.check("cloud_type", Some(spec.cloud_type), state.cloud_type, true);
    set.check("cluster_tier", Some(spec.cluster_tier), state.cluster_tier, true);
    set.check(
        "cluster_type",
        spec.cluster_type.value().copied(),
        state.cluster_type,
        true,
    );
    set.check(
        "fault_tolerance",
        spec.fault_tolerance.value().copied(),
        state.fault_tolerance,
        false,
    );
    set.check(
        "num_faults_to_tolerate",
        spec.num_faults_to_tolerate.value().copied(),
        state.num_faults_to_tolerate,
        false,
    );

    set.check_membership(
        "regions",
        spec.regions.iter().map(|r| r.region.as_str()),
        state.regions.iter().map(|r| r.region.as_str()),
    );
    let observed: HashMap<&str, _> = state
        .regions
        .iter()
        .map(|r| (r.region.as_str(), r))
        .collect();
    for (i, region) in spec.regions.iter().enumerate() {
        let Some(actual) = observed.get(region.region.as_str()) else {
            continue;
        };
        let prefix = format!("regions[{i}]");
        set.check(
            format!("{prefix}.num_nodes"),
            Some(region.num_nodes),
            actual.num_nodes,
            false,
        );
        set.check(
            format!("{prefix}.public_access"),
            region.public_access.value().copied(),
            actual.public_access,
            false,
        );
        set.check(
            format!("{prefix}.is_preferred"),
            region.is_preferred.value().copied(),
            actual.is_preferred,
            false,
        );
        set.check(
            format!("{prefix}.is_default"),
            region.is_default.value().copied(),
            actual.is_default,
            false,
        );
    }

    set.check_node_config("node_config", &spec.node_config, &state.node_config);

    if let Some(track) = spec.database_track.value() {
        if state.database_track.as_ref() != Some(track) {
            set.push(
                "database_track",
                track.clone(),
                display_option(state.database_track.as_ref()),
                true,
            );
        }
    }

    if spec.credentials != state.credentials {
        set.push("credentials", REDACTED.to_string(), REDACTED.to_string(), true);
    }

    set.check(
        "desired_state",
        spec.desired_state.value().copied(),
        state.desired_state,
        false,
    );
    set.check(
        "connection_pooling",
        spec.connection_pooling.value().copied(),
        state.connection_pooling.unwrap_or(false),
        false,
    );

    set.finish()
}

/// Allow-list attachments are compared by resolved id, so they are checked
/// separately once the references have been resolved
pub fn diff_cluster_allow_lists(desired_ids: &[String], state: &ClusterState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    set.check_membership(
        "allow_lists",
        desired_ids.iter().map(String::as_str),
        state.allow_list_ids.iter().map(String::as_str),
    );
    set.finish()
}

/// Region VPCs are compared by resolved id. `desired` is the translated
/// region list, in the same order as the spec's regions.
pub fn diff_cluster_vpcs(desired: &[ClusterRegionInfo], state: &ClusterState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    for (i, region) in desired.iter().enumerate() {
        let name = region.placement_info.cloud_info.region.as_str();
        let Some(actual) = state.regions.iter().find(|r| r.region == name) else {
            continue;
        };
        set.check_resolved(
            format!("regions[{i}].vpc"),
            region.placement_info.vpc_id.as_deref(),
            actual.vpc_id.as_deref(),
            true,
        );
    }
    set.finish()
}

/// VPCs are immutable; every drift requires replacement
pub fn diff_vpc(spec: &VpcSpec, state: &VpcState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    set.check("name", Some(spec.name.as_str()), state.name.as_str(), true);
    set.check("cloud_type", Some(spec.cloud_type), state.cloud_type, true);

    if let Some(cidr) = spec.global_cidr.value() {
        if state.global_cidr.as_ref() != Some(cidr) {
            set.push(
                "global_cidr",
                cidr.clone(),
                display_option(state.global_cidr.as_ref()),
                true,
            );
        }
    }

    let observed: HashMap<&str, &str> = state
        .region_cidrs
        .iter()
        .map(|rc| (rc.region.as_str(), rc.cidr.as_str()))
        .collect();
    for (i, rc) in spec.region_cidrs.iter().enumerate() {
        let actual = observed.get(rc.region.as_str()).copied().unwrap_or(ABSENT);
        set.check(format!("region_cidrs[{i}].cidr"), Some(rc.cidr.as_str()), actual, true);
    }
    if !spec.region_cidrs.is_empty() {
        for rc in &state.region_cidrs {
            if !spec.region_cidrs.iter().any(|d| d.region == rc.region) {
                set.push("region_cidrs", ABSENT.to_string(), rc.region.clone(), true);
            }
        }
    }

    set.finish()
}

pub fn diff_allow_list(spec: &AllowListSpec, state: &AllowListState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    set.check("name", Some(spec.name.as_str()), state.name.as_str(), false);
    set.check(
        "description",
        spec.description.value().map(String::as_str),
        state.description.as_str(),
        false,
    );
    set.check_membership(
        "cidrs",
        spec.cidrs.iter().map(String::as_str),
        state.cidrs.iter().map(String::as_str),
    );
    set.finish()
}

/// `request` carries the resolved primary cluster and replica VPC ids
pub fn diff_read_replicas(
    spec: &ReadReplicasSpec,
    request: &ReadReplicasRequest,
    state: &ReadReplicasState,
) -> Vec<Drift> {
    let mut set = DriftSet::default();
    set.check_resolved(
        "primary_cluster",
        Some(request.primary_cluster_id.as_str()),
        Some(state.primary_cluster_id.as_str()),
        true,
    );

    set.check_membership(
        "replicas",
        spec.replicas.iter().map(|r| r.region.as_str()),
        state.replicas.iter().map(|r| r.region.as_str()),
    );
    let observed: HashMap<&str, _> = state
        .replicas
        .iter()
        .map(|r| (r.region.as_str(), r))
        .collect();
    for (i, replica) in spec.replicas.iter().enumerate() {
        let Some(actual) = observed.get(replica.region.as_str()) else {
            continue;
        };
        let prefix = format!("replicas[{i}]");
        set.check(
            format!("{prefix}.cloud_type"),
            Some(replica.cloud_type),
            actual.cloud_type,
            true,
        );
        set.check(
            format!("{prefix}.num_nodes"),
            Some(replica.num_nodes),
            actual.num_nodes,
            false,
        );
        set.check(
            format!("{prefix}.num_replicas"),
            replica.num_replicas.value().copied(),
            actual.num_replicas,
            false,
        );
        set.check_resolved(
            format!("{prefix}.vpc"),
            request
                .replicas
                .get(i)
                .and_then(|r| r.placement_info.vpc_id.as_deref()),
            actual.vpc_id.as_deref(),
            true,
        );
        set.check_node_config(
            &format!("{prefix}.node_config"),
            &replica.node_config,
            &actual.node_config,
        );
    }

    set.finish()
}

/// On-demand backups are immutable. `cluster_id` is the resolved cluster reference.
pub fn diff_backup(spec: &BackupSpec, cluster_id: &str, state: &BackupState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    set.check("cluster", Some(cluster_id), state.cluster_id.as_str(), true);
    if let Some(description) = spec.description.value() {
        if state.description.as_ref() != Some(description) {
            set.push(
                "description",
                description.clone(),
                display_option(state.description.as_ref()),
                true,
            );
        }
    }
    set.check(
        "retention_period_in_days",
        spec.retention_period_in_days.value().copied(),
        state.retention_period_in_days,
        true,
    );
    set.finish()
}

pub fn diff_integration(spec: &IntegrationSpec, state: &IntegrationState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    set.check("name", Some(spec.name.as_str()), state.name.as_str(), false);
    set.check("sink_type", Some(spec.sink_type), state.sink_type, true);

    let block = spec.sink_type.to_string().to_ascii_lowercase();
    let changed = spec.datadog != state.datadog
        || spec.grafana != state.grafana
        || spec.sumologic != state.sumologic
        || spec.prometheus != state.prometheus;
    if changed {
        set.push(block, REDACTED.to_string(), REDACTED.to_string(), false);
    }
    set.finish()
}

pub fn diff_audit_log(spec: &AuditLogSpec, state: &AuditLogState) -> Vec<Drift> {
    let mut set = DriftSet::default();
    if let Some(ReferenceChoice::Id(id)) = spec.cluster.choice() {
        set.check("cluster.id", Some(id), state.cluster_id.as_str(), true);
    }
    if let Some(ReferenceChoice::Id(id)) = spec.integration.choice() {
        set.check("integration.id", Some(id), state.integration_id.as_str(), false);
    }

    let desired = &spec.log_settings;
    let observed = &state.log_settings;
    let flags: [(&str, &Field<bool>, bool); 5] = [
        ("log_settings.log_catalog", &desired.log_catalog, observed.log_catalog),
        ("log_settings.log_client", &desired.log_client, observed.log_client),
        ("log_settings.log_parameter", &desired.log_parameter, observed.log_parameter),
        ("log_settings.log_relation", &desired.log_relation, observed.log_relation),
        (
            "log_settings.log_statement_once",
            &desired.log_statement_once,
            observed.log_statement_once,
        ),
    ];
    for (field, want, have) in flags {
        set.check(field, want.value().copied(), have, false);
    }
    set.check(
        "log_settings.log_level",
        desired.log_level.value().map(|l| format!("{l:?}")),
        format!("{:?}", observed.log_level),
        false,
    );

    let classes = |list: &[crate::model::StatementClass]| -> Vec<String> {
        list.iter().map(|c| format!("{c:?}")).collect()
    };
    let want = classes(&spec.statement_classes);
    let have = classes(&state.statement_classes);
    set.check_membership(
        "statement_classes",
        want.iter().map(String::as_str),
        have.iter().map(String::as_str),
    );

    set.finish()
}

/// Refuse drifts the service cannot apply in place
pub fn ensure_in_place(resource: &str, drifts: &[Drift]) -> Result<(), Error> {
    let issues: Vec<SpecValidationError> = drifts
        .iter()
        .filter(|d| d.requires_replacement)
        .map(|d| {
            SpecValidationError::new(
                d.field.clone(),
                format!(
                    "changing {} of an existing {resource} from {} to {} requires replacing it",
                    d.field, d.observed, d.desired
                ),
                format!("Revert the change, or delete the {resource} and apply again."),
            )
        })
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::ConfigurationError(issues))
    }
}
