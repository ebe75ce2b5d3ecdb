//! Read replica reconciliation
//!
//! All replica regions of a primary cluster are managed as one resource and
//! submitted together. Progress is tracked through the primary cluster's tasks.

use tracing::{info, instrument, warn};

use super::cluster::{node_info, node_state};
use super::drift::{diff_read_replicas, ensure_in_place};
use super::poller::{Observation, TerminalPredicate};
use super::reader::{ReadPurpose, RegionOrder};
use super::reconciler::{Applied, Reconciler};
use super::translator::{
    ensure_valid, resolve_reference, ReferenceKind, ReferenceResolver, Translated,
};
use crate::client::payload::{
    CloudInfo, PlacementInfo, ReadReplicaPayload, ReadReplicasData, TaskType,
};
use crate::client::ApiRequest;
use crate::error::{Error, Result};
use crate::model::{
    Operation, OperationKind, ReadReplicaRegionState, ReadReplicasSpec, ReadReplicasState,
};

const RESOURCE: &str = "read replicas";

/// Resolved replica payloads for one primary cluster
#[derive(Clone, Debug, PartialEq)]
pub struct ReadReplicasRequest {
    pub primary_cluster_id: String,
    pub replicas: Vec<ReadReplicaPayload>,
}

fn replica_order(spec: &ReadReplicasSpec) -> RegionOrder {
    RegionOrder::from_keys(spec.replicas.iter().map(|r| r.region.as_str()))
}

pub async fn translate_read_replicas(
    spec: &ReadReplicasSpec,
    resolver: &dyn ReferenceResolver,
) -> Result<Translated<ReadReplicasRequest>> {
    ensure_valid(spec.validate())?;

    let primary_cluster_id = resolve_reference(
        resolver,
        &spec.primary_cluster,
        ReferenceKind::Cluster,
        "primary_cluster",
    )
    .await?;

    let mut replicas = Vec::with_capacity(spec.replicas.len());
    for (i, replica) in spec.replicas.iter().enumerate() {
        let vpc_id = resolve_reference(
            resolver,
            &replica.vpc,
            ReferenceKind::Vpc,
            &format!("replicas[{i}].vpc"),
        )
        .await?;

        replicas.push(ReadReplicaPayload {
            node_info: node_info(&replica.node_config),
            placement_info: PlacementInfo {
                cloud_info: CloudInfo {
                    code: replica.cloud_type,
                    region: replica.region.clone(),
                },
                num_nodes: replica.num_nodes,
                num_replicas: Some(replica.num_replicas.value().copied().unwrap_or(1)),
                vpc_id: Some(vpc_id),
            },
        });
    }

    Ok(Translated {
        request: ReadReplicasRequest {
            primary_cluster_id,
            replicas,
        },
        order: replica_order(spec),
    })
}

pub fn merge_read_replicas_state(
    data: ReadReplicasData,
    primary_cluster_id: &str,
    spec: &ReadReplicasSpec,
    order: &RegionOrder,
) -> ReadReplicasState {
    let info = data.info;
    let replicas: Vec<ReadReplicaRegionState> = data
        .spec
        .into_iter()
        .map(|r| {
            let region = r.placement_info.cloud_info.region;
            let declared = spec.replicas.iter().find(|d| d.region == region);
            let placed = info.replicas.iter().find(|p| p.region == region);
            ReadReplicaRegionState {
                cloud_type: r.placement_info.cloud_info.code,
                num_nodes: r.placement_info.num_nodes,
                num_replicas: r.placement_info.num_replicas.unwrap_or(1),
                vpc_name: r
                    .placement_info
                    .vpc_id
                    .as_ref()
                    .and(declared)
                    .and_then(|d| d.vpc.name.cloned_option()),
                vpc_id: r.placement_info.vpc_id,
                node_config: node_state(&r.node_info),
                replica_cluster_id: placed.and_then(|p| p.cluster_id.clone()),
                endpoint: placed.and_then(|p| p.endpoint.clone()),
                region,
            }
        })
        .collect();

    let primary_cluster_id = if info.primary_cluster_id.is_empty() {
        primary_cluster_id.to_string()
    } else {
        info.primary_cluster_id
    };

    ReadReplicasState {
        primary_cluster_id,
        replicas: order.apply(replicas, |r| r.region.as_str()),
    }
}

impl Reconciler {
    #[instrument(skip(self, spec))]
    pub async fn create_read_replicas(&self, spec: &ReadReplicasSpec) -> Result<ReadReplicasState> {
        let resolver = self.resolver();
        let translated = translate_read_replicas(spec, &resolver).await?;
        let primary = translated.request.primary_cluster_id.as_str();
        info!(
            "Creating {} read replica region(s) on cluster {}",
            translated.request.replicas.len(),
            primary
        );

        let request = ApiRequest::post(
            self.paths.read_replicas(primary),
            &translated.request.replicas,
        )?;
        self.submit_replicas(primary, request, OperationKind::Create, TaskType::CreateReadReplica)
            .await?;

        self.refresh_read_replicas(primary, spec).await
    }

    /// Read the replicas of `primary_cluster_id`. No replica regions count as missing.
    #[instrument(skip(self, spec))]
    pub async fn read_read_replicas(
        &self,
        primary_cluster_id: &str,
        spec: &ReadReplicasSpec,
        purpose: ReadPurpose,
    ) -> Result<Option<ReadReplicasState>> {
        let data = self
            .read_remote::<ReadReplicasData>(
                &self.paths.read_replicas(primary_cluster_id),
                purpose,
                RESOURCE,
                primary_cluster_id,
            )
            .await?;

        match data {
            Some(data) if !data.spec.is_empty() => Ok(Some(merge_read_replicas_state(
                data,
                primary_cluster_id,
                spec,
                &replica_order(spec),
            ))),
            _ => match purpose {
                ReadPurpose::Refresh => Err(Error::NotFoundError {
                    resource: RESOURCE,
                    id: primary_cluster_id.to_string(),
                }),
                ReadPurpose::DeletePrecheck => Ok(None),
            },
        }
    }

    pub async fn refresh_read_replicas(
        &self,
        primary_cluster_id: &str,
        spec: &ReadReplicasSpec,
    ) -> Result<ReadReplicasState> {
        self.read_read_replicas(primary_cluster_id, spec, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: primary_cluster_id.to_string(),
            })
    }

    #[instrument(skip(self, spec))]
    pub async fn update_read_replicas(
        &self,
        primary_cluster_id: &str,
        spec: &ReadReplicasSpec,
    ) -> Result<Applied<ReadReplicasState>> {
        let resolver = self.resolver();
        let translated = translate_read_replicas(spec, &resolver).await?;
        let current = self.refresh_read_replicas(primary_cluster_id, spec).await?;

        let drifts = diff_read_replicas(spec, &translated.request, &current);
        ensure_in_place(RESOURCE, &drifts)?;
        if drifts.is_empty() {
            return Ok(Applied::unchanged(current));
        }

        info!("Updating read replicas of cluster {}", primary_cluster_id);
        let request = ApiRequest::put(
            self.paths.read_replicas(primary_cluster_id),
            &translated.request.replicas,
        )?;
        self.submit_replicas(
            primary_cluster_id,
            request,
            OperationKind::Update,
            TaskType::EditReadReplica,
        )
        .await?;

        let state = self.refresh_read_replicas(primary_cluster_id, spec).await?;
        Ok(Applied::updated(state, drifts))
    }

    pub async fn apply_read_replicas(
        &self,
        spec: &ReadReplicasSpec,
        prior: Option<&ReadReplicasState>,
    ) -> Result<Applied<ReadReplicasState>> {
        let Some(prior) = prior else {
            return Ok(Applied::created(self.create_read_replicas(spec).await?));
        };
        match self
            .update_read_replicas(&prior.primary_cluster_id, spec)
            .await
        {
            Err(Error::NotFoundError { .. }) => {
                warn!(
                    "Read replicas of cluster {} are gone, creating them again",
                    prior.primary_cluster_id
                );
                Ok(Applied::created(self.create_read_replicas(spec).await?))
            }
            other => other,
        }
    }

    /// Remove every replica region of `primary_cluster_id`
    #[instrument(skip(self))]
    pub async fn delete_read_replicas(&self, primary_cluster_id: &str) -> Result<()> {
        let path = self.paths.read_replicas(primary_cluster_id);
        let existing = self
            .read_remote::<ReadReplicasData>(
                &path,
                ReadPurpose::DeletePrecheck,
                RESOURCE,
                primary_cluster_id,
            )
            .await?;
        if existing.map_or(true, |d| d.spec.is_empty()) {
            return Ok(());
        }

        info!("Deleting read replicas of cluster {}", primary_cluster_id);
        let mut op = Operation::new(RESOURCE, primary_cluster_id, OperationKind::Delete);
        self.submit(&mut op, ApiRequest::delete(&path)).await?;

        self.poller
            .wait(&mut op, &TerminalPredicate::deletion(), || {
                self.observe_replicas(&path)
            })
            .await
    }

    /// An empty replica list reads the same as a 404
    async fn observe_replicas(&self, path: &str) -> Result<Observation> {
        let data: ReadReplicasData = self.fetch_as(path).await?;
        if data.spec.is_empty() {
            Ok(Observation::Absent)
        } else {
            Ok(Observation::status("DELETING"))
        }
    }

    async fn submit_replicas(
        &self,
        primary_cluster_id: &str,
        request: ApiRequest,
        kind: OperationKind,
        task_type: TaskType,
    ) -> Result<()> {
        let baseline = self.task_baseline(primary_cluster_id, task_type).await?;
        let mut op = Operation::new(RESOURCE, primary_cluster_id, kind);
        self.submit(&mut op, request).await?;
        self.await_task(&mut op, primary_cluster_id, task_type, baseline)
            .await
    }
}
