//! Cluster reconciliation

use tracing::{info, instrument, warn};

use super::drift::{
    diff_cluster, diff_cluster_allow_lists, diff_cluster_vpcs, ensure_in_place, Drift,
};
use super::reader::{ReadPurpose, RegionOrder};
use super::reconciler::{Applied, Reconciler};
use super::translator::{
    ensure_valid, resolve_optional, resolve_reference, ReferenceKind, ReferenceResolver,
    Translated,
};
use crate::client::payload::{
    AllowListData, CloudInfo, ClusterData, ClusterInfoPayload, ClusterRegionInfo,
    ClusterSpecPayload, CreateClusterRequest, DbCredentials, NodeInfo, PlacementInfo,
    SoftwareInfo, TaskType, UserCredentials, ACCESSIBILITY_PRIVATE, ACCESSIBILITY_PUBLIC,
};
use crate::client::ApiRequest;
use crate::config::FeatureFlags;
use crate::error::{Error, Result};
use crate::model::{
    ClusterSpec, ClusterState, CrossReference, DesiredState, EndpointState, NodeConfig,
    NodeConfigState, Operation, OperationKind, RegionState,
};

const RESOURCE: &str = "cluster";

/// Everything a cluster pass submits
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterRequest {
    pub create: CreateClusterRequest,
    /// Resolved allow-list ids, in caller order
    pub allow_list_ids: Vec<String>,
}

pub fn cluster_region_order(spec: &ClusterSpec) -> RegionOrder {
    RegionOrder::from_keys(spec.regions.iter().map(|r| r.region.as_str()))
}

pub(crate) fn node_info(config: &NodeConfig) -> NodeInfo {
    NodeInfo {
        num_cores: config.num_cores,
        memory_mb: config.memory_mb.cloned_option(),
        disk_size_gb: config.disk_size_gb.cloned_option(),
        // 0 asks for the provider default
        disk_iops: config.disk_iops.cloned_option().filter(|iops| *iops > 0),
    }
}

pub(crate) fn node_state(info: &NodeInfo) -> NodeConfigState {
    NodeConfigState {
        num_cores: info.num_cores,
        memory_mb: info.memory_mb.unwrap_or_default(),
        disk_size_gb: info.disk_size_gb.unwrap_or_default(),
        disk_iops: info.disk_iops,
    }
}

/// Validate and translate a cluster spec into its create payload
pub async fn translate_cluster(
    spec: &ClusterSpec,
    features: &FeatureFlags,
    resolver: &dyn ReferenceResolver,
) -> Result<Translated<ClusterRequest>> {
    ensure_valid(spec.validate(features))?;

    let ((ysql_user, ysql_password), (ycql_user, ycql_password)) =
        spec.credentials.resolved().ok_or_else(|| {
            Error::configuration(
                "credentials",
                "database credentials are incomplete",
                "Set username and password, or all four ysql_/ycql_ fields.",
            )
        })?;

    let mut region_info = Vec::with_capacity(spec.regions.len());
    for (i, region) in spec.regions.iter().enumerate() {
        let vpc_id = resolve_optional(
            resolver,
            &region.vpc,
            ReferenceKind::Vpc,
            &format!("regions[{i}].vpc"),
        )
        .await?;

        let mut accessibility = Vec::new();
        if region.public_access.value() == Some(&true) {
            accessibility.push(ACCESSIBILITY_PUBLIC.to_string());
        }
        if vpc_id.is_some() {
            accessibility.push(ACCESSIBILITY_PRIVATE.to_string());
        }

        region_info.push(ClusterRegionInfo {
            placement_info: PlacementInfo {
                cloud_info: CloudInfo {
                    code: spec.cloud_type,
                    region: region.region.clone(),
                },
                num_nodes: region.num_nodes,
                num_replicas: None,
                vpc_id,
            },
            is_default: region.is_default.value() == Some(&true),
            is_affinitized: region.is_preferred.value() == Some(&true),
            accessibility_types: accessibility,
        });
    }

    let software_info = match spec.database_track.value() {
        Some(track) => Some(SoftwareInfo {
            track_id: resolve_reference(
                resolver,
                &CrossReference::by_name(track.as_str()),
                ReferenceKind::SoftwareTrack,
                "database_track",
            )
            .await?,
        }),
        None => None,
    };

    let mut allow_list_ids = Vec::with_capacity(spec.allow_lists.len());
    for (i, reference) in spec.allow_lists.iter().enumerate() {
        allow_list_ids.push(
            resolve_reference(
                resolver,
                reference,
                ReferenceKind::AllowList,
                &format!("allow_lists[{i}]"),
            )
            .await?,
        );
    }

    // The primary cloud region is the preferred one, else the first listed
    let primary = spec
        .regions
        .iter()
        .find(|r| r.is_preferred.value() == Some(&true))
        .or_else(|| spec.regions.first())
        .map(|r| r.region.clone())
        .unwrap_or_default();

    let create = CreateClusterRequest {
        cluster_spec: ClusterSpecPayload {
            name: spec.name.clone(),
            cluster_info: ClusterInfoPayload {
                cluster_tier: spec.cluster_tier,
                cluster_type: spec.cluster_type.cloned_option(),
                num_nodes: spec.total_nodes(),
                fault_tolerance: spec.fault_tolerance.cloned_option(),
                num_faults_to_tolerate: spec.num_faults_to_tolerate.cloned_option(),
                node_info: node_info(&spec.node_config),
                enable_connection_pooling: spec.connection_pooling.cloned_option(),
            },
            cloud_info: CloudInfo {
                code: spec.cloud_type,
                region: primary,
            },
            cluster_region_info: region_info,
            software_info,
        },
        db_credentials: DbCredentials {
            ysql: UserCredentials {
                username: ysql_user,
                password: ysql_password,
            },
            ycql: UserCredentials {
                username: ycql_user,
                password: ycql_password,
            },
        },
    };

    Ok(Translated {
        request: ClusterRequest {
            create,
            allow_list_ids,
        },
        order: cluster_region_order(spec),
    })
}

/// Merge the settled remote cluster with the caller's spec
pub fn merge_cluster_state(
    data: ClusterData,
    allow_lists: Vec<AllowListData>,
    spec: &ClusterSpec,
    order: &RegionOrder,
) -> ClusterState {
    let info = data.info;
    let cluster = data.spec;

    let regions: Vec<RegionState> = cluster
        .cluster_region_info
        .into_iter()
        .map(|r| {
            let region = r.placement_info.cloud_info.region;
            // The declared name is only carried while the service reports a VPC
            let vpc_name = r.placement_info.vpc_id.as_ref().and_then(|_| {
                spec.regions
                    .iter()
                    .find(|declared| declared.region == region)
                    .and_then(|declared| declared.vpc.name.cloned_option())
            });
            RegionState {
                public_access: r
                    .accessibility_types
                    .iter()
                    .any(|a| a == ACCESSIBILITY_PUBLIC),
                num_nodes: r.placement_info.num_nodes,
                vpc_id: r.placement_info.vpc_id,
                vpc_name,
                is_preferred: r.is_affinitized,
                is_default: r.is_default,
                region,
            }
        })
        .collect();
    let regions = order.apply(regions, |r| r.region.as_str());

    let endpoints: Vec<EndpointState> = info
        .cluster_endpoints
        .into_iter()
        .map(|e| EndpointState {
            region: e.region,
            host: e.host,
            accessibility: e.accessibility_type,
        })
        .collect();
    let endpoints = order.apply(endpoints, |e| e.region.as_str());

    // Attachments keep the order the caller listed them in, by id or by name
    let declared = RegionOrder::from_keys(spec.allow_lists.iter().filter_map(|r| {
        r.id.value().or_else(|| r.name.value()).map(String::as_str)
    }));
    let allow_lists = declared.apply_by(allow_lists, |a| {
        declared
            .position(&a.info.id)
            .or_else(|| declared.position(&a.spec.name))
    });

    ClusterState {
        cluster_id: info.id,
        name: cluster.name,
        cloud_type: cluster.cloud_info.code,
        cluster_tier: cluster.cluster_info.cluster_tier,
        cluster_type: cluster.cluster_info.cluster_type.unwrap_or_default(),
        fault_tolerance: cluster.cluster_info.fault_tolerance.unwrap_or_default(),
        num_faults_to_tolerate: cluster.cluster_info.num_faults_to_tolerate.unwrap_or(0),
        regions,
        node_config: node_state(&cluster.cluster_info.node_info),
        database_track: info.track_name,
        software_version: info.software_version,
        desired_state: if info.state.eq_ignore_ascii_case("PAUSED") {
            DesiredState::Paused
        } else {
            DesiredState::Active
        },
        state: info.state,
        connection_pooling: cluster.cluster_info.enable_connection_pooling,
        allow_list_ids: allow_lists.into_iter().map(|a| a.info.id).collect(),
        endpoints,
        credentials: spec.credentials.clone(),
        created_on: info.metadata.created_on,
        updated_on: info.metadata.updated_on,
    }
}

impl Reconciler {
    /// Create a cluster and wait until it is usable
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterState> {
        let resolver = self.resolver();
        let translated = translate_cluster(spec, &self.features, &resolver).await?;
        info!("Creating cluster {}", spec.name);

        let mut op = Operation::new(RESOURCE, &spec.name, OperationKind::Create);
        let request = ApiRequest::post(self.paths.clusters(), &translated.request.create)?;
        let data: ClusterData = self.submit_as(&mut op, request).await?;
        let cluster_id = data.info.id;
        op.bind(&cluster_id);

        self.await_task(&mut op, &cluster_id, TaskType::CreateCluster, None)
            .await?;

        if !translated.request.allow_list_ids.is_empty() {
            self.attach_allow_lists(&cluster_id, &translated.request.allow_list_ids)
                .await?;
        }
        if spec.effective_desired_state() == DesiredState::Paused {
            self.pause_cluster(&cluster_id).await?;
        }

        self.refresh_cluster(&cluster_id, spec).await
    }

    /// Read the settled cluster. With [`ReadPurpose::DeletePrecheck`] a
    /// missing cluster yields `Ok(None)`.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn read_cluster(
        &self,
        cluster_id: &str,
        spec: &ClusterSpec,
        purpose: ReadPurpose,
    ) -> Result<Option<ClusterState>> {
        let Some(data) = self
            .read_remote::<ClusterData>(&self.paths.cluster(cluster_id), purpose, RESOURCE, cluster_id)
            .await?
        else {
            return Ok(None);
        };
        let allow_lists: Vec<AllowListData> = self
            .fetch_as(&self.paths.cluster_allow_lists(cluster_id))
            .await?;

        Ok(Some(merge_cluster_state(
            data,
            allow_lists,
            spec,
            &cluster_region_order(spec),
        )))
    }

    /// Refresh read; a missing cluster is a [`Error::NotFoundError`]
    pub async fn refresh_cluster(&self, cluster_id: &str, spec: &ClusterSpec) -> Result<ClusterState> {
        self.read_cluster(cluster_id, spec, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: cluster_id.to_string(),
            })
    }

    /// Bring an existing cluster in line with `spec`, changing only what drifted.
    ///
    /// Credentials are write-only, so they are compared against `prior`.
    #[instrument(skip(self, prior, spec), fields(name = %spec.name, cluster_id = %prior.cluster_id))]
    pub async fn update_cluster(
        &self,
        prior: &ClusterState,
        spec: &ClusterSpec,
    ) -> Result<Applied<ClusterState>> {
        let cluster_id = prior.cluster_id.as_str();
        let resolver = self.resolver();
        let translated = translate_cluster(spec, &self.features, &resolver).await?;
        let mut current = self.refresh_cluster(cluster_id, spec).await?;
        current.credentials = prior.credentials.clone();

        let mut drifts = diff_cluster(spec, &current);
        drifts.extend(diff_cluster_vpcs(
            &translated.request.create.cluster_spec.cluster_region_info,
            &current,
        ));
        ensure_in_place(RESOURCE, &drifts)?;
        let attachment_drifts =
            diff_cluster_allow_lists(&translated.request.allow_list_ids, &current);

        if drifts.is_empty() && attachment_drifts.is_empty() {
            info!("Cluster {} is up to date", spec.name);
            return Ok(Applied::unchanged(current));
        }

        let wants_paused = spec.desired_state.value().copied();
        let spec_changed = drifts.iter().any(|d| d.field != "desired_state");

        // A paused cluster cannot be edited; resume first when it should run
        if current.desired_state == DesiredState::Paused
            && (wants_paused == Some(DesiredState::Active) || spec_changed)
        {
            self.resume_cluster(cluster_id).await?;
        }

        if spec_changed {
            self.edit_cluster(cluster_id, &translated.request.create.cluster_spec)
                .await?;
        }
        if !attachment_drifts.is_empty() {
            self.attach_allow_lists(cluster_id, &translated.request.allow_list_ids)
                .await?;
        }

        let should_pause = match wants_paused {
            Some(DesiredState::Paused) => true,
            Some(DesiredState::Active) => false,
            None => current.desired_state == DesiredState::Paused,
        };
        if should_pause {
            let now = self.refresh_cluster(cluster_id, spec).await?;
            if now.desired_state != DesiredState::Paused {
                self.pause_cluster(cluster_id).await?;
            }
        }

        let state = self.refresh_cluster(cluster_id, spec).await?;
        let mut all: Vec<Drift> = drifts;
        all.extend(attachment_drifts);
        Ok(Applied::updated(state, all))
    }

    /// Create when there is no prior state, otherwise update in place
    #[instrument(skip(self, spec, prior), fields(name = %spec.name))]
    pub async fn apply_cluster(
        &self,
        spec: &ClusterSpec,
        prior: Option<&ClusterState>,
    ) -> Result<Applied<ClusterState>> {
        let Some(prior) = prior else {
            return Ok(Applied::created(self.create_cluster(spec).await?));
        };

        match self.update_cluster(prior, spec).await {
            Err(Error::NotFoundError { .. }) => {
                warn!(
                    "Cluster {} ({}) no longer exists, creating it again",
                    spec.name, prior.cluster_id
                );
                Ok(Applied::created(self.create_cluster(spec).await?))
            }
            other => other,
        }
    }

    async fn edit_cluster(&self, cluster_id: &str, payload: &ClusterSpecPayload) -> Result<()> {
        let baseline = self.task_baseline(cluster_id, TaskType::EditCluster).await?;
        let mut op = Operation::new(RESOURCE, cluster_id, OperationKind::Update);
        self.submit(&mut op, ApiRequest::put(self.paths.cluster(cluster_id), payload)?)
            .await?;
        self.await_task(&mut op, cluster_id, TaskType::EditCluster, baseline)
            .await
    }

    async fn attach_allow_lists(&self, cluster_id: &str, allow_list_ids: &[String]) -> Result<()> {
        let mut op = Operation::new(RESOURCE, cluster_id, OperationKind::Update);
        self.submit(
            &mut op,
            ApiRequest::put(self.paths.cluster_allow_lists(cluster_id), allow_list_ids)?,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn pause_cluster(&self, cluster_id: &str) -> Result<()> {
        info!("Pausing cluster {}", cluster_id);
        let baseline = self.task_baseline(cluster_id, TaskType::PauseCluster).await?;
        let mut op = Operation::new(RESOURCE, cluster_id, OperationKind::Pause);
        self.submit(&mut op, ApiRequest::action(self.paths.pause_cluster(cluster_id)))
            .await?;
        self.await_task(&mut op, cluster_id, TaskType::PauseCluster, baseline)
            .await
    }

    #[instrument(skip(self))]
    pub async fn resume_cluster(&self, cluster_id: &str) -> Result<()> {
        info!("Resuming cluster {}", cluster_id);
        let baseline = self.task_baseline(cluster_id, TaskType::ResumeCluster).await?;
        let mut op = Operation::new(RESOURCE, cluster_id, OperationKind::Resume);
        self.submit(&mut op, ApiRequest::action(self.paths.resume_cluster(cluster_id)))
            .await?;
        self.await_task(&mut op, cluster_id, TaskType::ResumeCluster, baseline)
            .await
    }

    /// Delete a cluster. Deleting a cluster that is already gone succeeds.
    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, cluster_id: &str) -> Result<()> {
        let path = self.paths.cluster(cluster_id);
        let existing = self
            .read_remote::<ClusterData>(&path, ReadPurpose::DeletePrecheck, RESOURCE, cluster_id)
            .await?;
        if existing.is_none() {
            info!("Cluster {} is already gone", cluster_id);
            return Ok(());
        }

        info!("Deleting cluster {}", cluster_id);
        let mut op = Operation::new(RESOURCE, cluster_id, OperationKind::Delete);
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
    use crate::controller::translator::testing::StaticResolver;
    use crate::model::{CloudType, ClusterTier, Credentials, Field, RegionSpec};
    use serde_json::json;
    use std::sync::Arc;

    fn spec() -> ClusterSpec {
        let mut east = RegionSpec::new("us-east-1", 3);
        east.vpc = CrossReference::by_name("prod");
        east.public_access = Field::Value(true);
        let mut west = RegionSpec::new("us-west-2", 3);
        west.is_preferred = Field::Value(true);

        ClusterSpec {
            name: "orders".into(),
            cloud_type: CloudType::Aws,
            cluster_tier: ClusterTier::Paid,
            cluster_type: Field::Absent,
            fault_tolerance: Field::Absent,
            num_faults_to_tolerate: Field::Absent,
            regions: vec![east, west, RegionSpec::new("eu-west-1", 3)],
            node_config: NodeConfig {
                num_cores: 4,
                memory_mb: Field::Absent,
                disk_size_gb: Field::Value(100),
                disk_iops: Field::Value(0),
            },
            database_track: Field::Value("Stable".into()),
            credentials: Credentials::combined("admin", "s3cret"),
            allow_lists: vec![CrossReference::by_name("office"), CrossReference::by_id("a-7")],
            desired_state: Field::Absent,
            connection_pooling: Field::Absent,
        }
    }

    fn resolver() -> StaticResolver {
        StaticResolver::default()
            .with(ReferenceKind::Vpc, "prod", "vpc-1")
            .with(ReferenceKind::SoftwareTrack, "Stable", "track-1")
            .with(ReferenceKind::AllowList, "office", "a-1")
    }

    #[tokio::test]
    async fn test_translation_resolves_references() {
        let translated = translate_cluster(&spec(), &FeatureFlags::default(), &resolver())
            .await
            .unwrap();
        let create = &translated.request.create;

        assert_eq!(create.cluster_spec.cluster_info.num_nodes, 9);
        assert_eq!(create.cluster_spec.cloud_info.region, "us-west-2");
        assert_eq!(
            create.cluster_spec.software_info,
            Some(SoftwareInfo {
                track_id: "track-1".into()
            })
        );
        let east = &create.cluster_spec.cluster_region_info[0];
        assert_eq!(east.placement_info.vpc_id.as_deref(), Some("vpc-1"));
        assert_eq!(east.accessibility_types, vec!["PUBLIC", "PRIVATE"]);
        assert!(create.cluster_spec.cluster_region_info[1].is_affinitized);
        assert_eq!(create.cluster_spec.cluster_info.node_info.disk_iops, None);
        assert_eq!(create.db_credentials.ycql.username, "admin");
        assert_eq!(translated.request.allow_list_ids, vec!["a-1", "a-7"]);
        assert_eq!(translated.order.position("eu-west-1"), Some(2));
    }

    #[tokio::test]
    async fn test_mixed_credentials_fail_before_any_lookup() {
        let mut bad = spec();
        bad.credentials.ysql_username = Field::Value("yb".into());
        bad.credentials.ysql_password = Field::Value("pw".into());
        let resolver = resolver();

        let err = translate_cluster(&bad, &FeatureFlags::default(), &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
        assert_eq!(resolver.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_vpc_name_is_configuration_error() {
        let mut bad = spec();
        bad.regions[2].vpc = CrossReference::by_name("staging");
        let err = translate_cluster(&bad, &FeatureFlags::default(), &resolver())
            .await
            .unwrap_err();
        match err {
            Error::ConfigurationError(issues) => {
                assert_eq!(issues[0].field, "regions[2].vpc.name")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn remote() -> (ClusterData, Vec<AllowListData>) {
        let data: ClusterData = serde_json::from_value(json!({
            "info": {
                "id": "c-1",
                "state": "ACTIVE",
                "software_version": "2.20.1.0",
                "track_name": "Stable",
                "metadata": {"created_on": "2026-01-02T03:04:05Z", "updated_on": "2026-01-02T04:04:05Z"},
                "cluster_endpoints": [
                    {"region": "eu-west-1", "host": "eu.example.com", "accessibility_type": "PUBLIC"},
                    {"region": "us-east-1", "host": "us.example.com", "accessibility_type": "PUBLIC"}
                ]
            },
            "spec": {
                "name": "orders",
                "cluster_info": {
                    "cluster_tier": "PAID",
                    "cluster_type": "SYNCHRONOUS",
                    "num_nodes": 9,
                    "fault_tolerance": "REGION",
                    "num_faults_to_tolerate": 1,
                    "node_info": {"num_cores": 4, "memory_mb": 16384, "disk_size_gb": 100, "disk_iops": 3000}
                },
                "cloud_info": {"code": "AWS", "region": "us-west-2"},
                "cluster_region_info": [
                    {"placement_info": {"cloud_info": {"code": "AWS", "region": "eu-west-1"}, "num_nodes": 3}},
                    {"placement_info": {"cloud_info": {"code": "AWS", "region": "us-east-1"}, "num_nodes": 3, "vpc_id": "vpc-1"},
                     "accessibility_types": ["PUBLIC", "PRIVATE"]},
                    {"placement_info": {"cloud_info": {"code": "AWS", "region": "us-west-2"}, "num_nodes": 3},
                     "is_affinitized": true}
                ]
            }
        }))
        .unwrap();
        let allow_lists: Vec<AllowListData> = serde_json::from_value(json!([
            {"info": {"id": "a-7"}, "spec": {"name": "vpn", "allow_list": ["10.0.0.0/8"]}},
            {"info": {"id": "a-1"}, "spec": {"name": "office", "allow_list": ["1.2.3.0/24"]}}
        ]))
        .unwrap();
        (data, allow_lists)
    }

    #[test]
    fn test_merge_restores_caller_order_and_defaults() {
        let spec = spec();
        let (data, allow_lists) = remote();
        let state = merge_cluster_state(data, allow_lists, &spec, &cluster_region_order(&spec));

        let regions: Vec<&str> = state.regions.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["us-east-1", "us-west-2", "eu-west-1"]);
        assert_eq!(state.regions[0].vpc_name.as_deref(), Some("prod"));
        assert!(state.regions[0].public_access);
        assert!(state.regions[1].is_preferred);

        let endpoints: Vec<&str> = state.endpoints.iter().map(|e| e.region.as_str()).collect();
        assert_eq!(endpoints, vec!["us-east-1", "eu-west-1"]);

        // Service defaults are written into the state
        assert_eq!(state.node_config.memory_mb, 16384);
        assert_eq!(state.node_config.disk_iops, Some(3000));
        assert_eq!(state.num_faults_to_tolerate, 1);
        assert_eq!(state.allow_list_ids, vec!["a-1", "a-7"]);
        assert_eq!(state.credentials, spec.credentials);
        assert!(diff_cluster(&spec, &state).is_empty());
    }

    #[test]
    fn test_vpc_name_needs_an_observed_vpc() {
        let spec = spec();
        let (mut data, allow_lists) = remote();
        data.spec.cluster_region_info[1].placement_info.vpc_id = None;
        let state = merge_cluster_state(data, allow_lists, &spec, &cluster_region_order(&spec));
        assert_eq!(state.regions[0].vpc_id, None);
        assert_eq!(state.regions[0].vpc_name, None);
    }

    #[tokio::test]
    async fn test_changed_vpc_reference_requires_replacement() {
        let mut moved = spec();
        moved.regions[0].vpc = CrossReference::by_name("staging");
        let resolver = resolver().with(ReferenceKind::Vpc, "staging", "vpc-2");
        let translated = translate_cluster(&moved, &FeatureFlags::default(), &resolver)
            .await
            .unwrap();

        let (data, allow_lists) = remote();
        let state = merge_cluster_state(data, allow_lists, &moved, &cluster_region_order(&moved));
        assert!(diff_cluster(&moved, &state).is_empty());

        let drifts =
            diff_cluster_vpcs(&translated.request.create.cluster_spec.cluster_region_info, &state);
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].field, "regions[0].vpc");
        assert_eq!(drifts[0].desired, "vpc-2");
        assert_eq!(drifts[0].observed, "vpc-1");
        assert!(drifts[0].requires_replacement);
    }

    fn reconciler(fake: &Arc<FakeCloud>) -> Reconciler {
        let mut config = EngineConfig::default();
        config.api.account_id = "acc".into();
        config.api.project_id = "proj".into();
        let r = Reconciler::new(
            fake.clone(),
            &config,
            Arc::new(MemorySink::new()),
            CancellationSignal::never(),
        );

        let (data, allow_lists) = remote();
        fake.on_fetch(
            r.paths().vpcs(),
            vec![Reply::Json(json!([
                {"info": {"id": "vpc-1"}, "spec": {"name": "prod"}},
                {"info": {"id": "vpc-2"}, "spec": {"name": "staging"}}
            ]))],
        );
        fake.on_fetch(
            r.paths().software_tracks(),
            vec![Reply::Json(json!([{"info": {"id": "track-1", "name": "Stable"}}]))],
        );
        fake.on_fetch(
            r.paths().allow_lists(),
            vec![Reply::Json(json!([{"info": {"id": "a-1"}, "spec": {"name": "office"}}]))],
        );
        fake.on_fetch(
            r.paths().cluster("c-1"),
            vec![Reply::Json(serde_json::to_value(data).unwrap())],
        );
        fake.on_fetch(
            r.paths().cluster_allow_lists("c-1"),
            vec![Reply::Json(serde_json::to_value(allow_lists).unwrap())],
        );
        r
    }

    fn prior() -> ClusterState {
        let spec = spec();
        let (data, allow_lists) = remote();
        merge_cluster_state(data, allow_lists, &spec, &cluster_region_order(&spec))
    }

    #[tokio::test]
    async fn test_unchanged_spec_submits_nothing() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(&fake);

        let applied = r.update_cluster(&prior(), &spec()).await.unwrap();
        assert_eq!(applied.action.to_string(), "unchanged");
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rotated_credentials_are_refused() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(&fake);

        let mut rotated = spec();
        rotated.credentials = Credentials::combined("rotated", "pw");
        match r.update_cluster(&prior(), &rotated).await.unwrap_err() {
            Error::ConfigurationError(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].field, "credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_moving_a_region_to_another_vpc_is_refused() {
        let fake = Arc::new(FakeCloud::new());
        let r = reconciler(&fake);

        let mut moved = spec();
        moved.regions[0].vpc = CrossReference::by_name("staging");
        match r.update_cluster(&prior(), &moved).await.unwrap_err() {
            Error::ConfigurationError(issues) => assert_eq!(issues[0].field, "regions[0].vpc"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(fake.submitted().is_empty());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let spec = spec();
        let order = cluster_region_order(&spec);
        let (data, allow_lists) = remote();
        let first = merge_cluster_state(data.clone(), allow_lists.clone(), &spec, &order);
        let second = merge_cluster_state(data, allow_lists, &spec, &order);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_paused_state_maps_to_desired_state() {
        let spec = spec();
        let (mut data, allow_lists) = remote();
        data.info.state = "PAUSED".into();
        let state = merge_cluster_state(data, allow_lists, &spec, &cluster_region_order(&spec));
        assert_eq!(state.desired_state, DesiredState::Paused);
        assert_eq!(state.state, "PAUSED");
    }
}
