//! VPC reconciliation
//!
//! VPCs are immutable once created: a changed CIDR or region means a new VPC.

use tracing::{info, instrument};

use super::drift::{diff_vpc, ensure_in_place};
use super::poller::TerminalPredicate;
use super::reader::{ReadPurpose, RegionOrder};
use super::reconciler::{Applied, Reconciler};
use super::translator::{ensure_valid, Translated};
use crate::client::payload::{VpcData, VpcRegionPayload, VpcSpecPayload};
use crate::client::ApiRequest;
use crate::error::{Error, Result};
use crate::model::{Operation, OperationKind, VpcRegionCidr, VpcSpec, VpcState};

const RESOURCE: &str = "VPC";

pub fn translate_vpc(spec: &VpcSpec) -> Result<Translated<VpcSpecPayload>> {
    ensure_valid(spec.validate())?;

    Ok(Translated {
        request: VpcSpecPayload {
            name: spec.name.clone(),
            cloud: spec.cloud_type,
            global_cidr: spec.global_cidr.cloned_option(),
            region_specs: spec
                .region_cidrs
                .iter()
                .map(|rc| VpcRegionPayload {
                    region: rc.region.clone(),
                    cidr: rc.cidr.clone(),
                })
                .collect(),
        },
        order: vpc_region_order(spec),
    })
}

fn vpc_region_order(spec: &VpcSpec) -> RegionOrder {
    RegionOrder::from_keys(spec.region_cidrs.iter().map(|rc| rc.region.as_str()))
}

pub fn merge_vpc_state(data: VpcData, order: &RegionOrder) -> VpcState {
    let region_cidrs = data
        .spec
        .region_specs
        .into_iter()
        .map(|r| VpcRegionCidr {
            region: r.region,
            cidr: r.cidr,
        })
        .collect();

    VpcState {
        vpc_id: data.info.id,
        name: data.spec.name,
        cloud_type: data.spec.cloud,
        global_cidr: data.spec.global_cidr,
        region_cidrs: order.apply(region_cidrs, |rc| rc.region.as_str()),
        state: data.info.state,
        cluster_ids: data.info.cluster_ids,
    }
}

impl Reconciler {
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_vpc(&self, spec: &VpcSpec) -> Result<VpcState> {
        let translated = translate_vpc(spec)?;
        info!("Creating VPC {}", spec.name);

        let mut op = Operation::new(RESOURCE, &spec.name, OperationKind::Create);
        let data: VpcData = self
            .submit_as(&mut op, ApiRequest::post(self.paths.vpcs(), &translated.request)?)
            .await?;
        let vpc_id = data.info.id;
        op.bind(&vpc_id);

        let predicate = TerminalPredicate::states(&["ACTIVE"], &["FAILED"]);
        self.await_state(&mut op, &self.paths.vpc(&vpc_id), &predicate)
            .await?;

        self.refresh_vpc(&vpc_id, spec).await
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn read_vpc(
        &self,
        vpc_id: &str,
        spec: &VpcSpec,
        purpose: ReadPurpose,
    ) -> Result<Option<VpcState>> {
        let data = self
            .read_remote::<VpcData>(&self.paths.vpc(vpc_id), purpose, RESOURCE, vpc_id)
            .await?;
        Ok(data.map(|d| merge_vpc_state(d, &vpc_region_order(spec))))
    }

    pub async fn refresh_vpc(&self, vpc_id: &str, spec: &VpcSpec) -> Result<VpcState> {
        self.read_vpc(vpc_id, spec, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: vpc_id.to_string(),
            })
    }

    /// VPCs cannot be changed in place; succeeds only when nothing drifted
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn update_vpc(&self, vpc_id: &str, spec: &VpcSpec) -> Result<Applied<VpcState>> {
        translate_vpc(spec)?;
        let current = self.refresh_vpc(vpc_id, spec).await?;
        let drifts = diff_vpc(spec, &current);
        ensure_in_place(RESOURCE, &drifts)?;
        Ok(Applied::unchanged(current))
    }

    pub async fn apply_vpc(&self, spec: &VpcSpec, prior: Option<&VpcState>) -> Result<Applied<VpcState>> {
        match prior {
            None => Ok(Applied::created(self.create_vpc(spec).await?)),
            Some(prior) => match self.update_vpc(&prior.vpc_id, spec).await {
                Err(Error::NotFoundError { .. }) => Ok(Applied::created(self.create_vpc(spec).await?)),
                other => other,
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let path = self.paths.vpc(vpc_id);
        if self
            .read_remote::<VpcData>(&path, ReadPurpose::DeletePrecheck, RESOURCE, vpc_id)
            .await?
            .is_none()
        {
            return Ok(());
        }

        info!("Deleting VPC {}", vpc_id);
        let mut op = Operation::new(RESOURCE, vpc_id, OperationKind::Delete);
        self.submit(&mut op, ApiRequest::delete(&path)).await?;
        self.await_deletion(&mut op, &path).await
    }
}
