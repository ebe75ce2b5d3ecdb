//! Allow list reconciliation
//!
//! Allow lists are applied synchronously by the service; only deletion is polled.

use tracing::{info, instrument};

use super::drift::{diff_allow_list, ensure_in_place};
use super::reader::{ReadPurpose, RegionOrder};
use super::reconciler::{Applied, Reconciler};
use super::translator::{ensure_valid, Translated};
use crate::client::payload::{AllowListData, AllowListSpecPayload};
use crate::client::ApiRequest;
use crate::error::{Error, Result};
use crate::model::{AllowListSpec, AllowListState, Operation, OperationKind};

const RESOURCE: &str = "allow list";

pub fn translate_allow_list(spec: &AllowListSpec) -> Result<Translated<AllowListSpecPayload>> {
    ensure_valid(spec.validate())?;
    Ok(Translated {
        request: AllowListSpecPayload {
            name: spec.name.clone(),
            description: spec.description.cloned_option().unwrap_or_default(),
            allow_list: spec.cidrs.clone(),
        },
        order: cidr_order(spec),
    })
}

/// Entries are keyed by their CIDR text
fn cidr_order(spec: &AllowListSpec) -> RegionOrder {
    RegionOrder::from_keys(spec.cidrs.iter().map(String::as_str))
}

pub fn merge_allow_list_state(data: AllowListData, order: &RegionOrder) -> AllowListState {
    AllowListState {
        allow_list_id: data.info.id,
        name: data.spec.name,
        description: data.spec.description,
        cidrs: order.apply(data.spec.allow_list, String::as_str),
        cluster_ids: data.info.cluster_ids,
    }
}

impl Reconciler {
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create_allow_list(&self, spec: &AllowListSpec) -> Result<AllowListState> {
        let translated = translate_allow_list(spec)?;
        info!("Creating allow list {}", spec.name);

        let mut op = Operation::new(RESOURCE, &spec.name, OperationKind::Create);
        let data: AllowListData = self
            .submit_as(
                &mut op,
                ApiRequest::post(self.paths.allow_lists(), &translated.request)?,
            )
            .await?;
        Ok(merge_allow_list_state(data, &translated.order))
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn read_allow_list(
        &self,
        allow_list_id: &str,
        spec: &AllowListSpec,
        purpose: ReadPurpose,
    ) -> Result<Option<AllowListState>> {
        let data = self
            .read_remote::<AllowListData>(
                &self.paths.allow_list(allow_list_id),
                purpose,
                RESOURCE,
                allow_list_id,
            )
            .await?;
        Ok(data.map(|d| merge_allow_list_state(d, &cidr_order(spec))))
    }

    pub async fn refresh_allow_list(
        &self,
        allow_list_id: &str,
        spec: &AllowListSpec,
    ) -> Result<AllowListState> {
        self.read_allow_list(allow_list_id, spec, ReadPurpose::Refresh)
            .await?
            .ok_or_else(|| Error::NotFoundError {
                resource: RESOURCE,
                id: allow_list_id.to_string(),
            })
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn update_allow_list(
        &self,
        allow_list_id: &str,
        spec: &AllowListSpec,
    ) -> Result<Applied<AllowListState>> {
        let translated = translate_allow_list(spec)?;
        let current = self.refresh_allow_list(allow_list_id, spec).await?;
        let drifts = diff_allow_list(spec, &current);
        ensure_in_place(RESOURCE, &drifts)?;
        if drifts.is_empty() {
            return Ok(Applied::unchanged(current));
        }

        info!("Updating allow list {}", spec.name);
        let mut op = Operation::new(RESOURCE, allow_list_id, OperationKind::Update);
        let data: AllowListData = self
            .submit_as(
                &mut op,
                ApiRequest::put(self.paths.allow_list(allow_list_id), &translated.request)?,
            )
            .await?;
        Ok(Applied::updated(
            merge_allow_list_state(data, &translated.order),
            drifts,
        ))
    }

    pub async fn apply_allow_list(
        &self,
        spec: &AllowListSpec,
        prior: Option<&AllowListState>,
    ) -> Result<Applied<AllowListState>> {
        match prior {
            None => Ok(Applied::created(self.create_allow_list(spec).await?)),
            Some(prior) => match self.update_allow_list(&prior.allow_list_id, spec).await {
                Err(Error::NotFoundError { .. }) => {
                    Ok(Applied::created(self.create_allow_list(spec).await?))
                }
                other => other,
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_allow_list(&self, allow_list_id: &str) -> Result<()> {
        let path = self.paths.allow_list(allow_list_id);
        if self
            .read_remote::<AllowListData>(&path, ReadPurpose::DeletePrecheck, RESOURCE, allow_list_id)
            .await?
            .is_none()
        {
            return Ok(());
        }

        info!("Deleting allow list {}", allow_list_id);
        let mut op = Operation::new(RESOURCE, allow_list_id, OperationKind::Delete);
        self.submit(&mut op, ApiRequest::delete(&path)).await?;
        self.await_deletion(&mut op, &path).await
    }
}
