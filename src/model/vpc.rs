//! Dedicated VPC resource

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CloudType, Field};
use super::validation::{finish, is_valid_cidr, validate_non_empty, SpecValidationError};

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct VpcSpec {
    pub name: String,
    pub cloud_type: CloudType,

    /// Single CIDR spanning every region (GCP only)
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub global_cidr: Field<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub region_cidrs: Vec<VpcRegionCidr>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct VpcRegionCidr {
    pub region: String,
    pub cidr: String,
}

impl VpcSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();
        validate_non_empty(&self.name, "name", &mut errors);

        match (self.global_cidr.value(), self.region_cidrs.is_empty()) {
            (Some(_), false) => errors.push(SpecValidationError::new(
                "global_cidr / region_cidrs",
                "global_cidr and region_cidrs are mutually exclusive",
                "Set either global_cidr or region_cidrs, not both.",
            )),
            (None, true) => errors.push(SpecValidationError::new(
                "global_cidr / region_cidrs",
                "one of global_cidr or region_cidrs is required",
                "Set global_cidr (GCP) or list region_cidrs.",
            )),
            _ => {}
        }

        if let Some(cidr) = self.global_cidr.value() {
            if self.cloud_type != CloudType::Gcp {
                errors.push(SpecValidationError::new(
                    "global_cidr",
                    format!("global_cidr is only supported on GCP, not {}", self.cloud_type),
                    "Use region_cidrs for AWS and AZURE VPCs.",
                ));
            }
            if !is_valid_cidr(cidr) {
                errors.push(SpecValidationError::new(
                    "global_cidr",
                    format!("{cidr} is not a valid CIDR block"),
                    "Use address/prefix notation, e.g. 10.0.0.0/16.",
                ));
            }
        }

        let mut seen = HashSet::new();
        for (i, rc) in self.region_cidrs.iter().enumerate() {
            validate_non_empty(&rc.region, &format!("region_cidrs[{i}].region"), &mut errors);
            if !seen.insert(rc.region.as_str()) {
                errors.push(SpecValidationError::new(
                    format!("region_cidrs[{i}].region"),
                    format!("region {} is listed more than once", rc.region),
                    "List each region once.",
                ));
            }
            if !is_valid_cidr(&rc.cidr) {
                errors.push(SpecValidationError::new(
                    format!("region_cidrs[{i}].cidr"),
                    format!("{} is not a valid CIDR block", rc.cidr),
                    "Use address/prefix notation, e.g. 10.0.0.0/16.",
                ));
            }
        }

        finish(errors)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct VpcState {
    pub vpc_id: String,
    pub name: String,
    pub cloud_type: CloudType,
    pub global_cidr: Option<String>,
    pub region_cidrs: Vec<VpcRegionCidr>,
    pub state: String,
    pub cluster_ids: Vec<String>,
}
