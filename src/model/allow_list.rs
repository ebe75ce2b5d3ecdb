//! Network allow lists

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Field;
use super::validation::{finish, is_valid_cidr, validate_non_empty, SpecValidationError};

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AllowListSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub description: Field<String>,

    pub cidrs: Vec<String>,
}

impl AllowListSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();
        validate_non_empty(&self.name, "name", &mut errors);

        if self.cidrs.is_empty() {
            errors.push(SpecValidationError::new(
                "cidrs",
                "an allow list needs at least one CIDR",
                "Add one or more address/prefix entries to cidrs.",
            ));
        }

        let mut seen = HashSet::new();
        for (i, cidr) in self.cidrs.iter().enumerate() {
            if !is_valid_cidr(cidr) {
                errors.push(SpecValidationError::new(
                    format!("cidrs[{i}]"),
                    format!("{cidr} is not a valid CIDR block"),
                    "Use address/prefix notation, e.g. 192.168.0.0/24.",
                ));
            }
            if !seen.insert(cidr.as_str()) {
                errors.push(SpecValidationError::new(
                    format!("cidrs[{i}]"),
                    format!("{cidr} is listed more than once"),
                    "Remove the duplicate entry.",
                ));
            }
        }

        finish(errors)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AllowListState {
    pub allow_list_id: String,
    pub name: String,
    pub description: String,
    pub cidrs: Vec<String>,
    pub cluster_ids: Vec<String>,
}
