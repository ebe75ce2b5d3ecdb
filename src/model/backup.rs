//! On-demand backups

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CrossReference, Field};
use super::validation::{finish, validate_reference, SpecValidationError};

pub const MIN_BACKUP_RETENTION_DAYS: u32 = 1;
pub const MAX_BACKUP_RETENTION_DAYS: u32 = 35;

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BackupSpec {
    pub cluster: CrossReference,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub description: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub retention_period_in_days: Field<u32>,
}

impl BackupSpec {
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();
        validate_reference(&self.cluster, "cluster", true, &mut errors);

        if let Some(days) = self.retention_period_in_days.value() {
            if !(MIN_BACKUP_RETENTION_DAYS..=MAX_BACKUP_RETENTION_DAYS).contains(days) {
                errors.push(SpecValidationError::new(
                    "retention_period_in_days",
                    format!(
                        "retention_period_in_days must be between {MIN_BACKUP_RETENTION_DAYS} and {MAX_BACKUP_RETENTION_DAYS}, got {days}"
                    ),
                    "Pick a retention period within the supported range.",
                ));
            }
        }

        finish(errors)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BackupState {
    pub backup_id: String,
    pub cluster_id: String,
    pub description: Option<String>,
    pub retention_period_in_days: u32,
    pub state: String,
    pub size_bytes: Option<u64>,
    pub created_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
}
