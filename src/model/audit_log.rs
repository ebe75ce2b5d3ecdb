//! Database audit log export configuration

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CrossReference, Field};
use super::validation::{finish, validate_reference, SpecValidationError};
use crate::config::FeatureFlags;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementClass {
    Read,
    Write,
    Function,
    Role,
    Ddl,
    Misc,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug1,
    Debug2,
    Debug3,
    Debug4,
    Debug5,
    Info,
    Notice,
    Warning,
    #[default]
    Log,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct YsqlLogSettings {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub log_catalog: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub log_client: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub log_level: Field<LogLevel>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub log_parameter: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub log_relation: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub log_statement_once: Field<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AuditLogSpec {
    pub cluster: CrossReference,
    pub integration: CrossReference,

    #[serde(default)]
    pub log_settings: YsqlLogSettings,

    pub statement_classes: Vec<StatementClass>,
}

impl AuditLogSpec {
    pub fn validate(&self, features: &FeatureFlags) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if !features.db_audit_logging {
            errors.push(SpecValidationError::new(
                "audit_log",
                "database audit logging requires the db_audit_logging feature",
                "Enable features.db_audit_logging in the engine configuration.",
            ));
        }

        validate_reference(&self.cluster, "cluster", true, &mut errors);
        validate_reference(&self.integration, "integration", true, &mut errors);

        if self.statement_classes.is_empty() {
            errors.push(SpecValidationError::new(
                "statement_classes",
                "at least one statement class is required",
                "List the statement classes to audit, e.g. [DDL, ROLE].",
            ));
        }
        let mut seen = HashSet::new();
        for (i, class) in self.statement_classes.iter().enumerate() {
            if !seen.insert(*class) {
                errors.push(SpecValidationError::new(
                    format!("statement_classes[{i}]"),
                    format!("{class:?} is listed more than once"),
                    "Remove the duplicate entry.",
                ));
            }
        }

        finish(errors)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct YsqlLogSettingsState {
    pub log_catalog: bool,
    pub log_client: bool,
    pub log_level: LogLevel,
    pub log_parameter: bool,
    pub log_relation: bool,
    pub log_statement_once: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AuditLogState {
    pub config_id: String,
    pub cluster_id: String,
    pub integration_id: String,
    pub log_settings: YsqlLogSettingsState,
    pub statement_classes: Vec<StatementClass>,
    pub state: String,
}
