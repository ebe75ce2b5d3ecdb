//! Validation rules that cannot be expressed as plain attribute shapes
//!
//! Every check collects into a `Vec<SpecValidationError>` so a caller sees all
//! problems with a manifest at once instead of fixing them one round trip at a time.

use std::fmt;
use std::net::IpAddr;

use super::types::{CloudType, ClusterTier, CrossReference, Credentials, Field};

/// Smallest disk a PAID cluster node may have
pub const PAID_MIN_DISK_SIZE_GB: u32 = 50;
/// Provisioned IOPS must be a multiple of this value
pub const DISK_IOPS_STEP: u32 = 1000;
pub const AWS_MIN_DISK_IOPS: u32 = 3000;
pub const AWS_MAX_DISK_IOPS: u32 = 16000;

/// Structured validation error for resource specifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.how_to_fix)
    }
}

/// Turn a collected error list into the usual validation result
pub fn finish(errors: Vec<SpecValidationError>) -> Result<(), Vec<SpecValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Disk size floor: PAID nodes need at least 50 GB, FREE has no floor
pub fn validate_disk_size(
    tier: ClusterTier,
    disk_size_gb: Option<u32>,
) -> Result<(), SpecValidationError> {
    match (tier, disk_size_gb) {
        (ClusterTier::Paid, Some(size)) if size < PAID_MIN_DISK_SIZE_GB => {
            Err(SpecValidationError::new(
                "node_config.disk_size_gb",
                format!(
                    "disk_size_gb must be at least {PAID_MIN_DISK_SIZE_GB} for PAID clusters, got {size}"
                ),
                format!("Set node_config.disk_size_gb to {PAID_MIN_DISK_SIZE_GB} or more."),
            ))
        }
        _ => Ok(()),
    }
}

/// Provisioned IOPS rules.
///
/// Only AWS PAID clusters may provision IOPS, and then only in steps of 1000
/// between 3000 and 16000 inclusive. Zero is treated as "not provisioned".
pub fn validate_disk_iops(
    cloud: CloudType,
    tier: ClusterTier,
    disk_iops: Option<u32>,
) -> Result<(), SpecValidationError> {
    let iops = match disk_iops {
        Some(0) | None => return Ok(()),
        Some(iops) => iops,
    };

    if cloud != CloudType::Aws {
        return Err(SpecValidationError::new(
            "node_config.disk_iops",
            format!("disk_iops is only supported on AWS, not {cloud}"),
            "Remove node_config.disk_iops for non-AWS clusters.",
        ));
    }

    if tier != ClusterTier::Paid {
        return Err(SpecValidationError::new(
            "node_config.disk_iops",
            "disk_iops cannot be set for FREE clusters",
            "Remove node_config.disk_iops or use cluster_tier PAID.",
        ));
    }

    if !(AWS_MIN_DISK_IOPS..=AWS_MAX_DISK_IOPS).contains(&iops) || iops % DISK_IOPS_STEP != 0 {
        return Err(SpecValidationError::new(
            "node_config.disk_iops",
            format!(
                "disk_iops must be a multiple of {DISK_IOPS_STEP} between {AWS_MIN_DISK_IOPS} and {AWS_MAX_DISK_IOPS}, got {iops}"
            ),
            "Pick a value such as 3000, 4000, ... 16000.",
        ));
    }

    Ok(())
}

/// Credential groups: combined pair XOR both per-API pairs, each group complete
pub fn validate_credentials(credentials: &Credentials, errors: &mut Vec<SpecValidationError>) {
    let combined = credentials.combined_fields_set();
    let separate = credentials.separate_fields_set();

    if !combined.is_empty() && !separate.is_empty() {
        let conflicting: Vec<&str> = combined.iter().chain(separate.iter()).copied().collect();
        errors.push(SpecValidationError::new(
            format!("credentials.{}", conflicting.join(" / credentials.")),
            "username/password cannot be combined with ysql_*/ycql_* credentials",
            "Use either credentials.username and credentials.password, or all four of ysql_username, ysql_password, ycql_username and ycql_password.",
        ));
        return;
    }

    if !combined.is_empty() {
        if combined.len() != 2 {
            errors.push(SpecValidationError::new(
                "credentials.username / credentials.password",
                "username and password must be set together",
                "Provide both credentials.username and credentials.password.",
            ));
        }
        return;
    }

    if !separate.is_empty() {
        if separate.len() != 4 {
            let missing: Vec<&str> = [
                "ysql_username",
                "ysql_password",
                "ycql_username",
                "ycql_password",
            ]
            .into_iter()
            .filter(|f| !separate.contains(f))
            .collect();
            errors.push(SpecValidationError::new(
                format!("credentials.{}", missing.join(" / credentials.")),
                "ysql_* and ycql_* credentials must all be set together",
                "Provide ysql_username, ysql_password, ycql_username and ycql_password.",
            ));
        }
        return;
    }

    errors.push(SpecValidationError::new(
        "credentials",
        "database credentials are required",
        "Set credentials.username and credentials.password.",
    ));
}

/// A reference must pick exactly one of id/name; `required` also rejects neither
pub fn validate_reference(
    reference: &CrossReference,
    field: &str,
    required: bool,
    errors: &mut Vec<SpecValidationError>,
) {
    if reference.is_ambiguous() {
        errors.push(SpecValidationError::new(
            format!("{field}.id / {field}.name"),
            format!("{field} cannot be referenced by both id and name"),
            format!("Set either {field}.id or {field}.name, not both."),
        ));
    } else if required && reference.is_empty() {
        errors.push(SpecValidationError::new(
            field,
            format!("{field} is required"),
            format!("Set {field}.id or {field}.name."),
        ));
    }
}

/// Non-empty string check for required text attributes
pub fn validate_non_empty(value: &str, field: &str, errors: &mut Vec<SpecValidationError>) {
    if value.trim().is_empty() {
        errors.push(SpecValidationError::new(
            field,
            format!("{field} must not be empty"),
            format!("Provide a non-empty value for {field}."),
        ));
    }
}

/// Reject a feature-gated attribute while its flag is off
pub fn validate_feature_gate<T>(
    value: &Field<T>,
    enabled: bool,
    field: &str,
    flag: &str,
    errors: &mut Vec<SpecValidationError>,
) {
    if value.is_set() && !enabled {
        errors.push(SpecValidationError::new(
            field,
            format!("{field} requires the {flag} feature"),
            format!("Enable features.{flag} in the engine configuration or remove {field}."),
        ));
    }
}

/// Parse `addr/prefix` for IPv4 or IPv6
pub fn is_valid_cidr(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(addr) = addr.parse::<IpAddr>() else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match addr {
        IpAddr::V4(_) => prefix <= 32,
        IpAddr::V6(_) => prefix <= 128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_parsing() {
        assert!(is_valid_cidr("10.0.0.0/16"));
        assert!(is_valid_cidr("0.0.0.0/0"));
        assert!(is_valid_cidr("2001:db8::/32"));
        assert!(!is_valid_cidr("10.0.0.0"));
        assert!(!is_valid_cidr("10.0.0.0/33"));
        assert!(!is_valid_cidr("not-an-ip/8"));
    }

    #[test]
    fn test_feature_gate() {
        let mut errors = Vec::new();
        validate_feature_gate(&Field::Value(true), false, "connection_pooling", "connection_pooling", &mut errors);
        assert_eq!(errors.len(), 1);

        let mut errors = Vec::new();
        validate_feature_gate(&Field::<bool>::Absent, false, "connection_pooling", "connection_pooling", &mut errors);
        validate_feature_gate(&Field::Value(true), true, "connection_pooling", "connection_pooling", &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_reference_validation() {
        let mut errors = Vec::new();
        validate_reference(&CrossReference::default(), "vpc", false, &mut errors);
        assert!(errors.is_empty());

        validate_reference(&CrossReference::default(), "cluster", true, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "cluster");
    }
}
