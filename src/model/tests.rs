//! Unit tests for resource spec validation
//!
//! Exercise the `validate()` functions of each spec to make sure valid
//! manifests pass and each class of invalid manifest is rejected with a
//! field path that points at the problem.

#[cfg(test)]
mod cluster_spec_validation {
    use crate::config::FeatureFlags;
    use crate::model::validation::{validate_disk_iops, validate_disk_size};
    use crate::model::{
        CloudType, ClusterSpec, ClusterTier, Credentials, CrossReference, FaultTolerance, Field,
        NodeConfig, RegionSpec, SpecValidationError,
    };

    /// Helper to create a minimal valid PAID cluster spec
    fn valid_paid_spec() -> ClusterSpec {
        ClusterSpec {
            name: "orders".to_string(),
            cloud_type: CloudType::Aws,
            cluster_tier: ClusterTier::Paid,
            cluster_type: Field::Absent,
            fault_tolerance: Field::Value(FaultTolerance::Zone),
            num_faults_to_tolerate: Field::Absent,
            regions: vec![RegionSpec::new("us-west-2", 3)],
            node_config: NodeConfig {
                num_cores: 4,
                memory_mb: Field::Absent,
                disk_size_gb: Field::Value(100),
                disk_iops: Field::Absent,
            },
            database_track: Field::Absent,
            credentials: Credentials::combined("admin", "s3cret"),
            allow_lists: vec![],
            desired_state: Field::Absent,
            connection_pooling: Field::Absent,
        }
    }

    fn free_spec() -> ClusterSpec {
        ClusterSpec {
            cluster_tier: ClusterTier::Free,
            fault_tolerance: Field::Absent,
            regions: vec![RegionSpec::new("us-west-2", 1)],
            ..valid_paid_spec()
        }
    }

    fn fields(errors: &[SpecValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_paid_spec_passes() {
        assert!(valid_paid_spec().validate(&FeatureFlags::default()).is_ok());
    }

    #[test]
    fn test_valid_free_spec_passes() {
        assert!(free_spec().validate(&FeatureFlags::default()).is_ok());
    }

    #[test]
    fn test_mixed_credentials_rejected() {
        let mut spec = valid_paid_spec();
        spec.credentials.ysql_username = Field::Value("sql".to_string());
        spec.credentials.ysql_password = Field::Value("pw".to_string());

        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.contains("username"));
        assert!(errors[0].field.contains("ysql_username"));
        assert!(errors[0].field.contains("ysql_password"));
        assert!(errors[0].message.contains("cannot be combined"));
    }

    #[test]
    fn test_separate_credentials_must_be_complete() {
        let mut spec = valid_paid_spec();
        spec.credentials = Credentials {
            ysql_username: Field::Value("sql".to_string()),
            ysql_password: Field::Value("pw".to_string()),
            ycql_username: Field::Value("cql".to_string()),
            ..Default::default()
        };

        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["credentials.ycql_password"]);

        spec.credentials = Credentials::separate(("sql", "pw"), ("cql", "pw2"));
        assert!(spec.validate(&FeatureFlags::default()).is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut spec = valid_paid_spec();
        spec.credentials = Credentials::default();
        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["credentials"]);
    }

    #[test]
    fn test_null_credentials_count_as_unset() {
        let mut spec = valid_paid_spec();
        spec.credentials.ysql_username = Field::Null;
        assert!(spec.validate(&FeatureFlags::default()).is_ok());
    }

    #[test]
    fn test_disk_iops_rules() {
        for ok in [3000, 4000, 16000] {
            assert!(
                validate_disk_iops(CloudType::Aws, ClusterTier::Paid, Some(ok)).is_ok(),
                "{ok} should pass"
            );
        }
        for bad in [2999, 16001, 3500] {
            assert!(
                validate_disk_iops(CloudType::Aws, ClusterTier::Paid, Some(bad)).is_err(),
                "{bad} should fail"
            );
        }
        for cloud in [CloudType::Gcp, CloudType::Azure] {
            assert!(validate_disk_iops(cloud, ClusterTier::Paid, Some(3000)).is_err());
            assert!(validate_disk_iops(cloud, ClusterTier::Paid, Some(0)).is_ok());
            assert!(validate_disk_iops(cloud, ClusterTier::Paid, None).is_ok());
        }
        assert!(validate_disk_iops(CloudType::Aws, ClusterTier::Free, Some(3000)).is_err());
    }

    #[test]
    fn test_disk_size_floor() {
        assert!(validate_disk_size(ClusterTier::Paid, Some(40)).is_err());
        assert!(validate_disk_size(ClusterTier::Paid, Some(50)).is_ok());
        assert!(validate_disk_size(ClusterTier::Paid, Some(500)).is_ok());
        assert!(validate_disk_size(ClusterTier::Free, Some(10)).is_ok());
        assert!(validate_disk_size(ClusterTier::Free, Some(40)).is_ok());
        assert!(validate_disk_size(ClusterTier::Paid, None).is_ok());
    }

    #[test]
    fn test_disk_rules_surface_through_cluster_validate() {
        let mut spec = valid_paid_spec();
        spec.cloud_type = CloudType::Gcp;
        spec.node_config.disk_size_gb = Field::Value(40);
        spec.node_config.disk_iops = Field::Value(3000);

        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(
            fields(&errors),
            vec!["node_config.disk_size_gb", "node_config.disk_iops"]
        );
    }

    #[test]
    fn test_vpc_reference_is_exclusive_per_region() {
        let mut spec = valid_paid_spec();
        let mut west = RegionSpec::new("us-west-2", 3);
        west.vpc = CrossReference::by_name("prod");
        let mut east = RegionSpec::new("us-east-1", 3);
        east.vpc = CrossReference {
            id: Field::Value("vpc-1".to_string()),
            name: Field::Value("prod".to_string()),
        };
        let central = RegionSpec::new("us-east-2", 3);
        spec.regions = vec![west, east, central];

        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["regions[1].vpc.id / regions[1].vpc.name"]);
    }

    #[test]
    fn test_duplicate_regions_rejected() {
        let mut spec = valid_paid_spec();
        spec.regions = vec![
            RegionSpec::new("us-west-2", 3),
            RegionSpec::new("us-west-2", 3),
        ];
        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["regions[1].region"]);
    }

    #[test]
    fn test_free_tier_single_node() {
        let mut spec = free_spec();
        spec.regions = vec![RegionSpec::new("us-west-2", 3)];
        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["regions"]);
    }

    #[test]
    fn test_fault_tolerance_node_minimums() {
        let mut spec = valid_paid_spec();
        spec.num_faults_to_tolerate = Field::Value(2);
        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["regions[].num_nodes"]);

        spec.regions = vec![RegionSpec::new("us-west-2", 5)];
        assert!(spec.validate(&FeatureFlags::default()).is_ok());
    }

    #[test]
    fn test_region_fault_tolerance_counts_regions() {
        let mut spec = valid_paid_spec();
        spec.fault_tolerance = Field::Value(FaultTolerance::Region);
        spec.regions = vec![
            RegionSpec::new("us-west-2", 1),
            RegionSpec::new("us-east-1", 1),
        ];
        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["regions"]);

        spec.regions.push(RegionSpec::new("us-east-2", 1));
        assert!(spec.validate(&FeatureFlags::default()).is_ok());
    }

    #[test]
    fn test_connection_pooling_is_feature_gated() {
        let mut spec = valid_paid_spec();
        spec.connection_pooling = Field::Value(true);

        let errors = spec.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(fields(&errors), vec!["connection_pooling"]);

        let features = FeatureFlags {
            connection_pooling: true,
            ..Default::default()
        };
        assert!(spec.validate(&features).is_ok());
    }

    #[test]
    fn test_yaml_spec_parses() {
        let yaml = r#"
name: orders
cloud_type: AWS
cluster_tier: PAID
fault_tolerance: ZONE
regions:
  - region: us-west-2
    num_nodes: 3
    vpc:
      name: prod-vpc
node_config:
  num_cores: 4
  disk_iops: ~
credentials:
  username: admin
  password: s3cret
"#;
        let spec: ClusterSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.regions[0].vpc, CrossReference::by_name("prod-vpc"));
        assert_eq!(spec.node_config.disk_iops, Field::Null);
        assert_eq!(spec.node_config.disk_size_gb, Field::Absent);
        assert!(spec.validate(&FeatureFlags::default()).is_ok());
    }
}

#[cfg(test)]
mod other_spec_validation {
    use crate::config::FeatureFlags;
    use crate::model::{
        AllowListSpec, AuditLogSpec, BackupSpec, CloudType, CrossReference, DatadogSpec, Field,
        IntegrationSpec, Manifest, NodeConfig, ReadReplicaRegion, ReadReplicasSpec,
        ResourceDocument, SinkType, StatementClass, VpcRegionCidr, VpcSpec,
    };

    fn replica(region: &str, vpc: CrossReference) -> ReadReplicaRegion {
        ReadReplicaRegion {
            region: region.to_string(),
            cloud_type: CloudType::Aws,
            num_nodes: 1,
            num_replicas: Field::Absent,
            vpc,
            node_config: NodeConfig {
                num_cores: 2,
                memory_mb: Field::Absent,
                disk_size_gb: Field::Absent,
                disk_iops: Field::Absent,
            },
        }
    }

    #[test]
    fn test_vpc_cidr_groups_are_exclusive() {
        let spec = VpcSpec {
            name: "prod".to_string(),
            cloud_type: CloudType::Gcp,
            global_cidr: Field::Value("10.0.0.0/16".to_string()),
            region_cidrs: vec![VpcRegionCidr {
                region: "us-west1".to_string(),
                cidr: "10.1.0.0/16".to_string(),
            }],
        };
        let errors = spec.validate().unwrap_err();
        assert_eq!(errors[0].field, "global_cidr / region_cidrs");

        let aws_global = VpcSpec {
            cloud_type: CloudType::Aws,
            region_cidrs: vec![],
            ..spec
        };
        let errors = aws_global.validate().unwrap_err();
        assert_eq!(errors[0].field, "global_cidr");
    }

    #[test]
    fn test_allow_list_cidrs() {
        let mut spec = AllowListSpec {
            name: "office".to_string(),
            description: Field::Absent,
            cidrs: vec!["192.168.1.0/24".to_string(), "10.0.0.0/8".to_string()],
        };
        assert!(spec.validate().is_ok());

        spec.cidrs.push("192.168.1.0/24".to_string());
        spec.cidrs.push("bogus".to_string());
        let errors = spec.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "cidrs[2]");
        assert_eq!(errors[1].field, "cidrs[3]");
    }

    #[test]
    fn test_read_replica_vpc_required_per_element() {
        let spec = ReadReplicasSpec {
            primary_cluster: CrossReference::by_name("orders"),
            replicas: vec![
                replica("us-east-1", CrossReference::by_id("vpc-1")),
                replica("eu-west-1", CrossReference::default()),
            ],
        };
        let errors = spec.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "replicas[1].vpc");
    }

    #[test]
    fn test_read_replica_disk_errors_carry_element_path() {
        let mut r = replica("us-east-1", CrossReference::by_id("vpc-1"));
        r.node_config.disk_iops = Field::Value(3500);
        let spec = ReadReplicasSpec {
            primary_cluster: CrossReference::by_id("c-1"),
            replicas: vec![r],
        };
        let errors = spec.validate().unwrap_err();
        assert_eq!(errors[0].field, "replicas[0].node_config.disk_iops");
    }

    #[test]
    fn test_backup_retention_range() {
        let mut spec = BackupSpec {
            cluster: CrossReference::by_name("orders"),
            description: Field::Absent,
            retention_period_in_days: Field::Value(36),
        };
        assert!(spec.validate().is_err());
        spec.retention_period_in_days = Field::Value(35);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_integration_block_must_match_sink() {
        let mut spec = IntegrationSpec {
            name: "dd".to_string(),
            sink_type: SinkType::Grafana,
            datadog: Some(DatadogSpec {
                api_key: "key".to_string(),
                site: "datadoghq.com".to_string(),
            }),
            grafana: None,
            sumologic: None,
            prometheus: None,
        };
        let errors = spec.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["datadog", "grafana"]);

        spec.sink_type = SinkType::Datadog;
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_audit_log_requires_feature() {
        let spec = AuditLogSpec {
            cluster: CrossReference::by_name("orders"),
            integration: CrossReference::by_name("dd"),
            log_settings: Default::default(),
            statement_classes: vec![StatementClass::Ddl, StatementClass::Role],
        };
        assert!(spec.validate(&FeatureFlags::default()).is_err());

        let features = FeatureFlags {
            db_audit_logging: true,
            ..Default::default()
        };
        assert!(spec.validate(&features).is_ok());
    }

    #[test]
    fn test_manifest_stages_and_duplicate_keys() {
        let yaml = r#"
resources:
  - kind: Cluster
    name: orders
    spec:
      name: orders
      cloud_type: AWS
      cluster_tier: FREE
      regions:
        - region: us-west-2
          num_nodes: 1
      node_config:
        num_cores: 2
      credentials:
        username: admin
        password: pw
  - kind: AllowList
    name: office
    spec:
      name: office
      cidrs: ["10.0.0.0/8"]
  - kind: AllowList
    name: office
    spec:
      name: office-2
      cidrs: ["10.0.0.0/8"]
"#;
        let manifest: Manifest = serde_yaml::from_str(yaml).unwrap();
        let stages = manifest.stages();
        assert_eq!(stages.len(), 2);
        assert!(matches!(stages[0][0], ResourceDocument::AllowList { .. }));
        assert!(matches!(stages[1][0], ResourceDocument::Cluster { .. }));

        let errors = manifest.validate(&FeatureFlags::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "AllowList/office");
    }
}
