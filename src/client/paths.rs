//! Endpoint paths, all rooted at one account/project pair

const API_ROOT: &str = "/api/public/v1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiPaths {
    account_id: String,
    project_id: String,
}

impl ApiPaths {
    pub fn new(account_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            project_id: project_id.into(),
        }
    }

    fn account(&self) -> String {
        format!("{API_ROOT}/accounts/{}", self.account_id)
    }

    fn project(&self) -> String {
        format!("{}/projects/{}", self.account(), self.project_id)
    }

    pub fn clusters(&self) -> String {
        format!("{}/clusters", self.project())
    }

    pub fn cluster(&self, cluster_id: &str) -> String {
        format!("{}/clusters/{cluster_id}", self.project())
    }

    pub fn pause_cluster(&self, cluster_id: &str) -> String {
        format!("{}/pause", self.cluster(cluster_id))
    }

    pub fn resume_cluster(&self, cluster_id: &str) -> String {
        format!("{}/resume", self.cluster(cluster_id))
    }

    pub fn cluster_allow_lists(&self, cluster_id: &str) -> String {
        format!("{}/allow-lists", self.cluster(cluster_id))
    }

    pub fn read_replicas(&self, cluster_id: &str) -> String {
        format!("{}/read-replicas", self.cluster(cluster_id))
    }

    pub fn vpcs(&self) -> String {
        format!("{}/network/vpcs", self.project())
    }

    pub fn vpc(&self, vpc_id: &str) -> String {
        format!("{}/network/vpcs/{vpc_id}", self.project())
    }

    pub fn allow_lists(&self) -> String {
        format!("{}/allow-lists", self.project())
    }

    pub fn allow_list(&self, allow_list_id: &str) -> String {
        format!("{}/allow-lists/{allow_list_id}", self.project())
    }

    pub fn backups(&self) -> String {
        format!("{}/backups", self.project())
    }

    pub fn backup(&self, backup_id: &str) -> String {
        format!("{}/backups/{backup_id}", self.project())
    }

    pub fn integrations(&self) -> String {
        format!("{}/telemetry-providers", self.project())
    }

    pub fn integration(&self, integration_id: &str) -> String {
        format!("{}/telemetry-providers/{integration_id}", self.project())
    }

    pub fn audit_log_configs(&self, cluster_id: &str) -> String {
        format!("{}/db-audit-log-exporter-configs", self.cluster(cluster_id))
    }

    pub fn audit_log_config(&self, cluster_id: &str, config_id: &str) -> String {
        format!("{}/{config_id}", self.audit_log_configs(cluster_id))
    }

    pub fn software_tracks(&self) -> String {
        format!("{}/software/tracks", self.account())
    }

    /// Task listing for one entity, newest first
    pub fn tasks(&self, entity_id: &str, task_type: &str) -> String {
        format!(
            "{}/tasks?entity_id={entity_id}&task_type={task_type}",
            self.account()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_rooted_at_project() {
        let paths = ApiPaths::new("acc", "proj");
        assert_eq!(
            paths.cluster("c1"),
            "/api/public/v1/accounts/acc/projects/proj/clusters/c1"
        );
        assert_eq!(
            paths.pause_cluster("c1"),
            "/api/public/v1/accounts/acc/projects/proj/clusters/c1/pause"
        );
        assert_eq!(
            paths.audit_log_config("c1", "a1"),
            "/api/public/v1/accounts/acc/projects/proj/clusters/c1/db-audit-log-exporter-configs/a1"
        );
    }

    #[test]
    fn test_account_scoped_paths() {
        let paths = ApiPaths::new("acc", "proj");
        assert_eq!(paths.software_tracks(), "/api/public/v1/accounts/acc/software/tracks");
        assert_eq!(
            paths.tasks("c1", "CREATE_CLUSTER"),
            "/api/public/v1/accounts/acc/tasks?entity_id=c1&task_type=CREATE_CLUSTER"
        );
    }
}
