//! Orchestrator: converges every declared cluster in dependency order.
//!
//! Per cluster the order is fixed, because later reconcilers read ids
//! resolved by earlier ones:
//!
//! ```text
//! probe -> registries -> [users -> groups -> global policies]
//!       -> parameter contexts -> projects (-> environments)
//!       -> [component policies]
//! ```
//!
//! Bracketed steps run only when security is coordinated. A transport
//! failure at any step marks the cluster unreachable and ends its run;
//! other clusters are unaffected.

use std::fmt;

use futures_util::stream::{self, StreamExt};
use nfc_reconcile::SyncReport;
use tracing::{error, info, warn};

use crate::client::{ApiError, Connector};
use crate::cluster::Cluster;
use crate::config::{ClusterConfig, Configuration};
use crate::sync::{
    sync_component_policies, sync_global_policies, sync_parameter_contexts, sync_projects,
    sync_registries, sync_user_groups, sync_users, AccessPolicyCatalog,
};

/// Outcome of one run against one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterReport {
    pub name: String,
    pub reachable: bool,
    pub registries: SyncReport,
    pub users: SyncReport,
    pub user_groups: SyncReport,
    pub global_policies: SyncReport,
    pub parameter_contexts: SyncReport,
    pub projects: SyncReport,
    pub environments: SyncReport,
    pub component_policies: SyncReport,
}

impl ClusterReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn sections(&self) -> [(&'static str, &SyncReport); 8] {
        [
            ("registries", &self.registries),
            ("users", &self.users),
            ("user_groups", &self.user_groups),
            ("global_policies", &self.global_policies),
            ("parameter_contexts", &self.parameter_contexts),
            ("projects", &self.projects),
            ("environments", &self.environments),
            ("component_policies", &self.component_policies),
        ]
    }

    /// Total mutating calls that succeeded.
    pub fn mutations(&self) -> u32 {
        self.sections().iter().map(|(_, r)| r.mutations()).sum()
    }

    pub fn is_converged(&self) -> bool {
        self.reachable && self.sections().iter().all(|(_, r)| r.is_converged())
    }
}

impl fmt::Display for ClusterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.reachable {
            return write!(f, "{}: unreachable", self.name);
        }
        write!(f, "{}:", self.name)?;
        for (section, report) in self.sections() {
            write!(f, " {section}[{report}]")?;
        }
        Ok(())
    }
}

/// Outcome of one run, one entry per declared cluster in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub clusters: Vec<ClusterReport>,
}

impl RunReport {
    pub fn cluster(&self, name: &str) -> Option<&ClusterReport> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn mutations(&self) -> u32 {
        self.clusters.iter().map(ClusterReport::mutations).sum()
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &ClusterReport> {
        self.clusters.iter().filter(|c| !c.reachable)
    }

    pub fn is_converged(&self) -> bool {
        self.clusters.iter().all(ClusterReport::is_converged)
    }
}

/// Runs reconciliation passes over a configuration.
#[derive(Debug, Clone)]
pub struct Coordinator {
    catalog: AccessPolicyCatalog,
    concurrency: usize,
}

impl Coordinator {
    pub fn new(catalog: AccessPolicyCatalog) -> Self {
        Self {
            catalog,
            concurrency: 1,
        }
    }

    /// Reconcile up to `concurrency` clusters at once. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Converge every declared cluster once.
    pub async fn run(&self, configuration: &Configuration, connector: &dyn Connector) -> RunReport {
        info!(
            clusters = configuration.clusters.len(),
            concurrency = self.concurrency,
            spec_hash = %configuration.spec_hash(),
            "Starting reconciliation run"
        );

        let clusters = stream::iter(&configuration.clusters)
            .map(|cluster| self.run_cluster(configuration, cluster, connector))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let report = RunReport { clusters };
        for cluster in &report.clusters {
            if cluster.reachable {
                info!(
                    cluster = %cluster.name,
                    mutations = cluster.mutations(),
                    report = %cluster,
                    "Cluster reconciled"
                );
            } else {
                warn!(cluster = %cluster.name, "Cluster skipped, unreachable");
            }
        }
        info!(
            mutations = report.mutations(),
            converged = report.is_converged(),
            "Reconciliation run finished"
        );
        report
    }

    async fn run_cluster(
        &self,
        configuration: &Configuration,
        config: &ClusterConfig,
        connector: &dyn Connector,
    ) -> ClusterReport {
        let mut report = ClusterReport::new(&config.name);

        let connection = match connector.connect(config) {
            Ok(connection) => connection,
            Err(err) => {
                error!(cluster = %config.name, error = %err, "Unable to build cluster connection");
                return report;
            }
        };

        let mut cluster = Cluster::new(config, connection);
        info!(cluster = %cluster.name, host = %cluster.host_name, "Testing cluster connectivity");
        if !cluster.probe().await {
            return report;
        }
        report.reachable = true;

        if let Err(err) = self.converge(&mut cluster, configuration, &mut report).await {
            cluster.mark_unreachable(&err);
            report.reachable = cluster.is_reachable();
        }
        report
    }

    async fn converge(
        &self,
        cluster: &mut Cluster,
        configuration: &Configuration,
        report: &mut ClusterReport,
    ) -> Result<(), ApiError> {
        let security = &configuration.security;

        report.registries = sync_registries(cluster, &configuration.registries).await?;

        if security.is_coordinated {
            report.users = sync_users(cluster, &security.users).await?;
            report.user_groups = sync_user_groups(cluster, &security.user_groups).await?;
            report.global_policies = sync_global_policies(cluster, security, &self.catalog).await?;
        }

        report.parameter_contexts =
            sync_parameter_contexts(cluster, &configuration.parameter_contexts).await?;

        let projects = sync_projects(cluster, configuration).await?;
        report.projects = projects.projects;
        report.environments = projects.environments;

        if security.is_coordinated {
            report.component_policies =
                sync_component_policies(cluster, security, &self.catalog).await?;
        }

        Ok(())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(AccessPolicyCatalog::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_floor() {
        let coordinator = Coordinator::default().with_concurrency(0);
        assert_eq!(coordinator.concurrency, 1);
    }

    #[test]
    fn test_unreachable_cluster_is_not_converged() {
        let report = RunReport {
            clusters: vec![
                ClusterReport {
                    reachable: true,
                    ..ClusterReport::new("dev")
                },
                ClusterReport::new("prod"),
            ],
        };

        assert!(!report.is_converged());
        assert_eq!(report.unreachable().count(), 1);
        assert_eq!(report.cluster("prod").map(|c| c.reachable), Some(false));
        assert_eq!(report.clusters[1].to_string(), "prod: unreachable");
    }
}
