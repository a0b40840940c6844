//! Project reconciler: one container per project under the root process group.

use std::ops::AddAssign;

use nfc_id::ProcessGroupId;
use nfc_reconcile::{eq_ignore_case, plan_by_name, Action, SyncReport};
use tracing::{debug, info, warn};

use super::{settle, sync_environments};
use crate::api::{ProcessGroupDto, VersionMap};
use crate::client::{ApiError, NifiClient};
use crate::cluster::Cluster;
use crate::config::{Configuration, Project};

/// Tallies for projects and the environments nested in them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectReport {
    pub projects: SyncReport,
    pub environments: SyncReport,
}

impl AddAssign for ProjectReport {
    fn add_assign(&mut self, rhs: Self) {
        self.projects += rhs.projects;
        self.environments += rhs.environments;
    }
}

/// Converge the project containers bound to this cluster, then their environments.
pub async fn sync_projects(
    cluster: &mut Cluster,
    configuration: &Configuration,
) -> Result<ProjectReport, ApiError> {
    let client = cluster.client().clone();
    let cluster_name = cluster.name.clone();
    let mut report = ProjectReport::default();

    let Some(root) = cluster.root_group_id().cloned() else {
        warn!(cluster = %cluster_name, "Root process group unknown, skipping projects");
        report.projects.record(Action::Skipped);
        return Ok(report);
    };

    info!(cluster = %cluster_name, "Collecting projects");
    let Some(current) = settle(client.child_process_groups(&root).await)? else {
        report.projects.record(Action::Failed);
        return Ok(report);
    };

    let plan = plan_by_name(
        configuration.projects_for(&cluster_name),
        current,
        |p| p.name.as_str(),
        |c| c.component.name.as_str(),
    );

    for duplicate in &plan.duplicates {
        warn!(
            cluster = %cluster_name,
            project = %duplicate.component.name,
            id = %duplicate.id,
            "Duplicate project name, leaving it alone"
        );
    }

    for stale in &plan.delete {
        let result = client.delete_process_group(&stale.id, stale.revision).await;
        let action = match settle(result)? {
            Some(()) => {
                info!(cluster = %cluster_name, project = %stale.component.name, "Deleted project");
                Action::Deleted
            }
            None => Action::Failed,
        };
        report.projects.record(action);
    }

    for project in plan.create {
        let component = ProcessGroupDto::new(&project.name, &project.description);
        let Some(created) = settle(client.create_process_group(&root, component).await)? else {
            report.projects.record(Action::Failed);
            continue;
        };

        info!(cluster = %cluster_name, project = %project.name, "Created project");
        report.projects.record(Action::Created);
        cluster.resolved.set_project(&project.name, created.id.clone());
        report.environments += sync_contents(cluster, &client, project, &created.id).await?;
    }

    for (project, existing) in plan.update {
        cluster.resolved.set_project(&project.name, existing.id.clone());

        if eq_ignore_case(&project.description, &existing.component.comments) {
            debug!(cluster = %cluster_name, project = %project.name, "Project is up to date");
            report.projects.record(Action::Unchanged);
        } else {
            let component = ProcessGroupDto::new(&project.name, &project.description);
            let result = client
                .update_process_group(&existing.id, existing.revision, component)
                .await;
            let action = match settle(result)? {
                Some(_) => {
                    info!(
                        cluster = %cluster_name,
                        project = %project.name,
                        description = %project.description,
                        "Updated project description"
                    );
                    Action::Updated
                }
                None => Action::Failed,
            };
            report.projects.record(action);
            if action == Action::Failed {
                warn!(
                    cluster = %cluster_name,
                    project = %project.name,
                    "Project update rejected, skipping its environments"
                );
                continue;
            }
        }

        report.environments += sync_contents(cluster, &client, project, &existing.id).await?;
    }

    info!(
        cluster = %cluster_name,
        projects = %report.projects,
        environments = %report.environments,
        "Projects synced"
    );
    Ok(report)
}

/// Resolve the project's flow versions, then converge its environments.
async fn sync_contents(
    cluster: &mut Cluster,
    client: &NifiClient,
    project: &Project,
    project_group_id: &ProcessGroupId,
) -> Result<SyncReport, ApiError> {
    let versions = available_versions(cluster, client, project).await?;
    debug!(
        cluster = %cluster.name,
        project = %project.name,
        versions = versions.len(),
        "Resolved available flow versions"
    );
    cluster.resolved.set_versions(&project.name, versions);

    sync_environments(cluster, project, project_group_id).await
}

async fn available_versions(
    cluster: &Cluster,
    client: &NifiClient,
    project: &Project,
) -> Result<VersionMap, ApiError> {
    let Some(registry_id) = cluster
        .registry(&project.registry_name)
        .map(|registry| registry.id.clone())
    else {
        warn!(
            cluster = %cluster.name,
            project = %project.name,
            registry = %project.registry_name,
            "Unable to find registry"
        );
        return Ok(VersionMap::new());
    };

    let result = client
        .flow_versions(&registry_id, &project.bucket_id, &project.flow_id)
        .await;
    Ok(settle(result)?.unwrap_or_default())
}
