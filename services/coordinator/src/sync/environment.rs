//! Environment reconciler: one versioned container per environment inside a project.
//!
//! An environment moves through these states:
//!
//! ```text
//! Absent --create--> Present --attach--> Versioned
//! Versioned --detach--> Present --update, reattach--> Versioned
//! any --delete--> Absent
//! ```
//!
//! Version changes are submitted as update requests; the cluster applies
//! them asynchronously and completion is not awaited.

use nfc_id::{ParameterContextId, ProcessGroupId, RegistryClientId};
use nfc_reconcile::{eq_ignore_case, plan_by_name, Action, SyncReport};
use tracing::{debug, info, warn};

use super::settle;
use crate::api::{
    ParameterContextReference, ProcessGroupDto, ProcessGroupEntity, VersionControlInformation,
};
use crate::client::{ApiError, NifiClient};
use crate::cluster::Cluster;
use crate::config::{Project, ProjectEnvironment};

/// Converge the environments of `project` on this cluster.
///
/// Uncoordinated environments are only resolved for their id. Remote
/// containers not declared at all are deleted.
pub async fn sync_environments(
    cluster: &mut Cluster,
    project: &Project,
    project_group_id: &ProcessGroupId,
) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    let Some(binding) = project.binding(&cluster.name) else {
        return Ok(report);
    };

    info!(cluster = %cluster.name, project = %project.name, "Collecting environments");
    let Some(current) = settle(client.child_process_groups(project_group_id).await)? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    let plan = plan_by_name(
        binding.environments.iter(),
        current,
        |e| e.name.as_str(),
        |c| c.component.name.as_str(),
    );

    for duplicate in &plan.duplicates {
        warn!(
            cluster = %cluster.name,
            project = %project.name,
            environment = %duplicate.component.name,
            id = %duplicate.id,
            "Duplicate environment name, leaving it alone"
        );
    }

    for stale in &plan.delete {
        let result = client.delete_process_group(&stale.id, stale.revision).await;
        let action = match settle(result)? {
            Some(()) => {
                info!(
                    cluster = %cluster.name,
                    project = %project.name,
                    environment = %stale.component.name,
                    "Deleted environment"
                );
                Action::Deleted
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    for environment in plan.create {
        if !environment.is_coordinated {
            debug!(
                cluster = %cluster.name,
                project = %project.name,
                environment = %environment.name,
                "Uncoordinated environment not found"
            );
            continue;
        }
        let action = create(cluster, &client, project, environment, project_group_id).await?;
        report.record(action);
    }

    for (environment, existing) in plan.update {
        cluster
            .resolved
            .set_environment(&project.name, &environment.name, existing.id.clone());

        if !environment.is_coordinated {
            continue;
        }
        let action = update(cluster, &client, project, environment, existing).await?;
        report.record(action);
    }

    Ok(report)
}

/// Everything an environment needs resolved before it can be written.
struct Target {
    version: i64,
    registry_id: RegistryClientId,
    parameter_context_id: Option<ParameterContextId>,
}

impl Target {
    /// Resolve version, registry and parameter context, warning about the first one missing.
    fn resolve(cluster: &Cluster, project: &Project, environment: &ProjectEnvironment) -> Option<Self> {
        let version = cluster
            .resolved
            .versions(&project.name)
            .and_then(|versions| environment.version.resolve(versions));
        let Some(version) = version else {
            warn!(
                cluster = %cluster.name,
                project = %project.name,
                environment = %environment.name,
                version = %environment.version,
                "Unable to find project version"
            );
            return None;
        };

        let Some(registry) = cluster.registry(&project.registry_name) else {
            warn!(
                cluster = %cluster.name,
                project = %project.name,
                registry = %project.registry_name,
                "Unable to find registry"
            );
            return None;
        };

        let parameter_context_id = match environment.parameter_context_name() {
            None => None,
            Some(name) => match cluster.resolved.parameter_context(name) {
                Some(id) => Some(id.clone()),
                None => {
                    warn!(
                        cluster = %cluster.name,
                        project = %project.name,
                        environment = %environment.name,
                        parameter_context = %name,
                        "Unable to find parameter context"
                    );
                    return None;
                }
            },
        };

        Some(Self {
            version,
            registry_id: registry.id.clone(),
            parameter_context_id,
        })
    }

    fn version_control(&self, group: &ProcessGroupId, project: &Project) -> VersionControlInformation {
        VersionControlInformation {
            group_id: group.clone(),
            registry_id: self.registry_id.clone(),
            bucket_id: project.bucket_id.clone(),
            flow_id: project.flow_id.clone(),
            version: self.version,
        }
    }
}

async fn create(
    cluster: &mut Cluster,
    client: &NifiClient,
    project: &Project,
    environment: &ProjectEnvironment,
    project_group_id: &ProcessGroupId,
) -> Result<Action, ApiError> {
    let Some(target) = Target::resolve(cluster, project, environment) else {
        return Ok(Action::Skipped);
    };

    let mut component = ProcessGroupDto::new(&environment.name, &environment.description);
    component.parameter_context = target
        .parameter_context_id
        .clone()
        .map(ParameterContextReference::to);

    let Some(created) = settle(client.create_process_group(project_group_id, component).await)?
    else {
        return Ok(Action::Failed);
    };
    info!(
        cluster = %cluster.name,
        project = %project.name,
        environment = %environment.name,
        "Created environment"
    );
    cluster
        .resolved
        .set_environment(&project.name, &environment.name, created.id.clone());

    let information = target.version_control(&created.id, project);
    let result = client
        .submit_version_update(&created.id, created.revision, information)
        .await;
    if settle(result)?.is_none() {
        return Ok(Action::Failed);
    }

    info!(
        cluster = %cluster.name,
        project = %project.name,
        environment = %environment.name,
        version = target.version,
        "Requested environment version"
    );
    Ok(Action::Created)
}

async fn update(
    cluster: &Cluster,
    client: &NifiClient,
    project: &Project,
    environment: &ProjectEnvironment,
    existing: ProcessGroupEntity,
) -> Result<Action, ApiError> {
    let Some(target) = Target::resolve(cluster, project, environment) else {
        return Ok(Action::Skipped);
    };

    let at_version = existing.tracked_version() == Some(target.version);
    let metadata_drift = !eq_ignore_case(&environment.name, &existing.component.name)
        || !eq_ignore_case(&environment.description, &existing.component.comments)
        || existing.parameter_context_id() != target.parameter_context_id.as_ref();

    if at_version && !metadata_drift {
        debug!(
            cluster = %cluster.name,
            project = %project.name,
            environment = %environment.name,
            "Environment is up to date"
        );
        return Ok(Action::Unchanged);
    }

    let mut revision = existing.revision;

    if metadata_drift {
        // Metadata cannot change while the group is under version control.
        if existing.tracked_version().is_some() {
            let result = client.stop_version_control(&existing.id, revision).await;
            let Some(detached) = settle(result)? else {
                return Ok(Action::Failed);
            };
            revision = match detached {
                Some(revision) => revision,
                None => match settle(client.process_group(&existing.id).await)? {
                    Some(group) => group.revision,
                    None => return Ok(Action::Failed),
                },
            };
            debug!(
                cluster = %cluster.name,
                project = %project.name,
                environment = %environment.name,
                "Detached environment from version control"
            );
        }

        let mut component = ProcessGroupDto::new(&environment.name, &environment.description);
        component.parameter_context = match (
            &target.parameter_context_id,
            existing.parameter_context_id(),
        ) {
            (Some(id), _) => Some(ParameterContextReference::to(id.clone())),
            (None, Some(_)) => Some(ParameterContextReference::cleared()),
            (None, None) => None,
        };

        let result = client
            .update_process_group(&existing.id, revision, component)
            .await;
        let Some(updated) = settle(result)? else {
            return Ok(Action::Failed);
        };
        revision = updated.revision;
        info!(
            cluster = %cluster.name,
            project = %project.name,
            environment = %environment.name,
            "Updated environment"
        );
    }

    let information = target.version_control(&existing.id, project);
    let result = client
        .submit_version_update(&existing.id, revision, information)
        .await;
    if settle(result)?.is_none() {
        return Ok(Action::Failed);
    }

    info!(
        cluster = %cluster.name,
        project = %project.name,
        environment = %environment.name,
        version = target.version,
        "Requested environment version"
    );
    Ok(Action::Updated)
}
