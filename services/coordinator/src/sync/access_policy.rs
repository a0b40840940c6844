//! Access policy reconciler, in two phases.
//!
//! The global phase walks the global descriptors and converges each
//! cluster-wide policy. The component phase walks the component
//! descriptors and converges the policies of the root flow, projects and
//! environments, honoring declared inheritance.
//!
//! Policies marked as required by the coordinator always keep the
//! coordinator identity as a member, so a run can never lock itself out.

use nfc_id::{ProcessGroupId, UserGroupId, UserId};
use nfc_reconcile::{eq_ignore_case, same_members, Action, SyncReport};
use tracing::{debug, info, warn};

use super::descriptors::{AccessPolicyCatalog, AccessPolicyDescriptor};
use super::settle;
use crate::api::{AccessPolicyDto, AccessPolicyEntity, TenantEntity, UserEntity};
use crate::client::{ApiError, NifiClient};
use crate::cluster::Cluster;
use crate::config::{ComponentAccessPolicy, ComponentTarget, Security};

/// The identity the coordinator runs as, and its user record if one exists.
struct CoordinatorUser {
    identity: String,
    user: Option<UserEntity>,
}

impl CoordinatorUser {
    async fn lookup(cluster: &mut Cluster, client: &NifiClient) -> Result<Option<Self>, ApiError> {
        let identity = match cluster.resolved.current_identity() {
            Some(identity) => identity.to_string(),
            None => match settle(client.current_user().await)? {
                Some(identity) => {
                    cluster.resolved.set_current_identity(identity.clone());
                    identity
                }
                None => return Ok(None),
            },
        };

        let user = settle(client.users().await)?
            .unwrap_or_default()
            .into_iter()
            .find(|user| eq_ignore_case(&user.component.identity, &identity));

        Ok(Some(Self { identity, user }))
    }

    fn holds(&self, descriptor: &AccessPolicyDescriptor, resource: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.holds_policy(descriptor.action, resource))
    }

    fn ensure_member(&self, users: &mut Vec<String>) {
        if !users.iter().any(|u| eq_ignore_case(u, &self.identity)) {
            users.push(self.identity.clone());
        }
    }
}

/// Declared members of one policy, by identity.
#[derive(Debug, Clone, Default)]
struct Grant {
    users: Vec<String>,
    user_groups: Vec<String>,
}

/// Members of one policy, by remote id.
struct Members {
    users: Vec<UserId>,
    user_groups: Vec<UserGroupId>,
}

/// Converge cluster-wide policies.
pub async fn sync_global_policies(
    cluster: &mut Cluster,
    security: &Security,
    catalog: &AccessPolicyCatalog,
) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    info!(cluster = %cluster.name, "Getting coordinator user");
    let Some(coordinator) = CoordinatorUser::lookup(cluster, &client).await? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    for descriptor in &catalog.global {
        let resource = descriptor.resource_for(None);

        let mut configured = security
            .global_access_policies
            .iter()
            .find(|p| descriptor.matches_name(&p.name) && p.action == descriptor.action)
            .map(|p| Grant {
                users: p.users.clone(),
                user_groups: p.user_groups.clone(),
            });

        if descriptor.required_by_coordinator {
            let grant = configured.get_or_insert_with(Grant::default);
            coordinator.ensure_member(&mut grant.users);
        }

        let Some(remote) = settle(client.access_policy(descriptor.action, &resource).await)? else {
            report.record(Action::Failed);
            continue;
        };

        let action = match (configured, remote) {
            (configured, Some(remote)) if remote.is_inherited(&resource, None) => {
                let grant = configured.unwrap_or_default();
                create(cluster, &client, descriptor, &resource, &grant).await?
            }
            (None, None) => {
                debug!(cluster = %cluster.name, policy = descriptor.name, resource = %resource, "Access policy is up to date");
                Action::Unchanged
            }
            (None, Some(remote)) if coordinator.holds(descriptor, &resource) => {
                update(cluster, &client, &coordinator, descriptor, &resource, &Grant::default(), &remote).await?
            }
            (None, Some(remote)) => delete(cluster, &client, descriptor, &resource, &remote).await?,
            (Some(grant), None) => create(cluster, &client, descriptor, &resource, &grant).await?,
            (Some(grant), Some(remote)) => {
                update(cluster, &client, &coordinator, descriptor, &resource, &grant, &remote).await?
            }
        };
        report.record(action);
    }

    info!(cluster = %cluster.name, %report, "Global access policies synced");
    Ok(report)
}

/// Converge policies on the root flow, projects and environments.
///
/// Must run after projects so their container ids are resolved.
pub async fn sync_component_policies(
    cluster: &mut Cluster,
    security: &Security,
    catalog: &AccessPolicyCatalog,
) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    info!(cluster = %cluster.name, "Getting coordinator user");
    let Some(coordinator) = CoordinatorUser::lookup(cluster, &client).await? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    for descriptor in &catalog.component {
        let mut configured: Vec<ComponentAccessPolicy> = security
            .component_access_policies
            .iter()
            .filter(|p| descriptor.matches_name(&p.name) && p.applies_to(&cluster.name))
            .cloned()
            .collect();

        if descriptor.required_by_coordinator {
            if !configured.iter().any(ComponentAccessPolicy::targets_root) {
                configured.insert(
                    0,
                    ComponentAccessPolicy::root(descriptor.name, coordinator.identity.clone()),
                );
            }
            for policy in &mut configured {
                coordinator.ensure_member(&mut policy.users);
            }
        }

        for policy in &configured {
            let Some(component_id) = component_id(cluster, policy) else {
                warn!(
                    cluster = %cluster.name,
                    policy = descriptor.name,
                    component_type = policy.component_type.as_str(),
                    component = %policy.component_name,
                    "Unable to find component"
                );
                report.record(Action::Skipped);
                continue;
            };

            let resource = descriptor.resource_for(Some(&component_id));
            let Some(remote) = settle(client.access_policy(descriptor.action, &resource).await)?
            else {
                report.record(Action::Failed);
                continue;
            };

            let inherited = remote
                .as_ref()
                .is_some_and(|r| r.is_inherited(&resource, Some(component_id.as_str())));
            let grant = Grant {
                users: policy.users.clone(),
                user_groups: policy.user_groups.clone(),
            };
            // The root flow has no parent to inherit from.
            let declared_inherited = policy.inherited && !policy.targets_root();

            let action = match remote {
                Some(remote) if declared_inherited && !inherited => {
                    delete(cluster, &client, descriptor, &resource, &remote).await?
                }
                _ if declared_inherited => {
                    debug!(cluster = %cluster.name, policy = descriptor.name, resource = %resource, "Access policy is inherited");
                    Action::Unchanged
                }
                Some(remote) if !inherited => {
                    update(cluster, &client, &coordinator, descriptor, &resource, &grant, &remote).await?
                }
                _ => create(cluster, &client, descriptor, &resource, &grant).await?,
            };
            report.record(action);
        }
    }

    info!(cluster = %cluster.name, %report, "Component access policies synced");
    Ok(report)
}

fn component_id(cluster: &Cluster, policy: &ComponentAccessPolicy) -> Option<ProcessGroupId> {
    match policy.target() {
        Ok(ComponentTarget::Root) => cluster.root_group_id().cloned(),
        Ok(ComponentTarget::Project(project)) => cluster.resolved.project(&project).cloned(),
        Ok(ComponentTarget::Environment {
            project,
            environment,
        }) => cluster.resolved.environment(&project, &environment).cloned(),
        Err(problem) => {
            debug!(cluster = %cluster.name, problem = %problem, "Invalid component policy target");
            None
        }
    }
}

fn resolve_members(cluster: &Cluster, descriptor: &AccessPolicyDescriptor, grant: &Grant) -> Members {
    let users = grant
        .users
        .iter()
        .filter_map(|identity| {
            let id = cluster.resolved.user(identity).map(|user| user.id.clone());
            if id.is_none() {
                warn!(cluster = %cluster.name, policy = descriptor.name, user = %identity, "User not found in configured users");
            }
            id
        })
        .collect();

    let user_groups = grant
        .user_groups
        .iter()
        .filter_map(|identity| {
            let id = cluster.resolved.user_group(identity).cloned();
            if id.is_none() {
                warn!(cluster = %cluster.name, policy = descriptor.name, user_group = %identity, "User group not found in configured user groups");
            }
            id
        })
        .collect();

    Members { users, user_groups }
}

fn policy_dto(descriptor: &AccessPolicyDescriptor, resource: &str, members: Members) -> AccessPolicyDto {
    AccessPolicyDto {
        id: None,
        resource: resource.to_string(),
        action: descriptor.action,
        users: members.users.into_iter().map(TenantEntity::reference).collect(),
        user_groups: members
            .user_groups
            .into_iter()
            .map(TenantEntity::reference)
            .collect(),
        component_reference: None,
    }
}

async fn create(
    cluster: &Cluster,
    client: &NifiClient,
    descriptor: &AccessPolicyDescriptor,
    resource: &str,
    grant: &Grant,
) -> Result<Action, ApiError> {
    let members = resolve_members(cluster, descriptor, grant);
    let result = client
        .create_access_policy(policy_dto(descriptor, resource, members))
        .await;

    Ok(match settle(result)? {
        Some(_) => {
            info!(
                cluster = %cluster.name,
                policy = descriptor.name,
                action = %descriptor.action,
                resource = %resource,
                "Created access policy"
            );
            Action::Created
        }
        None => Action::Failed,
    })
}

async fn update(
    cluster: &Cluster,
    client: &NifiClient,
    coordinator: &CoordinatorUser,
    descriptor: &AccessPolicyDescriptor,
    resource: &str,
    grant: &Grant,
    remote: &AccessPolicyEntity,
) -> Result<Action, ApiError> {
    let mut members = resolve_members(cluster, descriptor, grant);

    // Never strip the coordinator from a policy it already holds.
    if coordinator.holds(descriptor, resource) {
        if let Some(user) = &coordinator.user {
            if !members.users.contains(&user.id) {
                members.users.push(user.id.clone());
            }
        }
    }

    if same_members(members.users.iter(), remote.user_ids())
        && same_members(members.user_groups.iter(), remote.user_group_ids())
    {
        debug!(
            cluster = %cluster.name,
            policy = descriptor.name,
            action = %descriptor.action,
            resource = %resource,
            "Access policy is up to date"
        );
        return Ok(Action::Unchanged);
    }

    let result = client
        .update_access_policy(&remote.id, remote.revision, policy_dto(descriptor, resource, members))
        .await;

    Ok(match settle(result)? {
        Some(_) => {
            info!(
                cluster = %cluster.name,
                policy = descriptor.name,
                action = %descriptor.action,
                resource = %resource,
                "Updated access policy"
            );
            Action::Updated
        }
        None => Action::Failed,
    })
}

async fn delete(
    cluster: &Cluster,
    client: &NifiClient,
    descriptor: &AccessPolicyDescriptor,
    resource: &str,
    remote: &AccessPolicyEntity,
) -> Result<Action, ApiError> {
    let result = client.delete_access_policy(&remote.id, remote.revision).await;

    Ok(match settle(result)? {
        Some(()) => {
            info!(
                cluster = %cluster.name,
                policy = descriptor.name,
                action = %descriptor.action,
                resource = %resource,
                "Deleted access policy"
            );
            Action::Deleted
        }
        None => Action::Failed,
    })
}
