//! User group reconciler.

use nfc_id::UserId;
use nfc_reconcile::{plan_by_name, same_members, Action, SyncReport};
use tracing::{debug, info, warn};

use super::settle;
use crate::client::ApiError;
use crate::cluster::Cluster;
use crate::config::UserGroup;

/// Converge user groups and their membership.
///
/// Members are resolved through the user ids recorded by the user reconciler;
/// unknown members are skipped with a warning.
pub async fn sync_user_groups(
    cluster: &mut Cluster,
    desired: &[UserGroup],
) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    info!(cluster = %cluster.name, "Collecting user groups");
    let Some(current) = settle(client.user_groups().await)? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    let plan = plan_by_name(
        desired.iter(),
        current,
        |g| g.identity.as_str(),
        |c| c.component.identity.as_str(),
    );

    for duplicate in &plan.duplicates {
        warn!(
            cluster = %cluster.name,
            user_group = %duplicate.component.identity,
            id = %duplicate.id,
            "Duplicate user group identity, leaving it alone"
        );
    }

    for stale in &plan.delete {
        let action = match settle(client.delete_user_group(&stale.id, stale.revision).await)? {
            Some(()) => {
                info!(cluster = %cluster.name, user_group = %stale.component.identity, "Deleted user group");
                Action::Deleted
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    for group in plan.create {
        let members = member_ids(cluster, group);
        let action = match settle(client.create_user_group(&group.identity, members).await)? {
            Some(created) => {
                info!(cluster = %cluster.name, user_group = %group.identity, "Created user group");
                cluster.resolved.set_user_group(&group.identity, created.id);
                Action::Created
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    for (group, existing) in plan.update {
        cluster
            .resolved
            .set_user_group(&group.identity, existing.id.clone());

        let members = member_ids(cluster, group);
        if same_members(members.iter(), existing.member_ids()) {
            debug!(cluster = %cluster.name, user_group = %group.identity, "Members are up to date");
            report.record(Action::Unchanged);
            continue;
        }

        let result = client
            .update_user_group(&existing.id, existing.revision, &group.identity, members)
            .await;
        let action = match settle(result)? {
            Some(_) => {
                info!(cluster = %cluster.name, user_group = %group.identity, "Updated user group members");
                Action::Updated
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    info!(cluster = %cluster.name, %report, "User groups synced");
    Ok(report)
}

fn member_ids(cluster: &Cluster, group: &UserGroup) -> Vec<UserId> {
    group
        .members
        .iter()
        .filter_map(|identity| match cluster.resolved.user(identity) {
            Some(user) => Some(user.id.clone()),
            None => {
                warn!(
                    cluster = %cluster.name,
                    user_group = %group.identity,
                    user = %identity,
                    "User not found in configured users"
                );
                None
            }
        })
        .collect()
}
