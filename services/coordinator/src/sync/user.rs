//! User reconciler.

use nfc_reconcile::{eq_ignore_case, plan_by_name, Action, SyncReport};
use tracing::{debug, info, warn};

use super::settle;
use crate::client::ApiError;
use crate::cluster::{Cluster, UserRecord};
use crate::config::User;

/// Converge users, always keeping the identity the coordinator runs as.
pub async fn sync_users(cluster: &mut Cluster, configured: &[User]) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    info!(cluster = %cluster.name, "Getting coordinator user");
    let Some(identity) = settle(client.current_user().await)? else {
        report.record(Action::Failed);
        return Ok(report);
    };
    cluster.resolved.set_current_identity(identity.clone());

    let mut desired = configured.to_vec();
    if !desired.iter().any(|u| eq_ignore_case(&u.identity, &identity)) {
        debug!(cluster = %cluster.name, identity = %identity, "Adding coordinator user to desired users");
        desired.push(User::new(identity.clone()));
    }

    info!(cluster = %cluster.name, "Collecting users");
    let Some(current) = settle(client.users().await)? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    let plan = plan_by_name(
        desired.iter(),
        current,
        |u| u.identity.as_str(),
        |c| c.component.identity.as_str(),
    );

    for duplicate in &plan.duplicates {
        warn!(
            cluster = %cluster.name,
            user = %duplicate.component.identity,
            id = %duplicate.id,
            "Duplicate user identity, leaving it alone"
        );
    }

    for stale in &plan.delete {
        if eq_ignore_case(&stale.component.identity, &identity) {
            continue;
        }

        let action = match settle(client.delete_user(&stale.id, stale.revision).await)? {
            Some(()) => {
                info!(cluster = %cluster.name, user = %stale.component.identity, "Deleted user");
                Action::Deleted
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    for user in plan.create {
        let action = match settle(client.create_user(&user.identity).await)? {
            Some(created) => {
                info!(cluster = %cluster.name, user = %user.identity, "Created user");
                cluster.resolved.set_user(
                    &user.identity,
                    UserRecord {
                        id: created.id,
                        revision: created.revision,
                    },
                );
                Action::Created
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    for (user, existing) in plan.update {
        debug!(cluster = %cluster.name, user = %user.identity, "User already exists");
        cluster.resolved.set_user(
            &user.identity,
            UserRecord {
                id: existing.id,
                revision: existing.revision,
            },
        );
        report.record(Action::Unchanged);
    }

    info!(cluster = %cluster.name, %report, "Users synced");
    Ok(report)
}
