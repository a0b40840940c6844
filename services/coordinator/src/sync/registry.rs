//! Registry client reconciler.

use nfc_reconcile::{eq_ignore_case, plan_by_name, Action, SyncReport};
use tracing::{info, warn};

use super::settle;
use crate::api::{RegistryClientDto, RegistryClientEntity};
use crate::client::ApiError;
use crate::cluster::Cluster;
use crate::config::Registry;

/// Converge the cluster's registry clients and cache the result on the cluster.
pub async fn sync_registries(
    cluster: &mut Cluster,
    desired: &[Registry],
) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    info!(cluster = %cluster.name, "Collecting registry clients");
    let Some(current) = settle(client.registry_clients().await)? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    let plan = plan_by_name(
        desired.iter(),
        current,
        |r| r.name.as_str(),
        |c| c.component.name.as_str(),
    );

    for duplicate in &plan.duplicates {
        warn!(
            cluster = %cluster.name,
            registry = %duplicate.component.name,
            id = %duplicate.id,
            "Duplicate registry client name, leaving it alone"
        );
    }

    for stale in &plan.delete {
        warn!(cluster = %cluster.name, registry = %stale.component.name, "Deleting registry client");
        let action = match settle(client.delete_registry_client(&stale.id, stale.revision).await)? {
            Some(()) => Action::Deleted,
            None => Action::Failed,
        };
        report.record(action);
    }

    for registry in &plan.create {
        info!(cluster = %cluster.name, registry = %registry.name, "Adding registry client");
        let action = match settle(client.create_registry_client(desired_dto(registry)).await)? {
            Some(_) => Action::Created,
            None => Action::Failed,
        };
        report.record(action);
    }

    for (registry, existing) in &plan.update {
        if is_up_to_date(registry, existing) {
            report.record(Action::Unchanged);
            continue;
        }

        warn!(
            cluster = %cluster.name,
            registry = %registry.name,
            "Registry details mismatch, updating"
        );
        let result = client
            .update_registry_client(&existing.id, existing.revision, desired_dto(registry))
            .await;
        let action = match settle(result)? {
            Some(_) => Action::Updated,
            None => Action::Failed,
        };
        report.record(action);
    }

    match settle(client.registry_clients().await)? {
        Some(registries) => cluster.cache_registries(registries),
        None => warn!(cluster = %cluster.name, "Unable to refresh registry clients"),
    }

    info!(cluster = %cluster.name, %report, "Registry clients synced");
    Ok(report)
}

fn desired_dto(registry: &Registry) -> RegistryClientDto {
    RegistryClientDto {
        id: None,
        name: registry.name.clone(),
        uri: registry.uri.clone(),
        description: registry.description.clone(),
    }
}

fn is_up_to_date(registry: &Registry, existing: &RegistryClientEntity) -> bool {
    eq_ignore_case(&registry.uri, &existing.component.uri)
        && eq_ignore_case(&registry.description, &existing.component.description)
}
