//! Parameter context reconciler.

use nfc_reconcile::{eq_ignore_case, plan_by_name, Action, SyncReport};
use tracing::{debug, info, warn};

use super::settle;
use crate::api::{ParameterContextDto, ParameterContextEntity, ParameterDto, ParameterEntity};
use crate::client::ApiError;
use crate::cluster::Cluster;
use crate::config::{Parameter, ParameterContext};

/// Converge coordinated parameter contexts and resolve the ids of all declared contexts.
///
/// Uncoordinated contexts are only looked up. Remote contexts not declared
/// at all are deleted.
pub async fn sync_parameter_contexts(
    cluster: &mut Cluster,
    desired: &[ParameterContext],
) -> Result<SyncReport, ApiError> {
    let client = cluster.client().clone();
    let mut report = SyncReport::default();

    info!(cluster = %cluster.name, "Collecting parameter contexts");
    let Some(current) = settle(client.parameter_contexts().await)? else {
        report.record(Action::Failed);
        return Ok(report);
    };

    let plan = plan_by_name(
        desired.iter(),
        current,
        |pc| pc.name.as_str(),
        |c| c.component.name.as_str(),
    );

    for duplicate in &plan.duplicates {
        warn!(
            cluster = %cluster.name,
            parameter_context = %duplicate.component.name,
            id = %duplicate.id,
            "Duplicate parameter context name, leaving it alone"
        );
    }

    for stale in &plan.delete {
        let result = client
            .delete_parameter_context(&stale.id, stale.revision)
            .await;
        let action = match settle(result)? {
            Some(()) => {
                info!(cluster = %cluster.name, parameter_context = %stale.component.name, "Deleted parameter context");
                Action::Deleted
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    for context in plan.create {
        if !context.is_coordinated {
            debug!(
                cluster = %cluster.name,
                parameter_context = %context.name,
                "Uncoordinated parameter context not found"
            );
            cluster.resolved.set_parameter_context(&context.name, None);
            continue;
        }

        let action = match settle(client.create_parameter_context(desired_dto(context)).await)? {
            Some(created) => {
                info!(cluster = %cluster.name, parameter_context = %context.name, "Created parameter context");
                cluster
                    .resolved
                    .set_parameter_context(&context.name, Some(created.id));
                Action::Created
            }
            None => {
                cluster.resolved.set_parameter_context(&context.name, None);
                Action::Failed
            }
        };
        report.record(action);
    }

    for (context, existing) in plan.update {
        cluster
            .resolved
            .set_parameter_context(&context.name, Some(existing.id.clone()));

        if !context.is_coordinated {
            continue;
        }

        if is_up_to_date(context, &existing) {
            debug!(cluster = %cluster.name, parameter_context = %context.name, "Parameter context is up to date");
            report.record(Action::Unchanged);
            continue;
        }

        let result = client
            .submit_parameter_context_update(&existing.id, existing.revision, desired_dto(context))
            .await;
        let action = match settle(result)? {
            Some(()) => {
                info!(cluster = %cluster.name, parameter_context = %context.name, "Submitted parameter context update");
                Action::Updated
            }
            None => Action::Failed,
        };
        report.record(action);
    }

    info!(cluster = %cluster.name, %report, "Parameter contexts synced");
    Ok(report)
}

fn desired_dto(context: &ParameterContext) -> ParameterContextDto {
    ParameterContextDto {
        id: None,
        name: context.name.clone(),
        description: context.description.clone(),
        parameters: context
            .parameters
            .iter()
            .map(|p| ParameterEntity {
                parameter: ParameterDto {
                    name: p.name.clone(),
                    description: p.description.clone(),
                    sensitive: p.is_sensitive,
                    value: p.value.clone(),
                },
            })
            .collect(),
    }
}

fn is_up_to_date(context: &ParameterContext, existing: &ParameterContextEntity) -> bool {
    eq_ignore_case(&context.description, &existing.component.description)
        && !parameters_differ(&context.parameters, &existing.component.parameters)
}

/// Compare declared parameters against the remote set.
///
/// Sensitive values cannot be read back, so a masked or missing remote
/// value for a sensitive parameter only has its shape compared.
fn parameters_differ(desired: &[Parameter], remote: &[ParameterEntity]) -> bool {
    if desired.len() != remote.len() {
        return true;
    }

    desired.iter().any(|parameter| {
        !remote
            .iter()
            .any(|entity| parameter_matches(parameter, &entity.parameter))
    })
}

fn parameter_matches(desired: &Parameter, remote: &ParameterDto) -> bool {
    eq_ignore_case(&desired.name, &remote.name)
        && eq_ignore_case(&desired.description, &remote.description)
        && desired.is_sensitive == remote.sensitive
        && value_matches(desired, remote)
}

fn value_matches(desired: &Parameter, remote: &ParameterDto) -> bool {
    match remote.value.as_deref() {
        None | Some(ParameterDto::SENSITIVE_MASK) if desired.is_sensitive => true,
        remote_value => desired.value.as_deref() == remote_value,
    }
}
