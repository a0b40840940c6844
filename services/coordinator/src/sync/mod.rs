//! Reconcilers, one per resource type.
//!
//! Each reconciler reads the cluster's current records, plans against the
//! desired records by name and applies the difference. Every reconciler
//! follows the same failure rules:
//!
//! - a transport failure is returned, which ends the run for that cluster
//! - a rejected operation is logged by the client and tallied as failed
//! - a missing prerequisite is logged and tallied as skipped

mod access_policy;
mod descriptors;
mod environment;
mod parameter_context;
mod project;
mod registry;
mod user;
mod user_group;

use tracing::debug;

use crate::client::ApiError;

pub use access_policy::{sync_component_policies, sync_global_policies};
pub use descriptors::{AccessPolicyCatalog, AccessPolicyDescriptor};
pub use environment::sync_environments;
pub use parameter_context::sync_parameter_contexts;
pub use project::{sync_projects, ProjectReport};
pub use registry::sync_registries;
pub use user::sync_users;
pub use user_group::sync_user_groups;

/// Keep transport failures as errors and turn a rejected operation into `None`.
///
/// The client has already logged the rejection with its response body.
fn settle<T>(result: Result<T, ApiError>) -> Result<Option<T>, ApiError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_transport() => Err(err),
        Err(err) => {
            debug!(error = %err, "Operation abandoned");
            Ok(None)
        }
    }
}
