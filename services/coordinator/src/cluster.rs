//! Per-cluster state for one reconciliation run.

use std::collections::HashMap;
use std::sync::Arc;

use nfc_id::{ParameterContextId, ProcessGroupId, UserGroupId, UserId};
use nfc_reconcile::NameKey;
use tracing::{info, warn};

use crate::api::{RegistryClientEntity, Revision, VersionMap};
use crate::client::{ApiError, ClusterConnection, NifiClient};
use crate::config::ClusterConfig;

/// A target cluster plus everything resolved against it during a run.
///
/// Nothing here is shared between clusters.
pub struct Cluster {
    pub name: String,
    pub host_name: String,
    client: NifiClient,
    reachable: bool,
    root_group_id: Option<ProcessGroupId>,
    registries: HashMap<NameKey, RegistryClientEntity>,
    pub resolved: ResolvedIds,
}

impl Cluster {
    pub fn new(config: &ClusterConfig, connection: Arc<dyn ClusterConnection>) -> Self {
        Self {
            name: config.name.clone(),
            host_name: config.host_name.clone(),
            client: NifiClient::new(config.name.clone(), connection),
            reachable: true,
            root_group_id: None,
            registries: HashMap::new(),
            resolved: ResolvedIds::default(),
        }
    }

    pub fn client(&self) -> &NifiClient {
        &self.client
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn mark_unreachable(&mut self, err: &ApiError) {
        warn!(
            cluster = %self.name,
            error = %err,
            "Unable to reach cluster, will try again later"
        );
        self.reachable = false;
    }

    /// Check reachability by reading the root process group.
    ///
    /// Any failure, including a rejected request, marks the cluster unreachable.
    pub async fn probe(&mut self) -> bool {
        match self.client.root_process_group().await {
            Ok(root) => {
                info!(cluster = %self.name, root_group_id = %root.id, "Cluster reachable");
                self.root_group_id = Some(root.id);
                self.reachable = true;
            }
            Err(err) => self.mark_unreachable(&err),
        }
        self.reachable
    }

    pub fn root_group_id(&self) -> Option<&ProcessGroupId> {
        self.root_group_id.as_ref()
    }

    /// Replace the cached registry clients.
    pub fn cache_registries(&mut self, registries: Vec<RegistryClientEntity>) {
        self.registries.clear();
        for registry in registries {
            self.registries
                .entry(NameKey::new(&registry.component.name))
                .or_insert(registry);
        }
    }

    pub fn registry(&self, name: &str) -> Option<&RegistryClientEntity> {
        self.registries.get(&NameKey::new(name))
    }
}

/// A user's remote id and revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub revision: Revision,
}

/// Remote ids resolved by earlier reconcilers and read by later ones.
#[derive(Debug, Default)]
pub struct ResolvedIds {
    current_identity: Option<String>,
    users: HashMap<NameKey, UserRecord>,
    user_groups: HashMap<NameKey, UserGroupId>,
    parameter_contexts: HashMap<NameKey, Option<ParameterContextId>>,
    projects: HashMap<NameKey, ProcessGroupId>,
    environments: HashMap<(NameKey, NameKey), ProcessGroupId>,
    versions: HashMap<NameKey, VersionMap>,
}

impl ResolvedIds {
    pub fn set_current_identity(&mut self, identity: impl Into<String>) {
        self.current_identity = Some(identity.into());
    }

    /// Identity the coordinator runs as on this cluster.
    pub fn current_identity(&self) -> Option<&str> {
        self.current_identity.as_deref()
    }

    pub fn set_user(&mut self, identity: &str, record: UserRecord) {
        self.users.insert(NameKey::new(identity), record);
    }

    pub fn user(&self, identity: &str) -> Option<&UserRecord> {
        self.users.get(&NameKey::new(identity))
    }

    pub fn set_user_group(&mut self, identity: &str, id: UserGroupId) {
        self.user_groups.insert(NameKey::new(identity), id);
    }

    pub fn user_group(&self, identity: &str) -> Option<&UserGroupId> {
        self.user_groups.get(&NameKey::new(identity))
    }

    /// Record a parameter context; `None` means it is known to be missing remotely.
    pub fn set_parameter_context(&mut self, name: &str, id: Option<ParameterContextId>) {
        self.parameter_contexts.insert(NameKey::new(name), id);
    }

    /// The context's id, if it was resolved and exists remotely.
    pub fn parameter_context(&self, name: &str) -> Option<&ParameterContextId> {
        self.parameter_contexts
            .get(&NameKey::new(name))
            .and_then(Option::as_ref)
    }

    pub fn set_project(&mut self, name: &str, id: ProcessGroupId) {
        self.projects.insert(NameKey::new(name), id);
    }

    pub fn project(&self, name: &str) -> Option<&ProcessGroupId> {
        self.projects.get(&NameKey::new(name))
    }

    pub fn set_environment(&mut self, project: &str, environment: &str, id: ProcessGroupId) {
        self.environments
            .insert((NameKey::new(project), NameKey::new(environment)), id);
    }

    pub fn environment(&self, project: &str, environment: &str) -> Option<&ProcessGroupId> {
        self.environments
            .get(&(NameKey::new(project), NameKey::new(environment)))
    }

    pub fn set_versions(&mut self, project: &str, versions: VersionMap) {
        self.versions.insert(NameKey::new(project), versions);
    }

    pub fn versions(&self, project: &str) -> Option<&VersionMap> {
        self.versions.get(&NameKey::new(project))
    }
}
