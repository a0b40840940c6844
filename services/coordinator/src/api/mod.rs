//! Typed request and response payloads for the NiFi REST API.
//!
//! Only the fields the reconcilers read are modeled; everything else in a
//! response is ignored. Request bodies are always built fresh from the
//! desired state plus the remote id and revision, never by patching a
//! fetched record.

mod flow;
mod policy;
mod tenants;

use serde::{Deserialize, Serialize};

pub use flow::{
    FlowSnapshotMetadata, FlowVersionsEntity, ParameterContextDto, ParameterContextEntity,
    ParameterContextReference, ParameterContextsEntity, ParameterDto, ParameterEntity,
    ProcessGroupDto, ProcessGroupEntity, ProcessGroupsEntity, RegistryClientDto,
    RegistryClientEntity, RegistryClientsEntity, VersionControlInformation,
    VersionControlInformationEntity, VersionMap, VersionUpdateRequest,
    VersionedFlowSnapshotMetadataEntity,
};
pub use policy::{AccessPolicyDto, AccessPolicyEntity, ComponentReference};
pub use tenants::{
    AccessPolicySummary, AccessPolicySummaryEntity, CurrentUserEntity, TenantDto, TenantEntity,
    UserDto, UserEntity, UserGroupDto, UserGroupEntity, UserGroupsEntity, UsersEntity,
};

/// Optimistic concurrency token attached to every mutable record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(default)]
    pub version: i64,
}

impl Revision {
    /// Revision sent with create requests.
    pub const INITIAL: Self = Self { version: 0 };
}

/// Body of every create and update request: a revision plus the component.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub revision: Revision,
    pub component: T,
}

impl<T> MutationRequest<T> {
    /// A create request for a record that has no id yet.
    pub fn create(component: T) -> Self {
        Self {
            id: None,
            revision: Revision::INITIAL,
            component,
        }
    }

    /// An update request for an existing record.
    pub fn update(id: impl Into<String>, revision: Revision, component: T) -> Self {
        Self {
            id: Some(id.into()),
            revision,
            component,
        }
    }
}
