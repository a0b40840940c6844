//! Registry clients, parameter contexts, process groups and flow versions.

use std::collections::BTreeMap;

use nfc_id::{ParameterContextId, ProcessGroupId, RegistryClientId};
use serde::{Deserialize, Serialize};

use super::Revision;
use crate::config::nullable;

// =============================================================================
// Registry clients
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryClientsEntity {
    #[serde(default, deserialize_with = "nullable")]
    pub registries: Vec<RegistryClientEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryClientEntity {
    pub id: RegistryClientId,

    #[serde(default)]
    pub revision: Revision,

    pub component: RegistryClientDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryClientDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RegistryClientId>,

    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub uri: String,

    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
}

// =============================================================================
// Parameter contexts
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterContextsEntity {
    #[serde(default, deserialize_with = "nullable")]
    pub parameter_contexts: Vec<ParameterContextEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterContextEntity {
    pub id: ParameterContextId,

    #[serde(default)]
    pub revision: Revision,

    pub component: ParameterContextDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterContextDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ParameterContextId>,

    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub description: String,

    #[serde(default, deserialize_with = "nullable")]
    pub parameters: Vec<ParameterEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntity {
    pub parameter: ParameterDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDto {
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub description: String,

    #[serde(default)]
    pub sensitive: bool,

    /// Sensitive values come back masked or absent.
    #[serde(default)]
    pub value: Option<String>,
}

impl ParameterDto {
    /// Placeholder the cluster returns in place of a sensitive value.
    pub const SENSITIVE_MASK: &'static str = "********";
}

// =============================================================================
// Process groups
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupsEntity {
    #[serde(default, deserialize_with = "nullable")]
    pub process_groups: Vec<ProcessGroupEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessGroupEntity {
    pub id: ProcessGroupId,

    #[serde(default)]
    pub revision: Revision,

    pub component: ProcessGroupDto,
}

impl ProcessGroupEntity {
    /// The version the group is tracking, if it is under version control.
    pub fn tracked_version(&self) -> Option<i64> {
        self.component
            .version_control_information
            .as_ref()
            .map(|vci| vci.version)
    }

    /// Id of the bound parameter context, if any.
    pub fn parameter_context_id(&self) -> Option<&ParameterContextId> {
        self.component
            .parameter_context
            .as_ref()
            .and_then(|reference| reference.id.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProcessGroupId>,

    pub name: String,

    /// The description of a process group.
    #[serde(default, deserialize_with = "nullable")]
    pub comments: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_context: Option<ParameterContextReference>,

    /// Read-only here: version control is changed through its own endpoints.
    #[serde(default, skip_serializing)]
    pub version_control_information: Option<VersionControlInformation>,
}

impl ProcessGroupDto {
    pub fn new(name: impl Into<String>, comments: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            comments: comments.into(),
            parameter_context: None,
            version_control_information: None,
        }
    }
}

/// Reference from a process group to a parameter context.
///
/// A reference with a `null` id unbinds the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterContextReference {
    pub id: Option<ParameterContextId>,
}

impl ParameterContextReference {
    pub fn to(id: ParameterContextId) -> Self {
        Self { id: Some(id) }
    }

    pub fn cleared() -> Self {
        Self { id: None }
    }
}

// =============================================================================
// Version control
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionControlInformation {
    pub group_id: ProcessGroupId,
    pub registry_id: RegistryClientId,
    pub bucket_id: String,
    pub flow_id: String,
    pub version: i64,
}

/// Body of a version change request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionUpdateRequest {
    pub process_group_revision: Revision,
    pub version_control_information: VersionControlInformation,
}

/// Response to stopping version control on a group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionControlInformationEntity {
    #[serde(default)]
    pub process_group_revision: Option<Revision>,
}

// =============================================================================
// Flow versions
// =============================================================================

/// Versions of a flow available in a registry, keyed by version number.
pub type VersionMap = BTreeMap<i64, FlowSnapshotMetadata>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersionsEntity {
    #[serde(default, deserialize_with = "nullable")]
    pub versioned_flow_snapshot_metadata_set: Vec<VersionedFlowSnapshotMetadataEntity>,
}

impl FlowVersionsEntity {
    pub fn into_version_map(self) -> VersionMap {
        self.versioned_flow_snapshot_metadata_set
            .into_iter()
            .map(|entry| {
                let metadata = entry.versioned_flow_snapshot_metadata;
                (metadata.version, metadata)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedFlowSnapshotMetadataEntity {
    pub versioned_flow_snapshot_metadata: FlowSnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowSnapshotMetadata {
    pub version: i64,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub comments: Option<String>,

    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_group_optional_sections() {
        let plain: ProcessGroupEntity = serde_json::from_value(json!({
            "id": "pg-1",
            "revision": {"version": 3},
            "component": {"id": "pg-1", "name": "dev", "comments": null}
        }))
        .unwrap();
        assert_eq!(plain.tracked_version(), None);
        assert_eq!(plain.parameter_context_id(), None);
        assert_eq!(plain.component.comments, "");

        let versioned: ProcessGroupEntity = serde_json::from_value(json!({
            "id": "pg-2",
            "component": {
                "name": "prod",
                "parameterContext": {"id": "pc-1", "component": {"id": "pc-1", "name": "prod-params"}},
                "versionControlInformation": {
                    "groupId": "pg-2",
                    "registryId": "reg-1",
                    "bucketId": "b",
                    "flowId": "f",
                    "version": 4,
                    "state": "UP_TO_DATE"
                }
            }
        }))
        .unwrap();
        assert_eq!(versioned.revision, Revision::INITIAL);
        assert_eq!(versioned.tracked_version(), Some(4));
        assert_eq!(versioned.parameter_context_id().map(|id| id.as_str()), Some("pc-1"));
    }

    #[test]
    fn test_process_group_update_never_sends_version_control() {
        let mut dto = ProcessGroupDto::new("dev", "desc");
        dto.parameter_context = Some(ParameterContextReference::cleared());
        dto.version_control_information = Some(VersionControlInformation {
            group_id: ProcessGroupId::parse("pg").unwrap(),
            registry_id: RegistryClientId::parse("reg").unwrap(),
            bucket_id: "b".to_string(),
            flow_id: "f".to_string(),
            version: 1,
        });

        let body = serde_json::to_value(&dto).unwrap();
        assert_eq!(
            body,
            json!({"name": "dev", "comments": "desc", "parameterContext": {"id": null}})
        );
    }

    #[test]
    fn test_version_map_keys_by_version() {
        let entity: FlowVersionsEntity = serde_json::from_value(json!({
            "versionedFlowSnapshotMetadataSet": [
                {"versionedFlowSnapshotMetadata": {"version": 2, "author": "a"}},
                {"versionedFlowSnapshotMetadata": {"version": 7}},
                {"versionedFlowSnapshotMetadata": {"version": 1}}
            ]
        }))
        .unwrap();

        let versions = entity.into_version_map();
        assert_eq!(versions.keys().copied().collect::<Vec<_>>(), vec![1, 2, 7]);
        assert_eq!(versions[&2].author.as_deref(), Some("a"));
    }
}
