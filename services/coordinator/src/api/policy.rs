//! Access policies.

use nfc_id::{AccessPolicyId, UserGroupId, UserId};
use serde::{Deserialize, Serialize};

use super::{Revision, TenantEntity};
use crate::config::{nullable, PolicyAction};

#[derive(Debug, Clone, Deserialize)]
pub struct AccessPolicyEntity {
    pub id: AccessPolicyId,

    #[serde(default)]
    pub revision: Revision,

    pub component: AccessPolicyDto,
}

impl AccessPolicyEntity {
    /// Returns true if this record grants a different resource than `resource`,
    /// or belongs to a different component than `component_id`.
    ///
    /// The cluster answers a policy lookup with the nearest ancestor's policy
    /// when the resource has none of its own.
    pub fn is_inherited(&self, resource: &str, component_id: Option<&str>) -> bool {
        if !self.component.resource.eq_ignore_ascii_case(resource) {
            return true;
        }
        match (component_id, &self.component.component_reference) {
            (Some(target), Some(reference)) => reference.id != target,
            _ => false,
        }
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &UserId> {
        self.component.users.iter().map(|user| &user.id)
    }

    pub fn user_group_ids(&self) -> impl Iterator<Item = &UserGroupId> {
        self.component.user_groups.iter().map(|group| &group.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicyDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AccessPolicyId>,

    /// Resource path with a leading slash (example: `/process-groups/<id>`).
    pub resource: String,

    pub action: PolicyAction,

    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<TenantEntity<UserId>>,

    #[serde(default, deserialize_with = "nullable")]
    pub user_groups: Vec<TenantEntity<UserGroupId>>,

    /// The component owning the policy, reported by the cluster only.
    #[serde(default, skip_serializing)]
    pub component_reference: Option<ComponentReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentReference {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(resource: &str, reference: Option<&str>) -> AccessPolicyEntity {
        let mut component = json!({
            "resource": resource,
            "action": "read",
            "users": [{"id": "u-1", "component": {"identity": "CN=alice"}}],
            "userGroups": null
        });
        if let Some(id) = reference {
            component["componentReference"] = json!({"id": id});
        }
        serde_json::from_value(json!({"id": "ap-1", "component": component})).unwrap()
    }

    #[test]
    fn test_inherited_from_parent_component() {
        let inherited = policy("/process-groups/root-id", Some("root-id"));
        assert!(inherited.is_inherited("/process-groups/child-id", Some("child-id")));

        let own = policy("/process-groups/child-id", Some("child-id"));
        assert!(!own.is_inherited("/process-groups/child-id", Some("child-id")));
    }

    #[test]
    fn test_inherited_global_resource() {
        assert!(policy("/controller", None).is_inherited("/counters", None));
        assert!(!policy("/counters", None).is_inherited("/counters", None));
    }

    #[test]
    fn test_request_omits_component_reference() {
        let entity = policy("/flow", Some("x"));
        let body = serde_json::to_value(&entity.component).unwrap();
        assert!(body.get("componentReference").is_none());
        assert_eq!(body["userGroups"], json!([]));
        assert_eq!(entity.user_ids().count(), 1);
    }
}
