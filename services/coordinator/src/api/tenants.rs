//! Users, user groups and the current user.

use nfc_id::{UserGroupId, UserId};
use serde::{Deserialize, Serialize};

use super::Revision;
use crate::config::{nullable, PolicyAction};

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUserEntity {
    pub identity: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsersEntity {
    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<UserEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntity {
    pub id: UserId,

    #[serde(default)]
    pub revision: Revision,

    pub component: UserDto,
}

impl UserEntity {
    /// Returns true if one of the user's effective policies grants `action` on `resource`.
    pub fn holds_policy(&self, action: PolicyAction, resource: &str) -> bool {
        self.component.access_policies.iter().any(|summary| {
            summary.component.action == action
                && summary.component.resource.eq_ignore_ascii_case(resource)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub identity: String,

    /// Effective policies, reported by the cluster only.
    #[serde(default, deserialize_with = "nullable", skip_serializing)]
    pub access_policies: Vec<AccessPolicySummaryEntity>,
}

impl UserDto {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            access_policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessPolicySummaryEntity {
    pub component: AccessPolicySummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessPolicySummary {
    pub action: PolicyAction,
    pub resource: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupsEntity {
    #[serde(default, deserialize_with = "nullable")]
    pub user_groups: Vec<UserGroupEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserGroupEntity {
    pub id: UserGroupId,

    #[serde(default)]
    pub revision: Revision,

    pub component: UserGroupDto,
}

impl UserGroupEntity {
    pub fn member_ids(&self) -> impl Iterator<Item = &UserId> {
        self.component.users.iter().map(|member| &member.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroupDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserGroupId>,

    pub identity: String,

    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<TenantEntity<UserId>>,
}

/// A user or group as referenced from a group or a policy.
///
/// Requests only carry the id; responses also carry the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEntity<I> {
    pub id: I,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<TenantDto>,
}

impl<I> TenantEntity<I> {
    pub fn reference(id: I) -> Self {
        Self {
            id,
            component: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantDto {
    pub identity: String,
}
