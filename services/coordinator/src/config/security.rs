//! Users, groups and access policies.

use std::fmt;
use std::str::FromStr;

use nfc_reconcile::NameKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{check_unique, nullable};

/// Desired tenants and access policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Security {
    /// When false, users, groups and policies are left untouched.
    #[serde(default)]
    pub is_coordinated: bool,

    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<User>,

    #[serde(default, deserialize_with = "nullable")]
    pub user_groups: Vec<UserGroup>,

    #[serde(default, deserialize_with = "nullable")]
    pub global_access_policies: Vec<GlobalAccessPolicy>,

    #[serde(default, deserialize_with = "nullable")]
    pub component_access_policies: Vec<ComponentAccessPolicy>,
}

impl Security {
    pub(super) fn validate(&self, problems: &mut Vec<String>) {
        check_unique(
            "user",
            self.users.iter().map(|u| u.identity.as_str()),
            problems,
        );
        check_unique(
            "user group",
            self.user_groups.iter().map(|g| g.identity.as_str()),
            problems,
        );

        let global_keys: Vec<String> = self
            .global_access_policies
            .iter()
            .map(|p| format!("{} ({})", p.name, p.action))
            .collect();
        check_unique(
            "global access policy",
            global_keys.iter().map(String::as_str),
            problems,
        );

        for policy in &self.component_access_policies {
            match policy.target() {
                Ok(ComponentTarget::Root) if policy.inherited => problems.push(format!(
                    "component policy {} marks the root flow as inherited, it has no parent",
                    policy.name
                )),
                Ok(_) => {}
                Err(problem) => problems.push(problem),
            }
        }
    }
}

/// A user, declared by identity alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User {
    pub identity: String,
}

impl User {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub identity: String,

    /// Member user identities.
    #[serde(default, deserialize_with = "nullable")]
    pub members: Vec<String>,
}

/// A grant on a cluster-wide resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAccessPolicy {
    /// Human name, matched against the policy catalog.
    pub name: String,
    pub action: PolicyAction,

    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub user_groups: Vec<String>,
}

/// A grant on one process group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentAccessPolicy {
    /// Human name, matched against the component policy catalog.
    pub name: String,
    pub component_type: ComponentType,

    /// `root`, a project name, or `project:environment`.
    pub component_name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub user_groups: Vec<String>,

    /// Declare that the component should inherit this policy from its parent.
    #[serde(default)]
    pub inherited: bool,

    /// Clusters this policy applies to; empty means all.
    #[serde(default, deserialize_with = "nullable")]
    pub clusters: Vec<String>,
}

impl ComponentAccessPolicy {
    /// A root flow policy granting only the given identity.
    pub fn root(name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: ComponentType::RootFlow,
            component_name: "root".to_string(),
            users: vec![identity.into()],
            user_groups: Vec::new(),
            inherited: false,
            clusters: Vec::new(),
        }
    }

    /// Returns true if the policy is scoped to the named cluster.
    pub fn applies_to(&self, cluster_name: &str) -> bool {
        let key = NameKey::new(cluster_name);
        self.clusters.is_empty() || self.clusters.iter().any(|c| NameKey::new(c) == key)
    }

    /// Decode the targeted component from type and name.
    pub fn target(&self) -> Result<ComponentTarget, String> {
        match self.component_type {
            ComponentType::RootFlow if self.component_name.eq_ignore_ascii_case("root") => {
                Ok(ComponentTarget::Root)
            }
            ComponentType::RootFlow => Err(format!(
                "component policy {} targets nifi flow {}, only root is supported",
                self.name, self.component_name
            )),
            ComponentType::Project => Ok(ComponentTarget::Project(self.component_name.clone())),
            ComponentType::Environment => match self.component_name.split_once(':') {
                Some((project, environment))
                    if !project.is_empty() && !environment.is_empty() =>
                {
                    Ok(ComponentTarget::Environment {
                        project: project.to_string(),
                        environment: environment.to_string(),
                    })
                }
                _ => Err(format!(
                    "component policy {} names environment {}, expected project:environment",
                    self.name, self.component_name
                )),
            },
        }
    }

    pub fn targets_root(&self) -> bool {
        matches!(self.target(), Ok(ComponentTarget::Root))
    }
}

/// The component a component policy points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentTarget {
    Root,
    Project(String),
    Environment { project: String, environment: String },
}

impl fmt::Display for ComponentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("nifi flow/root"),
            Self::Project(name) => write!(f, "project/{name}"),
            Self::Environment {
                project,
                environment,
            } => write!(f, "environment/{project}:{environment}"),
        }
    }
}

/// Kind of component a policy is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    RootFlow,
    Project,
    Environment,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RootFlow => "nifi flow",
            Self::Project => "project",
            Self::Environment => "environment",
        }
    }
}

impl FromStr for ComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nifi flow" => Ok(Self::RootFlow),
            "project" => Ok(Self::Project),
            "environment" => Ok(Self::Environment),
            other => Err(format!("unknown component type {other:?}")),
        }
    }
}

/// Access policy action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyAction {
    Read,
    Write,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(format!("unknown policy action {other:?}")),
        }
    }
}

macro_rules! serde_via_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_str!(ComponentType);
serde_via_str!(PolicyAction);
