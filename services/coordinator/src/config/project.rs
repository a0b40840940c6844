//! Projects and their per-cluster environments.

use std::collections::BTreeMap;
use std::fmt;

use nfc_reconcile::NameKey;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::nullable;

/// A project: one container per cluster, holding one child container per environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Name of the registry client the flow versions come from.
    pub registry_name: String,

    pub bucket_id: String,
    pub flow_id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub clusters: Vec<ProjectCluster>,
}

impl Project {
    /// The binding of this project to the named cluster, if any.
    pub fn binding(&self, cluster_name: &str) -> Option<&ProjectCluster> {
        let key = NameKey::new(cluster_name);
        self.clusters
            .iter()
            .find(|c| NameKey::new(&c.cluster_name) == key)
    }
}

/// Binds a project to one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCluster {
    pub cluster_name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub environments: Vec<ProjectEnvironment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEnvironment {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Uncoordinated environments are only looked up, never changed.
    #[serde(default)]
    pub is_coordinated: bool,

    #[serde(default)]
    pub version: DesiredVersion,

    #[serde(default)]
    parameter_context_name: Option<String>,
}

impl ProjectEnvironment {
    pub fn new(
        name: impl Into<String>,
        version: DesiredVersion,
        parameter_context_name: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            is_coordinated: true,
            version,
            parameter_context_name,
        }
    }

    /// The referenced parameter context; an empty name counts as none.
    pub fn parameter_context_name(&self) -> Option<&str> {
        self.parameter_context_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

/// Which flow version an environment should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DesiredVersion {
    /// The highest version the registry offers.
    #[default]
    Latest,

    /// A specific version number.
    Exact(i64),
}

impl DesiredVersion {
    /// Resolve against the versions the registry offers for the flow.
    ///
    /// Returns `None` when the map is empty or the exact version is absent.
    pub fn resolve<V>(&self, available: &BTreeMap<i64, V>) -> Option<i64> {
        match self {
            Self::Latest => available.keys().next_back().copied(),
            Self::Exact(version) => available.contains_key(version).then_some(*version),
        }
    }
}

impl fmt::Display for DesiredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for DesiredVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Latest => serializer.serialize_str("latest"),
            Self::Exact(v) => serializer.serialize_i64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for DesiredVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionVisitor;

        impl Visitor<'_> for VersionVisitor {
            type Value = DesiredVersion;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"latest\" or a version number")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(DesiredVersion::Exact(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .map(DesiredVersion::Exact)
                    .map_err(|_| E::custom(format!("version {v} is out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                let v = v.trim();
                if v.eq_ignore_ascii_case("latest") {
                    return Ok(DesiredVersion::Latest);
                }
                v.parse()
                    .map(DesiredVersion::Exact)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(VersionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn versions(keys: &[i64]) -> BTreeMap<i64, ()> {
        keys.iter().map(|k| (*k, ())).collect()
    }

    #[rstest]
    #[case(DesiredVersion::Latest, &[1, 2, 7, 3], Some(7))]
    #[case(DesiredVersion::Latest, &[], None)]
    #[case(DesiredVersion::Exact(2), &[1, 2, 3], Some(2))]
    #[case(DesiredVersion::Exact(9), &[1, 2, 3], None)]
    fn test_resolve_version(
        #[case] desired: DesiredVersion,
        #[case] available: &[i64],
        #[case] expected: Option<i64>,
    ) {
        assert_eq!(desired.resolve(&versions(available)), expected);
    }

    #[rstest]
    #[case("\"latest\"", DesiredVersion::Latest)]
    #[case("\"LATEST\"", DesiredVersion::Latest)]
    #[case("4", DesiredVersion::Exact(4))]
    #[case("\"12\"", DesiredVersion::Exact(12))]
    fn test_parse_version(#[case] raw: &str, #[case] expected: DesiredVersion) {
        let parsed: DesiredVersion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_version_rejects_garbage() {
        assert!(serde_json::from_str::<DesiredVersion>("\"newest\"").is_err());
    }

    #[test]
    fn test_empty_parameter_context_name_is_none() {
        let env = ProjectEnvironment::new("dev", DesiredVersion::Latest, Some(" ".to_string()));
        assert_eq!(env.parameter_context_name(), None);
    }

    #[test]
    fn test_binding_is_case_insensitive() {
        let project = Project {
            name: "p".to_string(),
            description: String::new(),
            registry_name: "r".to_string(),
            bucket_id: "b".to_string(),
            flow_id: "f".to_string(),
            clusters: vec![ProjectCluster {
                cluster_name: "Dev".to_string(),
                environments: vec![],
            }],
        };
        assert!(project.binding("dev").is_some());
        assert!(project.binding("prod").is_none());
    }
}
