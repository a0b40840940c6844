//! Desired-state configuration document.
//!
//! The document declares clusters, registries, parameter contexts,
//! projects and security. It is loaded through the `config` crate, so the
//! file format (YAML, TOML or JSON) follows the file extension.

mod project;
mod security;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use nfc_reconcile::{NameKey, SpecHash};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use project::{DesiredVersion, Project, ProjectCluster, ProjectEnvironment};
pub use security::{
    ComponentAccessPolicy, ComponentTarget, ComponentType, GlobalAccessPolicy, PolicyAction,
    Security, User, UserGroup,
};

/// Errors raised while loading the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// The complete desired state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, deserialize_with = "nullable")]
    pub clusters: Vec<ClusterConfig>,

    #[serde(default, deserialize_with = "nullable")]
    pub registries: Vec<Registry>,

    #[serde(default, deserialize_with = "nullable")]
    pub parameter_contexts: Vec<ParameterContext>,

    #[serde(default, deserialize_with = "nullable")]
    pub projects: Vec<Project>,

    #[serde(default, deserialize_with = "nullable")]
    pub security: Security,
}

/// One target cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,

    /// Base URL of the cluster, without the API root (example: https://nifi-0:8443).
    pub host_name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub security: ClusterSecurity,
}

/// Transport security for one cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSecurity {
    #[serde(default)]
    pub use_certificate: bool,

    #[serde(default)]
    pub certificate_config: Option<CertificateConfig>,
}

/// Client certificate material, all PEM encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    pub ssl_cert_file: PathBuf,
    pub ssl_key_file: PathBuf,
    pub ssl_ca_cert: PathBuf,
}

/// A flow registry client definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub name: String,
    pub uri: String,

    #[serde(default)]
    pub description: String,
}

/// A named set of parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterContext {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Only coordinated contexts are created, updated or deleted.
    #[serde(default)]
    pub is_coordinated: bool,

    #[serde(default, deserialize_with = "nullable")]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub is_sensitive: bool,

    #[serde(default)]
    pub value: Option<String>,
}

/// Treat an explicit `null` the same as a missing key.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Configuration {
    /// Load and validate the document at `path`.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let document = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .build()
            .map_err(|source| ConfigError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        let configuration: Self = document.try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Parse and validate a document held in memory.
    pub fn from_str(contents: &str, format: config::FileFormat) -> Result<Self, ConfigError> {
        let configuration: Self = config::Config::builder()
            .add_source(config::File::from_str(contents, format))
            .build()?
            .try_deserialize()?;

        configuration.validate()?;
        Ok(configuration)
    }

    /// Canonical content hash, insensitive to formatting and key order.
    pub fn spec_hash(&self) -> SpecHash {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        SpecHash::from_json(&value)
    }

    /// Look up a declared parameter context by name.
    pub fn parameter_context(&self, name: &str) -> Option<&ParameterContext> {
        let key = NameKey::new(name);
        self.parameter_contexts
            .iter()
            .find(|pc| NameKey::new(&pc.name) == key)
    }

    /// Projects bound to the named cluster.
    pub fn projects_for<'a>(&'a self, cluster_name: &'a str) -> impl Iterator<Item = &'a Project> {
        self.projects
            .iter()
            .filter(move |p| p.binding(cluster_name).is_some())
    }

    /// Check cross-references and key uniqueness, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        check_unique(
            "cluster",
            self.clusters.iter().map(|c| c.name.as_str()),
            &mut problems,
        );
        check_unique(
            "registry",
            self.registries.iter().map(|r| r.name.as_str()),
            &mut problems,
        );
        check_unique(
            "parameter context",
            self.parameter_contexts.iter().map(|pc| pc.name.as_str()),
            &mut problems,
        );
        check_unique(
            "project",
            self.projects.iter().map(|p| p.name.as_str()),
            &mut problems,
        );

        for cluster in &self.clusters {
            if cluster.security.use_certificate && cluster.security.certificate_config.is_none() {
                problems.push(format!(
                    "cluster {} sets use_certificate but has no certificate_config",
                    cluster.name
                ));
            }
        }

        for context in &self.parameter_contexts {
            check_unique(
                &format!("parameter in context {}", context.name),
                context.parameters.iter().map(|p| p.name.as_str()),
                &mut problems,
            );
        }

        for project in &self.projects {
            let registry_declared = self
                .registries
                .iter()
                .any(|r| NameKey::new(&r.name) == NameKey::new(&project.registry_name));
            if !registry_declared {
                problems.push(format!(
                    "project {} references undeclared registry {}",
                    project.name, project.registry_name
                ));
            }

            check_unique(
                &format!("cluster binding in project {}", project.name),
                project.clusters.iter().map(|c| c.cluster_name.as_str()),
                &mut problems,
            );

            for binding in &project.clusters {
                check_unique(
                    &format!(
                        "environment in project {} on cluster {}",
                        project.name, binding.cluster_name
                    ),
                    binding.environments.iter().map(|e| e.name.as_str()),
                    &mut problems,
                );

                for environment in &binding.environments {
                    if let Some(name) = environment.parameter_context_name() {
                        if self.parameter_context(name).is_none() {
                            problems.push(format!(
                                "environment {}:{} references undeclared parameter context {}",
                                project.name, environment.name, name
                            ));
                        }
                    }
                }
            }
        }

        self.security.validate(&mut problems);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

pub(crate) fn check_unique<'a>(
    what: &str,
    names: impl Iterator<Item = &'a str>,
    problems: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(NameKey::new(name)) {
            problems.push(format!("duplicate {what} {name}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const SAMPLE: &str = r#"
clusters:
  - name: dev
    host_name: http://nifi-dev:8080
  - name: prod
    host_name: https://nifi-prod:8443
    security:
      use_certificate: true
      certificate_config:
        ssl_cert_file: /certs/client.pem
        ssl_key_file: /certs/client.key
        ssl_ca_cert: /certs/ca.pem
registries:
  - name: main
    uri: http://registry:18080
    description: shared registry
parameter_contexts:
  - name: dev-params
    description: dev values
    is_coordinated: true
    parameters:
      - name: db.url
        description: database
        is_sensitive: false
        value: jdbc:postgresql://db/dev
      - name: db.password
        is_sensitive: true
        value: hunter2
  - name: legacy
    is_coordinated: false
projects:
  - name: ingest
    description: ingest pipeline
    registry_name: main
    bucket_id: bucket-1
    flow_id: flow-1
    clusters:
      - cluster_name: dev
        environments:
          - name: dev
            description: dev env
            is_coordinated: true
            version: latest
            parameter_context_name: dev-params
          - name: pinned
            is_coordinated: true
            version: 3
security:
  is_coordinated: true
  users:
    - CN=alice
    - CN=bob
  user_groups:
    - identity: admins
      members: [CN=alice]
  global_access_policies:
    - name: view the UI
      action: read
      users: [CN=alice]
  component_access_policies:
    - name: view the component
      component_type: environment
      component_name: ingest:dev
      user_groups: [admins]
      clusters: [dev]
"#;

    #[test]
    fn test_parse_sample_document() {
        let config = Configuration::from_str(SAMPLE, FileFormat::Yaml).unwrap();

        assert_eq!(config.clusters.len(), 2);
        assert!(config.clusters[1].security.use_certificate);
        assert_eq!(config.registries[0].uri, "http://registry:18080");
        assert_eq!(config.parameter_contexts[0].parameters.len(), 2);
        assert!(config.parameter_contexts[0].parameters[1].is_sensitive);
        assert!(!config.parameter_contexts[1].is_coordinated);

        let envs = &config.projects[0].clusters[0].environments;
        assert_eq!(envs[0].version, DesiredVersion::Latest);
        assert_eq!(envs[1].version, DesiredVersion::Exact(3));
        assert_eq!(envs[0].parameter_context_name(), Some("dev-params"));
        assert_eq!(envs[1].parameter_context_name(), None);

        assert!(config.security.is_coordinated);
        assert_eq!(config.security.users[1].identity, "CN=bob");
        assert_eq!(config.security.global_access_policies[0].action, PolicyAction::Read);
        assert_eq!(
            config.security.component_access_policies[0].component_type,
            ComponentType::Environment
        );
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let doc = "clusters:\n  - name: dev\n    host_name: http://nifi:8080\n";
        let config = Configuration::from_str(doc, FileFormat::Yaml).unwrap();

        assert!(config.registries.is_empty());
        assert!(config.projects.is_empty());
        assert!(!config.security.is_coordinated);
    }

    #[test]
    fn test_rejects_duplicate_registry_names() {
        let doc = r#"
clusters: []
registries:
  - name: main
    uri: http://a
  - name: MAIN
    uri: http://b
"#;
        let err = Configuration::from_str(doc, FileFormat::Yaml).unwrap_err();
        match err {
            ConfigError::Invalid(problems) => {
                assert_eq!(problems, vec!["duplicate registry MAIN".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_dangling_references() {
        let doc = r#"
clusters: []
projects:
  - name: p
    registry_name: nowhere
    bucket_id: b
    flow_id: f
    clusters:
      - cluster_name: dev
        environments:
          - name: e
            version: latest
            parameter_context_name: missing
"#;
        let err = Configuration::from_str(doc, FileFormat::Yaml).unwrap_err();
        let ConfigError::Invalid(problems) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_certificate_required_when_enabled() {
        let doc = r#"
clusters:
  - name: secure
    host_name: https://nifi:8443
    security:
      use_certificate: true
"#;
        assert!(matches!(
            Configuration::from_str(doc, FileFormat::Yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_inherited_root_policy() {
        let doc = r#"
clusters: []
security:
  is_coordinated: true
  component_access_policies:
    - name: view the component
      component_type: nifi flow
      component_name: root
      inherited: true
"#;
        let err = Configuration::from_str(doc, FileFormat::Yaml).unwrap_err();
        let ConfigError::Invalid(problems) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("root flow as inherited"));
    }

    #[test]
    fn test_spec_hash_ignores_key_order() {
        let a = Configuration::from_str(SAMPLE, FileFormat::Yaml).unwrap();
        let reordered = SAMPLE.replace(
            "  - name: main\n    uri: http://registry:18080\n",
            "  - uri: http://registry:18080\n    name: main\n",
        );
        assert_ne!(reordered, SAMPLE);
        let b = Configuration::from_str(&reordered, FileFormat::Yaml).unwrap();
        assert_eq!(a.spec_hash(), b.spec_hash());
    }

    #[test]
    fn test_projects_for_cluster() {
        let config = Configuration::from_str(SAMPLE, FileFormat::Yaml).unwrap();
        assert_eq!(config.projects_for("DEV").count(), 1);
        assert_eq!(config.projects_for("prod").count(), 0);
    }
}
