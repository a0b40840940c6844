//! Shared fixtures for coordinator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use config::FileFormat;
use nfc_coordinator::client::{ClusterConnection, Connector, TransportError};
use nfc_coordinator::cluster::Cluster;
use nfc_coordinator::config::{ClusterConfig, ClusterSecurity};
use nfc_coordinator::{Configuration, MockCluster};
use serde_json::{json, Value};

pub const ROOT_ID: &str = "root-id";
pub const COORDINATOR: &str = "CN=coordinator";

/// Hands out one scripted mock per cluster name.
#[derive(Default)]
pub struct MockConnector {
    clusters: HashMap<String, Arc<MockCluster>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable cluster whose root group answers.
    pub fn add(&mut self, name: &str) -> Arc<MockCluster> {
        let mock = Arc::new(MockCluster::new());
        mock.respond_get("/process-groups/root", process_group(ROOT_ID, "NiFi Flow", "", None, None));
        self.clusters.insert(name.to_string(), mock.clone());
        mock
    }
}

impl Connector for MockConnector {
    fn connect(&self, cluster: &ClusterConfig) -> Result<Arc<dyn ClusterConnection>, TransportError> {
        match self.clusters.get(&cluster.name) {
            Some(mock) => Ok(mock.clone() as Arc<dyn ClusterConnection>),
            None => Err(TransportError::Client(format!("no mock for {}", cluster.name))),
        }
    }
}

pub fn cluster_config(name: &str) -> ClusterConfig {
    ClusterConfig {
        name: name.to_string(),
        host_name: format!("http://{name}:8080"),
        security: ClusterSecurity::default(),
    }
}

/// A probed cluster backed by a fresh mock.
pub async fn probed_cluster(name: &str) -> (Cluster, Arc<MockCluster>) {
    let mut connector = MockConnector::new();
    let mock = connector.add(name);
    let mut cluster = Cluster::new(&cluster_config(name), mock.clone());
    assert!(cluster.probe().await);
    mock.clear_requests();
    (cluster, mock)
}

pub fn configuration(yaml: &str) -> Configuration {
    Configuration::from_str(yaml, FileFormat::Yaml).unwrap()
}

pub fn process_group(
    id: &str,
    name: &str,
    comments: &str,
    version: Option<i64>,
    parameter_context: Option<&str>,
) -> Value {
    let mut component = json!({
        "id": id,
        "name": name,
        "comments": comments,
    });
    if let Some(version) = version {
        component["versionControlInformation"] = json!({
            "groupId": id,
            "registryId": "reg-1",
            "bucketId": "bucket-1",
            "flowId": "flow-1",
            "version": version,
        });
    }
    if let Some(context) = parameter_context {
        component["parameterContext"] = json!({"id": context});
    }
    json!({"id": id, "revision": {"version": 4}, "component": component})
}

pub fn process_groups(groups: Vec<Value>) -> Value {
    json!({ "processGroups": groups })
}

pub fn registry_client(id: &str, name: &str, uri: &str, description: &str) -> Value {
    json!({
        "id": id,
        "revision": {"version": 1},
        "component": {"id": id, "name": name, "uri": uri, "description": description},
    })
}

pub fn flow_versions(versions: &[i64]) -> Value {
    let set: Vec<Value> = versions
        .iter()
        .map(|v| json!({"versionedFlowSnapshotMetadata": {"version": v, "author": "ci"}}))
        .collect();
    json!({ "versionedFlowSnapshotMetadataSet": set })
}

pub fn user(id: &str, identity: &str, policies: &[(&str, &str)]) -> Value {
    let policies: Vec<Value> = policies
        .iter()
        .map(|(action, resource)| json!({"component": {"action": action, "resource": resource}}))
        .collect();
    json!({
        "id": id,
        "revision": {"version": 0},
        "component": {"identity": identity, "accessPolicies": policies},
    })
}

pub fn access_policy(
    id: &str,
    action: &str,
    resource: &str,
    component_id: Option<&str>,
    user_ids: &[&str],
) -> Value {
    let users: Vec<Value> = user_ids.iter().map(|u| json!({"id": u})).collect();
    let mut component = json!({
        "id": id,
        "action": action,
        "resource": resource,
        "users": users,
        "userGroups": [],
    });
    if let Some(component_id) = component_id {
        component["componentReference"] = json!({"id": component_id});
    }
    json!({"id": id, "revision": {"version": 2}, "component": component})
}
