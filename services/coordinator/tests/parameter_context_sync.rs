mod common;

use nfc_coordinator::client::Method;
use nfc_coordinator::config::{Parameter, ParameterContext};
use nfc_coordinator::sync::sync_parameter_contexts;
use serde_json::{json, Value};

use common::probed_cluster;

fn context(name: &str, is_coordinated: bool, value: &str) -> ParameterContext {
    ParameterContext {
        name: name.to_string(),
        description: "ingest settings".to_string(),
        is_coordinated,
        parameters: vec![
            Parameter {
                name: "db.url".to_string(),
                description: "database".to_string(),
                is_sensitive: false,
                value: Some(value.to_string()),
            },
            Parameter {
                name: "db.password".to_string(),
                description: String::new(),
                is_sensitive: true,
                value: Some("hunter2".to_string()),
            },
        ],
    }
}

fn remote_context(id: &str, name: &str, value: &str) -> Value {
    json!({
        "id": id,
        "revision": {"version": 3},
        "component": {
            "id": id,
            "name": name,
            "description": "ingest settings",
            "parameters": [
                {"parameter": {"name": "db.url", "description": "database", "sensitive": false, "value": value}},
                {"parameter": {"name": "db.password", "description": "", "sensitive": true, "value": "********"}}
            ]
        }
    })
}

#[tokio::test]
async fn test_changed_value_submits_one_update_request() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/flow/parameter-contexts",
        json!({"parameterContexts": [remote_context("pc-1", "ingest", "jdbc:old")]}),
    );

    let report = sync_parameter_contexts(&mut cluster, &[context("ingest", true, "jdbc:new")])
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    let mutations = mock.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, Method::Post);
    assert_eq!(mutations[0].path, "/parameter-contexts/pc-1/update-requests");

    let body = mutations[0].body.as_ref().unwrap();
    assert_eq!(body["revision"]["version"], 3);
    assert_eq!(body["component"]["id"], "pc-1");
}

#[tokio::test]
async fn test_masked_sensitive_value_is_not_drift() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/flow/parameter-contexts",
        json!({"parameterContexts": [remote_context("pc-1", "ingest", "jdbc:same")]}),
    );

    let report = sync_parameter_contexts(&mut cluster, &[context("ingest", true, "jdbc:same")])
        .await
        .unwrap();

    assert_eq!(report.unchanged, 1);
    assert!(mock.mutations().is_empty());
    assert_eq!(
        cluster.resolved.parameter_context("ingest").map(|id| id.as_str()),
        Some("pc-1")
    );
}

#[tokio::test]
async fn test_uncoordinated_contexts_are_read_only() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/flow/parameter-contexts",
        json!({"parameterContexts": [remote_context("pc-1", "legacy", "jdbc:anything")]}),
    );

    let desired = [
        context("legacy", false, "jdbc:other"),
        context("missing", false, "jdbc:other"),
    ];
    let report = sync_parameter_contexts(&mut cluster, &desired).await.unwrap();

    assert!(mock.mutations().is_empty());
    assert_eq!(report.mutations(), 0);
    assert!(cluster.resolved.parameter_context("legacy").is_some());
    assert!(cluster.resolved.parameter_context("missing").is_none());
}

#[tokio::test]
async fn test_create_and_delete() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/flow/parameter-contexts",
        json!({"parameterContexts": [remote_context("pc-9", "stale", "x")]}),
    );

    let report = sync_parameter_contexts(&mut cluster, &[context("fresh", true, "jdbc:new")])
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.deleted, 1);

    let mutations = mock.mutations();
    assert!(mutations
        .iter()
        .any(|r| r.method == Method::Delete && r.path == "/parameter-contexts/pc-9"));
    let created = mutations
        .iter()
        .find(|r| r.method == Method::Post)
        .unwrap();
    assert_eq!(created.path, "/parameter-contexts");
    assert_eq!(
        created.body.as_ref().unwrap()["component"]["parameters"][1]["parameter"]["sensitive"],
        true
    );
    assert!(cluster.resolved.parameter_context("fresh").is_some());
}
