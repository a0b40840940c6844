mod common;

use nfc_coordinator::client::Method;
use nfc_coordinator::config::Registry;
use nfc_coordinator::sync::sync_registries;
use serde_json::json;

use common::{probed_cluster, registry_client};

fn registry(name: &str, uri: &str) -> Registry {
    Registry {
        name: name.to_string(),
        uri: uri.to_string(),
        description: String::new(),
    }
}

#[tokio::test]
async fn test_update_drifted_and_delete_undeclared() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/controller/registry-clients",
        json!({"registries": [
            registry_client("reg-a", "A", "http://old", ""),
            registry_client("reg-b", "B", "http://b", ""),
        ]}),
    );

    let report = sync_registries(&mut cluster, &[registry("A", "http://a")])
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.created, 0);

    let mutations = mock.mutations();
    assert_eq!(mutations.len(), 2);

    let update = mutations
        .iter()
        .find(|r| r.method == Method::Put)
        .unwrap();
    assert_eq!(update.path, "/controller/registry-clients/reg-a");
    let body = update.body.as_ref().unwrap();
    assert_eq!(body["component"]["uri"], "http://a");
    assert_eq!(body["revision"]["version"], 1);

    let delete = mutations
        .iter()
        .find(|r| r.method == Method::Delete)
        .unwrap();
    assert_eq!(delete.path, "/controller/registry-clients/reg-b");
    assert_eq!(delete.query_value("version"), Some("1"));
}

#[tokio::test]
async fn test_create_missing_and_cache_ids() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get("/controller/registry-clients", json!({"registries": []}));
    mock.respond_get(
        "/controller/registry-clients",
        json!({"registries": [registry_client("reg-new", "main", "http://registry", "")]}),
    );

    let report = sync_registries(&mut cluster, &[registry("main", "http://registry")])
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    let mutations = mock.mutations();
    let posted = &mutations[0];
    assert_eq!(posted.method, Method::Post);
    assert_eq!(posted.body.as_ref().unwrap()["component"]["name"], "main");

    let cached = cluster.registry("MAIN").unwrap();
    assert_eq!(cached.id.as_str(), "reg-new");
}

#[tokio::test]
async fn test_uri_compared_case_insensitively() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/controller/registry-clients",
        json!({"registries": [registry_client("reg-a", "a", "HTTP://A", "")]}),
    );

    let report = sync_registries(&mut cluster, &[registry("A", "http://a")])
        .await
        .unwrap();

    assert_eq!(report.unchanged, 1);
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_rejected_update_is_tallied_as_failed() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get(
        "/controller/registry-clients",
        json!({"registries": [registry_client("reg-a", "A", "http://old", "")]}),
    );
    mock.respond(
        Method::Put,
        "/controller/registry-clients/reg-a",
        nfc_coordinator::client::ApiResponse::new(409, "revision mismatch"),
    );

    let report = sync_registries(&mut cluster, &[registry("A", "http://a")])
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(cluster.is_reachable());
}
