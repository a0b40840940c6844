mod common;

use nfc_coordinator::client::Method;
use nfc_coordinator::config::{User, UserGroup};
use nfc_coordinator::sync::{sync_user_groups, sync_users};
use serde_json::json;

use common::{probed_cluster, user, COORDINATOR};

#[tokio::test]
async fn test_users_never_delete_coordinator() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get("/flow/current-user", json!({"identity": COORDINATOR}));
    mock.respond_get(
        "/tenants/users",
        json!({"users": [user("u-0", COORDINATOR, &[]), user("u-9", "CN=old", &[])]}),
    );

    let report = sync_users(&mut cluster, &[User::new("CN=alice")])
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.unchanged, 1);

    let mutations = mock.mutations();
    assert_eq!(mutations.len(), 2);
    assert!(mutations
        .iter()
        .any(|r| r.method == Method::Delete && r.path == "/tenants/users/u-9"));
    assert!(!mutations.iter().any(|r| r.path == "/tenants/users/u-0"));

    let created = mutations
        .iter()
        .find(|r| r.method == Method::Post)
        .unwrap();
    assert_eq!(created.body.as_ref().unwrap()["component"]["identity"], "CN=alice");

    assert_eq!(cluster.resolved.current_identity(), Some(COORDINATOR));
    assert_eq!(
        cluster.resolved.user("cn=ALICE").map(|u| u.id.as_str()),
        Some("mock-1")
    );
    assert_eq!(
        cluster.resolved.user(COORDINATOR).map(|u| u.id.as_str()),
        Some("u-0")
    );
}

#[tokio::test]
async fn test_group_members_resolve_to_user_ids() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get("/flow/current-user", json!({"identity": COORDINATOR}));
    mock.respond_get(
        "/tenants/users",
        json!({"users": [user("u-0", COORDINATOR, &[]), user("u-1", "CN=alice", &[])]}),
    );
    mock.respond_get("/tenants/user-groups", json!({"userGroups": []}));

    sync_users(&mut cluster, &[User::new("CN=alice")])
        .await
        .unwrap();
    let group = UserGroup {
        identity: "admins".to_string(),
        members: vec!["CN=alice".to_string(), "CN=ghost".to_string()],
    };
    let report = sync_user_groups(&mut cluster, &[group]).await.unwrap();

    assert_eq!(report.created, 1);
    let mutations = mock.mutations();
    let created = &mutations[0];
    assert_eq!(created.path, "/tenants/user-groups");
    assert_eq!(
        created.body.as_ref().unwrap()["component"]["users"],
        json!([{"id": "u-1"}])
    );
    assert!(cluster.resolved.user_group("ADMINS").is_some());
}

#[tokio::test]
async fn test_group_membership_diff() {
    let (mut cluster, mock) = probed_cluster("dev").await;
    mock.respond_get("/flow/current-user", json!({"identity": COORDINATOR}));
    mock.respond_get(
        "/tenants/users",
        json!({"users": [
            user("u-0", COORDINATOR, &[]),
            user("u-1", "CN=alice", &[]),
            user("u-2", "CN=bob", &[]),
        ]}),
    );
    mock.respond_get(
        "/tenants/user-groups",
        json!({"userGroups": [
            {"id": "g-1", "revision": {"version": 7}, "component": {"identity": "admins", "users": [{"id": "u-1"}]}},
            {"id": "g-2", "revision": {"version": 1}, "component": {"identity": "ops", "users": [{"id": "u-2"}, {"id": "u-1"}]}},
        ]}),
    );

    let users = [User::new("CN=alice"), User::new("CN=bob")];
    sync_users(&mut cluster, &users).await.unwrap();
    mock.clear_requests();

    let groups = [
        UserGroup {
            identity: "admins".to_string(),
            members: vec!["CN=alice".to_string(), "CN=bob".to_string()],
        },
        UserGroup {
            identity: "ops".to_string(),
            members: vec!["CN=alice".to_string(), "CN=bob".to_string()],
        },
    ];
    let report = sync_user_groups(&mut cluster, &groups).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);

    let mutations = mock.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, Method::Put);
    assert_eq!(mutations[0].path, "/tenants/user-groups/g-1");
    assert_eq!(mutations[0].body.as_ref().unwrap()["revision"]["version"], 7);
}
