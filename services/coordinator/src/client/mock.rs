//! Scripted in-memory cluster for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiRequest, ApiResponse, ClusterConnection, Method, TransportError};

/// A fake cluster answering from scripted routes.
///
/// Routes are keyed by method and path (the query string is ignored). A
/// route scripted several times answers in order, and its last response
/// repeats. Unscripted requests get defaults:
///
/// - `GET`: 404
/// - `POST`: 201 echoing the body with a fresh id and revision 1
/// - `PUT`: 200 echoing the body with its revision bumped
/// - `DELETE`: 200 with an empty object, or the bumped group revision when
///   stopping version control
pub struct MockCluster {
    state: Mutex<MockState>,
}

struct MockState {
    reachable: bool,
    severed: Vec<String>,
    routes: HashMap<(Method, String), VecDeque<ApiResponse>>,
    requests: Vec<ApiRequest>,
    next_id: u64,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                reachable: true,
                severed: Vec::new(),
                routes: HashMap::new(),
                requests: Vec::new(),
                next_id: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script a response for `method` and `path`.
    pub fn respond(&self, method: Method, path: impl Into<String>, response: ApiResponse) {
        self.state()
            .routes
            .entry((method, path.into()))
            .or_default()
            .push_back(response);
    }

    /// Script a 200 JSON response for a `GET`.
    pub fn respond_get(&self, path: impl Into<String>, body: Value) {
        self.respond(Method::Get, path, ApiResponse::json(200, &body));
    }

    /// Make every request fail as if the cluster were down.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().reachable = reachable;
    }

    /// Drop the connection for every request whose path starts with `prefix`.
    pub fn sever(&self, prefix: impl Into<String>) {
        self.state().severed.push(prefix.into());
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().requests.clone()
    }

    /// Every state-changing request received so far, in order.
    pub fn mutations(&self) -> Vec<ApiRequest> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.method.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn scripted(&mut self, request: &ApiRequest) -> Option<ApiResponse> {
        let queue = self
            .routes
            .get_mut(&(request.method, request.path.clone()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn default_response(&mut self, request: &ApiRequest) -> ApiResponse {
        let body = request.body.clone().unwrap_or_else(|| json!({}));
        match request.method {
            Method::Get => ApiResponse::new(404, format!("{} not found", request.path)),
            Method::Post => {
                self.next_id += 1;
                ApiResponse::json(201, &created(body, self.next_id))
            }
            Method::Put => ApiResponse::json(200, &bumped(body)),
            Method::Delete if request.path.starts_with("/versions/process-groups/") => {
                let version = request
                    .query_value("version")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                ApiResponse::json(
                    200,
                    &json!({"processGroupRevision": {"version": version + 1}}),
                )
            }
            Method::Delete => ApiResponse::json(200, &json!({})),
        }
    }
}

fn created(mut body: Value, sequence: u64) -> Value {
    if body.get("component").is_none() {
        return body;
    }
    let id = format!("mock-{sequence}");
    body["id"] = json!(id);
    body["revision"] = json!({"version": 1});
    body["component"]["id"] = json!(id);
    body
}

fn bumped(mut body: Value) -> Value {
    let version = body["revision"]["version"].as_i64().unwrap_or(0);
    if body.is_object() {
        body["revision"] = json!({"version": version + 1});
    }
    body
}

#[async_trait]
impl ClusterConnection for MockCluster {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.state();
        state.requests.push(request.clone());

        let severed = state
            .severed
            .iter()
            .any(|prefix| request.path.starts_with(prefix.as_str()));
        if !state.reachable || severed {
            return Err(TransportError::Request {
                method: request.method,
                url: request.path.clone(),
                message: "[MOCK] connection refused".to_string(),
            });
        }

        let response = match state.scripted(request) {
            Some(response) => response,
            None => state.default_response(request),
        };
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            "[MOCK] Answered request"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_play_in_order() {
        let mock = MockCluster::new();
        mock.respond(Method::Get, "/a", ApiResponse::new(200, "first"));
        mock.respond(Method::Get, "/a", ApiResponse::new(200, "second"));

        let request = ApiRequest::get("/a");
        assert_eq!(mock.execute(&request).await.unwrap().body, "first");
        assert_eq!(mock.execute(&request).await.unwrap().body, "second");
        assert_eq!(mock.execute(&request).await.unwrap().body, "second");
    }

    #[tokio::test]
    async fn test_default_post_assigns_id() {
        let mock = MockCluster::new();
        let request = ApiRequest::new(Method::Post, "/tenants/users")
            .with_body(json!({"revision": {"version": 0}, "component": {"identity": "CN=x"}}));

        let response = mock.execute(&request).await.unwrap();
        let body: Value = serde_json::from_str(&response.body).unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(body["id"], "mock-1");
        assert_eq!(body["component"]["identity"], "CN=x");
        assert_eq!(mock.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_records_and_fails() {
        let mock = MockCluster::new();
        mock.set_reachable(false);

        assert!(mock.execute(&ApiRequest::get("/x")).await.is_err());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_severed_prefix_fails_only_matching_paths() {
        let mock = MockCluster::new();
        mock.sever("/flow/parameter-contexts");

        assert!(mock
            .execute(&ApiRequest::get("/flow/parameter-contexts"))
            .await
            .is_err());
        assert_eq!(mock.execute(&ApiRequest::get("/x")).await.unwrap().status, 404);
    }
}
