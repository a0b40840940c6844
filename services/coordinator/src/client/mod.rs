//! Cluster connection capability and the typed NiFi client built on it.
//!
//! - [`ClusterConnection`]: executes one raw request against a cluster
//! - [`HttpConnection`]: the reqwest implementation used in production
//! - [`MockCluster`]: scripted in-memory implementation for tests
//! - [`NifiClient`]: one typed method per remote endpoint

mod http;
mod mock;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use nfc_id::{
    AccessPolicyId, ParameterContextId, ProcessGroupId, RegistryClientId, UserGroupId, UserId,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{
    AccessPolicyDto, AccessPolicyEntity, CurrentUserEntity, FlowVersionsEntity,
    MutationRequest, ParameterContextDto, ParameterContextEntity, ParameterContextsEntity,
    ProcessGroupDto, ProcessGroupEntity, ProcessGroupsEntity, RegistryClientDto,
    RegistryClientEntity, RegistryClientsEntity, Revision, TenantEntity, UserDto, UserEntity,
    UserGroupDto, UserGroupEntity, UserGroupsEntity, UsersEntity, VersionControlInformation,
    VersionControlInformationEntity, VersionMap, VersionUpdateRequest,
};
use crate::config::{ClusterConfig, PolicyAction};

pub use http::{HttpConnection, HttpConnector};
pub use mock::MockCluster;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true for methods that change remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request, relative to the cluster's API root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,

    /// Path below the API root, with a leading slash.
    pub path: String,

    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn delete(path: impl Into<String>, revision: Revision) -> Self {
        Self::new(Method::Delete, path).with_query("version", revision.version.to_string())
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The cluster could not be talked to at all.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read {path}: {source}")]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("{method} {url} failed: {message}")]
    Request {
        method: Method,
        url: String,
        message: String,
    },
}

/// Errors returned by [`NifiClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The cluster is unreachable; the rest of its run is skipped.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The cluster rejected one operation.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: Method,
        path: String,
        status: u16,
        body: String,
    },

    /// The cluster answered with a payload we could not read.
    #[error("{method} {path} returned an unexpected payload: {source}")]
    Decode {
        method: Method,
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Executes raw requests against one cluster.
#[async_trait]
pub trait ClusterConnection: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Opens a connection for a configured cluster.
pub trait Connector: Send + Sync {
    fn connect(&self, cluster: &ClusterConfig) -> Result<Arc<dyn ClusterConnection>, TransportError>;
}

/// Typed NiFi API client for one cluster.
#[derive(Clone)]
pub struct NifiClient {
    cluster: String,
    connection: Arc<dyn ClusterConnection>,
}

impl NifiClient {
    pub fn new(cluster: impl Into<String>, connection: Arc<dyn ClusterConnection>) -> Self {
        Self {
            cluster: cluster.into(),
            connection,
        }
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.execute(&request).await?;
        self.check(request, response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(&request).await?;
        let method = request.method;
        let path = request.path.clone();
        let response = self.check(request, response)?;
        self.decode(method, path, &response)
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        debug!(
            cluster = %self.cluster,
            method = %request.method,
            path = %request.path,
            "Sending request"
        );
        Ok(self.connection.execute(request).await?)
    }

    fn check(&self, request: ApiRequest, response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            return Ok(response);
        }

        warn!(
            cluster = %self.cluster,
            method = %request.method,
            path = %request.path,
            status = response.status,
            body = %response.body,
            "Request rejected"
        );
        Err(ApiError::Status {
            method: request.method,
            path: request.path,
            status: response.status,
            body: response.body,
        })
    }

    fn decode<T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        response: &ApiResponse,
    ) -> Result<T, ApiError> {
        serde_json::from_str(&response.body).map_err(|source| {
            warn!(
                cluster = %self.cluster,
                method = %method,
                path = %path,
                error = %source,
                "Unexpected response payload"
            );
            ApiError::Decode {
                method,
                path,
                source,
            }
        })
    }

    fn body<T: Serialize>(value: &T) -> serde_json::Value {
        serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
    }

    // =========================================================================
    // Process groups
    // =========================================================================

    /// The root process group; doubles as the reachability probe.
    pub async fn root_process_group(&self) -> Result<ProcessGroupEntity, ApiError> {
        self.send_json(ApiRequest::get("/process-groups/root")).await
    }

    pub async fn process_group(&self, id: &ProcessGroupId) -> Result<ProcessGroupEntity, ApiError> {
        self.send_json(ApiRequest::get(format!("/process-groups/{id}")))
            .await
    }

    pub async fn child_process_groups(
        &self,
        parent: &ProcessGroupId,
    ) -> Result<Vec<ProcessGroupEntity>, ApiError> {
        let groups: ProcessGroupsEntity = self
            .send_json(ApiRequest::get(format!(
                "/process-groups/{parent}/process-groups"
            )))
            .await?;
        Ok(groups.process_groups)
    }

    pub async fn create_process_group(
        &self,
        parent: &ProcessGroupId,
        component: ProcessGroupDto,
    ) -> Result<ProcessGroupEntity, ApiError> {
        let body = Self::body(&MutationRequest::create(component));
        self.send_json(
            ApiRequest::new(Method::Post, format!("/process-groups/{parent}/process-groups"))
                .with_body(body),
        )
        .await
    }

    pub async fn update_process_group(
        &self,
        id: &ProcessGroupId,
        revision: Revision,
        mut component: ProcessGroupDto,
    ) -> Result<ProcessGroupEntity, ApiError> {
        component.id = Some(id.clone());
        let body = Self::body(&MutationRequest::update(id.as_str(), revision, component));
        self.send_json(ApiRequest::new(Method::Put, format!("/process-groups/{id}")).with_body(body))
            .await
    }

    pub async fn delete_process_group(
        &self,
        id: &ProcessGroupId,
        revision: Revision,
    ) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/process-groups/{id}"), revision))
            .await
            .map(drop)
    }

    // =========================================================================
    // Version control
    // =========================================================================

    pub async fn flow_versions(
        &self,
        registry: &RegistryClientId,
        bucket_id: &str,
        flow_id: &str,
    ) -> Result<VersionMap, ApiError> {
        let versions: FlowVersionsEntity = self
            .send_json(ApiRequest::get(format!(
                "/flow/registries/{registry}/buckets/{bucket_id}/flows/{flow_id}/versions"
            )))
            .await?;
        Ok(versions.into_version_map())
    }

    /// Ask the cluster to move a group to a flow version.
    ///
    /// The change is applied asynchronously; completion is not awaited.
    pub async fn submit_version_update(
        &self,
        group: &ProcessGroupId,
        revision: Revision,
        information: VersionControlInformation,
    ) -> Result<(), ApiError> {
        let body = Self::body(&VersionUpdateRequest {
            process_group_revision: revision,
            version_control_information: information,
        });
        self.send(
            ApiRequest::new(
                Method::Post,
                format!("/versions/update-requests/process-groups/{group}"),
            )
            .with_body(body),
        )
        .await
        .map(drop)
    }

    /// Detach a group from version control, returning its new revision when reported.
    ///
    /// An unreadable response is logged and reported as `None`; the caller
    /// re-reads the group instead.
    pub async fn stop_version_control(
        &self,
        group: &ProcessGroupId,
        revision: Revision,
    ) -> Result<Option<Revision>, ApiError> {
        let path = format!("/versions/process-groups/{group}");
        let response = self.send(ApiRequest::delete(path.clone(), revision)).await?;
        let entity: Option<VersionControlInformationEntity> =
            self.decode(Method::Delete, path, &response).ok();
        Ok(entity.and_then(|e| e.process_group_revision))
    }

    // =========================================================================
    // Registry clients
    // =========================================================================

    pub async fn registry_clients(&self) -> Result<Vec<RegistryClientEntity>, ApiError> {
        let registries: RegistryClientsEntity = self
            .send_json(ApiRequest::get("/controller/registry-clients"))
            .await?;
        Ok(registries.registries)
    }

    pub async fn create_registry_client(
        &self,
        component: RegistryClientDto,
    ) -> Result<RegistryClientEntity, ApiError> {
        let body = Self::body(&MutationRequest::create(component));
        self.send_json(
            ApiRequest::new(Method::Post, "/controller/registry-clients").with_body(body),
        )
        .await
    }

    pub async fn update_registry_client(
        &self,
        id: &RegistryClientId,
        revision: Revision,
        mut component: RegistryClientDto,
    ) -> Result<RegistryClientEntity, ApiError> {
        component.id = Some(id.clone());
        let body = Self::body(&MutationRequest::update(id.as_str(), revision, component));
        self.send_json(
            ApiRequest::new(Method::Put, format!("/controller/registry-clients/{id}"))
                .with_body(body),
        )
        .await
    }

    pub async fn delete_registry_client(
        &self,
        id: &RegistryClientId,
        revision: Revision,
    ) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(
            format!("/controller/registry-clients/{id}"),
            revision,
        ))
        .await
        .map(drop)
    }

    // =========================================================================
    // Parameter contexts
    // =========================================================================

    pub async fn parameter_contexts(&self) -> Result<Vec<ParameterContextEntity>, ApiError> {
        let contexts: ParameterContextsEntity = self
            .send_json(ApiRequest::get("/flow/parameter-contexts"))
            .await?;
        Ok(contexts.parameter_contexts)
    }

    pub async fn create_parameter_context(
        &self,
        component: ParameterContextDto,
    ) -> Result<ParameterContextEntity, ApiError> {
        let body = Self::body(&MutationRequest::create(component));
        self.send_json(ApiRequest::new(Method::Post, "/parameter-contexts").with_body(body))
            .await
    }

    /// Submit an asynchronous update request for a parameter context.
    pub async fn submit_parameter_context_update(
        &self,
        id: &ParameterContextId,
        revision: Revision,
        mut component: ParameterContextDto,
    ) -> Result<(), ApiError> {
        component.id = Some(id.clone());
        let body = Self::body(&MutationRequest::update(id.as_str(), revision, component));
        self.send(
            ApiRequest::new(
                Method::Post,
                format!("/parameter-contexts/{id}/update-requests"),
            )
            .with_body(body),
        )
        .await
        .map(drop)
    }

    pub async fn delete_parameter_context(
        &self,
        id: &ParameterContextId,
        revision: Revision,
    ) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/parameter-contexts/{id}"), revision))
            .await
            .map(drop)
    }

    // =========================================================================
    // Tenants
    // =========================================================================

    /// Identity the coordinator is authenticated as.
    pub async fn current_user(&self) -> Result<String, ApiError> {
        let user: CurrentUserEntity = self
            .send_json(ApiRequest::get("/flow/current-user"))
            .await?;
        Ok(user.identity)
    }

    pub async fn users(&self) -> Result<Vec<UserEntity>, ApiError> {
        let users: UsersEntity = self.send_json(ApiRequest::get("/tenants/users")).await?;
        Ok(users.users)
    }

    pub async fn create_user(&self, identity: &str) -> Result<UserEntity, ApiError> {
        let body = Self::body(&MutationRequest::create(UserDto::new(identity)));
        self.send_json(ApiRequest::new(Method::Post, "/tenants/users").with_body(body))
            .await
    }

    pub async fn delete_user(&self, id: &UserId, revision: Revision) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/tenants/users/{id}"), revision))
            .await
            .map(drop)
    }

    pub async fn user_groups(&self) -> Result<Vec<UserGroupEntity>, ApiError> {
        let groups: UserGroupsEntity = self
            .send_json(ApiRequest::get("/tenants/user-groups"))
            .await?;
        Ok(groups.user_groups)
    }

    pub async fn create_user_group(
        &self,
        identity: &str,
        members: Vec<UserId>,
    ) -> Result<UserGroupEntity, ApiError> {
        let component = UserGroupDto {
            id: None,
            identity: identity.to_string(),
            users: members.into_iter().map(TenantEntity::reference).collect(),
        };
        let body = Self::body(&MutationRequest::create(component));
        self.send_json(ApiRequest::new(Method::Post, "/tenants/user-groups").with_body(body))
            .await
    }

    pub async fn update_user_group(
        &self,
        id: &UserGroupId,
        revision: Revision,
        identity: &str,
        members: Vec<UserId>,
    ) -> Result<UserGroupEntity, ApiError> {
        let component = UserGroupDto {
            id: Some(id.clone()),
            identity: identity.to_string(),
            users: members.into_iter().map(TenantEntity::reference).collect(),
        };
        let body = Self::body(&MutationRequest::update(id.as_str(), revision, component));
        self.send_json(
            ApiRequest::new(Method::Put, format!("/tenants/user-groups/{id}")).with_body(body),
        )
        .await
    }

    pub async fn delete_user_group(
        &self,
        id: &UserGroupId,
        revision: Revision,
    ) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/tenants/user-groups/{id}"), revision))
            .await
            .map(drop)
    }

    // =========================================================================
    // Access policies
    // =========================================================================

    /// The policy governing `action` on `resource`, or `None` if there is none.
    ///
    /// The result may be an ancestor's policy; see [`AccessPolicyEntity::is_inherited`].
    pub async fn access_policy(
        &self,
        action: PolicyAction,
        resource: &str,
    ) -> Result<Option<AccessPolicyEntity>, ApiError> {
        let request = ApiRequest::get(format!("/policies/{action}{resource}"));
        let response = self.execute(&request).await?;
        if response.status == 404 {
            return Ok(None);
        }

        let method = request.method;
        let path = request.path.clone();
        let response = self.check(request, response)?;
        self.decode(method, path, &response).map(Some)
    }

    pub async fn create_access_policy(
        &self,
        component: AccessPolicyDto,
    ) -> Result<AccessPolicyEntity, ApiError> {
        let body = Self::body(&MutationRequest::create(component));
        self.send_json(ApiRequest::new(Method::Post, "/policies").with_body(body))
            .await
    }

    pub async fn update_access_policy(
        &self,
        id: &AccessPolicyId,
        revision: Revision,
        mut component: AccessPolicyDto,
    ) -> Result<AccessPolicyEntity, ApiError> {
        component.id = Some(id.clone());
        let body = Self::body(&MutationRequest::update(id.as_str(), revision, component));
        self.send_json(ApiRequest::new(Method::Put, format!("/policies/{id}")).with_body(body))
            .await
    }

    pub async fn delete_access_policy(
        &self,
        id: &AccessPolicyId,
        revision: Revision,
    ) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(format!("/policies/{id}"), revision))
            .await
            .map(drop)
    }
}
