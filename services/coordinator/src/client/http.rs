//! reqwest-backed cluster connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ApiRequest, ApiResponse, ClusterConnection, Connector, Method, TransportError};
use crate::config::ClusterConfig;

/// Suffix appended to a cluster's host name to reach the REST API.
const API_ROOT: &str = "/nifi-api";

/// Talks to one cluster over HTTPS (or plain HTTP).
pub struct HttpConnection {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConnection {
    /// Build a connection for a configured cluster.
    ///
    /// When the cluster uses certificates, the client certificate and key are
    /// presented as the client identity and the CA is trusted as a root.
    pub fn new(cluster: &ClusterConfig, timeout: Duration) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls().timeout(timeout);

        if let Some(certs) = cluster
            .security
            .certificate_config
            .as_ref()
            .filter(|_| cluster.security.use_certificate)
        {
            let mut pem = read_pem(&certs.ssl_cert_file)?;
            pem.push(b'\n');
            pem.extend(read_pem(&certs.ssl_key_file)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| TransportError::Client(format!("invalid client identity: {e}")))?;

            let ca = reqwest::Certificate::from_pem(&read_pem(&certs.ssl_ca_cert)?)
                .map_err(|e| TransportError::Client(format!("invalid CA certificate: {e}")))?;

            builder = builder.identity(identity).add_root_certificate(ca);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("{}{}", cluster.host_name.trim_end_matches('/'), API_ROOT),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::ReadCertificate {
        path: path.to_path_buf(),
        source,
    })
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl ClusterConnection for HttpConnection {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let failed = |e: reqwest::Error| TransportError::Request {
            method: request.method,
            url: url.clone(),
            message: e.to_string(),
        };

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(failed)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(failed)?;

        debug!(method = %request.method, url = %url, status, "Received response");
        Ok(ApiResponse { status, body })
    }
}

/// Opens [`HttpConnection`]s with a shared request timeout.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, cluster: &ClusterConfig) -> Result<Arc<dyn ClusterConnection>, TransportError> {
        Ok(Arc::new(HttpConnection::new(cluster, self.timeout)?))
    }
}
