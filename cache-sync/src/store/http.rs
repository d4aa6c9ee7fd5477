//! HTTP object store client.
//!
//! Objects are written with `PUT {endpoint}/{remote_path}`; metadata travels as
//! `x-meta-<key>` headers.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error};

use super::{ObjectStore, PutRequest, StoreError};

/// Prefix for user metadata headers.
const METADATA_HEADER_PREFIX: &str = "x-meta-";

pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpObjectStore {
    /// Create a client for `endpoint`. `timeout` of `None` keeps reqwest's defaults.
    pub fn new(
        endpoint: &str,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn object_url(&self, remote_path: &str) -> String {
        format!("{}/{}", self.endpoint, remote_path.trim_start_matches('/'))
    }
}

/// Translate a non-success response into a store error.
fn status_error(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized(body),
        StatusCode::FORBIDDEN => StoreError::Forbidden(body),
        _ => StoreError::Rejected {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, request: PutRequest) -> Result<(), StoreError> {
        let url = self.object_url(&request.remote_path);

        let mut builder = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type.as_str())
            .header(reqwest::header::CONTENT_LENGTH, request.content_length.to_string());

        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        for (key, value) in &request.metadata {
            builder = builder.header(format!("{}{}", METADATA_HEADER_PREFIX, key), value.as_str());
        }

        let response = builder
            .body(reqwest::Body::wrap_stream(request.body))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("PUT {} -> {}", url, status);
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!("PUT {} failed with status {}: {}", url, status, body);
        Err(status_error(status, body))
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}
