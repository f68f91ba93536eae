//! HTTP implementation of the remote client.

use std::time::Duration;

use async_trait::async_trait;
use jigsync_engine::{OperationType, PendingMutation};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};

use super::{RemoteMutationClient, ServerRecord};
use crate::error::RemoteError;

/// Header carrying the entry's `client_ref`.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Header carrying the payload schema version.
pub const SCHEMA_VERSION_HEADER: &str = "X-Payload-Schema-Version";

const MAX_ERROR_BODY: usize = 512;

/// Talks to the jig tracking API over HTTP.
///
/// Routes follow the API's resource layout: creates `POST
/// /api/{entity_type}/`, updates `PUT /api/{entity_type}/{entity_id}` and
/// deletes `DELETE /api/{entity_type}/{entity_id}`.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpRemoteClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth_token: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            timeout,
        })
    }

    /// Method and URL for `mutation`.
    pub fn endpoint(&self, mutation: &PendingMutation) -> Result<(Method, String), RemoteError> {
        let entity_type = mutation.entity_type();
        let collection = format!("{}/api/{}", self.base_url, entity_type);

        let entity_url = || match mutation.envelope.entity_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(format!("{}/{}", collection, id)),
            _ => Err(RemoteError::InvalidRequest(format!(
                "{} on {} has no entity id",
                mutation.operation_type(),
                entity_type
            ))),
        };

        match mutation.operation_type() {
            OperationType::Create => Ok((Method::POST, format!("{}/", collection))),
            OperationType::Update => Ok((Method::PUT, entity_url()?)),
            OperationType::Delete => Ok((Method::DELETE, entity_url()?)),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else if e.is_builder() {
            RemoteError::InvalidRequest(e.to_string())
        } else {
            RemoteError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
impl RemoteMutationClient for HttpRemoteClient {
    async fn submit(&self, mutation: &PendingMutation) -> Result<ServerRecord, RemoteError> {
        let (method, url) = self.endpoint(mutation)?;

        let mut request = self
            .client
            .request(method, &url)
            .header(IDEMPOTENCY_HEADER, &mutation.client_ref)
            .header(
                SCHEMA_VERSION_HEADER,
                mutation.envelope.schema_version.to_string(),
            );
        if mutation.operation_type() != OperationType::Delete {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(mutation.envelope.bytes.clone());
        }
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(id = mutation.id, url = %url, "Submitting mutation");
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        if body.is_empty() {
            return Ok(ServerRecord::Null);
        }
        Ok(serde_json::from_slice(&body).unwrap_or(ServerRecord::Null))
    }
}

/// Map a non-success status to a [`RemoteError`].
///
/// 408, 429 and 5xx are worth retrying; any other 4xx is a definitive refusal.
pub fn classify_status(status: StatusCode, body: String) -> RemoteError {
    let message = truncate(body);
    let code = status.as_u16();
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteError::Server {
            status: code,
            message,
        },
        s if s.is_client_error() => RemoteError::Rejected {
            status: code,
            message,
        },
        _ => RemoteError::Server {
            status: code,
            message,
        },
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
