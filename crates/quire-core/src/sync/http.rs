//! HTTP transport for the sync endpoints.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::{
    DeltaSyncRequest, DeltaSyncResponse, ErrorBody, QueueSyncRequest, QueueSyncResponse,
    DELTA_SYNC_PATH, PROTOCOL_HEADER, PROTOCOL_VERSION, QUEUE_SYNC_PATH,
};
use crate::util::compact_text;

use super::{SyncConfig, SyncError, SyncResult, SyncTransport};

/// JSON-over-HTTP [`SyncTransport`].
#[derive(Clone)]
pub struct HttpTransport {
    server_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("server_url", &self.server_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build a transport for the configured server.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| SyncError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            server_url: config.server_url.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    async fn post<Req, Resp>(&self, path: &str, token: &str, request: &Req) -> SyncResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(token)
            .header(PROTOCOL_HEADER, PROTOCOL_VERSION.to_string())
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|error| SyncError::Offline(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|error| response_error(&error))
    }
}

impl SyncTransport for HttpTransport {
    async fn delta_sync(
        &self,
        token: &str,
        request: &DeltaSyncRequest,
    ) -> SyncResult<DeltaSyncResponse> {
        self.post(DELTA_SYNC_PATH, token, request).await
    }

    async fn queue_sync(
        &self,
        token: &str,
        request: &QueueSyncRequest,
    ) -> SyncResult<QueueSyncResponse> {
        self.post(QUEUE_SYNC_PATH, token, request).await
    }
}

fn status_error(status: StatusCode, body: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Unauthorized,
        StatusCode::UPGRADE_REQUIRED => SyncError::ClientOutdated,
        _ => SyncError::Server {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
    }
}

/// A body that fails to arrive is a connectivity problem; one that arrives
/// but doesn't parse is a protocol problem.
fn response_error(error: &reqwest::Error) -> SyncError {
    if error.is_decode() {
        SyncError::Protocol(format!("invalid response body: {error}"))
    } else {
        SyncError::Offline(error.to_string())
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        return format!("{} ({})", payload.error.trim(), status.as_u16());
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
