//! REST operations against the backend log API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use pipewatch_core::types::{ApiAck, LogBatch, SearchRequest, SearchResponse};
use pipewatch_core::{
    BuildId, CollectionStatus, LogPage, LogQuery, LogSource, RawLogEvent, SourceError,
    SourceResult, StreamHandle,
};

use crate::config::ClientConfig;
use crate::stream;

/// Versioned base path every endpoint lives under.
const API_BASE: &str = "/api/v1";

/// Stateless client for the backend log API.
///
/// One instance per session controller; constructed, not shared as a
/// process-wide singleton, so per-build isolation stays testable.
#[derive(Debug, Clone)]
pub struct LogApiClient {
    http: reqwest::Client,
    /// Separate client for the push stream: no total request timeout,
    /// long read timeout between frames.
    stream_http: reqwest::Client,
    base_url: String,
}

impl LogApiClient {
    /// # Errors
    ///
    /// Fails on invalid configuration or if the underlying HTTP clients
    /// cannot be constructed.
    pub fn new(config: ClientConfig) -> SourceResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(SourceError::transport)?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.stream_read_timeout_ms))
            .build()
            .map_err(SourceError::transport)?;

        Ok(Self {
            http,
            stream_http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Construct from `PIPEWATCH_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`LogApiClient::new`].
    pub fn from_env() -> SourceResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_BASE}{path}", self.base_url)
    }

    /// Signal the backend to begin capturing logs for `build`.
    pub async fn start_collection(&self, build: &BuildId) -> SourceResult<()> {
        let url = self.url(&format!("/logs/builds/{build}/start"));
        debug!(build_id = %build, "starting log collection");
        let response = self.http.post(&url).send().await.map_err(SourceError::transport)?;
        let ack: ApiAck = check_json(response).await?;
        require_ack(ack)
    }

    /// Signal the backend to stop capturing logs for `build`.
    pub async fn stop_collection(&self, build: &BuildId) -> SourceResult<()> {
        let url = self.url(&format!("/logs/builds/{build}/stop"));
        debug!(build_id = %build, "stopping log collection");
        let response = self.http.post(&url).send().await.map_err(SourceError::transport)?;
        let ack: ApiAck = check_json(response).await?;
        require_ack(ack)
    }

    /// Collection status for `build`.
    pub async fn status(&self, build: &BuildId) -> SourceResult<CollectionStatus> {
        let url = self.url(&format!("/logs/builds/{build}/status"));
        let response = self.http.get(&url).send().await.map_err(SourceError::transport)?;
        check_json(response).await
    }

    /// Up to `limit` most recent raw events for `build`.
    pub async fn recent_logs(&self, build: &BuildId, limit: usize) -> SourceResult<Vec<RawLogEvent>> {
        let url = self.url(&format!("/logs/builds/{build}/recent"));
        let response = self
            .http
            .get(&url)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(SourceError::transport)?;
        let batch: LogBatch = check_json(response).await?;
        require_batch(batch)
    }

    /// The full current cache snapshot for `build`.
    pub async fn cached_logs(&self, build: &BuildId) -> SourceResult<Vec<RawLogEvent>> {
        let url = self.url(&format!("/logs/builds/{build}"));
        let response = self.http.get(&url).send().await.map_err(SourceError::transport)?;
        let batch: LogBatch = check_json(response).await?;
        require_batch(batch)
    }

    /// Unified paginated read; the backend chooses live cache or archive
    /// and applies `query`'s filters server-side.
    pub async fn get_logs(&self, build: &BuildId, query: &LogQuery) -> SourceResult<LogPage> {
        let url = self.url(&format!("/logs/{build}"));
        let mut request = self.http.get(&url).query(&[
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ]);
        if let Some(levels) = query.levels_param() {
            request = request.query(&[("levels", levels)]);
        }
        if let Some(search) = &query.search {
            request = request
                .query(&[("search", search.as_str())])
                .query(&[("regex", if query.regex { "true" } else { "false" })]);
        }
        let response = request.send().await.map_err(SourceError::transport)?;
        check_json(response).await
    }

    /// Server-side full-text/regex search. The client only renders the
    /// results.
    pub async fn search(&self, build: &BuildId, request: &SearchRequest) -> SourceResult<SearchResponse> {
        let url = self.url(&format!("/logs/{build}/search"));
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(SourceError::transport)?;
        check_json(response).await
    }

    /// Open one push-stream connection for `build`.
    pub async fn open_stream(&self, build: &BuildId) -> SourceResult<StreamHandle> {
        let url = self.url(&format!("/logs/builds/{build}/stream"));
        stream::open(self.stream_http.clone(), url, build.clone()).await
    }
}

#[async_trait]
impl LogSource for LogApiClient {
    async fn start_collection(&self, build: &BuildId) -> SourceResult<()> {
        Self::start_collection(self, build).await
    }

    async fn stop_collection(&self, build: &BuildId) -> SourceResult<()> {
        Self::stop_collection(self, build).await
    }

    async fn status(&self, build: &BuildId) -> SourceResult<CollectionStatus> {
        Self::status(self, build).await
    }

    async fn recent_logs(&self, build: &BuildId, limit: usize) -> SourceResult<Vec<RawLogEvent>> {
        Self::recent_logs(self, build, limit).await
    }

    async fn cached_logs(&self, build: &BuildId) -> SourceResult<Vec<RawLogEvent>> {
        Self::cached_logs(self, build).await
    }

    async fn archived_logs(&self, build: &BuildId, query: &LogQuery) -> SourceResult<LogPage> {
        Self::get_logs(self, build, query).await
    }

    async fn open_stream(&self, build: &BuildId) -> SourceResult<StreamHandle> {
        Self::open_stream(self, build).await
    }
}

/// Structured error body some endpoints return on non-2xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn check_json<T: DeserializeOwned>(response: Response) -> SourceResult<T> {
    if response.status().is_success() {
        response.json::<T>().await.map_err(SourceError::decode)
    } else {
        Err(api_error(response).await)
    }
}

/// Translate a non-2xx response into a typed error, keeping the backend's
/// machine-readable code and Retry-After hint when present.
async fn api_error(response: Response) -> SourceError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    let (code, message) = serde_json::from_str::<ErrorBody>(&body).map_or_else(
        |_| (None, None),
        |parsed| (parsed.code, parsed.message.or(parsed.error)),
    );
    let message = message.unwrap_or_else(|| {
        if body.is_empty() {
            format!("http status {status}")
        } else {
            body
        }
    });

    SourceError::Api {
        status,
        code,
        message,
        retry_after,
    }
}

fn require_ack(ack: ApiAck) -> SourceResult<()> {
    if ack.success {
        Ok(())
    } else {
        Err(SourceError::Api {
            status: 200,
            code: Some("rejected".into()),
            message: ack.message.unwrap_or_else(|| "request rejected".into()),
            retry_after: None,
        })
    }
}

fn require_batch(batch: LogBatch) -> SourceResult<Vec<RawLogEvent>> {
    if batch.success {
        Ok(batch.data)
    } else {
        Err(SourceError::Api {
            status: 200,
            code: Some("rejected".into()),
            message: "batch request rejected".into(),
            retry_after: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let client = LogApiClient::new(ClientConfig::new("http://ci.example.com/")).unwrap();
        assert_eq!(
            client.url("/logs/builds/b1/start"),
            "http://ci.example.com/api/v1/logs/builds/b1/start"
        );
    }

    #[test]
    fn require_ack_maps_rejection() {
        assert!(require_ack(ApiAck { success: true, message: None }).is_ok());
        let err = require_ack(ApiAck {
            success: false,
            message: Some("already stopped".into()),
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Api { code: Some(code), message, .. }
                if code == "rejected" && message == "already stopped"
        ));
    }
}
