//! HTTP client for the animation endpoints.
//!
//! Wraps `POST /api/v1/animations` and
//! `GET /api/v1/animations/{job_handle}/status` using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use memoria_core::animation::{NormalizedStatus, ProviderKind};
use memoria_core::types::DbId;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Accepted dispatch, as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchResponse {
    pub job_handle: String,
    pub provider: ProviderKind,
    pub status: NormalizedStatus,
    pub message: String,
}

/// One status reading for a job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    pub job_handle: String,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    pub status: NormalizedStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error_detail: Option<String>,
}

impl StatusReport {
    /// A report carrying only a status.
    pub fn bare(job_handle: impl Into<String>, status: NormalizedStatus) -> Self {
        Self {
            job_handle: job_handle.into(),
            provider: None,
            status,
            result_url: None,
            error_detail: None,
        }
    }
}

/// What to ask the status endpoint about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    pub job_handle: String,
    pub provider: Option<ProviderKind>,
    /// Fallback key for a handle the server has not indexed yet.
    pub media_id: Option<DbId>,
}

impl StatusQuery {
    pub fn for_dispatch(dispatched: &DispatchResponse, media_id: DbId) -> Self {
        Self {
            job_handle: dispatched.job_handle.clone(),
            provider: Some(dispatched.provider),
            media_id: Some(media_id),
        }
    }
}

/// Anything that can answer a status query. The poller only depends on this.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, query: &StatusQuery) -> Result<StatusReport, FetchError>;
}

#[derive(Serialize)]
struct AnimateBody<'a> {
    media_id: DbId,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'static str>,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

/// Upper bound on a single API request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one API deployment.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// * `base_url` - API root, e.g. `http://localhost:8000`.
    ///
    /// Every request is bounded by [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling. The
    /// caller's client should carry its own timeout.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    /// `{base_url}/api/v1/animations/{segments..}`, each segment
    /// percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["api", "v1", "animations"])
                .extend(segments);
        }
        url
    }

    /// Request animation of a photo. Returns as soon as the job is queued.
    pub async fn dispatch(
        &self,
        media_id: DbId,
        prompt: Option<&str>,
        provider: Option<ProviderKind>,
    ) -> Result<DispatchResponse, FetchError> {
        let body = AnimateBody {
            media_id,
            prompt,
            provider: provider.map(ProviderKind::as_str),
        };

        let response = self
            .client
            .post(self.endpoint(&[]))
            .json(&body)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    async fn parse_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchError> {
        let status = response.status();
        if status.is_success() {
            let envelope: DataEnvelope<T> = response.json().await?;
            return Ok(envelope.data);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.error),
            Err(_) => (None, text),
        };
        Err(FetchError::Server {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, query: &StatusQuery) -> Result<StatusReport, FetchError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(provider) = query.provider {
            params.push(("provider", provider.as_str().to_string()));
        }
        if let Some(media_id) = query.media_id {
            params.push(("media_id", media_id.to_string()));
        }

        let url = self.endpoint(&[&query.job_handle, "status"]);
        let response = self.client.get(url).query(&params).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        Self::parse_data(response).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_report_tolerates_missing_optionals() {
        let report: StatusReport =
            serde_json::from_str(r#"{"job_handle":"h1","status":"processing"}"#).unwrap();
        assert_eq!(report, StatusReport::bare("h1", NormalizedStatus::Processing));
    }

    #[test]
    fn status_report_reads_success_payload() {
        let report: StatusReport = serde_json::from_str(
            r#"{"job_handle":"h1","provider":"heygen","status":"success","result_url":"https://cdn/x.mp4"}"#,
        )
        .unwrap();
        assert_eq!(report.provider, Some(ProviderKind::HeyGen));
        assert_eq!(report.result_url.as_deref(), Some("https://cdn/x.mp4"));
    }

    #[test]
    fn dispatch_body_omits_unset_fields() {
        let body = AnimateBody {
            media_id: 42,
            prompt: None,
            provider: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"media_id":42}"#);
    }

    #[test]
    fn query_for_dispatch_carries_media_fallback() {
        let dispatched = DispatchResponse {
            job_handle: "h1".into(),
            provider: ProviderKind::HeyGen,
            status: NormalizedStatus::Pending,
            message: "started".into(),
        };
        let query = StatusQuery::for_dispatch(&dispatched, 42);
        assert_eq!(query.provider, Some(ProviderKind::HeyGen));
        assert_eq!(query.media_id, Some(42));
    }

    #[test]
    fn endpoints_ignore_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(
            client.endpoint(&[]).as_str(),
            "http://localhost:8000/api/v1/animations"
        );
        assert_eq!(
            client.endpoint(&["h1", "status"]).as_str(),
            "http://localhost:8000/api/v1/animations/h1/status"
        );
    }

    #[test]
    fn endpoints_keep_base_path_prefix() {
        let client = ApiClient::new("https://memoria.test/backend").unwrap();
        assert_eq!(
            client.endpoint(&["h1", "status"]).as_str(),
            "https://memoria.test/backend/api/v1/animations/h1/status"
        );
    }

    #[test]
    fn job_handle_is_percent_encoded_as_one_segment() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        let url = client.endpoint(&["talks/a?b#c", "status"]);

        assert_eq!(url.path(), "/api/v1/animations/talks%2Fa%3Fb%23c/status");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert_matches!(ApiClient::new("not a url"), Err(FetchError::InvalidUrl(_)));
        assert_matches!(ApiClient::new("mailto:ops@memoria.test"), Err(FetchError::InvalidUrl(_)));
    }
}
