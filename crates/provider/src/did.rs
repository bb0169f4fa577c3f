//! D-ID "talks" adapter.

use async_trait::async_trait;
use memoria_core::animation::{ProviderKind, ProviderStatus};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::http::{self, error_text, first_string};
use crate::{AnimationProvider, MediaReference};

pub struct DidProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    voice_id: Option<String>,
    webhook_url: Option<String>,
}

impl DidProvider {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        api_key: Option<String>,
        voice_id: Option<String>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            voice_id,
            webhook_url,
        }
    }

    /// Value for the `Authorization` header. D-ID keys are issued already
    /// base64-encoded.
    fn authorization(&self) -> Result<String, ProviderError> {
        self.api_key
            .as_deref()
            .map(|key| format!("Basic {key}"))
            .ok_or(ProviderError::NotConfigured { provider: "D-ID" })
    }

    fn talk_payload(&self, media: &MediaReference) -> Value {
        let mut payload = json!({
            "source_url": media.image_url,
            "script": {
                "type": "text",
                "input": media.script(),
            },
        });
        if let Some(voice) = &self.voice_id {
            payload["config"] = json!({ "voice": voice });
        }
        if let Some(webhook) = &self.webhook_url {
            payload["webhook"] = json!(webhook);
        }
        payload
    }
}

#[async_trait]
impl AnimationProvider for DidProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Did
    }

    async fn submit(&self, media: &MediaReference) -> Result<String, ProviderError> {
        let authorization = self.authorization()?;
        let response = self
            .client
            .post(format!("{}/talks", self.api_url))
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&self.talk_payload(media))
            .send()
            .await?;
        let body = http::parse_json(response).await?;

        first_string(&body, &[&["id"]])
            .ok_or_else(|| ProviderError::Malformed(format!("D-ID did not return a talk id: {body}")))
    }

    async fn check_status(
        &self,
        provider_handle: &str,
        media: &MediaReference,
    ) -> Result<ProviderStatus, ProviderError> {
        let authorization = self.authorization()?;
        let response = self
            .client
            .get(format!("{}/talks/{provider_handle}", self.api_url))
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(media_id = media.media_id, talk_id = provider_handle, "D-ID talk not found");
            return Ok(ProviderStatus::NotFound);
        }

        let body = http::parse_json(response).await?;
        Ok(parse_status_body(&body))
    }
}

/// Read a `/talks/{id}` response.
pub fn parse_status_body(body: &Value) -> ProviderStatus {
    let status = first_string(body, &[&["status"]]).unwrap_or_default();
    let url = first_string(body, &[&["result_url"]]);
    let error = error_text(body.get("error"), &["description", "kind"]);
    interpret_status(&status, url, error)
}

/// Translate D-ID's status vocabulary.
pub fn interpret_status(status: &str, url: Option<String>, error: Option<String>) -> ProviderStatus {
    match status.trim().to_ascii_lowercase().as_str() {
        "done" => ProviderStatus::Completed { result_url: url },
        "started" => ProviderStatus::InProgress,
        "created" => ProviderStatus::Pending,
        "error" | "rejected" => ProviderStatus::Failed {
            detail: error.unwrap_or_default(),
        },
        other => {
            tracing::warn!(status = other, "Unknown D-ID status, treating as in progress");
            ProviderStatus::InProgress
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn provider(api_key: Option<&str>) -> DidProvider {
        DidProvider::new(
            reqwest::Client::new(),
            "https://api.d-id.com".into(),
            api_key.map(Into::into),
            Some("en-US-JennyNeural".into()),
            Some("https://hooks.example/did".into()),
        )
    }

    fn media() -> MediaReference {
        MediaReference {
            media_id: 42,
            image_url: "https://cdn/photo.jpg".into(),
            script: Some("We miss you".into()),
        }
    }

    #[test]
    fn done_with_result_url() {
        let body = json!({ "id": "tlk_1", "status": "done", "result_url": "https://cdn/x.mp4" });
        assert_eq!(
            parse_status_body(&body),
            ProviderStatus::Completed {
                result_url: Some("https://cdn/x.mp4".into())
            }
        );
    }

    #[test]
    fn error_description_is_kept() {
        let body = json!({
            "status": "error",
            "error": { "kind": "FaceError", "description": "No face detected" }
        });
        assert_eq!(
            parse_status_body(&body),
            ProviderStatus::Failed {
                detail: "No face detected".into()
            }
        );
    }

    #[test]
    fn vocabulary_maps_to_normalized_states() {
        assert_eq!(interpret_status("created", None, None), ProviderStatus::Pending);
        assert_eq!(interpret_status("started", None, None), ProviderStatus::InProgress);
        assert_eq!(
            interpret_status("rejected", None, Some("moderation".into())),
            ProviderStatus::Failed {
                detail: "moderation".into()
            }
        );
    }

    #[test]
    fn payload_includes_voice_and_webhook() {
        let payload = provider(Some("k")).talk_payload(&media());
        assert_eq!(payload["source_url"], "https://cdn/photo.jpg");
        assert_eq!(payload["script"]["input"], "We miss you");
        assert_eq!(payload["config"]["voice"], "en-US-JennyNeural");
        assert_eq!(payload["webhook"], "https://hooks.example/did");
    }

    #[test]
    fn authorization_uses_basic_scheme() {
        assert_eq!(provider(Some("abc")).authorization().unwrap(), "Basic abc");
        assert_matches!(
            provider(None).authorization(),
            Err(ProviderError::NotConfigured { .. })
        );
    }
}
