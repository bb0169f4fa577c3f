//! HeyGen talking-photo adapter.
//!
//! Submission tries to upload the photo first to obtain a
//! `talking_photo_id`; if that fails for any reason the public image URL is
//! passed instead. Status is read from `GET /video/{id}`.

use async_trait::async_trait;
use memoria_core::animation::{ProviderKind, ProviderStatus};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::http::{self, error_text, first_string};
use crate::{AnimationProvider, MediaReference};

const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;

/// Voice id sent when none is configured.
const DEFAULT_VOICE_ID: &str = "default";

/// Locations HeyGen has been observed to put the new video's id.
const VIDEO_ID_PATHS: &[&[&str]] = &[
    &["data", "video_id"],
    &["data", "id"],
    &["video_id"],
    &["id"],
    &["data", "video", "id"],
];

pub struct HeyGenProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    voice_id: Option<String>,
}

impl HeyGenProvider {
    /// * `api_url` - Base URL including the version, e.g. `https://api.heygen.com/v2`.
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        api_key: Option<String>,
        voice_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            voice_id,
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured { provider: "HeyGen" })
    }

    /// Upload the photo and return its `talking_photo_id`, or `None` if any
    /// step failed.
    async fn upload_photo(&self, api_key: &str, media: &MediaReference) -> Option<String> {
        match self.try_upload_photo(api_key, &media.image_url).await {
            Ok(id) => {
                tracing::debug!(media_id = media.media_id, talking_photo_id = %id, "Uploaded photo to HeyGen");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(
                    media_id = media.media_id,
                    error = %e,
                    "HeyGen photo upload failed, falling back to photo_url",
                );
                None
            }
        }
    }

    async fn try_upload_photo(&self, api_key: &str, image_url: &str) -> Result<String, ProviderError> {
        let image = http::ensure_success(self.client.get(image_url).send().await?)
            .await?
            .bytes()
            .await?;

        let (file_name, mime) = upload_file_type(image_url);
        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name(file_name)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("photo", part);

        let response = self
            .client
            .post(format!("{}/talking_photo/upload", self.api_url))
            .header("X-Api-Key", api_key)
            .multipart(form)
            .send()
            .await?;
        let body = http::parse_json(response).await?;

        first_string(&body, &[&["data", "talking_photo_id"], &["talking_photo_id"]])
            .ok_or_else(|| ProviderError::Malformed(format!("no talking_photo_id in {body}")))
    }

    fn generate_payload(&self, media: &MediaReference, talking_photo_id: Option<String>) -> Value {
        let talking_photo = match talking_photo_id {
            Some(id) => json!({ "talking_photo_id": id }),
            None => json!({ "photo_url": media.image_url }),
        };

        json!({
            "video_inputs": [{
                "character": {
                    "type": "talking_photo",
                    "talking_photo": talking_photo,
                },
                "voice": {
                    "type": "text",
                    "input_text": media.script(),
                    "voice_id": self.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID),
                },
            }],
            "dimension": { "width": VIDEO_WIDTH, "height": VIDEO_HEIGHT },
        })
    }
}

#[async_trait]
impl AnimationProvider for HeyGenProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HeyGen
    }

    async fn submit(&self, media: &MediaReference) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let talking_photo_id = self.upload_photo(api_key, media).await;
        let payload = self.generate_payload(media, talking_photo_id);

        let response = self
            .client
            .post(format!("{}/video/generate", self.api_url))
            .header("X-Api-Key", api_key)
            .json(&payload)
            .send()
            .await?;
        let body = http::parse_json(response).await?;

        extract_video_id(&body).ok_or_else(|| {
            ProviderError::Malformed(format!("HeyGen did not return a video id: {body}"))
        })
    }

    async fn check_status(
        &self,
        provider_handle: &str,
        media: &MediaReference,
    ) -> Result<ProviderStatus, ProviderError> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/video/{provider_handle}", self.api_url))
            .header("X-Api-Key", api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(media_id = media.media_id, video_id = provider_handle, "HeyGen video not found");
            return Ok(ProviderStatus::NotFound);
        }

        let body = http::parse_json(response).await?;
        Ok(parse_status_body(&body))
    }
}

/// Upload file name and mime type for an image URL, from its extension.
/// Anything unrecognised is sent as JPEG.
pub fn upload_file_type(image_url: &str) -> (&'static str, &'static str) {
    let path = image_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => ("photo.png", "image/png"),
        Some("webp") => ("photo.webp", "image/webp"),
        _ => ("photo.jpg", "image/jpeg"),
    }
}

/// Pull the video id out of a `/video/generate` response.
pub fn extract_video_id(body: &Value) -> Option<String> {
    first_string(body, VIDEO_ID_PATHS)
}

/// Read a `/video/{id}` response. The payload is usually under `data`, but
/// some responses put the fields at the top level.
pub fn parse_status_body(body: &Value) -> ProviderStatus {
    let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);

    let status = first_string(data, &[&["status"]])
        .or_else(|| first_string(body, &[&["status"]]))
        .unwrap_or_default();
    let url = first_string(data, &[&["video_url"], &["url"]]);
    let error = error_text(body.get("error").filter(|e| !e.is_null()), &["message", "detail", "code"])
        .or_else(|| error_text(data.get("error"), &["message", "detail", "code"]));

    interpret_status(&status, url, error)
}

/// Translate HeyGen's status vocabulary.
pub fn interpret_status(status: &str, url: Option<String>, error: Option<String>) -> ProviderStatus {
    match status.trim().to_ascii_lowercase().as_str() {
        "completed" | "done" | "success" => ProviderStatus::Completed { result_url: url },
        "processing" | "in_progress" | "rendering" => ProviderStatus::InProgress,
        "pending" | "waiting" | "queued" => ProviderStatus::Pending,
        "failed" | "error" => ProviderStatus::Failed {
            detail: error.unwrap_or_default(),
        },
        "not_found" => ProviderStatus::NotFound,
        other => {
            tracing::warn!(status = other, "Unknown HeyGen status, treating as in progress");
            ProviderStatus::InProgress
        }
    }
}
