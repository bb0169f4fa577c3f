//! The slice of the media model that animation jobs depend on.
//!
//! Media items are owned by the media subsystem. The animation pipeline reads
//! them at dispatch time and writes exactly one thing back: the animated flag
//! (plus the resulting video URL) when a job succeeds.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Base URL used for provider-facing image links when no public URL is set.
/// External providers cannot reach it; it only works for local testing.
pub const FALLBACK_PUBLIC_API_URL: &str = "http://localhost:8000";

/// Image extensions the providers accept in a source URL.
const PROVIDER_IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Extension appended when the file name has none the providers accept.
const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
    Audio,
    Document,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Document => "document",
        }
    }
}

impl FromStr for MediaType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaType::Photo),
            "video" => Ok(MediaType::Video),
            "audio" => Ok(MediaType::Audio),
            "document" => Ok(MediaType::Document),
            other => Err(CoreError::Validation(format!("Unknown media type '{other}'"))),
        }
    }
}

/// A media item as seen by the animation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    pub id: DbId,
    pub memorial_id: DbId,
    pub file_name: String,
    /// Public URL when the file is hosted externally (e.g. object storage).
    pub file_url: Option<String>,
    pub media_type: MediaType,
    pub is_animated: bool,
    /// Video produced by a successful animation.
    pub animation_url: Option<String>,
}

impl Media {
    pub fn is_still_image(&self) -> bool {
        self.media_type == MediaType::Photo
    }
}

/// Build the image URL handed to an animation provider.
///
/// Externally hosted files are used as-is. Otherwise the file is served
/// through the API's media endpoint, with an extension providers accept.
pub fn resolve_image_url(media: &Media, public_api_url: Option<&str>) -> String {
    if let Some(url) = media
        .file_url
        .as_deref()
        .filter(|u| u.starts_with("https://") || u.starts_with("http://"))
    {
        return url.to_string();
    }

    let base = public_api_url
        .map(|u| u.trim_end_matches('/'))
        .filter(|u| !u.is_empty())
        .unwrap_or(FALLBACK_PUBLIC_API_URL);

    format!(
        "{base}/api/v1/media/{}.{}",
        media.id,
        provider_image_extension(&media.file_name)
    )
}

/// Lowercased extension of `file_name` if providers accept it, else `jpg`.
fn provider_image_extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| PROVIDER_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}
