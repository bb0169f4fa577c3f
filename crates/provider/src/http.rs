//! Response handling shared by the provider adapters.

use serde_json::Value;

use crate::error::ProviderError;

/// Map a non-2xx status code and body to a [`ProviderError`].
///
/// - 408, 429 and 5xx are transient: [`ProviderError::Unavailable`].
/// - Every other 4xx is the provider refusing the request: [`ProviderError::Rejected`].
pub fn classify_status(status: u16, body: String) -> ProviderError {
    match status {
        408 | 429 | 500..=599 => ProviderError::Unavailable(format!("HTTP {status}: {body}")),
        _ => ProviderError::Rejected { status, body },
    }
}

/// Return the response unchanged on success, otherwise a classified error
/// carrying the body text.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(classify_status(status.as_u16(), body))
}

/// Parse a successful response as loosely-typed JSON.
pub async fn parse_json(response: reqwest::Response) -> Result<Value, ProviderError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(format!("{e}: {text}")))
}

/// First non-empty string found at any of `paths` (each a list of object keys).
pub fn first_string(body: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |node, key| node.get(*key))
            .and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    })
}

/// Human-readable error text from a provider's `error` field, which may be
/// a plain string or an object.
pub fn error_text(error: Option<&Value>, object_keys: &[&str]) -> Option<String> {
    match error? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        obj @ Value::Object(_) => object_keys
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .or_else(|| Some(obj.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn client_errors_are_rejections() {
        for status in [400, 401, 402, 403, 404, 422] {
            assert_matches!(
                classify_status(status, "nope".into()),
                ProviderError::Rejected { status: s, .. } if s == status
            );
        }
    }

    #[test]
    fn throttling_and_server_errors_are_unavailable() {
        for status in [408, 429, 500, 502, 503] {
            assert_matches!(
                classify_status(status, String::new()),
                ProviderError::Unavailable(_)
            );
        }
    }

    #[test]
    fn first_string_follows_paths_in_order() {
        let body = json!({ "data": { "id": "inner" }, "id": "outer" });
        assert_eq!(
            first_string(&body, &[&["data", "video_id"], &["data", "id"], &["id"]]),
            Some("inner".into())
        );
        assert_eq!(first_string(&body, &[&["missing"]]), None);
    }

    #[test]
    fn first_string_skips_blank_values() {
        let body = json!({ "data": { "video_id": "" }, "video_id": "v-1" });
        assert_eq!(
            first_string(&body, &[&["data", "video_id"], &["video_id"]]),
            Some("v-1".into())
        );
    }

    #[test]
    fn error_text_prefers_named_keys() {
        let err = json!({ "kind": "FaceError", "description": "No face detected" });
        assert_eq!(
            error_text(Some(&err), &["description", "kind"]),
            Some("No face detected".into())
        );
        assert_eq!(
            error_text(Some(&json!("quota_exceeded")), &["message"]),
            Some("quota_exceeded".into())
        );
        assert_eq!(error_text(Some(&Value::Null), &["message"]), None);
        assert_eq!(error_text(None, &["message"]), None);
    }
}
