//! HTTP status and transport error mapping.

use crate::error::{SourceError, SourceResult};
use reqwest::StatusCode;
use serde_json::Value;

/// Longest body excerpt carried into an error message.
const BODY_EXCERPT: usize = 200;

/// Map a non-success status to a source error.
///
/// 403/429 are blocks, 404 is "no data", anything else is unavailability.
pub fn status_error(status: StatusCode, body: &str) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    let excerpt: String = body.chars().take(BODY_EXCERPT).collect();
    let msg = format!("HTTP {status}: {excerpt}");
    Some(match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => SourceError::Blocked(msg),
        StatusCode::NOT_FOUND => SourceError::NotFound(msg),
        _ => SourceError::Unavailable(msg),
    })
}

/// Send a request and decode a JSON body.
pub async fn send_json(request: reqwest::RequestBuilder) -> SourceResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(format!("HTTP request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SourceError::Unavailable(format!("Failed to read body: {e}")))?;

    if let Some(err) = status_error(status, &body) {
        return Err(err);
    }

    serde_json::from_str(&body).map_err(|e| SourceError::Decode(format!("Invalid JSON: {e}")))
}
