use reqwest::StatusCode;
use serde_json::Value;

use crate::classify::FailedRequest;

const BODY_PREVIEW_LIMIT: usize = 256;
const UNKNOWN_ERROR: &str = "Unknown Error";

/// Build the failure record for a non-2xx response.
///
/// The body is kept as JSON when it parses, as a string preview otherwise.
pub fn failure_from_response(url: &str, status: StatusCode, body: &[u8]) -> FailedRequest {
    let reason = status.canonical_reason().unwrap_or(UNKNOWN_ERROR);
    let body = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(body)
                .unwrap_or_else(|_| Value::String(body_preview(body))),
        )
    };
    FailedRequest {
        url: url.to_string(),
        status: status.as_u16(),
        status_text: Some(reason.to_string()),
        message: Some(format!(
            "Http failure response for {url}: {} {reason}",
            status.as_u16()
        )),
        body,
    }
}

/// Build the failure record for a request that never got a response.
pub fn failure_from_transport(url: &str, err: &reqwest::Error) -> FailedRequest {
    FailedRequest {
        url: url.to_string(),
        status: 0,
        status_text: Some(UNKNOWN_ERROR.to_string()),
        message: Some(format!("Http failure response for {url}: 0 {UNKNOWN_ERROR} ({err})")),
        body: None,
    }
}

pub fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return "<empty>".to_string();
    }
    let end = body.len().min(BODY_PREVIEW_LIMIT);
    let mut preview = String::from_utf8_lossy(&body[..end]).to_string();
    if body.len() > BODY_PREVIEW_LIMIT {
        preview.push_str("...");
    }
    preview.replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::{body_preview, failure_from_response};
    use crate::classify::classify;
    use reqwest::StatusCode;

    #[test]
    fn json_bodies_are_kept_structured() {
        let failure = failure_from_response(
            "https://c/api/v2/projects",
            StatusCode::FORBIDDEN,
            br#"{"error":{"code":403,"message":"forbidden: not a project member"}}"#,
        );
        let classified = classify(&failure);
        assert_eq!(classified.code, 403);
        assert_eq!(classified.message, "forbidden: not a project member");
    }

    #[test]
    fn plain_bodies_fall_back_to_transport_message() {
        let failure = failure_from_response(
            "https://c/api/v2/projects",
            StatusCode::BAD_GATEWAY,
            b"<html>bad gateway</html>",
        );
        let classified = classify(&failure);
        assert_eq!(classified.code, 502);
        assert_eq!(
            classified.message,
            "Http failure response for https://c/api/v2/projects: 502 Bad Gateway"
        );
        assert_eq!(classified.short_message.as_deref(), Some("Bad Gateway"));
    }

    #[test]
    fn preview_is_truncated_and_single_line() {
        let long = "x\n".repeat(300);
        let preview = body_preview(long.as_bytes());
        assert!(preview.ends_with("..."));
        assert!(!preview.contains('\n'));
        assert_eq!(body_preview(b""), "<empty>");
    }
}
