use std::sync::LazyLock;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::types::{ClassifiedError, ErrorKey};

/// Origin used to resolve relative request URLs; only the path survives.
static RELATIVE_BASE: LazyLock<Option<Url>> =
    LazyLock::new(|| Url::parse("http://localhost/").ok());

/// A failed HTTP call as reported by the transport layer.
///
/// `status` is `0` when no response was received at all.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FailedRequest {
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: i64,
    message: String,
}

impl FailedRequest {
    pub fn error_key(&self) -> ErrorKey {
        ErrorKey::new(&normalize_url(&self.url), self.status)
    }

    fn status_text(&self) -> String {
        non_empty(self.status_text.as_deref())
            .map(str::to_string)
            .or_else(|| {
                StatusCode::from_u16(self.status)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// Turn a transport failure into the `{code, message, short_message}` shown to users.
///
/// A structured `{"error": {"code", "message"}}` body with a non-blank message is
/// used verbatim; anything else falls back to the transport message and the
/// status text.
pub fn classify(failure: &FailedRequest) -> ClassifiedError {
    if let Some(api) = failure
        .body
        .as_ref()
        .and_then(|body| ApiErrorBody::deserialize(body).ok())
        .filter(|api| non_empty(Some(api.error.message.as_str())).is_some())
    {
        return ClassifiedError {
            code: api.error.code,
            message: api.error.message,
            short_message: None,
        };
    }

    let status_text = failure.status_text();
    ClassifiedError {
        code: i64::from(failure.status),
        message: non_empty(failure.message.as_deref())
            .map_or_else(|| status_text.clone(), str::to_string),
        short_message: Some(status_text),
    }
}

/// Reduce a request URL to a stable per-endpoint path.
///
/// The `/api/v<N>` prefix, the query string and the fragment are dropped.
/// URLs that cannot be parsed are only cut at the first `?`.
pub fn normalize_url(raw: &str) -> String {
    let parsed = match RELATIVE_BASE.as_ref() {
        Some(base) => Url::options().base_url(Some(base)).parse(raw),
        None => Url::parse(raw),
    };
    match parsed {
        Ok(url) if !url.cannot_be_a_base() => strip_api_version(url.path()).to_string(),
        _ => raw.split('?').next().unwrap_or_default().to_string(),
    }
}

fn strip_api_version(path: &str) -> &str {
    let Some(rest) = path.strip_prefix("/api/v") else {
        return path;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return path;
    }
    let tail = &rest[digits..];
    if tail.starts_with('/') { tail } else { path }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}
