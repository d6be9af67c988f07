use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Normalised view of a failed request, as shown to the user.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClassifiedError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,
}

/// Payload handed to a notification sink.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Notification {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,
}

impl From<ClassifiedError> for Notification {
    fn from(value: ClassifiedError) -> Self {
        Self {
            message: value.message,
            short_message: value.short_message,
        }
    }
}

/// Identity of a failure: normalised request path plus HTTP status.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ErrorKey(String);

impl ErrorKey {
    pub fn new(normalized_url: &str, status: u16) -> Self {
        Self(format!("{normalized_url}|{status}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verdict of the throttle store for one observation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Notify,
    Suppress,
}

impl Decision {
    pub const fn is_suppressed(self) -> bool {
        matches!(self, Self::Suppress)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassifiedError, ErrorKey, Notification};

    #[test]
    fn error_key_joins_path_and_status() {
        let key = ErrorKey::new("/projects/abc/clusters", 503);
        assert_eq!(key.as_str(), "/projects/abc/clusters|503");
        assert_eq!(key.to_string(), key.as_str());
    }

    #[test]
    fn notification_keeps_short_message() {
        let notification = Notification::from(ClassifiedError {
            code: 404,
            message: "Http failure response".to_string(),
            short_message: Some("Not Found".to_string()),
        });
        assert_eq!(notification.short_message.as_deref(), Some("Not Found"));
    }
}
