use std::borrow::Cow;

use regex::Regex;
use tracing::debug;

const INVALID_CREDENTIALS: &str = "Invalid credentials provided";
const INSUFFICIENT_PERMISSIONS: &str = "Insufficient permissions for the provided credentials";
const QUOTA_EXCEEDED: &str = "Cloud provider quota exceeded";

/// Ordered `(pattern, canonical message)` pairs; the first match wins.
const BUILTIN_RULES: &[(&str, &str)] = &[
    ("AccessKeyId.*is not valid", INVALID_CREDENTIALS),
    ("InvalidClientTokenId", INVALID_CREDENTIALS),
    ("SignatureDoesNotMatch", INVALID_CREDENTIALS),
    ("AuthFailure", INVALID_CREDENTIALS),
    ("UnrecognizedClientException", INVALID_CREDENTIALS),
    ("AADSTS7000215", INVALID_CREDENTIALS),
    ("AADSTS700016", INVALID_CREDENTIALS),
    ("AADSTS90002", INVALID_CREDENTIALS),
    ("invalid_client", INVALID_CREDENTIALS),
    ("invalid_grant", INVALID_CREDENTIALS),
    ("Unable to authenticate you", INVALID_CREDENTIALS),
    ("The request you have made requires authentication", INVALID_CREDENTIALS),
    (
        "Cannot complete login due to an incorrect user name or password",
        INVALID_CREDENTIALS,
    ),
    ("failed to get token", INVALID_CREDENTIALS),
    ("QuotaExceeded", QUOTA_EXCEEDED),
    ("LimitExceeded", QUOTA_EXCEEDED),
    ("AuthorizationFailed", INSUFFICIENT_PERMISSIONS),
    ("UnauthorizedOperation", INSUFFICIENT_PERMISSIONS),
    ("Permission.*denied", INSUFFICIENT_PERMISSIONS),
    (r"^Forbidden\b", INSUFFICIENT_PERMISSIONS),
    (r"^Unauthorized\b", "You are not authorized to perform this operation"),
];

#[derive(Clone, Debug)]
struct RemapRule {
    pattern_lower: String,
    regex: Option<Regex>,
    canonical: String,
}

impl RemapRule {
    fn new(pattern: &str, canonical: &str) -> Self {
        let regex = match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                debug!(pattern, error = %err, "remap pattern is not a regex, matching as text only");
                None
            }
        };
        Self {
            pattern_lower: pattern.to_lowercase(),
            regex,
            canonical: canonical.to_string(),
        }
    }

    fn matches(&self, message: &str, message_lower: &str) -> bool {
        message_lower.contains(&self.pattern_lower)
            || self.regex.as_ref().is_some_and(|re| re.is_match(message))
    }
}

/// Rewrites known provider error text into user-facing canonical messages.
#[derive(Clone, Debug)]
pub struct MessageRemapper {
    rules: Vec<RemapRule>,
}

impl Default for MessageRemapper {
    fn default() -> Self {
        Self::with_rules(std::iter::empty::<(&str, &str)>())
    }
}

impl MessageRemapper {
    /// Build a remapper whose `rules` take priority over the built-in table.
    pub fn with_rules<I, P, M>(rules: I) -> Self
    where
        I: IntoIterator<Item = (P, M)>,
        P: AsRef<str>,
        M: AsRef<str>,
    {
        let mut compiled: Vec<RemapRule> = rules
            .into_iter()
            .filter(|(pattern, _)| !pattern.as_ref().is_empty())
            .map(|(pattern, canonical)| RemapRule::new(pattern.as_ref(), canonical.as_ref()))
            .collect();
        compiled.extend(
            BUILTIN_RULES
                .iter()
                .map(|(pattern, canonical)| RemapRule::new(pattern, canonical)),
        );
        Self { rules: compiled }
    }

    /// Only the given rules, without the built-in table.
    pub fn from_rules_only<I, P, M>(rules: I) -> Self
    where
        I: IntoIterator<Item = (P, M)>,
        P: AsRef<str>,
        M: AsRef<str>,
    {
        Self {
            rules: rules
                .into_iter()
                .filter(|(pattern, _)| !pattern.as_ref().is_empty())
                .map(|(pattern, canonical)| RemapRule::new(pattern.as_ref(), canonical.as_ref()))
                .collect(),
        }
    }

    pub fn remap<'a>(&self, message: &'a str) -> Cow<'a, str> {
        let lower = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(message, &lower))
            .map_or(Cow::Borrowed(message), |rule| {
                Cow::Owned(rule.canonical.clone())
            })
    }
}
