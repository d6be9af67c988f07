use std::time::Duration;

pub(super) const fn default_concurrency() -> usize {
    4
}

pub(super) const fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

pub(super) const fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

pub(super) const fn default_max_entries() -> usize {
    1_000
}

pub(super) fn default_notify_appname() -> String {
    "Errgate".to_string()
}

pub(super) const fn default_queue_bound() -> usize {
    64
}

pub(super) const fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

pub(super) fn default_silenced_endpoints() -> Vec<String> {
    vec!["/metrics".to_string(), "/dashboard/changelogs".to_string()]
}

pub(super) fn default_silenced_messages() -> Vec<String> {
    vec!["external cluster functionality is disabled".to_string()]
}
