use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{Decision, ErrorKey};

use super::ThrottlingConfig;

pub(crate) const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// One observation of a failed request, as fed to [`ThrottleStore::observe`].
#[derive(Clone, Copy, Debug)]
pub struct Observation<'a> {
    pub key: &'a ErrorKey,
    pub status: u16,
    pub message: &'a str,
    pub url: &'a str,
}

/// Tracking state for one `(endpoint, status)` key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEntry {
    pub error_key: ErrorKey,
    pub notifications_displayed: u32,
    pub last_occurrence: Instant,
    /// Relative to the last displayed notification, not the last occurrence.
    pub next_notification: Instant,
    pub last_error_message: String,
    pub last_status: u16,
    pub last_failed_url: String,
}

/// Bounded map of [`ErrorEntry`] applying per-key exponential backoff.
///
/// Expired entries are only evicted when an insert finds the map full.
#[derive(Debug)]
pub struct ThrottleStore {
    entries: HashMap<ErrorKey, ErrorEntry>,
    max_entries: usize,
}

impl Default for ThrottleStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ThrottleStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn observe(
        &mut self,
        config: &ThrottlingConfig,
        observation: Observation<'_>,
        now: Instant,
    ) -> Decision {
        if !config.enable_throttling {
            return Decision::Notify;
        }

        let Some(entry) = self.entries.get_mut(observation.key) else {
            if self.entries.len() >= self.max_entries {
                let removed = sweep_expired(&mut self.entries, now, config.entry_expiration);
                debug!(
                    removed,
                    remaining = self.entries.len(),
                    "throttle store full, swept expired entries"
                );
            }
            self.entries.insert(
                observation.key.clone(),
                ErrorEntry {
                    error_key: observation.key.clone(),
                    notifications_displayed: 1,
                    last_occurrence: now,
                    next_notification: now + config.initial_delay,
                    last_error_message: observation.message.to_string(),
                    last_status: observation.status,
                    last_failed_url: observation.url.to_string(),
                },
            );
            return Decision::Notify;
        };

        let previous_status = entry.last_status;
        entry.last_occurrence = now;
        entry.last_error_message.clear();
        entry.last_error_message.push_str(observation.message);
        entry.last_status = observation.status;
        entry.last_failed_url.clear();
        entry.last_failed_url.push_str(observation.url);

        if previous_status != observation.status {
            entry.notifications_displayed = 1;
            entry.next_notification = now + config.initial_delay;
            return Decision::Notify;
        }

        if now < entry.next_notification {
            return Decision::Suppress;
        }

        entry.notifications_displayed = entry.notifications_displayed.saturating_add(1);
        entry.next_notification = now + backoff_window(config, entry.notifications_displayed);
        Decision::Notify
    }

    pub fn sweep_expired(&mut self, now: Instant, expiration: Duration) -> usize {
        sweep_expired(&mut self.entries, now, expiration)
    }

    pub fn get(&self, key: &ErrorKey) -> Option<&ErrorEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Window before the next notification once `displayed` notifications were shown:
/// `min(initial_delay * multiplier^(displayed - 1), max_delay)`.
pub fn backoff_window(config: &ThrottlingConfig, displayed: u32) -> Duration {
    let exponent = i32::try_from(displayed.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::try_from_secs_f64(secs).map_or(config.max_delay, |d| d.min(config.max_delay))
}

/// Remove every entry whose last occurrence is older than `expiration`.
pub fn sweep_expired(
    entries: &mut HashMap<ErrorKey, ErrorEntry>,
    now: Instant,
    expiration: Duration,
) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| now.saturating_duration_since(entry.last_occurrence) <= expiration);
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::{ErrorEntry, Observation, ThrottleStore, backoff_window, sweep_expired};
    use crate::throttle::ThrottlingConfig;
    use crate::types::{Decision, ErrorKey};
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    const fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn scenario_config() -> ThrottlingConfig {
        ThrottlingConfig {
            initial_delay: ms(60_000),
            max_delay: ms(240_000),
            backoff_multiplier: 2.0,
            cleanup_interval: ms(600_000),
            entry_expiration: ms(3_600_000),
            enable_throttling: true,
        }
    }

    fn observe(
        store: &mut ThrottleStore,
        config: &ThrottlingConfig,
        key: &ErrorKey,
        status: u16,
        now: Instant,
    ) -> Decision {
        store.observe(
            config,
            Observation {
                key,
                status,
                message: "boom",
                url: "https://console/api/v2/projects",
            },
            now,
        )
    }

    fn entry<'a>(store: &'a ThrottleStore, key: &ErrorKey) -> &'a ErrorEntry {
        match store.get(key) {
            Some(entry) => entry,
            None => panic!("entry for {key} should exist"),
        }
    }

    #[test]
    fn first_occurrence_notifies_then_window_suppresses() {
        let config = scenario_config();
        let mut store = ThrottleStore::default();
        let key = ErrorKey::new("/projects", 500);
        let t0 = Instant::now();

        assert_eq!(observe(&mut store, &config, &key, 500, t0), Decision::Notify);
        assert_eq!(entry(&store, &key).next_notification, t0 + ms(60_000));

        assert_eq!(
            observe(&mut store, &config, &key, 500, t0 + ms(30_000)),
            Decision::Suppress
        );
        let tracked = entry(&store, &key);
        assert_eq!(tracked.notifications_displayed, 1);
        assert_eq!(tracked.last_occurrence, t0 + ms(30_000));

        assert_eq!(
            observe(&mut store, &config, &key, 500, t0 + ms(70_000)),
            Decision::Notify
        );
        let tracked = entry(&store, &key);
        assert_eq!(tracked.notifications_displayed, 2);
        assert_eq!(tracked.next_notification, t0 + ms(190_000));
    }

    #[test]
    fn suppressed_repeat_records_latest_occurrence_only() {
        let config = scenario_config();
        let mut store = ThrottleStore::default();
        let key = ErrorKey::new("/projects/p", 500);
        let t0 = Instant::now();

        store.observe(
            &config,
            Observation {
                key: &key,
                status: 500,
                message: "etcd timeout",
                url: "https://console/api/v2/projects/p?page=1",
            },
            t0,
        );
        let decision = store.observe(
            &config,
            Observation {
                key: &key,
                status: 500,
                message: "apiserver unreachable",
                url: "https://console/api/v2/projects/p?page=2",
            },
            t0 + ms(20_000),
        );

        assert_eq!(decision, Decision::Suppress);
        let tracked = entry(&store, &key);
        assert_eq!(tracked.last_error_message, "apiserver unreachable");
        assert_eq!(tracked.last_failed_url, "https://console/api/v2/projects/p?page=2");
        assert_eq!(tracked.last_status, 500);
        assert_eq!(tracked.last_occurrence, t0 + ms(20_000));
        assert_eq!(tracked.notifications_displayed, 1);
        assert_eq!(tracked.next_notification, t0 + ms(60_000));
    }

    #[test]
    fn status_change_resets_backoff() {
        let config = scenario_config();
        let mut store = ThrottleStore::default();
        let key = ErrorKey::new("/projects", 500);
        let t0 = Instant::now();

        observe(&mut store, &config, &key, 500, t0);
        observe(&mut store, &config, &key, 500, t0 + ms(30_000));
        assert_eq!(
            observe(&mut store, &config, &key, 401, t0 + ms(70_000)),
            Decision::Notify
        );
        let tracked = entry(&store, &key);
        assert_eq!(tracked.notifications_displayed, 1);
        assert_eq!(tracked.last_status, 401);
        assert_eq!(tracked.next_notification, t0 + ms(130_000));
    }

    #[test]
    fn status_change_notifies_even_inside_window() {
        let config = scenario_config();
        let mut store = ThrottleStore::default();
        let key = ErrorKey::new("/projects", 500);
        let t0 = Instant::now();

        observe(&mut store, &config, &key, 500, t0);
        assert_eq!(
            observe(&mut store, &config, &key, 401, t0 + ms(1_000)),
            Decision::Notify
        );
        assert_eq!(
            observe(&mut store, &config, &key, 401, t0 + ms(2_000)),
            Decision::Suppress
        );
    }

    #[test]
    fn disabled_throttling_never_touches_state() {
        let config = ThrottlingConfig {
            enable_throttling: false,
            ..scenario_config()
        };
        let mut store = ThrottleStore::default();
        let key = ErrorKey::new("/projects", 500);
        let t0 = Instant::now();

        for step in 0..5 {
            assert_eq!(
                observe(&mut store, &config, &key, 500, t0 + ms(step)),
                Decision::Notify
            );
        }
        assert!(store.is_empty());
    }

    #[test]
    fn displayed_intervals_grow_geometrically_and_cap() {
        let config = scenario_config();
        let mut store = ThrottleStore::default();
        let key = ErrorKey::new("/seeds", 503);
        let mut now = Instant::now();
        let mut windows = Vec::new();

        assert_eq!(observe(&mut store, &config, &key, 503, now), Decision::Notify);
        for _ in 0..5 {
            let next = entry(&store, &key).next_notification;
            windows.push(next - now);
            now = next;
            assert_eq!(observe(&mut store, &config, &key, 503, now), Decision::Notify);
        }

        assert_eq!(
            windows,
            vec![ms(60_000), ms(120_000), ms(240_000), ms(240_000), ms(240_000)]
        );
        assert!(windows.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn backoff_window_uses_count_minus_one_exponent() {
        let config = scenario_config();
        assert_eq!(backoff_window(&config, 1), ms(60_000));
        assert_eq!(backoff_window(&config, 2), ms(120_000));
        assert_eq!(backoff_window(&config, 3), ms(240_000));
        assert_eq!(backoff_window(&config, u32::MAX), ms(240_000));
    }

    #[test]
    fn full_store_sweeps_only_expired_entries() {
        let config = scenario_config();
        let mut store = ThrottleStore::new(3);
        let t0 = Instant::now();
        let old_a = ErrorKey::new("/a", 500);
        let old_b = ErrorKey::new("/b", 500);
        let fresh = ErrorKey::new("/c", 500);
        let incoming = ErrorKey::new("/d", 500);

        observe(&mut store, &config, &old_a, 500, t0);
        observe(&mut store, &config, &old_b, 500, t0);
        observe(&mut store, &config, &fresh, 500, t0 + ms(3_000_000));
        assert_eq!(store.len(), 3);

        let now = t0 + ms(3_700_000);
        assert_eq!(observe(&mut store, &config, &incoming, 500, now), Decision::Notify);
        assert!(store.get(&old_a).is_none());
        assert!(store.get(&old_b).is_none());
        assert!(store.get(&fresh).is_some());
        assert!(store.get(&incoming).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sweep_keeps_entries_exactly_at_expiration() {
        let t0 = Instant::now();
        let key = ErrorKey::new("/a", 500);
        let mut entries = HashMap::new();
        entries.insert(
            key.clone(),
            ErrorEntry {
                error_key: key.clone(),
                notifications_displayed: 1,
                last_occurrence: t0,
                next_notification: t0,
                last_error_message: String::new(),
                last_status: 500,
                last_failed_url: String::new(),
            },
        );

        assert_eq!(sweep_expired(&mut entries, t0 + ms(1_000), ms(1_000)), 0);
        assert_eq!(sweep_expired(&mut entries, t0 + ms(1_001), ms(1_000)), 1);
        assert!(entries.is_empty());
    }

    #[test]
    fn clear_releases_all_entries() {
        let config = scenario_config();
        let mut store = ThrottleStore::default();
        let t0 = Instant::now();
        observe(&mut store, &config, &ErrorKey::new("/a", 500), 500, t0);
        observe(&mut store, &config, &ErrorKey::new("/b", 500), 500, t0);
        store.clear();
        assert!(store.is_empty());
    }
}
