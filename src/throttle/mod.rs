use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;

mod store;

pub use store::{ErrorEntry, Observation, ThrottleStore, backoff_window, sweep_expired};

const MINUTE: f64 = 60.0;
const HOUR: f64 = 3_600.0;
const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3_600);

/// Raw throttling options as they appear in the application configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ThrottlingOptions {
    pub initial_delay_minutes: f64,
    pub max_delay_minutes: f64,
    pub backoff_multiplier: f64,
    pub cleanup_interval_minutes: f64,
    pub entry_expiration_hours: f64,
    pub enable_throttling: bool,
}

impl Default for ThrottlingOptions {
    fn default() -> Self {
        Self {
            initial_delay_minutes: 1.0,
            max_delay_minutes: 30.0,
            backoff_multiplier: 2.0,
            cleanup_interval_minutes: 10.0,
            entry_expiration_hours: 1.0,
            enable_throttling: true,
        }
    }
}

/// Effective throttling parameters derived from [`ThrottlingOptions`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrottlingConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Only meaningful to an external scheduler; the store sweeps lazily.
    pub cleanup_interval: Duration,
    pub entry_expiration: Duration,
    pub enable_throttling: bool,
}

impl ThrottlingConfig {
    /// Derive the effective parameters, clamping values that would break
    /// `initial_delay <= max_delay` or produce negative durations.
    pub fn from_options(options: &ThrottlingOptions) -> Self {
        let initial_delay = seconds(options.initial_delay_minutes * MINUTE);
        let max_delay = seconds(options.max_delay_minutes * MINUTE).max(initial_delay);
        let backoff_multiplier =
            if options.backoff_multiplier.is_finite() && options.backoff_multiplier > 0.0 {
                options.backoff_multiplier
            } else {
                1.0
            };
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            cleanup_interval: seconds(options.cleanup_interval_minutes * MINUTE),
            entry_expiration: seconds(options.entry_expiration_hours * HOUR),
            enable_throttling: options.enable_throttling,
        }
    }

    /// Throttling switched off: every observation notifies.
    pub fn disabled() -> Self {
        Self {
            enable_throttling: false,
            ..Self::from_options(&ThrottlingOptions::default())
        }
    }
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self::from_options(&ThrottlingOptions::default())
    }
}

/// NaN and non-positive values collapse to zero; anything too large for a
/// `Duration` (including positive infinity) saturates at `MAX_DURATION`.
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).map_or(MAX_DURATION, |d| d.min(MAX_DURATION))
}

/// Anything able to hand out the current throttling options.
pub trait ThrottlingSource: Send + Sync {
    fn throttling_options(&self) -> ThrottlingOptions;
}

impl ThrottlingSource for ThrottlingOptions {
    fn throttling_options(&self) -> ThrottlingOptions {
        self.clone()
    }
}

/// Memoises the [`ThrottlingConfig`] derived from a [`ThrottlingSource`].
///
/// The source is consulted on the first [`get`](Self::get) and again only after
/// [`invalidate`](Self::invalidate).
pub struct ThrottlingConfigResolver {
    source: Arc<dyn ThrottlingSource>,
    cached: RwLock<Option<ThrottlingConfig>>,
}

impl ThrottlingConfigResolver {
    pub fn new(source: Arc<dyn ThrottlingSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    pub fn fixed(options: ThrottlingOptions) -> Self {
        Self::new(Arc::new(options))
    }

    pub fn get(&self) -> ThrottlingConfig {
        if let Some(config) = *self.cached.read().unwrap_or_else(PoisonError::into_inner) {
            return config;
        }
        let mut slot = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        *slot.get_or_insert_with(|| ThrottlingConfig::from_options(&self.source.throttling_options()))
    }

    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl std::fmt::Debug for ThrottlingConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottlingConfigResolver")
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        MAX_DURATION, ThrottlingConfig, ThrottlingConfigResolver, ThrottlingOptions,
        ThrottlingSource,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        options: Mutex<ThrottlingOptions>,
    }

    impl ThrottlingSource for CountingSource {
        fn throttling_options(&self) -> ThrottlingOptions {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.options
                .lock()
                .map(|options| options.clone())
                .unwrap_or_default()
        }
    }

    #[test]
    fn options_are_scaled_to_durations() {
        let config = ThrottlingConfig::from_options(&ThrottlingOptions {
            initial_delay_minutes: 1.0,
            max_delay_minutes: 4.0,
            backoff_multiplier: 2.0,
            cleanup_interval_minutes: 0.5,
            entry_expiration_hours: 2.0,
            enable_throttling: true,
        });
        assert_eq!(config.initial_delay, Duration::from_millis(60_000));
        assert_eq!(config.max_delay, Duration::from_millis(240_000));
        assert_eq!(config.cleanup_interval, Duration::from_millis(30_000));
        assert_eq!(config.entry_expiration, Duration::from_millis(7_200_000));
    }

    #[test]
    fn derived_config_keeps_invariants() {
        let config = ThrottlingConfig::from_options(&ThrottlingOptions {
            initial_delay_minutes: 10.0,
            max_delay_minutes: 2.0,
            backoff_multiplier: f64::NAN,
            cleanup_interval_minutes: -3.0,
            entry_expiration_hours: f64::INFINITY,
            enable_throttling: true,
        });
        assert!(config.initial_delay <= config.max_delay);
        assert_eq!(config.max_delay, Duration::from_secs(600));
        assert!((config.backoff_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.cleanup_interval, Duration::ZERO);
        assert_eq!(config.entry_expiration, MAX_DURATION);
    }

    #[test]
    fn nan_durations_collapse_to_zero() {
        let config = ThrottlingConfig::from_options(&ThrottlingOptions {
            cleanup_interval_minutes: f64::NAN,
            entry_expiration_hours: f64::NEG_INFINITY,
            ..ThrottlingOptions::default()
        });
        assert_eq!(config.cleanup_interval, Duration::ZERO);
        assert_eq!(config.entry_expiration, Duration::ZERO);
    }

    #[test]
    fn resolver_caches_until_invalidated() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            options: Mutex::new(ThrottlingOptions::default()),
        });
        let resolver = ThrottlingConfigResolver::new(source.clone());

        assert!(resolver.get().enable_throttling);
        assert!(resolver.get().enable_throttling);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        if let Ok(mut options) = source.options.lock() {
            options.enable_throttling = false;
        }
        assert!(resolver.get().enable_throttling);

        resolver.invalidate();
        assert!(!resolver.get().enable_throttling);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
