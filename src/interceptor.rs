use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_channel::{Sender, TrySendError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::classify::{FailedRequest, classify, normalize_url};
use crate::remap::MessageRemapper;
use crate::silence::SilenceFilters;
use crate::throttle::{Observation, ThrottleStore, ThrottlingConfig, ThrottlingConfigResolver};
use crate::types::{ErrorKey, Notification};

/// Receives the notifications that survive filtering and throttling.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Forwards notifications to a bounded channel, dropping them when it is full.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    pub const fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        match self.tx.try_send(notification.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(message = %dropped.message, "notification queue full; dropping notification");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("notification queue closed; dropping notification");
            }
        }
    }
}

/// Latest value of the admin "hide all errors" switch.
#[derive(Clone, Debug)]
pub struct HideErrorsFlag(watch::Receiver<bool>);

impl HideErrorsFlag {
    pub fn channel(initial: bool) -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self(rx))
    }

    /// A flag that never changes.
    pub fn fixed(value: bool) -> Self {
        Self::channel(value).1
    }

    pub fn is_set(&self) -> bool {
        *self.0.borrow()
    }
}

/// What happened to one failed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped by a silence rule (or no failure at all); nothing was tracked.
    Silenced,
    /// Tracked, but still inside its backoff window.
    Throttled,
    /// Exactly one notification was handed to the sink.
    Notified(Notification),
}

/// Decision pipeline run once per failed request.
pub struct ErrorInterceptor {
    throttling: ThrottlingConfigResolver,
    filters: SilenceFilters,
    remapper: MessageRemapper,
    hide_all: HideErrorsFlag,
    store: Mutex<ThrottleStore>,
    sink: Arc<dyn NotificationSink>,
}

impl ErrorInterceptor {
    pub fn new(
        throttling: ThrottlingConfigResolver,
        filters: SilenceFilters,
        remapper: MessageRemapper,
        hide_all: HideErrorsFlag,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            throttling,
            filters,
            remapper,
            hide_all,
            store: Mutex::new(ThrottleStore::default()),
            sink,
        }
    }

    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.store = Mutex::new(ThrottleStore::new(max_entries));
        self
    }

    pub fn handle(&self, failure: Option<&FailedRequest>) -> Outcome {
        self.handle_at(failure, Instant::now())
    }

    pub fn handle_at(&self, failure: Option<&FailedRequest>, now: Instant) -> Outcome {
        let Some(failure) = failure else {
            return Outcome::Silenced;
        };
        if self.filters.silences_endpoint(&failure.url) {
            debug!(url = %failure.url, "endpoint silenced");
            return Outcome::Silenced;
        }

        let classified = classify(failure);
        if self
            .filters
            .silences_message(&classified.message, self.hide_all.is_set())
        {
            debug!(url = %failure.url, code = classified.code, "message silenced");
            return Outcome::Silenced;
        }

        let key = ErrorKey::new(&normalize_url(&failure.url), failure.status);
        let config = self.throttling.get();
        let decision = self.lock_store().observe(
            &config,
            Observation {
                key: &key,
                status: failure.status,
                message: &classified.message,
                url: &failure.url,
            },
            now,
        );
        if decision.is_suppressed() {
            debug!(%key, "notification throttled");
            return Outcome::Throttled;
        }

        let notification = Notification {
            message: self.remapper.remap(&classified.message).into_owned(),
            short_message: classified.short_message,
        };
        debug!(%key, code = classified.code, "emitting notification");
        self.sink.notify(&notification);
        Outcome::Notified(notification)
    }

    /// Evict expired entries now; for callers that drive their own cleanup timer.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let expiration = self.throttling.get().entry_expiration;
        self.lock_store().sweep_expired(now, expiration)
    }

    pub fn throttling_config(&self) -> ThrottlingConfig {
        self.throttling.get()
    }

    /// Re-derive throttling parameters on the next decision.
    pub fn invalidate_config(&self) {
        self.throttling.invalidate();
    }

    pub fn tracked_entries(&self) -> usize {
        self.lock_store().len()
    }

    pub fn clear(&self) {
        self.lock_store().clear();
    }

    fn lock_store(&self) -> MutexGuard<'_, ThrottleStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ErrorInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorInterceptor")
            .field("filters", &self.filters)
            .field("hide_all", &self.hide_all.is_set())
            .finish_non_exhaustive()
    }
}
