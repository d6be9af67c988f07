use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_with::serde_as;
use url::Url;

use crate::Result;
use crate::error::ConfigError;
use crate::throttle::ThrottlingOptions;

use super::defaults::{
    default_concurrency, default_connect_timeout, default_max_entries, default_notify_appname,
    default_poll_interval, default_queue_bound, default_request_timeout,
    default_silenced_endpoints, default_silenced_messages,
};
use super::env::EnvLayer;
use super::{
    Config, HumantimeDuration, NotifySettings, ProbeSettings, RemapEntry, SilenceSettings,
};

pub(super) fn load(path: impl AsRef<Path>) -> std::result::Result<RawConfig, ConfigError> {
    let mut builder = ::config::Config::builder();
    let path = path.as_ref();
    builder = builder.add_source(::config::File::from(path).required(false));
    builder = builder.add_source(
        ::config::Environment::with_prefix("ERRGATE")
            .separator("__")
            .try_parsing(true),
    );
    deserialize(builder)
}

pub(super) fn load_str(toml: &str) -> std::result::Result<RawConfig, ConfigError> {
    let builder = ::config::Config::builder()
        .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml));
    deserialize(builder)
}

fn deserialize(
    builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
) -> std::result::Result<RawConfig, ConfigError> {
    builder
        .build()
        .map_err(|err| ConfigError::Other(err.to_string()))?
        .try_deserialize()
        .map_err(|err| ConfigError::Parse(err.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub(super) probe: RawProbe,
    #[serde(default)]
    pub(super) throttling: RawThrottling,
    #[serde(default)]
    pub(super) silence: RawSilence,
    #[serde(default)]
    pub(super) remap: Vec<RawRemap>,
    #[serde(default)]
    pub(super) notify: RawNotify,
    #[serde(default)]
    pub(super) app: RawApp,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawProbe {
    pub(super) base_url: Option<String>,
    pub(super) token: Option<String>,
    #[serde(default)]
    pub(super) endpoints: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub(super) concurrency: usize,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) request_timeout: Duration,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) connect_timeout: Duration,
}

/// The option keys understood by the throttling resolver, plus store sizing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub(super) struct RawThrottling {
    pub(super) initial_delay_minutes: f64,
    pub(super) max_delay_minutes: f64,
    pub(super) backoff_multiplier: f64,
    pub(super) cleanup_interval_minutes: f64,
    pub(super) entry_expiration_hours: f64,
    pub(super) enable_throttling: bool,
    pub(super) max_entries: usize,
    pub(super) periodic_sweep: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawSilence {
    #[serde(default = "default_silenced_endpoints")]
    pub(super) endpoints: Vec<String>,
    #[serde(default = "default_silenced_messages")]
    pub(super) messages: Vec<String>,
    #[serde(default)]
    pub(super) hide_all_errors: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawRemap {
    pub(super) pattern: String,
    pub(super) message: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawNotify {
    #[serde(default = "default_notify_appname")]
    pub(super) appname: String,
    #[serde(default)]
    pub(super) sticky: bool,
    #[serde(default)]
    #[serde_as(as = "Option<HumantimeDuration>")]
    pub(super) timeout: Option<Duration>,
    #[serde(default)]
    pub(super) default_timeout: bool,
    #[serde(default)]
    pub(super) icon: Option<PathBuf>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawApp {
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) poll_interval: Duration,
    #[serde(default = "default_queue_bound")]
    pub(super) queue_bound: usize,
}

impl RawConfig {
    pub(super) fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_overrides(&EnvLayer::process())
    }

    fn apply_overrides(&mut self, env: &EnvLayer<'_>) -> std::result::Result<(), ConfigError> {
        if let Some(url) = env.string("ERRGATE_BASE_URL")? {
            self.probe.base_url = Some(url);
        }
        if let Some(token) = env.string("ERRGATE_TOKEN")? {
            self.probe.token = Some(token);
        }
        if let Some(endpoints) = env.list("ERRGATE_ENDPOINTS")? {
            self.probe.endpoints = endpoints;
        }
        if let Some(concurrency) = env.parse::<usize>("ERRGATE_CONCURRENCY")? {
            self.probe.concurrency = concurrency;
        }
        if let Some(initial) = env.parse::<f64>("ERRGATE_INITIAL_DELAY_MINUTES")? {
            self.throttling.initial_delay_minutes = initial;
        }
        if let Some(max) = env.parse::<f64>("ERRGATE_MAX_DELAY_MINUTES")? {
            self.throttling.max_delay_minutes = max;
        }
        if let Some(multiplier) = env.parse::<f64>("ERRGATE_BACKOFF_MULTIPLIER")? {
            self.throttling.backoff_multiplier = multiplier;
        }
        if let Some(cleanup) = env.parse::<f64>("ERRGATE_CLEANUP_INTERVAL_MINUTES")? {
            self.throttling.cleanup_interval_minutes = cleanup;
        }
        if let Some(expiration) = env.parse::<f64>("ERRGATE_ENTRY_EXPIRATION_HOURS")? {
            self.throttling.entry_expiration_hours = expiration;
        }
        if let Some(max_entries) = env.parse::<usize>("ERRGATE_MAX_ENTRIES")? {
            self.throttling.max_entries = max_entries;
        }
        if let Some(sweep) = env.bool("ERRGATE_PERIODIC_SWEEP")? {
            self.throttling.periodic_sweep = sweep;
        }
        if let Some(enabled) = env.bool("ERRGATE_ENABLE_THROTTLING")? {
            self.throttling.enable_throttling = enabled;
        }
        if let Some(hide) = env.bool("ERRGATE_HIDE_ALL_ERRORS")? {
            self.silence.hide_all_errors = hide;
        }
        if let Some(interval) = env.duration("ERRGATE_POLL_INTERVAL")? {
            self.app.poll_interval = interval;
        }
        if let Some(queue) = env.parse::<usize>("ERRGATE_QUEUE_BOUND")? {
            self.app.queue_bound = queue;
        }
        if let Some(appname) = env.string("ERRGATE_NOTIFY_APPNAME")? {
            self.notify.appname = appname;
        }
        if let Some(sticky) = env.bool("ERRGATE_NOTIFY_STICKY")? {
            self.notify.sticky = sticky;
        }
        if let Some(timeout) = env.duration("ERRGATE_NOTIFY_TIMEOUT")? {
            self.notify.timeout = Some(timeout);
        }
        Ok(())
    }

    pub(super) fn validate_and_build(self) -> Result<Config> {
        let base_url = self
            .probe
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|err| ConfigError::InvalidField {
                    field: "probe.base_url",
                    message: err.to_string(),
                })
            })
            .transpose()?;

        let endpoints = validate_endpoints(base_url.as_ref(), self.probe.endpoints)?;

        let token = match self.probe.token {
            Some(token) if token.trim().is_empty() => {
                return Err(ConfigError::InvalidField {
                    field: "probe.token",
                    message: "token cannot be empty".to_string(),
                }
                .into());
            }
            other => other.map(Into::into),
        };

        let throttling = self.throttling.options()?;

        if self.throttling.max_entries == 0 {
            return Err(invalid(
                "throttling.max_entries",
                "the store must hold at least one entry",
            ));
        }
        if self.app.queue_bound == 0 {
            return Err(invalid(
                "app.queue_bound",
                "queue bound must be greater than zero",
            ));
        }
        if self.app.poll_interval.is_zero() {
            return Err(invalid(
                "app.poll_interval",
                "poll interval must be greater than zero",
            ));
        }

        let mut remap = Vec::with_capacity(self.remap.len());
        for entry in self.remap {
            if entry.pattern.is_empty() {
                return Err(invalid("remap.pattern", "pattern cannot be empty"));
            }
            remap.push(RemapEntry {
                pattern: entry.pattern,
                message: entry.message,
            });
        }

        Ok(Config {
            probe: ProbeSettings {
                base_url,
                token,
                endpoints,
                concurrency: self.probe.concurrency.max(1),
                request_timeout: self.probe.request_timeout,
                connect_timeout: self.probe.connect_timeout,
            },
            throttling,
            max_entries: self.throttling.max_entries,
            periodic_sweep: self.throttling.periodic_sweep,
            silence: SilenceSettings {
                endpoints: self.silence.endpoints,
                messages: self.silence.messages,
                hide_all_errors: self.silence.hide_all_errors,
            },
            remap,
            notify: NotifySettings {
                appname: self.notify.appname,
                sticky: self.notify.sticky,
                timeout: self.notify.timeout,
                default_timeout: self.notify.default_timeout,
                icon: self.notify.icon,
            },
            poll_interval: self.app.poll_interval,
            queue_capacity: self.app.queue_bound,
        })
    }
}

impl RawThrottling {
    fn options(&self) -> Result<ThrottlingOptions> {
        let durations = [
            ("throttling.initial_delay_minutes", self.initial_delay_minutes),
            ("throttling.max_delay_minutes", self.max_delay_minutes),
            ("throttling.cleanup_interval_minutes", self.cleanup_interval_minutes),
            ("throttling.entry_expiration_hours", self.entry_expiration_hours),
        ];
        for (field, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "expected a finite, non-negative number"));
            }
        }
        if self.initial_delay_minutes > self.max_delay_minutes {
            return Err(invalid(
                "throttling.initial_delay_minutes",
                "initial delay cannot exceed max_delay_minutes",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(invalid(
                "throttling.backoff_multiplier",
                "multiplier must be greater than zero",
            ));
        }
        Ok(ThrottlingOptions {
            initial_delay_minutes: self.initial_delay_minutes,
            max_delay_minutes: self.max_delay_minutes,
            backoff_multiplier: self.backoff_multiplier,
            cleanup_interval_minutes: self.cleanup_interval_minutes,
            entry_expiration_hours: self.entry_expiration_hours,
            enable_throttling: self.enable_throttling,
        })
    }
}

/// Every endpoint must join onto the base URL, or onto a placeholder origin
/// when no base is configured yet.
fn validate_endpoints(base: Option<&Url>, endpoints: Vec<String>) -> Result<Vec<String>> {
    let placeholder;
    let base = match base {
        Some(base) => base,
        None => {
            placeholder = Url::parse("http://localhost/")
                .map_err(|err| invalid("probe.base_url", &err.to_string()))?;
            &placeholder
        }
    };
    for endpoint in &endpoints {
        if endpoint.trim().is_empty() {
            return Err(invalid("probe.endpoints", "endpoint cannot be empty"));
        }
        if let Err(err) = base.join(endpoint) {
            return Err(invalid("probe.endpoints", &format!("{endpoint}: {err}")));
        }
    }
    Ok(endpoints)
}

fn invalid(field: &'static str, message: &str) -> crate::error::Error {
    ConfigError::InvalidField {
        field,
        message: message.to_string(),
    }
    .into()
}

impl Default for RawProbe {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            endpoints: Vec::new(),
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for RawThrottling {
    fn default() -> Self {
        let defaults = ThrottlingOptions::default();
        Self {
            initial_delay_minutes: defaults.initial_delay_minutes,
            max_delay_minutes: defaults.max_delay_minutes,
            backoff_multiplier: defaults.backoff_multiplier,
            cleanup_interval_minutes: defaults.cleanup_interval_minutes,
            entry_expiration_hours: defaults.entry_expiration_hours,
            enable_throttling: defaults.enable_throttling,
            max_entries: default_max_entries(),
            periodic_sweep: false,
        }
    }
}

impl Default for RawSilence {
    fn default() -> Self {
        Self {
            endpoints: default_silenced_endpoints(),
            messages: default_silenced_messages(),
            hide_all_errors: false,
        }
    }
}

impl Default for RawNotify {
    fn default() -> Self {
        Self {
            appname: default_notify_appname(),
            sticky: false,
            timeout: None,
            default_timeout: false,
            icon: None,
        }
    }
}

impl Default for RawApp {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            queue_bound: default_queue_bound(),
        }
    }
}
