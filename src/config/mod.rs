use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::Result;
use crate::error::Error as GateError;
use crate::remap::MessageRemapper;
use crate::silence::SilenceFilters;
use crate::throttle::{ThrottlingConfigResolver, ThrottlingOptions};

mod defaults;
mod env;
mod raw;
mod serde;

use self::serde::HumantimeDuration;

#[derive(Debug, Clone)]
pub struct Config {
    pub probe: ProbeSettings,
    pub throttling: ThrottlingOptions,
    pub max_entries: usize,
    pub periodic_sweep: bool,
    pub silence: SilenceSettings,
    pub remap: Vec<RemapEntry>,
    pub notify: NotifySettings,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub base_url: Option<Url>,
    pub token: Option<SecretString>,
    pub endpoints: Vec<String>,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SilenceSettings {
    pub endpoints: Vec<String>,
    pub messages: Vec<String>,
    pub hide_all_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapEntry {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub appname: String,
    pub sticky: bool,
    pub timeout: Option<Duration>,
    pub default_timeout: bool,
    pub icon: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration file cannot be parsed, when
    /// environment overrides are invalid, or when the resulting values fail
    /// validation.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = raw::load(path).map_err(GateError::from)?;
        raw.apply_env_overrides().map_err(GateError::from)?;
        raw.validate_and_build()
    }

    /// Parse a TOML document without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be parsed or fails validation.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        raw::load_str(toml)
            .map_err(GateError::from)?
            .validate_and_build()
    }

    pub fn silence_filters(&self) -> SilenceFilters {
        SilenceFilters::new(self.silence.endpoints.clone(), self.silence.messages.clone())
    }

    pub fn remapper(&self) -> MessageRemapper {
        MessageRemapper::with_rules(
            self.remap
                .iter()
                .map(|entry| (entry.pattern.as_str(), entry.message.as_str())),
        )
    }

    pub fn throttling_resolver(&self) -> ThrottlingConfigResolver {
        ThrottlingConfigResolver::fixed(self.throttling.clone())
    }
}
