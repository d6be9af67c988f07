use std::time::Duration;

use humantime::parse_duration;

use crate::error::ConfigError;

type Lookup<'a> = Box<dyn Fn(&'static str) -> std::result::Result<Option<String>, ConfigError> + 'a>;

/// Source of the explicit `ERRGATE_*` override variables.
pub(super) struct EnvLayer<'a> {
    lookup: Lookup<'a>,
}

impl EnvLayer<'static> {
    pub(super) fn process() -> Self {
        Self {
            lookup: Box::new(process_var),
        }
    }
}

impl<'a> EnvLayer<'a> {
    #[cfg(test)]
    pub(super) fn from_pairs(pairs: &'a [(&'static str, &'a str)]) -> Self {
        Self {
            lookup: Box::new(move |key| {
                Ok(pairs
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| (*value).to_string()))
            }),
        }
    }

    pub(super) fn string(&self, key: &'static str) -> std::result::Result<Option<String>, ConfigError> {
        (self.lookup)(key)
    }

    pub(super) fn parse<T>(&self, key: &'static str) -> std::result::Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.non_blank(key)? else {
            return Ok(None);
        };
        value
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidField {
                field: key,
                message: err.to_string(),
            })
    }

    pub(super) fn bool(&self, key: &'static str) -> std::result::Result<Option<bool>, ConfigError> {
        self.parse::<bool>(key)
    }

    pub(super) fn duration(
        &self,
        key: &'static str,
    ) -> std::result::Result<Option<Duration>, ConfigError> {
        let Some(value) = self.non_blank(key)? else {
            return Ok(None);
        };
        parse_duration(&value)
            .map(Some)
            .map_err(|err| ConfigError::InvalidField {
                field: key,
                message: err.to_string(),
            })
    }

    /// Comma-separated list; blank items are dropped.
    pub(super) fn list(
        &self,
        key: &'static str,
    ) -> std::result::Result<Option<Vec<String>>, ConfigError> {
        Ok(self.string(key)?.map(|value| split_list(&value)))
    }

    fn non_blank(&self, key: &'static str) -> std::result::Result<Option<String>, ConfigError> {
        Ok(self
            .string(key)?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }
}

fn process_var(key: &'static str) -> std::result::Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::Other(format!("{key}: {err}"))),
    }
}

pub(super) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
