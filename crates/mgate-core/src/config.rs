//! Immutable gate configuration.
//!
//! Raw values come from the environment (or CLI flags backed by it) and are
//! validated once into a [`GateConfig`] that the engine borrows for its whole
//! lifetime.

use std::time::Duration;

use url::Url;

pub const ENV_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_REQUIRED_MODELS: &str = "REQUIRED_MODELS";
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
pub const ENV_STARTUP_TIMEOUT: &str = "STARTUP_TIMEOUT";
pub const ENV_RETRY_BACKOFF: &str = "RETRY_BACKOFF";
pub const ENV_LOOP_INTERVAL: &str = "LOOP_INTERVAL";

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("required env {0} not set")]
    Missing(&'static str),
    #[error("{0} parsed to zero entries")]
    EmptyModelList(&'static str),
    #[error("{var} invalid duration {value:?}: {reason}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("{var} invalid URL {value:?}: {reason}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which deployment mode the configuration is validated for. Each mode needs a
/// different subset of the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Probe,
    Gate,
    Reconcile,
}

/// Unvalidated settings exactly as read from the environment.
#[derive(Debug, Clone, Default)]
pub struct RawSettings {
    pub base_url: Option<String>,
    pub required_models: Option<String>,
    pub request_timeout: Option<String>,
    pub startup_timeout: Option<String>,
    pub retry_backoff: Option<String>,
    pub loop_interval: Option<String>,
}

impl RawSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            base_url: lookup(ENV_BASE_URL),
            required_models: lookup(ENV_REQUIRED_MODELS),
            request_timeout: lookup(ENV_REQUEST_TIMEOUT),
            startup_timeout: lookup(ENV_STARTUP_TIMEOUT),
            retry_backoff: lookup(ENV_RETRY_BACKOFF),
            loop_interval: lookup(ENV_LOOP_INTERVAL),
        }
    }
}

/// Ordered, non-empty list of model identifiers the backend must hold.
///
/// Order drives pull order. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredModels(Vec<String>);

impl RequiredModels {
    /// Split on commas and whitespace, dropping empty fragments.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let models: Vec<String> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        if models.is_empty() {
            return Err(ConfigError::EmptyModelList(ENV_REQUIRED_MODELS));
        }
        Ok(Self(models))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Backend base URL without a trailing slash.
    pub base_url: String,
    pub required: RequiredModels,
    /// Budget for every individual backend call.
    pub request_timeout: Duration,
    /// Overall readiness deadline; present for `Gate` and `Reconcile`.
    pub startup_timeout: Option<Duration>,
    pub retry_backoff: Duration,
    /// Re-ensure period; present for `Reconcile`. Zero means a single pass.
    pub loop_interval: Option<Duration>,
}

impl GateConfig {
    pub fn from_env(mode: Mode) -> Result<Self, ConfigError> {
        Self::from_settings(&RawSettings::from_env(), mode)
    }

    pub fn from_settings(raw: &RawSettings, mode: Mode) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(require(ENV_BASE_URL, raw.base_url.as_deref())?)?;
        let required =
            RequiredModels::parse(require(ENV_REQUIRED_MODELS, raw.required_models.as_deref())?)?;
        let request_timeout = positive_duration(
            ENV_REQUEST_TIMEOUT,
            require(ENV_REQUEST_TIMEOUT, raw.request_timeout.as_deref())?,
        )?;

        let startup_timeout = match mode {
            Mode::Probe => None,
            Mode::Gate | Mode::Reconcile => {
                let value = require(ENV_STARTUP_TIMEOUT, raw.startup_timeout.as_deref())?;
                Some(duration_var(ENV_STARTUP_TIMEOUT, value)?)
            }
        };

        let retry_backoff = match optional(raw.retry_backoff.as_deref()) {
            Some(value) => positive_duration(ENV_RETRY_BACKOFF, value)?,
            None => DEFAULT_RETRY_BACKOFF,
        };

        let loop_interval = match mode {
            Mode::Reconcile => {
                let value = require(ENV_LOOP_INTERVAL, raw.loop_interval.as_deref())?;
                Some(duration_var(ENV_LOOP_INTERVAL, value)?)
            }
            Mode::Probe | Mode::Gate => None,
        };

        Ok(Self {
            base_url,
            required,
            request_timeout,
            startup_timeout,
            retry_backoff,
            loop_interval,
        })
    }
}

fn optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require<'a>(var: &'static str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    optional(value).ok_or(ConfigError::Missing(var))
}

fn parse_base_url(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim_end_matches('/');
    let invalid = |reason: String| ConfigError::InvalidUrl {
        var: ENV_BASE_URL,
        value: value.to_string(),
        reason,
    };
    let parsed = Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme `{other}`"))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(trimmed.to_string())
}

fn duration_var(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|reason| ConfigError::InvalidDuration {
        var,
        value: value.to_string(),
        reason,
    })
}

fn positive_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = duration_var(var, value)?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration(var));
    }
    Ok(duration)
}

/// Parse duration strings such as `30s`, `1m30s`, `250ms` or `1.5h`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare number is
/// read as seconds. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty duration".into());
    }
    if let Ok(secs) = trimmed.parse::<f64>() {
        return nanos(secs * NANOS_PER_SEC);
    }

    let mut total = 0f64;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("expected a number at `{rest}`"));
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number `{number}`"))?;
        let unit_len = tail
            .find(|c: char| !c.is_alphabetic())
            .unwrap_or(tail.len());
        if unit_len == 0 {
            return Err(format!("missing unit after `{number}`"));
        }
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000.0,
            "ms" => NANOS_PER_SEC / 1_000.0,
            "s" => NANOS_PER_SEC,
            "m" => NANOS_PER_SEC * 60.0,
            "h" => NANOS_PER_SEC * 3_600.0,
            other => return Err(format!("unknown unit `{other}`")),
        };
        total += value * scale;
        rest = tail;
    }
    nanos(total)
}

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

fn nanos(value: f64) -> Result<Duration, String> {
    if !value.is_finite() {
        return Err("duration must be finite".into());
    }
    if value < 0.0 {
        return Err("negative durations are not supported".into());
    }
    let rounded = value.round();
    if rounded > u64::MAX as f64 {
        return Err("duration overflow".into());
    }
    Ok(Duration::from_nanos(rounded as u64))
}
