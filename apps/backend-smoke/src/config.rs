//! Environment-backed runtime configuration for `backend-smoke`.

use std::{env, error::Error, fmt, time::Duration};

use backend_core::{BackoffPolicy, ClientOptions, Credentials, RetryConfig};

const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    pub credentials: Credentials,
    /// Channel to join and read recent history from before tailing.
    pub channel: Option<String>,
    /// Stop after this many normalized messages. Runs until Ctrl-C when unset.
    pub max_messages: Option<u64>,
    /// Number of history posts fetched for `channel`.
    pub history_limit: u32,
    /// Backoff override for login and connect retries.
    pub backoff: Option<BackoffPolicy>,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let server = required_trimmed_env("MATTERMOST_SERVER", &mut lookup)?;
        let login = required_trimmed_env("MATTERMOST_LOGIN", &mut lookup)?;
        let password = lookup("MATTERMOST_PASSWORD")
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing {
                key: "MATTERMOST_PASSWORD",
            })?;
        let team = required_trimmed_env("MATTERMOST_TEAM", &mut lookup)?;
        let no_tls = parse_optional_bool("MATTERMOST_NO_TLS", &mut lookup)?.unwrap_or(false);

        let channel = optional_trimmed_env("MATTERMOST_CHANNEL", &mut lookup);
        let max_messages = parse_optional_u64("MATTERMOST_MAX_MESSAGES", &mut lookup)?;
        let history_limit = parse_optional_u64("MATTERMOST_HISTORY_LIMIT", &mut lookup)?
            .map(|limit| {
                u32::try_from(limit).map_err(|err| ConfigError::InvalidValue {
                    key: "MATTERMOST_HISTORY_LIMIT",
                    value: limit.to_string(),
                    reason: err.to_string(),
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        let backoff_min_ms = parse_optional_u64("MATTERMOST_BACKOFF_MIN_MS", &mut lookup)?;
        let backoff_max_ms = parse_optional_u64("MATTERMOST_BACKOFF_MAX_MS", &mut lookup)?;
        let backoff = if backoff_min_ms.is_none() && backoff_max_ms.is_none() {
            None
        } else {
            let defaults = BackoffPolicy::default();
            let min_ms = backoff_min_ms.unwrap_or(defaults.min_delay_ms());
            let max_ms = backoff_max_ms.unwrap_or(defaults.max_delay_ms());
            if min_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "MATTERMOST_BACKOFF_MIN_MS",
                    value: "0".to_owned(),
                    reason: "must be at least 1".to_owned(),
                });
            }
            if max_ms < min_ms {
                return Err(ConfigError::InvalidValue {
                    key: "MATTERMOST_BACKOFF_MAX_MS",
                    value: max_ms.to_string(),
                    reason: format!("must not be below the minimum of {min_ms}"),
                });
            }
            Some(BackoffPolicy::new(
                Duration::from_millis(min_ms),
                Duration::from_millis(max_ms),
                defaults.jitter(),
            ))
        };

        if max_messages == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "MATTERMOST_MAX_MESSAGES",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            credentials: Credentials::new(login, password, team, server).with_no_tls(no_tls),
            channel,
            max_messages,
            history_limit,
            backoff,
        })
    }

    /// Client tuning derived from the backoff override.
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::default();
        if let Some(policy) = self.backoff {
            options.login_retry = RetryConfig {
                policy,
                ..options.login_retry
            };
            options.connect_retry = RetryConfig {
                policy,
                ..options.connect_retry
            };
        }
        options
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    Missing { key: &'static str },
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "{key} must be set"),
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).ok_or(ConfigError::Missing { key })
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_bool<F>(key: &'static str, lookup: &mut F) -> Result<Option<bool>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected true or false".to_owned(),
        }),
    }
}
