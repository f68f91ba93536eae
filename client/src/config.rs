//! Configuration management for the sync agent.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use jigsync_engine::{Backoff, RetryPolicy};

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding the durable queue
    pub database_path: PathBuf,
    /// Base URL of the remote service
    pub remote_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Per-request timeout for submits and probes
    pub request_timeout: Duration,
    /// How often the health probe reports connectivity
    pub probe_interval: Duration,
    /// Pause between two submits of the same pass
    pub inter_item_delay: Duration,
    /// Abandonment, stuck threshold and backoff
    pub retry: RetryPolicy,
    /// Age after which synced entries are purged
    pub retention: Duration,
    /// How often the purge runs
    pub cleanup_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = lookup("JIGSYNC_DATABASE_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingDatabasePath)?;

        let remote_url = lookup("JIGSYNC_REMOTE_URL")
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .ok_or(ConfigError::MissingRemoteUrl)?;

        let auth_token = lookup("JIGSYNC_AUTH_TOKEN").filter(|v| !v.is_empty());

        let request_timeout =
            Duration::from_secs(parse_or(&lookup, "JIGSYNC_REQUEST_TIMEOUT_SECS", 30)?);
        let probe_interval =
            Duration::from_secs(parse_or(&lookup, "JIGSYNC_PROBE_INTERVAL_SECS", 5)?);
        let inter_item_delay =
            Duration::from_millis(parse_or(&lookup, "JIGSYNC_INTER_ITEM_DELAY_MS", 100)?);

        let max_attempts = parse_opt(&lookup, "JIGSYNC_MAX_ATTEMPTS")?;
        let abandon_on_rejection = parse_or(&lookup, "JIGSYNC_ABANDON_ON_REJECTION", false)?;
        let stuck_after = parse_or(&lookup, "JIGSYNC_STUCK_AFTER", 5)?;

        let backoff = match parse_opt::<u64, _>(&lookup, "JIGSYNC_BACKOFF_BASE_MS")? {
            Some(base_ms) => Backoff::Exponential {
                base_ms,
                max_ms: parse_or(&lookup, "JIGSYNC_BACKOFF_MAX_MS", 300_000)?,
            },
            None => Backoff::None,
        };

        let retention_days: u64 = parse_or(&lookup, "JIGSYNC_RETENTION_DAYS", 30)?;
        let cleanup_interval =
            Duration::from_secs(parse_or(&lookup, "JIGSYNC_CLEANUP_INTERVAL_SECS", 86_400)?);

        if probe_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "JIGSYNC_PROBE_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if cleanup_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "JIGSYNC_CLEANUP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_path,
            remote_url,
            auth_token,
            request_timeout,
            probe_interval,
            inter_item_delay,
            retry: RetryPolicy {
                max_attempts,
                abandon_on_rejection,
                stuck_after,
                backoff,
            },
            retention: Duration::from_secs(retention_days.saturating_mul(86_400)),
            cleanup_interval,
        })
    }
}

fn parse_opt<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JIGSYNC_DATABASE_PATH environment variable is required")]
    MissingDatabasePath,

    #[error("JIGSYNC_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid {key} value: {value:?}")]
    Invalid { key: &'static str, value: String },
}
