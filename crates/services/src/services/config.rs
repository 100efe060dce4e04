//! Environment-driven settings for the generation engine.

use std::{path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

const DEFAULT_OUTPUT_ROOT: &str = "./generated";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_STALE_AFTER_SECS: u64 = 900;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_STATUS_LOG_LIMIT: i64 = 50;

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Root under which each job gets its own directory.
    pub output_root: PathBuf,
    /// Deadline for one pipeline run.
    pub job_timeout: Duration,
    /// A `generating` job with no progress for this long is treated as orphaned.
    pub stale_after: Duration,
    pub sweep_interval: Duration,
    /// Log entries returned with a status read.
    pub status_log_limit: i64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            job_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            status_log_limit: DEFAULT_STATUS_LOG_LIMIT,
        }
    }
}

impl GenerationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset or malformed values keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            parse_or(&lookup, key, default.as_secs()).map_or(default, Duration::from_secs)
        };

        Self {
            output_root: lookup("GENERATED_PROJECTS_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            job_timeout: secs("GENERATION_TIMEOUT_SECS", defaults.job_timeout),
            stale_after: secs("GENERATION_STALE_AFTER_SECS", defaults.stale_after),
            sweep_interval: secs("GENERATION_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            status_log_limit: parse_or(&lookup, "STATUS_LOG_LIMIT", defaults.status_log_limit)
                .unwrap_or(defaults.status_log_limit),
        }
    }
}

/// `None` means "use the default"; zero and negative values are rejected too.
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Option<T>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            warn!(key = key, value = %raw, default = %default, "Ignoring invalid setting");
            None
        }
    }
}
