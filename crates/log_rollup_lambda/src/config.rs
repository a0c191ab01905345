use std::str::FromStr;

use log_rollup_core::batching::{
    BatchLimits, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_TASK_BYTES, DEFAULT_MAX_TASK_ITEMS,
};
use log_rollup_core::error::RollupError;
use log_rollup_core::lease::{RedrivePolicy, DEFAULT_MAX_RECEIVE_COUNT};

pub const DEFAULT_EPHEMERAL_CAPACITY_BYTES: u64 = 5 * 1024 * 1024 * 1024;
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 25;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const MISSING_QUEUE: &str = "ROLLUP_QUEUE_URL or ROLLUP_QUEUE_NAME must be configured";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueLocation {
    Url(String),
    Name(String),
}

/// Worker-side settings for one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiverSettings {
    pub delete_originals: bool,
    pub ephemeral_capacity_bytes: u64,
    pub download_concurrency: usize,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            delete_originals: true,
            ephemeral_capacity_bytes: DEFAULT_EPHEMERAL_CAPACITY_BYTES,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupConfig {
    pub queue: Option<QueueLocation>,
    pub batch_limits: BatchLimits,
    pub archiver: ArchiverSettings,
    pub redrive: RedrivePolicy,
    pub log_level: String,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            queue: None,
            batch_limits: BatchLimits::default(),
            archiver: ArchiverSettings::default(),
            redrive: RedrivePolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RollupConfig {
    pub fn from_env() -> Result<Self, RollupError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RollupError> {
        let value = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let queue = match (value("ROLLUP_QUEUE_URL"), value("ROLLUP_QUEUE_NAME")) {
            (Some(url), _) => Some(QueueLocation::Url(url)),
            (None, Some(name)) => Some(QueueLocation::Name(name)),
            (None, None) => None,
        };

        let max_items = parse_or(
            "ROLLUP_MAX_TASK_ITEMS",
            value("ROLLUP_MAX_TASK_ITEMS"),
            DEFAULT_MAX_TASK_ITEMS,
        )?;
        let max_bytes = parse_or(
            "ROLLUP_MAX_TASK_BYTES",
            value("ROLLUP_MAX_TASK_BYTES"),
            DEFAULT_MAX_TASK_BYTES,
        )?;
        let max_message_bytes = parse_or(
            "ROLLUP_MAX_MESSAGE_BYTES",
            value("ROLLUP_MAX_MESSAGE_BYTES"),
            DEFAULT_MAX_MESSAGE_BYTES,
        )?;
        let batch_limits = BatchLimits::new(max_items, max_bytes)
            .and_then(|limits| limits.with_max_message_bytes(max_message_bytes))
            .map_err(|error| RollupError::Config(error.to_string()))?;

        let download_concurrency = parse_or(
            "ROLLUP_DOWNLOAD_CONCURRENCY",
            value("ROLLUP_DOWNLOAD_CONCURRENCY"),
            DEFAULT_DOWNLOAD_CONCURRENCY,
        )?;
        if download_concurrency == 0 {
            return Err(RollupError::Config(
                "ROLLUP_DOWNLOAD_CONCURRENCY must be a positive integer".to_string(),
            ));
        }

        let max_receive_count = parse_or(
            "ROLLUP_MAX_RECEIVE_COUNT",
            value("ROLLUP_MAX_RECEIVE_COUNT"),
            DEFAULT_MAX_RECEIVE_COUNT,
        )?;

        Ok(Self {
            queue,
            batch_limits,
            archiver: ArchiverSettings {
                delete_originals: match value("ROLLUP_DELETE_ORIGINALS") {
                    Some(raw) => parse_bool("ROLLUP_DELETE_ORIGINALS", &raw)?,
                    None => true,
                },
                ephemeral_capacity_bytes: parse_or(
                    "ROLLUP_EPHEMERAL_CAPACITY_BYTES",
                    value("ROLLUP_EPHEMERAL_CAPACITY_BYTES"),
                    DEFAULT_EPHEMERAL_CAPACITY_BYTES,
                )?,
                download_concurrency,
            },
            redrive: RedrivePolicy::new(max_receive_count),
            log_level: value("ROLLUP_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    pub fn require_queue(&self) -> Result<&QueueLocation, RollupError> {
        self.queue
            .as_ref()
            .ok_or_else(|| RollupError::Config(MISSING_QUEUE.to_string()))
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, RollupError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|error| RollupError::Config(format!("{name}={raw:?} is invalid: {error}"))),
    }
}

pub fn parse_bool(name: &str, raw: &str) -> Result<bool, RollupError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RollupError::Config(format!(
            "{name}={raw:?} must be a boolean"
        ))),
    }
}
