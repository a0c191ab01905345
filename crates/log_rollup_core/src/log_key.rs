use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Length of the `YYYY-MM-DD-HH-MM-SS` stamp leading every access-log basename.
const TIMESTAMP_LEN: usize = 19;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// A single entry of an object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ListedObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }
}

/// An access-log object whose key follows `<prefix><YYYY-MM-DD-HH-MM-SS>-<hex-id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogObjectKey {
    bucket: String,
    key: String,
    timestamp: DateTime<Utc>,
    size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("key has an empty basename")]
    EmptyBasename,
    #[error("basename does not start with a YYYY-MM-DD-HH-MM-SS timestamp")]
    MissingTimestamp,
    #[error("basename is missing the '-<hex-id>' suffix")]
    MissingIdentifier,
    #[error("basename identifier is not hexadecimal")]
    InvalidIdentifier,
}

impl LogObjectKey {
    pub fn parse(
        bucket: impl Into<String>,
        key: impl Into<String>,
        size: u64,
    ) -> Result<Self, KeyParseError> {
        let key = key.into();
        let timestamp = parse_basename_timestamp(basename_of(&key))?;
        Ok(Self {
            bucket: bucket.into(),
            key,
            timestamp,
            size,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Everything up to and including the last `/`; empty at the bucket root.
    pub fn directory(&self) -> &str {
        directory_of(&self.key)
    }

    pub fn basename(&self) -> &str {
        basename_of(&self.key)
    }
}

impl Ord for LogObjectKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| self.bucket.cmp(&other.bucket))
            .then_with(|| self.size.cmp(&other.size))
    }
}

impl PartialOrd for LogObjectKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn is_access_log_key(key: &str) -> bool {
    parse_basename_timestamp(basename_of(key)).is_ok()
}

pub fn basename_of(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, name)| name)
}

pub fn directory_of(key: &str) -> &str {
    key.rfind('/').map_or("", |index| &key[..=index])
}

fn parse_basename_timestamp(basename: &str) -> Result<DateTime<Utc>, KeyParseError> {
    if basename.is_empty() {
        return Err(KeyParseError::EmptyBasename);
    }

    let stamp = basename
        .get(..TIMESTAMP_LEN)
        .ok_or(KeyParseError::MissingTimestamp)?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map_err(|_| KeyParseError::MissingTimestamp)?;

    let identifier = basename[TIMESTAMP_LEN..]
        .strip_prefix('-')
        .filter(|rest| !rest.is_empty())
        .ok_or(KeyParseError::MissingIdentifier)?;
    if !identifier.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(KeyParseError::InvalidIdentifier);
    }

    Ok(timestamp.and_utc())
}

/// An `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct S3Uri {
    bucket: String,
    key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum S3UriError {
    #[error("invalid S3 URI {0:?}: it should start with s3://")]
    MissingScheme(String),
    #[error("invalid S3 URI {0:?}: missing bucket")]
    MissingBucket(String),
}

impl S3Uri {
    pub fn parse(uri: &str) -> Result<Self, S3UriError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| S3UriError::MissingScheme(uri.to_string()))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(S3UriError::MissingBucket(uri.to_string()));
        }
        Ok(Self::from_segments(bucket, key))
    }

    pub fn from_segments(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
