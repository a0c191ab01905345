use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::archive::RollupArchive;
use crate::error::RollupError;
use crate::log_key::{directory_of, LogObjectKey};

pub const TASK_SCHEMA_VERSION: &str = "v1";

/// One unit of compaction work: a single day of logs under a single prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub role_identifier: String,
    pub bucket: String,
    pub prefix: String,
    pub day: NaiveDate,
    pub member_keys: Vec<String>,
    /// Parallel to `member_keys`; empty when the sender did not know sizes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_sizes: Vec<u64>,
}

impl Task {
    /// Builds a task from keys that share one directory and one day.
    pub fn from_group(
        role_identifier: impl Into<String>,
        bucket: impl Into<String>,
        keys: &[LogObjectKey],
    ) -> Result<Self, ValidationError> {
        let first = keys
            .first()
            .ok_or_else(|| ValidationError::new("member_keys cannot be empty"))?;

        let mut members: Vec<(&str, u64)> = keys.iter().map(|key| (key.key(), key.size())).collect();
        members.sort_unstable();

        let task = Self {
            role_identifier: role_identifier.into(),
            bucket: bucket.into(),
            prefix: first.directory().to_string(),
            day: first.day(),
            member_keys: members.iter().map(|(key, _)| (*key).to_string()).collect(),
            member_sizes: members.iter().map(|(_, size)| *size).collect(),
        };
        task.validate()?;
        Ok(task)
    }

    pub fn from_message_body(body: &str) -> Result<Self, RollupError> {
        serde_json::from_str(body).map_err(|error| RollupError::Payload(error.to_string()))
    }

    pub fn to_message_body(&self) -> Result<String, RollupError> {
        serde_json::to_string(self).map_err(|error| RollupError::Payload(error.to_string()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.role_identifier.trim().is_empty() {
            return Err(ValidationError::new("role_identifier cannot be empty"));
        }
        if self.bucket.trim().is_empty() {
            return Err(ValidationError::new("bucket cannot be empty"));
        }
        if self.member_keys.is_empty() {
            return Err(ValidationError::new("member_keys cannot be empty"));
        }
        if !self.member_sizes.is_empty() && self.member_sizes.len() != self.member_keys.len() {
            return Err(ValidationError::new(
                "member_sizes must be empty or match member_keys in length",
            ));
        }

        let mut seen = BTreeSet::new();
        for key in &self.member_keys {
            if !seen.insert(key.as_str()) {
                return Err(ValidationError::new(format!("duplicate member key {key}")));
            }
            if directory_of(key) != self.prefix {
                return Err(ValidationError::new(format!(
                    "member key {key} is not directly under prefix {:?}",
                    self.prefix
                )));
            }
            let parsed = LogObjectKey::parse(&self.bucket, key.as_str(), 0).map_err(|error| {
                ValidationError::new(format!("member key {key} is not an access log: {error}"))
            })?;
            if parsed.day() != self.day {
                return Err(ValidationError::new(format!(
                    "member key {key} does not belong to day {}",
                    self.day
                )));
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.member_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_keys.is_empty()
    }

    /// `(key, size)` pairs; sizes default to 0 when the task carries none.
    pub fn members(&self) -> Vec<(&str, u64)> {
        self.member_keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                (
                    key.as_str(),
                    self.member_sizes.get(index).copied().unwrap_or(0),
                )
            })
            .collect()
    }

    pub fn total_declared_bytes(&self) -> Option<u64> {
        if self.member_sizes.is_empty() {
            return None;
        }
        Some(self.member_sizes.iter().fold(0u64, |sum, size| sum.saturating_add(*size)))
    }

    pub fn archive(&self) -> RollupArchive {
        RollupArchive::new(self.day, &self.members())
    }

    /// Full object key of this task's archive, in the task's own prefix.
    pub fn archive_key(&self) -> String {
        format!("{}{}", self.prefix, self.archive().name)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Task with {} files of {} @ s3://{}/{}>",
            self.len(),
            self.day,
            self.bucket,
            self.prefix
        )
    }
}

/// Producer invocation payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProducerRequest {
    #[serde(alias = "s3_role")]
    pub role_identifier: String,
    pub prefixes: Vec<String>,
    /// Optional replay date; never later than the current UTC day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
}

pub fn normalize_producer_request(
    request: ProducerRequest,
) -> Result<ProducerRequest, ValidationError> {
    let role_identifier = request.role_identifier.trim().to_string();
    if role_identifier.is_empty() {
        return Err(ValidationError::new("role_identifier cannot be empty"));
    }

    let prefixes: Vec<String> = request
        .prefixes
        .iter()
        .map(|prefix| prefix.trim().to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect();
    if prefixes.is_empty() {
        return Err(ValidationError::new("prefixes cannot be empty"));
    }

    Ok(ProducerRequest {
        role_identifier,
        prefixes,
        as_of: request.as_of,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrefixReport {
    pub prefix: String,
    pub tasks_enqueued: usize,
    pub tasks_failed: usize,
    pub keys_grouped: usize,
    pub keys_skipped: usize,
    pub keys_deferred: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrefixReport {
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.tasks_failed > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProducerSummary {
    pub status: String,
    pub as_of: NaiveDate,
    pub tasks_enqueued: usize,
    pub tasks_failed: usize,
    pub prefixes: Vec<PrefixReport>,
    pub schema_version: String,
}

impl ProducerSummary {
    pub fn from_reports(as_of: NaiveDate, prefixes: Vec<PrefixReport>) -> Self {
        let status = if prefixes.iter().any(PrefixReport::failed) {
            "partial_failure"
        } else {
            "ok"
        };
        Self {
            status: status.to_string(),
            as_of,
            tasks_enqueued: prefixes.iter().map(|report| report.tasks_enqueued).sum(),
            tasks_failed: prefixes.iter().map(|report| report.tasks_failed).sum(),
            prefixes,
            schema_version: TASK_SCHEMA_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}
