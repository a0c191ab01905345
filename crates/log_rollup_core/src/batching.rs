use std::collections::VecDeque;

use crate::contract::ValidationError;
use crate::log_key::LogObjectKey;

/// Keys per task. Long keys reach the message size limit first.
pub const DEFAULT_MAX_TASK_ITEMS: usize = 6_000;
/// Original bytes per task. The worker must fit both the originals and the
/// archive in 10 GiB of ephemeral storage.
pub const DEFAULT_MAX_TASK_BYTES: u64 = 5 * 1024 * 1024 * 1024;
/// Largest message body the task queue accepts.
pub const QUEUE_MESSAGE_LIMIT_BYTES: usize = 256 * 1024;
/// Serialized task size per message, 8 KiB below the queue limit.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = QUEUE_MESSAGE_LIMIT_BYTES - 8 * 1024;
/// Reserved for the task fields other than members and prefix: a role ARN
/// of up to 2 048 characters, the bucket name, the day and the field names.
pub const MESSAGE_ENVELOPE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_bytes: u64,
    pub max_message_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_TASK_ITEMS,
            max_bytes: DEFAULT_MAX_TASK_BYTES,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl BatchLimits {
    pub fn new(max_items: usize, max_bytes: u64) -> Result<Self, ValidationError> {
        if max_items == 0 {
            return Err(ValidationError::new("max_items must be a positive integer"));
        }
        if max_bytes == 0 {
            return Err(ValidationError::new("max_bytes must be a positive integer"));
        }
        Ok(Self {
            max_items,
            max_bytes,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        })
    }

    pub fn with_max_message_bytes(self, max_message_bytes: usize) -> Result<Self, ValidationError> {
        if max_message_bytes <= MESSAGE_ENVELOPE_BYTES {
            return Err(ValidationError::new(format!(
                "max_message_bytes must exceed {MESSAGE_ENVELOPE_BYTES}"
            )));
        }
        if max_message_bytes > QUEUE_MESSAGE_LIMIT_BYTES {
            return Err(ValidationError::new(format!(
                "max_message_bytes cannot exceed {QUEUE_MESSAGE_LIMIT_BYTES}"
            )));
        }
        Ok(Self {
            max_message_bytes,
            ..self
        })
    }
}

/// Splits one day group into order-preserving batches bounded by `limits`.
///
/// A key joins the current batch while the item, byte and message size
/// limits all still hold. An object larger than `max_bytes` becomes a batch
/// of its own.
pub fn split_group(keys: &[LogObjectKey], limits: BatchLimits) -> Vec<Vec<LogObjectKey>> {
    let mut batches = Vec::new();
    let mut current: Vec<LogObjectKey> = Vec::new();
    let mut current_bytes = 0u64;
    let mut current_message = 0usize;

    let prefix_bytes = keys
        .first()
        .map_or(0, |key| json_string_len(key.directory()));
    let member_budget = limits
        .max_message_bytes
        .saturating_sub(MESSAGE_ENVELOPE_BYTES + prefix_bytes);

    for key in keys {
        let message_cost = member_message_bytes(key);
        let fits = current.len() < limits.max_items
            && current_bytes.saturating_add(key.size()) <= limits.max_bytes
            && current_message + message_cost <= member_budget;
        if !current.is_empty() && !fits {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
            current_message = 0;
        }
        current_bytes = current_bytes.saturating_add(key.size());
        current_message += message_cost;
        current.push(key.clone());
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// Bytes one member adds to a serialized task: its quoted key in
/// `member_keys` and its size in `member_sizes`, each with a separator.
fn member_message_bytes(key: &LogObjectKey) -> usize {
    json_string_len(key.key()) + 3 + key.size().to_string().len() + 1
}

/// Length of `value` as the body of a JSON string, excluding quotes.
fn json_string_len(value: &str) -> usize {
    value
        .bytes()
        .map(|byte| match byte {
            b'"' | b'\\' | b'\n' | b'\r' | b'\t' | 0x08 | 0x0c => 2,
            0x00..=0x1f => 6,
            _ => 1,
        })
        .sum()
}

/// Checks that `batches` partition `keys` exactly, in order.
pub fn validate_partition(
    keys: &[LogObjectKey],
    batches: &[Vec<LogObjectKey>],
) -> Result<(), ValidationError> {
    if batches.iter().any(Vec::is_empty) {
        return Err(ValidationError::new("Batches cannot be empty"));
    }

    let flattened: Vec<&LogObjectKey> = batches.iter().flatten().collect();
    if flattened.len() != keys.len() {
        return Err(ValidationError::new(
            "Batches overlap or leave keys unassigned",
        ));
    }

    if flattened.iter().zip(keys).any(|(left, right)| *left != right) {
        return Err(ValidationError::new(
            "Batches reorder or replace keys of the group",
        ));
    }

    Ok(())
}

/// Merges per-prefix streams so consecutive items come from different prefixes.
///
/// The object store rate-limits requests per prefix, so spreading consecutive
/// tasks across prefixes lets more workers run without being throttled.
pub fn interleave_round_robin<T>(streams: Vec<Vec<T>>) -> Vec<T> {
    let total = streams.iter().map(Vec::len).sum();
    let mut queues: VecDeque<std::vec::IntoIter<T>> =
        streams.into_iter().map(Vec::into_iter).collect();
    let mut merged = Vec::with_capacity(total);

    while let Some(mut stream) = queues.pop_front() {
        if let Some(item) = stream.next() {
            merged.push(item);
            queues.push_back(stream);
        }
    }

    merged
}
