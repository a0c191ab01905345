use log_rollup_core::contract::Task;
use log_rollup_core::error::RollupError;
use log_rollup_core::lease::{FailureDisposition, RedrivePolicy};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::adapters::task_queue::TaskQueue;
use crate::config::ArchiverSettings;
use crate::handlers::archiver::{archive_task, ArchiveOutcome, ArchiverDeps};

/// One task message taken from a queue-triggered invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
    pub receive_count: u32,
}

/// A record the queue should redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Partial batch response for a queue-triggered invocation.
///
/// Only the listed records are redelivered; every other record of the batch
/// is deleted by the event source mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueBatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
    #[serde(skip)]
    pub outcomes: Vec<ArchiveOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollingSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

pub fn decode_queue_event(event: &Value) -> Result<Vec<QueueRecord>, RollupError> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| RollupError::Payload("SQS event must include Records array".to_string()))?;

    let mut decoded = Vec::with_capacity(records.len());
    for record in records {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| RollupError::Payload("SQS record body must be a string".to_string()))?;
        let receive_count = record
            .pointer("/attributes/ApproximateReceiveCount")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(1);
        decoded.push(QueueRecord {
            message_id: record
                .get("messageId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            body: body.to_string(),
            receive_count,
        });
    }

    Ok(decoded)
}

/// Archives every record of a queue-triggered invocation.
///
/// Every record is attempted and each failure is reported by message id, so a
/// bad record is redelivered alone. A failed record without a message id
/// cannot be reported and fails the whole invocation instead.
pub fn run_worker(
    records: &[QueueRecord],
    settings: &ArchiverSettings,
    redrive: &RedrivePolicy,
    deps: &ArchiverDeps<'_>,
) -> Result<QueueBatchResponse, RollupError> {
    let mut response = QueueBatchResponse {
        outcomes: Vec::with_capacity(records.len()),
        ..QueueBatchResponse::default()
    };
    let mut unreportable = None;

    for record in records {
        match process_body(&record.body, settings, deps) {
            Ok(outcome) => response.outcomes.push(outcome),
            Err(failure) => {
                log_failure(&record.message_id, record.receive_count, redrive, &failure);
                if record.message_id.is_empty() {
                    unreportable.get_or_insert(failure);
                } else {
                    response.batch_item_failures.push(BatchItemFailure {
                        item_identifier: record.message_id.clone(),
                    });
                }
            }
        }
    }

    if let Some(failure) = unreportable {
        return Err(failure);
    }
    info!(
        component = "worker",
        event = "batch_completed",
        records = records.len(),
        succeeded = response.outcomes.len(),
        failed = response.batch_item_failures.len(),
        "queue batch processed"
    );
    Ok(response)
}

/// Pulls up to `count` messages and archives each, acknowledging successes.
///
/// Failed messages are left leased so the queue redelivers or dead-letters
/// them on its own schedule.
pub fn run_polling_worker(
    queue: &dyn TaskQueue,
    count: usize,
    settings: &ArchiverSettings,
    redrive: &RedrivePolicy,
    deps: &ArchiverDeps<'_>,
) -> Result<PollingSummary, RollupError> {
    let messages = queue.receive(count).map_err(RollupError::Dequeue)?;
    let mut summary = PollingSummary {
        received: messages.len(),
        ..PollingSummary::default()
    };
    if messages.is_empty() {
        info!(
            component = "worker",
            event = "queue_empty",
            "no tasks in queue"
        );
        return Ok(summary);
    }

    for message in messages {
        match process_body(&message.body, settings, deps) {
            Ok(_) => {
                summary.succeeded += 1;
                if let Err(message_error) = queue.delete(&message.receipt_handle) {
                    warn!(
                        component = "worker",
                        event = "ack_failed",
                        message_id = %message.message_id,
                        error = %message_error,
                        "failed to delete completed task message"
                    );
                }
            }
            Err(failure) => {
                summary.failed += 1;
                log_failure(&message.message_id, message.receive_count, redrive, &failure);
            }
        }
    }

    Ok(summary)
}

fn process_body(
    body: &str,
    settings: &ArchiverSettings,
    deps: &ArchiverDeps<'_>,
) -> Result<ArchiveOutcome, RollupError> {
    let task = Task::from_message_body(body)?;
    info!(
        component = "worker",
        event = "task_received",
        task = %task,
        "got task from queue"
    );
    archive_task(&task, settings, deps)
}

fn log_failure(
    message_id: &str,
    receive_count: u32,
    redrive: &RedrivePolicy,
    failure: &RollupError,
) {
    let disposition = redrive.disposition_after_failure(receive_count);
    error!(
        component = "worker",
        event = "task_failed",
        message_id = %message_id,
        receive_count,
        disposition = disposition.as_str(),
        error_code = failure.code(),
        error = %failure,
        "task failed"
    );
    if disposition == FailureDisposition::DeadLetter {
        warn!(
            component = "worker",
            event = "task_dead_lettered",
            message_id = %message_id,
            "receive budget spent; the queue will dead-letter this message"
        );
    }
}
