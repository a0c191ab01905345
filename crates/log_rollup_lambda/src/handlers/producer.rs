use std::collections::BTreeMap;

use chrono::NaiveDate;
use log_rollup_core::batching::{
    interleave_round_robin, split_group, validate_partition, BatchLimits,
    QUEUE_MESSAGE_LIMIT_BYTES,
};
use log_rollup_core::contract::{
    normalize_producer_request, PrefixReport, ProducerRequest, ProducerSummary, Task,
};
use log_rollup_core::error::RollupError;
use log_rollup_core::grouping::group_by_day;
use log_rollup_core::log_key::S3Uri;
use tracing::{debug, error, info, warn};

use crate::adapters::credentials::RoleProvider;
use crate::adapters::object_store::ObjectStoreFactory;
use crate::adapters::task_queue::TaskQueue;

pub struct ProducerDeps<'a> {
    pub roles: &'a dyn RoleProvider,
    pub stores: &'a dyn ObjectStoreFactory,
    pub queue: &'a dyn TaskQueue,
    /// Region the client is configured for; buckets elsewhere are refused.
    pub region: Option<&'a str>,
}

/// The effective as-of day: a requested replay day, never later than `today`.
pub fn resolve_as_of(requested: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    requested.map_or(today, |day| day.min(today))
}

/// Lists, groups and enqueues work for every prefix of `request`.
///
/// Only an invalid request fails the call. Each prefix is handled in
/// isolation and its failure is recorded in the returned summary.
pub fn run_producer(
    request: ProducerRequest,
    today: NaiveDate,
    limits: BatchLimits,
    deps: &ProducerDeps<'_>,
) -> Result<ProducerSummary, RollupError> {
    let request = normalize_producer_request(request)
        .map_err(|error| RollupError::InvalidRequest(error.to_string()))?;
    let as_of = resolve_as_of(request.as_of, today);

    info!(
        component = "producer",
        event = "run_started",
        as_of = %as_of,
        prefixes = request.prefixes.len(),
        "producer run started"
    );

    let reports: Vec<PrefixReport> = request
        .prefixes
        .iter()
        .map(|prefix| produce_for_prefix(&request.role_identifier, prefix, as_of, limits, deps))
        .collect();
    let summary = ProducerSummary::from_reports(as_of, reports);

    info!(
        component = "producer",
        event = "run_completed",
        status = %summary.status,
        tasks_enqueued = summary.tasks_enqueued,
        tasks_failed = summary.tasks_failed,
        "producer run completed"
    );
    Ok(summary)
}

fn produce_for_prefix(
    role_identifier: &str,
    prefix: &str,
    as_of: NaiveDate,
    limits: BatchLimits,
    deps: &ProducerDeps<'_>,
) -> PrefixReport {
    let mut report = PrefixReport {
        prefix: prefix.to_string(),
        ..PrefixReport::default()
    };

    let tasks = match plan_prefix(role_identifier, prefix, as_of, limits, deps, &mut report) {
        Ok(tasks) => tasks,
        Err(failure) => {
            error!(
                component = "producer",
                event = "prefix_failed",
                prefix = %prefix,
                error_code = failure.code(),
                error = %failure,
                "skipping prefix"
            );
            report.error = Some(failure.to_string());
            return report;
        }
    };

    for task in tasks {
        match publish(&task, deps.queue) {
            Ok(()) => {
                report.tasks_enqueued += 1;
                debug!(
                    component = "producer",
                    event = "task_enqueued",
                    bucket = %task.bucket,
                    prefix = %task.prefix,
                    day = %task.day,
                    members = task.len(),
                    "task enqueued"
                );
            }
            Err(failure) => {
                report.tasks_failed += 1;
                error!(
                    component = "producer",
                    event = "task_enqueue_failed",
                    bucket = %task.bucket,
                    prefix = %task.prefix,
                    day = %task.day,
                    error_code = failure.code(),
                    error = %failure,
                    "failed to enqueue task"
                );
            }
        }
    }

    info!(
        component = "producer",
        event = "prefix_completed",
        prefix = %prefix,
        tasks_enqueued = report.tasks_enqueued,
        tasks_failed = report.tasks_failed,
        keys_grouped = report.keys_grouped,
        keys_skipped = report.keys_skipped,
        keys_deferred = report.keys_deferred,
        "prefix processed"
    );
    report
}

/// Builds the prefix's tasks in publication order.
fn plan_prefix(
    role_identifier: &str,
    prefix: &str,
    as_of: NaiveDate,
    limits: BatchLimits,
    deps: &ProducerDeps<'_>,
    report: &mut PrefixReport,
) -> Result<Vec<Task>, RollupError> {
    let uri = S3Uri::parse(prefix).map_err(|error| RollupError::InvalidRequest(error.to_string()))?;

    let credentials =
        deps.roles
            .assume(role_identifier)
            .map_err(|message| RollupError::Credentials {
                role: role_identifier.to_string(),
                message,
            })?;
    let store = deps
        .stores
        .connect(&credentials)
        .map_err(|message| RollupError::Credentials {
            role: role_identifier.to_string(),
            message,
        })?;

    if let Some(expected) = deps.region {
        let bucket_region =
            store
                .bucket_region(uri.bucket())
                .map_err(|message| RollupError::Listing {
                    bucket: uri.bucket().to_string(),
                    prefix: uri.key().to_string(),
                    message,
                })?;
        if bucket_region != expected {
            return Err(RollupError::RegionMismatch {
                bucket: uri.bucket().to_string(),
                bucket_region,
                expected: expected.to_string(),
            });
        }
    }

    let objects = store
        .list(uri.bucket(), uri.key())
        .map_err(|message| RollupError::Listing {
            bucket: uri.bucket().to_string(),
            prefix: uri.key().to_string(),
            message,
        })?;

    let grouped = group_by_day(uri.bucket(), objects, as_of);
    for skipped in &grouped.skipped {
        debug!(
            component = "producer",
            event = "key_skipped",
            key = %skipped.key,
            reason = %skipped.reason,
            "skipping key that is not an access log"
        );
    }
    report.keys_grouped = grouped.total_keys();
    report.keys_skipped = grouped.skipped.len();
    report.keys_deferred = grouped.deferred;
    if !grouped.skipped.is_empty() {
        info!(
            component = "producer",
            event = "keys_skipped",
            prefix = %prefix,
            count = grouped.skipped.len(),
            "skipped keys that are not access logs"
        );
    }

    let mut per_directory: BTreeMap<String, Vec<Task>> = BTreeMap::new();
    for (group, keys) in &grouped.groups {
        let batches = split_group(keys, limits);
        if let Err(invalid) = validate_partition(keys, &batches) {
            warn!(
                component = "producer",
                event = "partition_rejected",
                directory = %group.directory,
                day = %group.day,
                error = %invalid,
                "dropping day group"
            );
            report.tasks_failed += 1;
            continue;
        }

        for batch in batches {
            match Task::from_group(role_identifier, uri.bucket(), &batch) {
                Ok(task) => per_directory
                    .entry(group.directory.clone())
                    .or_default()
                    .push(task),
                Err(invalid) => {
                    warn!(
                        component = "producer",
                        event = "task_rejected",
                        directory = %group.directory,
                        day = %group.day,
                        error = %invalid,
                        "dropping batch"
                    );
                    report.tasks_failed += 1;
                }
            }
        }
    }

    Ok(interleave_round_robin(per_directory.into_values().collect()))
}

fn publish(task: &Task, queue: &dyn TaskQueue) -> Result<(), RollupError> {
    let body = task.to_message_body()?;
    if body.len() > QUEUE_MESSAGE_LIMIT_BYTES {
        return Err(RollupError::Enqueue(format!(
            "task body of {} bytes exceeds the {QUEUE_MESSAGE_LIMIT_BYTES} byte message limit",
            body.len()
        )));
    }
    queue.send(&body).map_err(RollupError::Enqueue)
}
