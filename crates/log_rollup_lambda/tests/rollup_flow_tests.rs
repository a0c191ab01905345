mod support;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use log_rollup_core::batching::BatchLimits;
use log_rollup_core::contract::{ProducerRequest, Task};
use log_rollup_core::lease::RedrivePolicy;
use log_rollup_core::log_key::LogObjectKey;
use log_rollup_lambda::config::ArchiverSettings;
use log_rollup_lambda::handlers::archiver::{
    archive_task, ArchiveStatus, ArchiverDeps, METADATA_FILE_COUNT, METADATA_FILE_SIZE,
};
use log_rollup_lambda::handlers::producer::{run_producer, ProducerDeps};
use log_rollup_lambda::handlers::worker::{decode_queue_event, run_polling_worker, run_worker};
use serde_json::json;
use support::archive::read_archive;
use support::fakes::{LeasedQueue, MemoryBuckets, StaticRoles};

const BUCKET: &str = "logs";
const ROLE: &str = "arn:aws:iam::123456789012:role/log-rollup";

const EXAMPLE_JUL1_A: &str = "example.com/2022-07-01-05-15-43-42117B9A70B0F1BA";
const EXAMPLE_JUL1_B: &str = "example.com/2022-07-01-23-59-59-E568B2907131C0C0";
const EXAMPLE_JUL2: &str = "example.com/2022-07-02-00-00-00-0A1B2C3D4E5F6071";
const EXAMPLE_TODAY: &str = "example.com/2022-07-03-01-00-00-FFEEDDCCBBAA9988";
const EXAMPLE_PAGE: &str = "example.com/index.html";
const OTHER_JUL1: &str = "other.org/2022-07-01-12-00-00-1234567890ABCDEF";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 7, 3).expect("valid date")
}

fn seeded_buckets() -> MemoryBuckets {
    let buckets = MemoryBuckets::default();
    for key in [
        EXAMPLE_JUL1_A,
        EXAMPLE_JUL1_B,
        EXAMPLE_JUL2,
        EXAMPLE_TODAY,
        EXAMPLE_PAGE,
        OTHER_JUL1,
    ] {
        buckets.seed(BUCKET, key, format!("log line for {key}\n").as_bytes());
    }
    buckets
}

fn settings(delete_originals: bool) -> ArchiverSettings {
    ArchiverSettings {
        delete_originals,
        download_concurrency: 4,
        ..ArchiverSettings::default()
    }
}

fn request() -> ProducerRequest {
    ProducerRequest {
        role_identifier: ROLE.to_string(),
        prefixes: vec![
            format!("s3://{BUCKET}/example.com/"),
            format!("s3://{BUCKET}/other.org/"),
        ],
        as_of: None,
    }
}

fn new_queue() -> LeasedQueue {
    LeasedQueue::new(RedrivePolicy::default(), Duration::minutes(15))
}

fn produce(buckets: &MemoryBuckets, queue: &LeasedQueue) -> usize {
    let summary = run_producer(
        request(),
        today(),
        BatchLimits::default(),
        &ProducerDeps {
            roles: &StaticRoles,
            stores: buckets,
            queue,
            region: Some("us-east-1"),
        },
    )
    .expect("producer request should be valid");
    assert_eq!(summary.status, "ok");
    summary.tasks_enqueued
}

fn archive_keys(buckets: &MemoryBuckets, prefix: &str) -> Vec<String> {
    buckets
        .keys(BUCKET)
        .into_iter()
        .filter(|key| key.starts_with(prefix) && key.ends_with(".tgz"))
        .collect()
}

fn task_for(keys: &[&str]) -> Task {
    let parsed: Vec<LogObjectKey> = keys
        .iter()
        .map(|key| {
            let size = format!("log line for {key}\n").len() as u64;
            LogObjectKey::parse(BUCKET, *key, size).expect("fixture key should parse")
        })
        .collect();
    Task::from_group(ROLE, BUCKET, &parsed).expect("fixture task should be valid")
}

#[test]
fn producer_and_worker_compact_past_days_into_archives() {
    let buckets = seeded_buckets();
    let queue = new_queue();

    assert_eq!(produce(&buckets, &queue), 3);

    let summary = run_polling_worker(
        &queue,
        10,
        &settings(false),
        &RedrivePolicy::default(),
        &ArchiverDeps {
            roles: &StaticRoles,
            stores: &buckets,
        },
    )
    .expect("queue should be readable");
    assert_eq!(summary.received, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert!(queue.is_drained());

    let jul1 = archive_keys(&buckets, "example.com/rollup-2022-07-01-");
    let jul2 = archive_keys(&buckets, "example.com/rollup-2022-07-02-");
    let other = archive_keys(&buckets, "other.org/rollup-2022-07-01-");
    assert_eq!((jul1.len(), jul2.len(), other.len()), (1, 1, 1));
    assert!(archive_keys(&buckets, "example.com/rollup-2022-07-03-").is_empty());

    let stored = buckets.object(BUCKET, &jul1[0]).expect("archive exists");
    let files = read_archive(&stored.body);
    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "2022-07-01-05-15-43-42117B9A70B0F1BA",
            "2022-07-01-23-59-59-E568B2907131C0C0",
        ]
    );
    assert_eq!(files[0].body, format!("log line for {EXAMPLE_JUL1_A}\n").into_bytes());
    assert_eq!(files[0].mode, 0o644);
    let first_logged_at = Utc
        .with_ymd_and_hms(2022, 7, 1, 5, 15, 43)
        .single()
        .expect("valid timestamp");
    assert_eq!(files[0].mtime, first_logged_at.timestamp() as u64);

    let original_size = format!("log line for {EXAMPLE_JUL1_A}\n").len()
        + format!("log line for {EXAMPLE_JUL1_B}\n").len();
    assert_eq!(
        stored.metadata.get(METADATA_FILE_COUNT).map(String::as_str),
        Some("2")
    );
    assert_eq!(
        stored.metadata.get(METADATA_FILE_SIZE),
        Some(&original_size.to_string())
    );

    for key in [EXAMPLE_JUL1_A, EXAMPLE_JUL1_B, EXAMPLE_JUL2, OTHER_JUL1] {
        assert!(buckets.object(BUCKET, key).is_some(), "{key} should be kept");
    }
}

#[test]
fn deleting_originals_leaves_only_archives_and_unrelated_objects() {
    let buckets = seeded_buckets();
    let queue = new_queue();
    let deps = ArchiverDeps {
        roles: &StaticRoles,
        stores: &buckets,
    };

    produce(&buckets, &queue);
    let summary = run_polling_worker(&queue, 10, &settings(true), &RedrivePolicy::default(), &deps)
        .expect("queue should be readable");
    assert_eq!(summary.succeeded, 3);

    for key in [EXAMPLE_JUL1_A, EXAMPLE_JUL1_B, EXAMPLE_JUL2, OTHER_JUL1] {
        assert!(buckets.object(BUCKET, key).is_none(), "{key} should be deleted");
    }
    assert!(buckets.object(BUCKET, EXAMPLE_TODAY).is_some());
    assert!(buckets.object(BUCKET, EXAMPLE_PAGE).is_some());
    assert_eq!(archive_keys(&buckets, "").len(), 3);

    assert_eq!(produce(&buckets, &queue), 0, "nothing is left to compact");
}

#[test]
fn rerunning_the_same_tasks_does_not_upload_again() {
    let buckets = seeded_buckets();
    let queue = new_queue();
    let deps = ArchiverDeps {
        roles: &StaticRoles,
        stores: &buckets,
    };

    produce(&buckets, &queue);
    run_polling_worker(&queue, 10, &settings(false), &RedrivePolicy::default(), &deps)
        .expect("first run");
    let archives = archive_keys(&buckets, "");
    assert_eq!(buckets.puts(), 3);

    assert_eq!(produce(&buckets, &queue), 3, "archives are not access logs");
    let summary = run_polling_worker(&queue, 10, &settings(false), &RedrivePolicy::default(), &deps)
        .expect("second run");

    assert_eq!(summary.succeeded, 3);
    assert_eq!(buckets.puts(), 3);
    assert_eq!(archive_keys(&buckets, ""), archives);
}

#[test]
fn identical_inputs_produce_identical_archives() {
    let task = task_for(&[EXAMPLE_JUL1_B, EXAMPLE_JUL1_A]);
    let mut bodies = Vec::new();

    for _ in 0..2 {
        let buckets = seeded_buckets();
        let outcome = archive_task(
            &task,
            &settings(false),
            &ArchiverDeps {
                roles: &StaticRoles,
                stores: &buckets,
            },
        )
        .expect("archive should be built");
        assert_eq!(outcome.status, ArchiveStatus::Created);
        let stored = buckets
            .object(BUCKET, &outcome.archive_key)
            .expect("archive uploaded");
        bodies.push(stored.body);
    }

    assert_eq!(bodies[0], bodies[1]);
}

#[test]
fn delete_failures_are_reported_without_failing_the_task() {
    let buckets = seeded_buckets();
    buckets.lock_key(EXAMPLE_JUL1_B);
    let task = task_for(&[EXAMPLE_JUL1_A, EXAMPLE_JUL1_B]);

    let outcome = archive_task(
        &task,
        &settings(true),
        &ArchiverDeps {
            roles: &StaticRoles,
            stores: &buckets,
        },
    )
    .expect("delete failures should not fail the task");

    assert_eq!(outcome.status, ArchiveStatus::Created);
    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.delete_failures.len(), 1);
    assert_eq!(outcome.delete_failures[0].key, EXAMPLE_JUL1_B);
    assert!(buckets.object(BUCKET, EXAMPLE_JUL1_A).is_none());
    assert!(buckets.object(BUCKET, EXAMPLE_JUL1_B).is_some());
    assert!(buckets.object(BUCKET, &outcome.archive_key).is_some());
}

#[test]
fn failing_task_is_redelivered_once_then_dead_lettered() {
    let buckets = seeded_buckets();
    buckets.fail_get(OTHER_JUL1);
    let queue = new_queue();
    let redrive = RedrivePolicy::default();
    let deps = ArchiverDeps {
        roles: &StaticRoles,
        stores: &buckets,
    };

    produce(&buckets, &queue);
    let first = run_polling_worker(&queue, 10, &settings(true), &redrive, &deps)
        .expect("first poll");
    assert_eq!((first.received, first.succeeded, first.failed), (3, 2, 1));

    queue.let_leases_lapse();
    let second = run_polling_worker(&queue, 10, &settings(true), &redrive, &deps)
        .expect("second poll");
    assert_eq!((second.received, second.failed), (1, 1));

    queue.let_leases_lapse();
    let third = run_polling_worker(&queue, 10, &settings(true), &redrive, &deps)
        .expect("third poll");
    assert_eq!(third.received, 0);

    let dead = queue.dead_letters();
    assert_eq!(dead.len(), 1);
    let task = Task::from_message_body(&dead[0]).expect("dead letter is a task");
    assert_eq!(task.member_keys, vec![OTHER_JUL1.to_string()]);
    assert!(archive_keys(&buckets, "other.org/").is_empty());
    assert!(buckets.object(BUCKET, OTHER_JUL1).is_some());
}

#[test]
fn queue_event_reports_only_the_failed_record() {
    let buckets = seeded_buckets();
    let good = task_for(&[EXAMPLE_JUL2]);
    let event = json!({
        "Records": [
            {
                "eventSource": "aws:sqs",
                "messageId": "bad",
                "body": "{\"bucket\": 7}",
                "attributes": {"ApproximateReceiveCount": "2"}
            },
            {
                "eventSource": "aws:sqs",
                "messageId": "good",
                "body": good.to_message_body().expect("task serializes"),
                "attributes": {"ApproximateReceiveCount": "1"}
            }
        ]
    });

    let records = decode_queue_event(&event).expect("event should decode");
    let response = run_worker(
        &records,
        &settings(false),
        &RedrivePolicy::default(),
        &ArchiverDeps {
            roles: &StaticRoles,
            stores: &buckets,
        },
    )
    .expect("every failed record has a message id");

    let failed: Vec<&str> = response
        .batch_item_failures
        .iter()
        .map(|failure| failure.item_identifier.as_str())
        .collect();
    assert_eq!(failed, vec!["bad"]);
    assert_eq!(response.outcomes.len(), 1);
    assert_eq!(response.outcomes[0].archive_key, good.archive_key());
    assert!(buckets.object(BUCKET, &good.archive_key()).is_some());
}

#[test]
fn failed_record_without_message_id_fails_the_invocation() {
    let buckets = seeded_buckets();
    let event = json!({
        "Records": [
            {"eventSource": "aws:sqs", "body": "{\"bucket\": 7}"}
        ]
    });

    let records = decode_queue_event(&event).expect("event should decode");
    let failure = run_worker(
        &records,
        &settings(false),
        &RedrivePolicy::default(),
        &ArchiverDeps {
            roles: &StaticRoles,
            stores: &buckets,
        },
    )
    .expect_err("unreportable failure should fail the invocation");

    assert_eq!(failure.code(), "payload_error");
}
