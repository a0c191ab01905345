use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log_rollup_core::archive::{build_archive, ArchiveEntry};
use log_rollup_core::contract::{Task, ValidationError};
use log_rollup_core::error::RollupError;
use log_rollup_core::log_key::LogObjectKey;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::credentials::RoleProvider;
use crate::adapters::object_store::{
    DeleteFailure, ObjectStore, ObjectStoreFactory, MAX_DELETE_BATCH,
};
use crate::config::ArchiverSettings;

pub const METADATA_FILE_COUNT: &str = "original-file-count";
pub const METADATA_FILE_SIZE: &str = "original-file-size";

pub struct ArchiverDeps<'a> {
    pub roles: &'a dyn RoleProvider,
    pub stores: &'a dyn ObjectStoreFactory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Created,
    AlreadyArchived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    pub archive_key: String,
    pub status: ArchiveStatus,
    pub members: usize,
    pub original_bytes: u64,
    pub archive_bytes: u64,
    pub deleted: usize,
    pub delete_failures: Vec<DeleteFailure>,
}

/// Compacts one task's members into its archive and optionally removes them.
///
/// Members are deleted only after the uploaded archive has been verified, so
/// an interrupted run always leaves either the originals or a complete
/// archive behind. A re-run whose archive already exists does nothing.
pub fn archive_task(
    task: &Task,
    settings: &ArchiverSettings,
    deps: &ArchiverDeps<'_>,
) -> Result<ArchiveOutcome, RollupError> {
    let started_at = Instant::now();
    task.validate()?;

    let credentials =
        deps.roles
            .assume(&task.role_identifier)
            .map_err(|message| RollupError::Credentials {
                role: task.role_identifier.clone(),
                message,
            })?;
    let store = deps
        .stores
        .connect(&credentials)
        .map_err(|message| RollupError::Credentials {
            role: task.role_identifier.clone(),
            message,
        })?;

    let archive_key = task.archive_key();
    info!(
        component = "archiver",
        event = "task_started",
        bucket = %task.bucket,
        prefix = %task.prefix,
        day = %task.day,
        archive_key = %archive_key,
        members = task.len(),
        "archiving task"
    );

    let existing = store
        .head(&task.bucket, &archive_key)
        .map_err(|message| RollupError::Verification {
            bucket: task.bucket.clone(),
            key: archive_key.clone(),
            message,
        })?;
    if let Some(head) = existing {
        info!(
            component = "archiver",
            event = "already_archived",
            bucket = %task.bucket,
            archive_key = %archive_key,
            "archive exists; nothing to do"
        );
        return Ok(ArchiveOutcome {
            archive_key,
            status: ArchiveStatus::AlreadyArchived,
            members: task.len(),
            original_bytes: task.total_declared_bytes().unwrap_or(0),
            archive_bytes: head.size,
            deleted: 0,
            delete_failures: Vec::new(),
        });
    }

    let limit = settings.ephemeral_capacity_bytes;
    if let Some(declared) = task.total_declared_bytes() {
        if declared > limit {
            return Err(RollupError::SizeLimitExceeded {
                required: declared,
                limit,
            });
        }
    }

    let staging = tempfile::Builder::new().prefix("rollup-").tempdir()?;
    let members = parse_members(task)?;
    let (entries, original_bytes) = download_members(
        store.as_ref(),
        &task.bucket,
        &members,
        staging.path(),
        settings,
    )?;

    let archive = task.archive();
    let archive_path = staging.path().join(&archive.name);
    let mut writer = build_archive(&entries, BufWriter::new(File::create(&archive_path)?))?;
    writer.flush()?;
    drop(writer);
    let archive_bytes = fs::metadata(&archive_path)?.len();

    let metadata = BTreeMap::from([
        (METADATA_FILE_COUNT.to_string(), task.len().to_string()),
        (METADATA_FILE_SIZE.to_string(), original_bytes.to_string()),
    ]);
    store
        .put(&task.bucket, &archive_key, &archive_path, &metadata)
        .map_err(|message| RollupError::Upload {
            bucket: task.bucket.clone(),
            key: archive_key.clone(),
            message,
        })?;
    verify_upload(store.as_ref(), &task.bucket, &archive_key, archive_bytes)?;

    info!(
        component = "archiver",
        event = "archive_uploaded",
        bucket = %task.bucket,
        archive_key = %archive_key,
        original_bytes,
        archive_bytes,
        "archive uploaded and verified"
    );

    let mut delete_failures = Vec::new();
    if settings.delete_originals {
        for chunk in task.member_keys.chunks(MAX_DELETE_BATCH) {
            delete_failures.extend(store.delete_many(&task.bucket, chunk));
        }
        for failure in &delete_failures {
            warn!(
                component = "archiver",
                event = "delete_failed",
                bucket = %task.bucket,
                key = %failure.key,
                error = %failure.message,
                "failed to delete archived member"
            );
        }
    }
    let deleted = if settings.delete_originals {
        task.len().saturating_sub(delete_failures.len())
    } else {
        0
    };

    info!(
        component = "archiver",
        event = "task_completed",
        bucket = %task.bucket,
        archive_key = %archive_key,
        deleted,
        delete_failures = delete_failures.len(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "task archived"
    );

    Ok(ArchiveOutcome {
        archive_key,
        status: ArchiveStatus::Created,
        members: task.len(),
        original_bytes,
        archive_bytes,
        deleted,
        delete_failures,
    })
}

fn parse_members(task: &Task) -> Result<Vec<LogObjectKey>, RollupError> {
    task.members()
        .into_iter()
        .map(|(key, size)| {
            LogObjectKey::parse(&task.bucket, key, size).map_err(|error| {
                RollupError::InvalidTask(ValidationError::new(format!(
                    "member key {key} is not an access log: {error}"
                )))
            })
        })
        .collect()
}

/// Downloads every member into `staging` on a bounded pool.
///
/// Objects stream straight to disk. Entries come back in member order
/// regardless of completion order. The running byte total is checked against
/// the ephemeral budget after every object.
fn download_members(
    store: &dyn ObjectStore,
    bucket: &str,
    members: &[LogObjectKey],
    staging: &Path,
    settings: &ArchiverSettings,
) -> Result<(Vec<ArchiveEntry>, u64), RollupError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.download_concurrency.max(1))
        .thread_name(|index| format!("rollup-download-{index}"))
        .build()
        .map_err(|error| RollupError::Staging(io::Error::other(error.to_string())))?;
    let downloaded = AtomicU64::new(0);
    let limit = settings.ephemeral_capacity_bytes;

    let entries = pool.install(|| {
        members
            .par_iter()
            .map(|member| {
                let path = staging.join(member.basename());
                let size = store
                    .download_to(bucket, member.key(), &path)
                    .map_err(|message| RollupError::Download {
                        bucket: bucket.to_string(),
                        key: member.key().to_string(),
                        message,
                    })?;
                let total = downloaded.fetch_add(size, Ordering::SeqCst) + size;
                if total > limit {
                    return Err(RollupError::SizeLimitExceeded {
                        required: total,
                        limit,
                    });
                }

                Ok(ArchiveEntry {
                    name: member.basename().to_string(),
                    modified: member.timestamp(),
                    path,
                })
            })
            .collect::<Result<Vec<_>, RollupError>>()
    })?;

    Ok((entries, downloaded.load(Ordering::SeqCst)))
}

fn verify_upload(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    expected_size: u64,
) -> Result<(), RollupError> {
    let verification = |message: String| RollupError::Verification {
        bucket: bucket.to_string(),
        key: key.to_string(),
        message,
    };

    match store.head(bucket, key).map_err(verification)? {
        None => Err(verification("archive is missing after upload".to_string())),
        Some(head) if head.size != expected_size => Err(verification(format!(
            "uploaded size {} does not match local size {expected_size}",
            head.size
        ))),
        Some(_) => Ok(()),
    }
}
