use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use chrono::{DateTime, Utc};
use tokio::runtime::Handle;

use crate::adapters::credentials::AccountCredentials;
use crate::adapters::object_store::{
    normalize_location_constraint, DeleteFailure, ListedObject, ObjectHead, ObjectStore,
    ObjectStoreFactory, MAX_DELETE_BATCH,
};

/// Bridges the synchronous store interface onto the async SDK.
fn block_on<F: Future>(runtime: &Handle, future: F) -> F::Output {
    tokio::task::block_in_place(|| runtime.block_on(future))
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    runtime: Handle,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, runtime: Handle) -> Self {
        Self { client, runtime }
    }
}

impl ObjectStore for S3ObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>, String> {
        let client = self.client.clone();
        block_on(&self.runtime, async move {
            let mut pages = client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .into_paginator()
                .send();

            let mut objects = Vec::new();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|error| format!("list_objects_v2 failed: {error}"))?;
                for object in page.contents() {
                    let Some(key) = object.key() else {
                        continue;
                    };
                    objects.push(ListedObject {
                        key: key.to_string(),
                        size: object.size().and_then(|size| u64::try_from(size).ok()).unwrap_or(0),
                        last_modified: object
                            .last_modified()
                            .and_then(|value| DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())),
                    });
                }
            }
            Ok(objects)
        })
    }

    fn bucket_region(&self, bucket: &str) -> Result<String, String> {
        let client = self.client.clone();
        block_on(&self.runtime, async move {
            let output = client
                .get_bucket_location()
                .bucket(bucket)
                .send()
                .await
                .map_err(|error| format!("get_bucket_location failed: {error}"))?;
            Ok(normalize_location_constraint(
                output.location_constraint().map(|constraint| constraint.as_str()),
            ))
        })
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let client = self.client.clone();
        block_on(&self.runtime, async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|error| format!("get_object failed: {error}"))?;
            let body = output
                .body
                .collect()
                .await
                .map_err(|error| format!("failed to read object body: {error}"))?;
            Ok(body.into_bytes().to_vec())
        })
    }

    fn download_to(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, String> {
        let client = self.client.clone();
        block_on(&self.runtime, async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|error| format!("get_object failed: {error}"))?;
            let file = File::create(destination)
                .map_err(|error| format!("failed to create {}: {error}", destination.display()))?;
            let mut writer = BufWriter::new(file);
            let mut body = output.body;
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|error| format!("failed to read object body: {error}"))?;
                writer
                    .write_all(&chunk)
                    .map_err(|error| format!("failed to write {}: {error}", destination.display()))?;
                written += chunk.len() as u64;
            }
            writer
                .flush()
                .map_err(|error| format!("failed to write {}: {error}", destination.display()))?;
            Ok(written)
        })
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let metadata: HashMap<String, String> = metadata.clone().into_iter().collect();
        block_on(&self.runtime, async move {
            let body = ByteStream::from_path(source)
                .await
                .map_err(|error| format!("failed to open {}: {error}", source.display()))?;
            client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type("application/gzip")
                .set_metadata(Some(metadata))
                .body(body)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("put_object failed: {error}"))
        })
    }

    fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, String> {
        let client = self.client.clone();
        block_on(&self.runtime, async move {
            match client.head_object().bucket(bucket).key(key).send().await {
                Ok(output) => Ok(Some(ObjectHead {
                    size: output
                        .content_length()
                        .and_then(|size| u64::try_from(size).ok())
                        .unwrap_or(0),
                    metadata: output
                        .metadata()
                        .map(|values| {
                            values
                                .iter()
                                .map(|(name, value)| (name.clone(), value.clone()))
                                .collect()
                        })
                        .unwrap_or_default(),
                })),
                Err(error)
                    if error
                        .as_service_error()
                        .map(|service_error| service_error.is_not_found())
                        .unwrap_or(false) =>
                {
                    Ok(None)
                }
                Err(error) => Err(format!("head_object failed: {error}")),
            }
        })
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), String> {
        let client = self.client.clone();
        block_on(&self.runtime, async move {
            client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("delete_object failed: {error}"))
        })
    }

    fn delete_many(&self, bucket: &str, keys: &[String]) -> Vec<DeleteFailure> {
        let mut failures = Vec::new();
        for chunk in keys.chunks(MAX_DELETE_BATCH) {
            match self.delete_chunk(bucket, chunk) {
                Ok(chunk_failures) => failures.extend(chunk_failures),
                Err(message) => failures.extend(chunk.iter().map(|key| DeleteFailure {
                    key: key.clone(),
                    message: message.clone(),
                })),
            }
        }
        failures
    }
}

impl S3ObjectStore {
    fn delete_chunk(&self, bucket: &str, keys: &[String]) -> Result<Vec<DeleteFailure>, String> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| format!("invalid delete request: {error}"))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|error| format!("invalid delete request: {error}"))?;

        let client = self.client.clone();
        block_on(&self.runtime, async move {
            let output = client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|error| format!("delete_objects failed: {error}"))?;
            Ok(output
                .errors()
                .iter()
                .map(|error| DeleteFailure {
                    key: error.key().unwrap_or_default().to_string(),
                    message: format!(
                        "{}: {}",
                        error.code().unwrap_or("Unknown"),
                        error.message().unwrap_or_default()
                    ),
                })
                .collect())
        })
    }
}

/// Creates S3 clients from the ambient SDK configuration plus assumed-role keys.
#[derive(Clone)]
pub struct S3StoreFactory {
    sdk_config: aws_config::SdkConfig,
    runtime: Handle,
}

impl S3StoreFactory {
    pub fn new(sdk_config: aws_config::SdkConfig, runtime: Handle) -> Self {
        Self {
            sdk_config,
            runtime,
        }
    }
}

impl ObjectStoreFactory for S3StoreFactory {
    fn connect(&self, credentials: &AccountCredentials) -> Result<Box<dyn ObjectStore>, String> {
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            credentials.session_token.clone(),
            credentials.expiration.map(SystemTime::from),
            "sts-assume-role",
        );
        let config = aws_sdk_s3::config::Builder::from(&self.sdk_config)
            .credentials_provider(provider)
            .build();
        Ok(Box::new(S3ObjectStore::new(
            aws_sdk_s3::Client::from_conf(config),
            self.runtime.clone(),
        )))
    }
}
