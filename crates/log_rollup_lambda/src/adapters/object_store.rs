use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use log_rollup_core::log_key::ListedObject;
use serde::Serialize;

use crate::adapters::credentials::AccountCredentials;

/// Maximum number of keys a single batch delete request accepts.
pub const MAX_DELETE_BATCH: usize = 1_000;

/// Region reported for buckets whose location constraint is empty.
pub const DEFAULT_BUCKET_REGION: &str = "us-east-1";

/// Maps a bucket location constraint onto a region name.
///
/// Buckets in us-east-1 report no constraint, and the oldest eu-west-1
/// buckets report the legacy `EU` alias.
pub fn normalize_location_constraint(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => DEFAULT_BUCKET_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    pub message: String,
}

pub trait ObjectStore: Send + Sync {
    /// Every object under `prefix`, across all listing pages.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>, String>;

    /// Region the bucket lives in, normalized with
    /// [`normalize_location_constraint`].
    fn bucket_region(&self, bucket: &str) -> Result<String, String>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;

    /// Writes the object to `destination` and returns the bytes written.
    fn download_to(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64, String> {
        let body = self.get(bucket, key)?;
        fs::write(destination, &body)
            .map_err(|error| format!("failed to write {}: {error}", destination.display()))?;
        Ok(body.len() as u64)
    }

    /// Uploads the file at `source` with user metadata.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), String>;

    /// `Ok(None)` when the object does not exist.
    fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, String>;

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, String> {
        Ok(self.head(bucket, key)?.is_some())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), String>;

    /// Deletes `keys`, reporting per-key failures instead of stopping.
    fn delete_many(&self, bucket: &str, keys: &[String]) -> Vec<DeleteFailure> {
        keys.iter()
            .filter_map(|key| {
                self.delete(bucket, key).err().map(|message| DeleteFailure {
                    key: key.clone(),
                    message,
                })
            })
            .collect()
    }
}

/// Builds an object store client scoped to one set of credentials.
pub trait ObjectStoreFactory: Send + Sync {
    fn connect(&self, credentials: &AccountCredentials) -> Result<Box<dyn ObjectStore>, String>;
}
