#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use log_rollup_core::lease::{LeaseQueue, RedrivePolicy};
use log_rollup_lambda::adapters::credentials::{AccountCredentials, RoleProvider};
use log_rollup_lambda::adapters::object_store::{
    ListedObject, ObjectHead, ObjectStore, ObjectStoreFactory, DEFAULT_BUCKET_REGION,
};
use log_rollup_lambda::adapters::task_queue::{ReceivedMessage, TaskQueue};

/// Hands out fixed credentials for any role.
pub struct StaticRoles;

impl RoleProvider for StaticRoles {
    fn assume(&self, role_identifier: &str) -> Result<AccountCredentials, String> {
        Ok(AccountCredentials {
            role_identifier: role_identifier.to_string(),
            access_key_id: "ASIATEST".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: Some("token".to_string()),
            expiration: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<(String, String), StoredObject>,
    locked_keys: BTreeSet<String>,
    failing_gets: BTreeSet<String>,
    puts: usize,
}

/// Shared in-memory buckets; every connection sees the same objects.
#[derive(Clone, Default)]
pub struct MemoryBuckets {
    state: Arc<Mutex<BucketState>>,
}

impl MemoryBuckets {
    pub fn seed(&self, bucket: &str, key: &str, body: &[u8]) {
        self.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.to_vec(),
                metadata: BTreeMap::new(),
            },
        );
    }

    /// Deletes of this key fail with an access error.
    pub fn lock_key(&self, key: &str) {
        self.lock().locked_keys.insert(key.to_string());
    }

    /// Downloads of this key fail.
    pub fn fail_get(&self, key: &str) {
        self.lock().failing_gets.insert(key.to_string());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(owner, _)| owner == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn puts(&self) -> usize {
        self.lock().puts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().expect("poisoned mutex")
    }
}

impl ObjectStore for MemoryBuckets {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>, String> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((owner, key), _)| owner == bucket && key.starts_with(prefix))
            .map(|((_, key), object)| ListedObject::new(key.clone(), object.body.len() as u64))
            .collect())
    }

    fn bucket_region(&self, _bucket: &str) -> Result<String, String> {
        Ok(DEFAULT_BUCKET_REGION.to_string())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let state = self.lock();
        if state.failing_gets.contains(key) {
            return Err("connection reset".to_string());
        }
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.body.clone())
            .ok_or_else(|| format!("no such key {key}"))
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        let body = fs::read(source).map_err(|error| error.to_string())?;
        let mut state = self.lock();
        state.puts += 1;
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, String> {
        Ok(self
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| ObjectHead {
                size: object.body.len() as u64,
                metadata: object.metadata.clone(),
            }))
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), String> {
        let mut state = self.lock();
        if state.locked_keys.contains(key) {
            return Err("access denied".to_string());
        }
        state.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

impl ObjectStoreFactory for MemoryBuckets {
    fn connect(&self, _credentials: &AccountCredentials) -> Result<Box<dyn ObjectStore>, String> {
        Ok(Box::new(self.clone()))
    }
}

/// Task queue backed by the lease model, with a manually advanced clock.
pub struct LeasedQueue {
    inner: Mutex<(LeaseQueue, DateTime<Utc>)>,
    visibility_timeout: Duration,
}

impl LeasedQueue {
    pub fn new(policy: RedrivePolicy, visibility_timeout: Duration) -> Self {
        let start = Utc
            .with_ymd_and_hms(2022, 7, 3, 6, 0, 0)
            .single()
            .expect("valid start time");
        Self {
            inner: Mutex::new((LeaseQueue::new(policy, visibility_timeout), start)),
            visibility_timeout,
        }
    }

    /// Moves the clock past every outstanding lease.
    pub fn let_leases_lapse(&self) {
        let mut inner = self.inner.lock().expect("poisoned mutex");
        inner.1 = inner.1 + self.visibility_timeout + Duration::seconds(1);
        let now = inner.1;
        inner.0.expire_leases(now);
    }

    pub fn dead_letters(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("poisoned mutex");
        inner.0.dead_letters().into_iter().map(str::to_string).collect()
    }

    pub fn is_drained(&self) -> bool {
        self.inner.lock().expect("poisoned mutex").0.is_drained()
    }
}

impl TaskQueue for LeasedQueue {
    fn send(&self, body: &str) -> Result<(), String> {
        self.inner.lock().expect("poisoned mutex").0.send(body);
        Ok(())
    }

    fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, String> {
        let mut inner = self.inner.lock().expect("poisoned mutex");
        let now = inner.1;
        let mut received = Vec::new();
        while received.len() < max_messages {
            let Some(message) = inner.0.receive(now) else {
                break;
            };
            received.push(ReceivedMessage {
                message_id: message.message_id.to_string(),
                receipt_handle: message.message_id.to_string(),
                body: message.body,
                receive_count: message.receive_count,
            });
        }
        Ok(received)
    }

    fn delete(&self, receipt_handle: &str) -> Result<(), String> {
        let message_id: u64 = receipt_handle
            .parse()
            .map_err(|_| format!("bad receipt handle {receipt_handle}"))?;
        self.inner
            .lock()
            .expect("poisoned mutex")
            .0
            .ack(message_id)
            .map_err(|error| error.to_string())
    }
}
