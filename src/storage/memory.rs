// In-memory object store with a settable clock and failure injection.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use super::{ObjectStore, RemoteObject, StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    now: Mutex<Option<DateTime<Utc>>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_gets: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp given to objects written through `put_object`.
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = Some(now);
    }

    pub fn insert(&self, key: &str, body: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                last_modified,
            },
        );
    }

    pub fn fail_put_for(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_get_for(&self, key: &str) {
        self.failing_gets.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete_for(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, StoredObject> {
        self.objects.lock().unwrap().clone()
    }

    /// Every call made against the store, as `"<op> <key>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self) -> StorageResult<Vec<RemoteObject>> {
        self.record("list".to_string());
        if *self.fail_listing.lock().unwrap() {
            return Err(StorageError::ListFailed("listing disabled".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, object)| RemoteObject {
                key: key.clone(),
                last_modified: object.last_modified,
                size: object.body.len() as u64,
            })
            .collect())
    }

    async fn put_object(&self, key: &str, source: &Path) -> StorageResult<()> {
        self.record(format!("put {}", key));
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(StorageError::UploadFailed(format!("refused {}", key)));
        }
        let body = fs::read(source)
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", source.display(), e)))?;
        let last_modified = self.now.lock().unwrap().unwrap_or_else(Utc::now);
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                last_modified,
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str, destination: &Path) -> StorageResult<u64> {
        self.record(format!("get {}", key));
        if self.failing_gets.lock().unwrap().contains(key) {
            return Err(StorageError::DownloadFailed(format!("refused {}", key)));
        }
        let body = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        fs::write(destination, &body)
            .map_err(|e| StorageError::DownloadFailed(format!("{}: {}", destination.display(), e)))?;
        Ok(body.len() as u64)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.record(format!("delete {}", key));
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::DeleteFailed(format!("refused {}", key)));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
