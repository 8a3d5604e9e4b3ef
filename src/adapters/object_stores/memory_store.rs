use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::errors::{BackupError, Result};
use crate::core::models::object_ref::ObjectRef;
use crate::core::traits::object_store::{ObjectBody, ObjectLister, ObjectSink, ObjectSource};

type Bucket = BTreeMap<String, Arc<Vec<u8>>>;

/// Thread-safe in-memory object store.
///
/// `put` collects the whole body before inserting it, so an object only
/// appears once its body reached a clean end-of-stream.
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    denied: Arc<RwLock<HashSet<String>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    /// Store an object directly, creating the bucket if needed.
    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), Arc::new(data.into()));
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|data| data.as_ref().clone())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .read()
            .get(bucket)
            .is_some_and(|b| b.contains_key(key))
    }

    /// Make every operation on `bucket` fail with `AccessDenied`.
    pub fn deny_access(&self, bucket: &str) {
        self.denied.write().insert(bucket.to_string());
    }

    fn check_access(&self, object: &ObjectRef) -> Result<()> {
        if self.denied.read().contains(&object.bucket) {
            return Err(BackupError::AccessDenied {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
            });
        }
        Ok(())
    }
}

impl ObjectSource for MemoryObjectStore {
    fn open(&self, object: &ObjectRef) -> Result<ObjectBody> {
        self.check_access(object)?;
        let data = self
            .buckets
            .read()
            .get(&object.bucket)
            .and_then(|b| b.get(&object.key))
            .cloned()
            .ok_or_else(|| BackupError::ObjectNotFound {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
            })?;
        Ok(Box::new(Cursor::new(data.as_ref().clone())))
    }
}

impl ObjectSink for MemoryObjectStore {
    fn put(&self, object: &ObjectRef, body: &mut dyn Read) -> Result<u64> {
        self.check_access(object)?;
        if !self.buckets.read().contains_key(&object.bucket) {
            return Err(BackupError::StoreFailed {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                reason: "no such bucket".into(),
            });
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data)?;
        let size = data.len() as u64;
        self.put_object(&object.bucket, &object.key, data);
        Ok(size)
    }
}

impl ObjectLister for MemoryObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.read();
        let Some(objects) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
