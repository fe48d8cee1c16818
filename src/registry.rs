//! Registry of rate-limit buckets keyed by compiled bucket template.
//!
//! Buckets are created on first reference and live as long as the registry.
//! The reserved [`GLOBAL_KEY`] bucket exists from the start.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::bucket::{Bucket, BucketSnapshot, GLOBAL_KEY};
use crate::error::RestError;
use tracing::debug;

/// Owns every bucket of one requester.
#[derive(Debug)]
pub struct BucketRegistry {
    default_limit: u64,
    global: Arc<Bucket>,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
}

impl BucketRegistry {
    /// New buckets start with `default_limit` requests available.
    pub fn new(default_limit: u64) -> Self {
        let global = Arc::new(Bucket::new(GLOBAL_KEY, default_limit));
        let mut buckets = HashMap::new();
        buckets.insert(GLOBAL_KEY.to_string(), global.clone());
        Self { default_limit, global, buckets: RwLock::new(buckets) }
    }

    /// The bucket for `key`, creating it if needed. Concurrent callers with the
    /// same key always get the same instance. [`GLOBAL_KEY`] is not a route
    /// bucket and is refused; use [`BucketRegistry::global`].
    pub fn get_or_create(&self, key: &str) -> Result<Arc<Bucket>, RestError> {
        if key == GLOBAL_KEY {
            return Err(RestError::ReservedBucket { key: key.to_string() });
        }
        if let Some(bucket) = self.get(key) {
            return Ok(bucket);
        }
        let mut map = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = map
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(target: "tollgate::registry", bucket = %key, limit = self.default_limit, "bucket created");
                Arc::new(Bucket::new(key, self.default_limit))
            })
            .clone();
        Ok(bucket)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Bucket>> {
        let map = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    /// The account-wide bucket.
    pub fn global(&self) -> &Arc<Bucket> {
        &self.global
    }

    pub fn len(&self) -> usize {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Always false: the global bucket is registered on construction.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Snapshot every bucket, sorted by key.
    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let buckets: Vec<Arc<Bucket>> = {
            let map = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        let mut entries: Vec<BucketSnapshot> = buckets.iter().map(|b| b.snapshot()).collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}
