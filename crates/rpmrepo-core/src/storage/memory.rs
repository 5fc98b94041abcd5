//! In-memory object store with an operation log and failure injection.
//!
//! Used by tests and dry runs. Clones share the same state.

use super::{ObjectReader, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncReadExt;

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body.
    pub data: Bytes,
    /// Content type given at upload.
    pub content_type: String,
}

/// One call against the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A read, whether or not the object existed.
    Get {
        /// Bucket read from.
        bucket: String,
        /// Key read.
        key: String,
    },
    /// A write, recorded before the body is consumed.
    Put {
        /// Bucket written to.
        bucket: String,
        /// Key written.
        key: String,
    },
    /// A delete.
    Delete {
        /// Bucket deleted from.
        bucket: String,
        /// Key deleted.
        key: String,
    },
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<(String, String), StoredObject>,
    failing_puts: HashSet<(String, String)>,
    failing_gets: HashSet<(String, String)>,
    log: Vec<Operation>,
}

/// Object store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn address(bucket: &str, key: &str) -> (String, String) {
    (bucket.to_string(), key.to_string())
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object without recording an operation.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.lock().objects.insert(
            address(bucket, key),
            StoredObject {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Current body of an object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(&address(bucket, key)).cloned()
    }

    /// Keys present in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every future `put` of this key fail without reading the body.
    pub fn fail_put(&self, bucket: &str, key: &str) {
        self.lock().failing_puts.insert(address(bucket, key));
    }

    /// Make every future `get` of this key fail.
    pub fn fail_get(&self, bucket: &str, key: &str) {
        self.lock().failing_gets.insert(address(bucket, key));
    }

    /// All operations so far, in call order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    /// Keys of all `put` operations so far, in call order.
    pub fn puts(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter_map(|op| match op {
                Operation::Put { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Let every injected `put` and `get` failure succeed again.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_puts.clear();
        state.failing_gets.clear();
    }

    /// Forget the operation log.
    pub fn clear_operations(&self) {
        self.lock().log.clear();
    }
}

fn injected(operation: &'static str, bucket: &str, key: &str) -> StorageError {
    StorageError::backend(
        "memory",
        operation,
        bucket,
        key,
        io::Error::other("injected failure"),
    )
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectReader>> {
        let mut state = self.lock();
        state.log.push(Operation::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if state.failing_gets.contains(&address(bucket, key)) {
            return Err(injected("get", bucket, key));
        }
        Ok(state
            .objects
            .get(&address(bucket, key))
            .map(|o| Box::pin(io::Cursor::new(o.data.clone())) as ObjectReader))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectReader,
        content_type: &str,
    ) -> StorageResult<u64> {
        {
            let mut state = self.lock();
            state.log.push(Operation::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
            if state.failing_puts.contains(&address(bucket, key)) {
                return Err(injected("put", bucket, key));
            }
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let len = data.len() as u64;
        self.insert(bucket, key, data, content_type);
        Ok(len)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut state = self.lock();
        state.log.push(Operation::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        state.objects.remove(&address(bucket, key));
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
