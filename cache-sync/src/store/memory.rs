//! In-memory object store.
//!
//! Keeps every object in a map. Useful as a dry target and as the store behind
//! tests, which can script per-path latency and failures.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ObjectStore, PutRequest, StoreError};

/// An object as the store received it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

/// Scripted failure for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Reject the credentials
    Unauthorized,
    /// Fail with a server-side error
    ServerError,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    failures: Mutex<HashMap<String, FailMode>>,
    delays: Mutex<HashMap<String, Duration>>,
    started: Mutex<Vec<String>>,
    put_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put of `remote_path` fail with `mode`.
    pub fn fail_path(&self, remote_path: &str, mode: FailMode) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(remote_path.to_string(), mode);
        }
    }

    /// Hold puts of `remote_path` for `delay` before answering.
    pub fn delay_path(&self, remote_path: &str, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.insert(remote_path.to_string(), delay);
        }
    }

    pub fn get(&self, remote_path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(remote_path).cloned())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    /// Number of put calls, successful or not.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Paths in the order their puts began.
    pub fn started_paths(&self) -> Vec<String> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, request: PutRequest) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut started) = self.started.lock() {
            started.push(request.remote_path.clone());
        }

        let delay = self
            .delays
            .lock()
            .ok()
            .and_then(|d| d.get(&request.remote_path).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|f| f.get(&request.remote_path).copied());
        match failure {
            Some(FailMode::Unauthorized) => {
                return Err(StoreError::Unauthorized("token rejected".to_string()))
            }
            Some(FailMode::ServerError) => {
                return Err(StoreError::Rejected {
                    status: 500,
                    message: "internal error".to_string(),
                })
            }
            None => {}
        }

        let mut body = request.body;
        let mut data = BytesMut::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }

        let object = StoredObject {
            data: data.freeze(),
            content_type: request.content_type,
            metadata: request.metadata,
        };
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(request.remote_path, object);
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
