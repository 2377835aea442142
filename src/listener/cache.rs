//! Shared result cache.
//!
//! One `StorageCache` is created per mount operation and shared by reference
//! across every listener compiled in it. Only the latest write per key is
//! retained; updates on different keys never contend on a global lock.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::exec::ExecCommandResult;
use crate::listener::args::Args;

/// The most recent execution outcome recorded for a cache key.
#[derive(Debug, Clone, Serialize)]
pub struct StorageEntry {
    /// Final argument mapping the execution ran with.
    pub args: Args,

    /// Execution result, when the command succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecCommandResult>,

    /// Error message, when the command failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Seconds since epoch at which the entry was stored.
    pub stored_at: u64,
}

impl StorageEntry {
    pub fn success(args: Args, result: ExecCommandResult) -> Self {
        Self {
            args,
            result: Some(result),
            error: None,
            stored_at: now_epoch_secs(),
        }
    }

    pub fn failure(args: Args, error: String) -> Self {
        Self {
            args,
            result: None,
            error: Some(error),
            stored_at: now_epoch_secs(),
        }
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Concurrency-safe last-write-wins mapping of cache key to latest outcome.
#[derive(Clone, Default)]
pub struct StorageCache {
    inner: Arc<DashMap<String, StorageEntry>>,
}

impl StorageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest outcome for a key, replacing any previous entry.
    pub fn store(&self, key: &str, entry: StorageEntry) {
        self.inner.insert(key.to_string(), entry);
    }

    /// Snapshot of the latest outcome for a key.
    pub fn get(&self, key: &str) -> Option<StorageEntry> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
