//! Per-resource leases
//!
//! The engine does not serialize work on a resource id: two concurrent
//! mutating passes against the same id race on the service side. Callers that
//! can run passes concurrently acquire a lease for the resource key first.
//! Leases are process-local.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Keyed async mutex
#[derive(Clone, Default)]
pub struct ResourceLeases {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one pass; released on drop
#[derive(Debug)]
pub struct Lease {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Lease {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ResourceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait until `key` is free, then hold it
    pub async fn acquire(&self, key: impl Into<String>) -> Lease {
        let key = key.into();
        let guard = self.slot(&key).lock_owned().await;
        debug!(%key, "Lease acquired");
        Lease { key, _guard: guard }
    }

    /// Hold `key` only if nobody else does
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<Lease> {
        let key = key.into();
        let guard = self.slot(&key).try_lock_owned().ok()?;
        Some(Lease { key, _guard: guard })
    }
}
