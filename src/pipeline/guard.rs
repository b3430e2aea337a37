//! Admission control: a hard cap on concurrent extractions and a
//! per-URL in-flight set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{ExtractError, ExtractResult};

/// Refuses work beyond a fixed number of in-flight requests instead of
/// queueing it.
#[derive(Clone)]
pub struct ConcurrencyGuard {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Held for the lifetime of one admitted request.
#[derive(Debug)]
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGuard {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn try_enter(&self) -> ExtractResult<RequestPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(RequestPermit { _permit: permit }),
            Err(_) => {
                debug!("Concurrency cap of {} reached", self.limit);
                Err(ExtractError::TooManyRequests)
            }
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Keys of requests currently being processed.
#[derive(Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

/// Removes its key from the in-flight set when dropped.
#[derive(Debug)]
pub struct InFlightClaim {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or None if another request already holds it.
    pub fn try_claim(&self, key: &str) -> Option<InFlightClaim> {
        let mut keys = lock_keys(&self.keys);
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(InFlightClaim {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        lock_keys(&self.keys).contains(key)
    }
}

/// A panic while holding the lock leaves the set itself intact.
fn lock_keys(keys: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    keys.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        lock_keys(&self.keys).remove(&self.key);
    }
}
