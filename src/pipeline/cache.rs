//! In-memory result cache.
//!
//! Successful extractions are kept for a fixed TTL so repeated requests for
//! the same page skip the whole pipeline. Expired entries are dropped lazily
//! on read, pruned when the map grows, and swept by a background task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::MediaRecord;

/// Prune on insert once the map holds more than this many entries.
const PRUNE_THRESHOLD: usize = 100;

/// Time source, swappable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.start + offset
    }
}

struct CacheEntry {
    record: MediaRecord,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// TTL cache of extraction results keyed by source and normalized URL.
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Cached record, or None if missing or expired.
    pub fn get(&self, key: &str) -> Option<MediaRecord> {
        let key = key.to_ascii_lowercase();
        let now = self.clock.now();
        let expired = {
            let guard = self.entries.read().ok()?;
            match guard.get(&key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.record.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            if let Ok(mut guard) = self.entries.write() {
                if guard.get(&key).is_some_and(|e| e.is_expired(now)) {
                    guard.remove(&key);
                }
            }
        }
        None
    }

    /// Store a record. Records without a download URL are never cached.
    pub fn put(&self, key: &str, record: MediaRecord) {
        if !record.has_download_url() {
            return;
        }
        let now = self.clock.now();
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(
                key.to_ascii_lowercase(),
                CacheEntry {
                    record,
                    expires_at: now + self.ttl,
                },
            );
            if guard.len() > PRUNE_THRESHOLD {
                guard.retain(|_, entry| !entry.is_expired(now));
            }
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        match self.entries.write() {
            Ok(mut guard) => {
                let before = guard.len();
                guard.retain(|_, entry| !entry.is_expired(now));
                before - guard.len()
            }
            Err(_) => 0,
        }
    }

    /// Entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep on a fixed interval until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        })
    }
}
