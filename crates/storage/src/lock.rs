//! Per-path async lock map (spec §5, Design Notes §9).
//!
//! One `tokio::sync::Mutex` per resolved absolute path, created lazily. A
//! short-held std mutex guards the map itself so lookups never block on an
//! unrelated file's lock. When the map grows past a bound it sheds half of
//! its currently-unlocked entries rather than growing forever.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use wenshape_protocol::error::StorageError;

const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVICTION_BOUND: usize = 4096;

#[derive(Clone)]
struct Entry {
    mutex: Arc<AsyncMutex<()>>,
}

/// Lazily-created, per-path lock map used to serialize reads/writes to the
/// same file across concurrent agents without serializing unrelated files.
pub struct FileLockMap {
    entries: StdMutex<HashMap<PathBuf, Entry>>,
    timeout: Duration,
    eviction_bound: usize,
}

impl Default for FileLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FileLockMap {
    pub fn new() -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
            timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            eviction_bound: DEFAULT_EVICTION_BOUND,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_eviction_bound(mut self, bound: usize) -> Self {
        self.eviction_bound = bound;
        self
    }

    fn entry_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries.lock().expect("lock map poisoned");
        if let Some(entry) = entries.get(path) {
            return entry.mutex.clone();
        }
        if entries.len() >= self.eviction_bound {
            evict_unlocked_half(&mut entries);
        }
        let mutex = Arc::new(AsyncMutex::new(()));
        entries.insert(
            path.to_path_buf(),
            Entry {
                mutex: mutex.clone(),
            },
        );
        mutex
    }

    /// Acquire the lock for `path`, timing out per the configured bound
    /// (default 30s, spec §5).
    pub async fn acquire(&self, path: &Path) -> Result<OwnedMutexGuard<()>, StorageError> {
        let mutex = self.entry_for(path);
        match tokio::time::timeout(self.timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(StorageError::LockTimeout {
                path: path.display().to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    pub fn tracked_len(&self) -> usize {
        self.entries.lock().expect("lock map poisoned").len()
    }
}

/// Drops roughly half of the entries that aren't currently locked by
/// anyone, oldest-iterated first. `Arc::strong_count == 1` means only the
/// map itself holds a reference, so no in-flight `acquire` depends on it.
fn evict_unlocked_half(entries: &mut HashMap<PathBuf, Entry>) {
    let unlocked: Vec<PathBuf> = entries
        .iter()
        .filter(|(_, entry)| Arc::strong_count(&entry.mutex) == 1)
        .map(|(path, _)| path.clone())
        .collect();
    let to_remove = unlocked.len() / 2;
    for path in unlocked.into_iter().take(to_remove) {
        entries.remove(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn same_path_serializes_access() {
        let map = Arc::new(FileLockMap::new());
        let path = PathBuf::from("/data/p1/canon/facts.jsonl");

        let guard1 = map.acquire(&path).await.unwrap();
        assert_eq!(map.tracked_len(), 1);
        drop(guard1);

        let guard2 = map.acquire(&path).await.unwrap();
        drop(guard2);
    }

    #[tokio::test]
    async fn distinct_paths_get_distinct_entries() {
        let map = FileLockMap::new();
        let a = PathBuf::from("/data/p1/canon/facts.jsonl");
        let b = PathBuf::from("/data/p1/canon/timeline.jsonl");
        let _g1 = map.acquire(&a).await.unwrap();
        let _g2 = map.acquire(&b).await.unwrap();
        assert_eq!(map.tracked_len(), 2);
    }

    #[tokio::test]
    async fn eviction_sheds_unlocked_entries_past_bound() {
        let map = FileLockMap::new().with_eviction_bound(4);
        for i in 0..4 {
            let path = PathBuf::from(format!("/data/p1/file_{i}.yaml"));
            let _guard = map.acquire(&path).await.unwrap();
        }
        assert_eq!(map.tracked_len(), 4);

        // All four are now unlocked; the next insert should trigger eviction.
        let path = PathBuf::from("/data/p1/file_4.yaml");
        let _guard = map.acquire(&path).await.unwrap();
        assert!(map.tracked_len() < 5);
    }

    #[tokio::test]
    async fn acquire_times_out_when_held() {
        let map = FileLockMap::new().with_timeout(Duration::from_millis(20));
        let path = PathBuf::from("/data/p1/canon/facts.jsonl");
        let _held = map.acquire(&path).await.unwrap();
        let result = map.acquire(&path).await;
        assert!(matches!(result, Err(StorageError::LockTimeout { .. })));
    }
}
