use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::MinifiedMetadata;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::read_sidecar;
use crate::schedule::Debouncer;
use crate::store::{load_entries, write_entries, CacheError};

pub const DEFAULT_MAX_ENTRIES: usize = 15_000;
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Where the cache is persisted; `None` keeps it in memory only.
    pub store_path: Option<PathBuf>,
    pub max_entries: usize,
    pub save_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            save_delay: DEFAULT_SAVE_DELAY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Sidecar modification time, nanoseconds since the epoch.
    pub mtime: u64,
    pub data: MinifiedMetadata,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub reads: u64,
}

/// mtime-validated cache of minified sidecar metadata.
///
/// Cloning is cheap and every clone shares the same entries. Lookups never
/// fail: a missing or unreadable sidecar yields an empty record.
#[derive(Clone)]
pub struct MetadataCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    entries: Mutex<LruCache<PathBuf, CacheEntry>>,
    store_path: Option<PathBuf>,
    saver: Debouncer,
    write_lock: tokio::sync::Mutex<()>,
    dirty: AtomicBool,
    hits: AtomicU64,
    reads: AtomicU64,
}

impl MetadataCache {
    /// Builds the cache and loads the persisted store, if any.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries)
            .or(NonZeroUsize::new(DEFAULT_MAX_ENTRIES))
            .unwrap_or(NonZeroUsize::MIN);
        let mut entries = LruCache::new(capacity);

        if let Some(path) = &config.store_path {
            if path.exists() {
                info!("Loading metadata cache from {:?}", path);
                match load_entries(path) {
                    Ok(loaded) => {
                        for (key, entry) in loaded {
                            entries.put(key, entry);
                        }
                        info!("Metadata cache loaded: {} entries", entries.len());
                    }
                    Err(err) => {
                        warn!("Failed to load metadata cache, starting fresh: {}", err);
                        if let Err(err) = std::fs::remove_file(path) {
                            warn!("Failed to remove broken cache file {:?}: {}", path, err);
                        }
                    }
                }
            }
        }

        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(entries),
                store_path: config.store_path,
                saver: Debouncer::new(config.save_delay),
                write_lock: tokio::sync::Mutex::new(()),
                dirty: AtomicBool::new(false),
                hits: AtomicU64::new(0),
                reads: AtomicU64::new(0),
            }),
        }
    }

    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(CacheConfig {
            max_entries,
            ..CacheConfig::default()
        })
    }

    /// Returns the minified sidecar at `path`, reading it only when the cached
    /// copy is missing or its mtime no longer matches the file.
    pub async fn get(&self, path: &Path) -> MinifiedMetadata {
        let mtime = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => mtime_nanos(modified),
            Err(err) => {
                debug!("Sidecar unavailable {:?}: {}", path, err);
                return MinifiedMetadata::default();
            }
        };

        if let Some(data) = self.lookup(path, mtime) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return data;
        }

        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        let data = match read_sidecar(path).await {
            Ok(data) => data,
            Err(CacheError::Io(err)) => {
                debug!("Failed to read sidecar {:?}: {}", path, err);
                return MinifiedMetadata::default();
            }
            Err(err) => {
                // Cached as empty so a broken file is not re-parsed until it changes.
                debug!("Malformed sidecar {:?}: {}", path, err);
                MinifiedMetadata::default()
            }
        };

        self.inner.entries.lock().put(
            path.to_path_buf(),
            CacheEntry {
                mtime,
                data: data.clone(),
            },
        );
        self.schedule_save();
        data
    }

    pub fn remove(&self, path: &Path) {
        let removed = self.inner.entries.lock().pop(path).is_some();
        if removed {
            debug!("Evicted cache entry {:?}", path);
            self.schedule_save();
        }
    }

    /// Drops every entry whose path lies under `prefix`.
    pub fn clear_by_prefix(&self, prefix: &Path) -> usize {
        let count = {
            let mut entries = self.inner.entries.lock();
            let doomed: Vec<PathBuf> = entries
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                entries.pop(key);
            }
            doomed.len()
        };
        if count > 0 {
            info!("Cleared {} cache entries under {:?}", count, prefix);
            self.schedule_save();
        }
        count
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.entries.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            reads: self.inner.reads.load(Ordering::Relaxed),
        }
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.inner.store_path.as_deref()
    }

    /// Writes the whole cache to its store file. Failures are logged; the
    /// in-memory cache stays authoritative either way.
    pub async fn save_to_disk(&self) {
        let _guard = self.inner.write_lock.lock().await;
        self.write_store().await;
    }

    /// Cancels a pending debounced save and writes now if anything changed.
    /// A save that is already writing is waited for first.
    pub async fn flush(&self) {
        self.inner.saver.cancel();
        let _guard = self.inner.write_lock.lock().await;
        if self.inner.dirty.load(Ordering::SeqCst) {
            self.write_store().await;
        }
    }

    /// Callers hold `write_lock`.
    async fn write_store(&self) {
        let path = match &self.inner.store_path {
            Some(path) => path,
            None => return,
        };

        let snapshot = self.snapshot();
        match write_entries(path, &snapshot).await {
            Ok(()) => debug!("Metadata cache saved ({} entries)", snapshot.len()),
            Err(err) => {
                self.inner.dirty.store(true, Ordering::SeqCst);
                warn!("Failed to save metadata cache to {:?}: {}", path, err);
            }
        }
    }

    pub fn has_pending_save(&self) -> bool {
        self.inner.saver.is_pending()
    }

    fn lookup(&self, path: &Path, mtime: u64) -> Option<MinifiedMetadata> {
        let mut entries = self.inner.entries.lock();
        match entries.get(path) {
            Some(entry) if entry.mtime == mtime => Some(entry.data.clone()),
            _ => None,
        }
    }

    /// Least recently used first, so a reload restores recency order.
    fn snapshot(&self) -> Vec<(String, CacheEntry)> {
        let entries = self.inner.entries.lock();
        self.inner.dirty.store(false, Ordering::SeqCst);
        entries
            .iter()
            .rev()
            .filter_map(|(key, entry)| match key.to_str() {
                Some(key) => Some((key.to_string(), entry.clone())),
                None => {
                    debug!("Not persisting non UTF-8 path {:?}", key);
                    None
                }
            })
            .collect()
    }

    fn schedule_save(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
        if self.inner.store_path.is_none() {
            return;
        }
        let cache = self.clone();
        if !self
            .inner
            .saver
            .schedule(move || async move { cache.save_to_disk().await })
        {
            debug!("No runtime for a deferred cache save; waiting for flush");
        }
    }
}

fn mtime_nanos(modified: SystemTime) -> u64 {
    modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}
