//! Word-level LRU cache of decoded posting lists.
//!
//! Every `get` reorders recency, so all access goes through one mutex around an
//! `LruCache`. Snapshots copy the entries under the lock (cheap `Arc` clones) and
//! encode and write them after releasing it. Mutations never write on the caller's
//! thread: they only count towards the next autosave, which a background task
//! performs through `persist_if_due`.
//!
//! A snapshot is tagged with the fingerprint of the barrel set it was decoded from
//! and is only restored against the same barrels.

use crate::config::CacheConfig;
use crate::index::{validate_postings, PostingList};
use crate::persist::atomic_write;
use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 2;

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    version: u32,
    /// Fingerprint of the barrels the payloads were decoded from.
    source: u32,
    entries: Vec<SnapshotEntry>, // least recently used first
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    term: String,
    checksum: u32,
    payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub restored: usize,
    pub dropped: usize,
    /// The snapshot as a whole was unreadable or stale and ignored.
    pub discarded: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct WordCache {
    inner: Mutex<LruCache<String, Arc<PostingList>>>,
    capacity: usize,
    snapshot_path: Option<PathBuf>,
    source: u32,
    autosave_interval: usize,
    pending: AtomicUsize, // mutations since the last snapshot
    persist_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl WordCache {
    pub fn new(max_size: usize, autosave_interval: usize, snapshot_path: Option<PathBuf>) -> Self {
        // a zero capacity cache never stores anything, see `put`
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            capacity: max_size,
            snapshot_path,
            source: 0,
            autosave_interval,
            pending: AtomicUsize::new(0),
            persist_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Tag snapshots with the fingerprint of the barrels they cache.
    pub fn with_source(mut self, source: u32) -> Self {
        self.source = source;
        self
    }

    /// Build a cache and restore whatever survives of its last snapshot taken
    /// against the barrels identified by `source`.
    pub fn open(config: &CacheConfig, snapshot_path: PathBuf, source: u32) -> Self {
        let cache = Self::new(config.max_size, config.autosave_interval, Some(snapshot_path)).with_source(source);
        let report = cache.load();
        info!(restored = report.restored, dropped = report.dropped, "initialized word cache");
        cache
    }

    pub fn get(&self, term: &str) -> Option<Arc<PostingList>> {
        let found = self.inner.lock().get(term).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn put(&self, term: String, value: Arc<PostingList>) {
        if self.capacity == 0 {
            return;
        }
        let evicted = {
            let mut lru = self.inner.lock();
            let refreshed = lru.contains(term.as_str());
            let pushed = lru.push(term, value);
            if refreshed { None } else { pushed }
        };
        if let Some((old, _)) = evicted {
            debug!(term = %old, "evicted from word cache");
        }
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Recency-neutral membership check.
    pub fn contains(&self, term: &str) -> bool {
        self.inner.lock().contains(term)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max_size: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// True once `autosave_interval` mutations have accumulated since the last snapshot.
    pub fn autosave_due(&self) -> bool {
        self.autosave_interval > 0
            && self.snapshot_path.is_some()
            && self.pending.load(Ordering::Relaxed) >= self.autosave_interval
    }

    /// Persist only when an autosave is due. Returns the entries written, if any.
    pub fn persist_if_due(&self) -> Result<Option<usize>> {
        if !self.autosave_due() {
            return Ok(None);
        }
        self.persist().map(Some)
    }

    /// Write a point-in-time snapshot. Returns the number of entries written.
    pub fn persist(&self) -> Result<usize> {
        let Some(path) = &self.snapshot_path else {
            return Ok(0);
        };
        let _writer = self.persist_lock.lock();
        let (entries, taken) = {
            let lru = self.inner.lock();
            let taken = self.pending.swap(0, Ordering::Relaxed);
            let entries: Vec<(String, Arc<PostingList>)> =
                lru.iter().rev().map(|(term, value)| (term.clone(), Arc::clone(value))).collect();
            (entries, taken)
        };

        let written = self.write_snapshot(path, entries);
        if written.is_err() {
            self.pending.fetch_add(taken, Ordering::Relaxed);
        }
        written
    }

    fn write_snapshot(&self, path: &Path, entries: Vec<(String, Arc<PostingList>)>) -> Result<usize> {
        let mut snapshot =
            CacheSnapshot { version: SNAPSHOT_VERSION, source: self.source, entries: Vec::with_capacity(entries.len()) };
        for (term, value) in entries {
            let payload = bincode::serialize(value.as_ref())?;
            snapshot.entries.push(SnapshotEntry { term, checksum: crc32fast::hash(&payload), payload });
        }
        let bytes = bincode::serialize(&snapshot)?;
        atomic_write(path, &bytes)?;
        debug!(entries = snapshot.entries.len(), path = %path.display(), "persisted word cache");
        Ok(snapshot.entries.len())
    }

    /// Best-effort restore from the configured snapshot. Never fails: bad entries are
    /// dropped one by one, an unreadable or stale snapshot is ignored entirely.
    pub fn load(&self) -> LoadReport {
        match &self.snapshot_path {
            Some(path) => self.load_from(path),
            None => LoadReport::default(),
        }
    }

    fn load_from(&self, path: &Path) -> LoadReport {
        let mut report = LoadReport::default();
        if !path.exists() {
            return report;
        }
        let snapshot: CacheSnapshot = match std::fs::read(path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| Ok(bincode::deserialize(&bytes)?))
        {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "discarding unreadable word cache snapshot");
                report.discarded = true;
                return report;
            }
        };
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(version = snapshot.version, "discarding word cache snapshot with unknown version");
            report.discarded = true;
            return report;
        }
        if snapshot.source != self.source {
            info!(snapshot = snapshot.source, barrels = self.source, "barrels changed since word cache snapshot; starting cold");
            report.discarded = true;
            return report;
        }
        if self.capacity == 0 {
            return report;
        }

        let mut lru = self.inner.lock();
        for entry in snapshot.entries {
            if crc32fast::hash(&entry.payload) != entry.checksum {
                report.dropped += 1;
                continue;
            }
            match bincode::deserialize::<PostingList>(&entry.payload) {
                Ok(list) if validate_postings(&list).is_ok() => {
                    lru.push(entry.term, Arc::new(list));
                    report.restored += 1;
                }
                _ => report.dropped += 1,
            }
        }
        if report.dropped > 0 {
            warn!(dropped = report.dropped, "dropped corrupt word cache entries");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocKey, DocKind, Posting};
    use tempfile::tempdir;

    fn list(id: u32) -> Arc<PostingList> {
        Arc::new(vec![Posting { doc: DocKey::new(DocKind::HtmlPage, id), tf: 1, positions: vec![id] }])
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = WordCache::new(2, 0, None);
        cache.put("a".into(), list(1));
        cache.put("b".into(), list(2));
        cache.put("c".into(), list(3));
        assert!(!cache.contains("a"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn get_refreshes_recency() {
        let cache = WordCache::new(2, 0, None);
        cache.put("a".into(), list(1));
        cache.put("b".into(), list(2));
        assert!(cache.get("a").is_some());
        cache.put("c".into(), list(3));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinserting_updates_value_without_growing() {
        let cache = WordCache::new(2, 0, None);
        cache.put("a".into(), list(1));
        cache.put("a".into(), list(9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap()[0].doc.id, 9);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let cache = WordCache::new(0, 0, None);
        cache.put("a".into(), list(1));
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn stays_bounded_under_churn() {
        let cache = WordCache::new(3, 0, None);
        for i in 0..100u32 {
            cache.put(format!("t{i}"), list(i));
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("t99") && cache.contains("t98") && cache.contains("t97"));
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = WordCache::new(2, 0, None);
        cache.put("a".into(), list(1));
        cache.get("a");
        cache.get("zzz");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size, stats.max_size), (1, 1, 1, 2));
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("word_cache.bin");
        let cache = WordCache::new(4, 0, Some(path.clone()));
        cache.put("a".into(), list(1));
        cache.put("b".into(), list(2));
        cache.get("a");
        assert_eq!(cache.persist().unwrap(), 2);

        let restored = WordCache::new(4, 0, Some(path));
        let report = restored.load();
        assert_eq!(report, LoadReport { restored: 2, dropped: 0, discarded: false });
        assert_eq!(restored.get("a"), Some(list(1)));
        assert_eq!(restored.get("b"), Some(list(2)));
    }

    #[test]
    fn corrupt_entries_are_dropped_individually() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("word_cache.bin");
        let good = bincode::serialize(list(1).as_ref()).unwrap();
        let snapshot = CacheSnapshot {
            version: SNAPSHOT_VERSION,
            source: 0,
            entries: vec![
                SnapshotEntry { term: "good".into(), checksum: crc32fast::hash(&good), payload: good.clone() },
                SnapshotEntry { term: "bad_sum".into(), checksum: 0xdead_beef, payload: good },
                SnapshotEntry { term: "bad_payload".into(), checksum: crc32fast::hash(&[1, 2, 3]), payload: vec![1, 2, 3] },
            ],
        };
        std::fs::write(&path, bincode::serialize(&snapshot).unwrap()).unwrap();

        let cache = WordCache::new(4, 0, Some(path));
        let report = cache.load();
        assert_eq!(report, LoadReport { restored: 1, dropped: 2, discarded: false });
        assert!(cache.contains("good"));
    }

    #[test]
    fn garbage_snapshot_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("word_cache.bin");
        std::fs::write(&path, b"definitely not bincode").unwrap();
        let cache = WordCache::new(4, 0, Some(path));
        let report = cache.load();
        assert!(report.discarded);
        assert!(cache.is_empty());
    }

    #[test]
    fn autosave_waits_for_interval_and_never_writes_inline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("word_cache.bin");
        let cache = WordCache::new(10, 3, Some(path.clone()));
        cache.put("a".into(), list(1));
        cache.put("b".into(), list(2));
        assert!(!cache.autosave_due());
        assert_eq!(cache.persist_if_due().unwrap(), None);
        cache.put("c".into(), list(3));
        assert!(cache.autosave_due());
        assert!(!path.exists());

        assert_eq!(cache.persist_if_due().unwrap(), Some(3));
        assert!(path.exists());
        assert!(!cache.autosave_due());
        assert_eq!(cache.persist_if_due().unwrap(), None);
    }

    #[test]
    fn snapshot_from_other_barrels_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("word_cache.bin");
        let cache = WordCache::new(4, 0, Some(path.clone())).with_source(7);
        cache.put("a".into(), list(1));
        cache.persist().unwrap();

        let same = WordCache::new(4, 0, Some(path.clone())).with_source(7);
        assert_eq!(same.load(), LoadReport { restored: 1, dropped: 0, discarded: false });

        let rebuilt = WordCache::new(4, 0, Some(path)).with_source(8);
        assert_eq!(rebuilt.load(), LoadReport { restored: 0, dropped: 0, discarded: true });
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn restore_respects_capacity_and_recency() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("word_cache.bin");
        let cache = WordCache::new(3, 0, Some(path.clone()));
        cache.put("a".into(), list(1));
        cache.put("b".into(), list(2));
        cache.put("c".into(), list(3));
        cache.get("a");
        cache.persist().unwrap();

        // "b" is the least recently used entry and the first to go
        let smaller = WordCache::new(2, 0, Some(path));
        smaller.load();
        assert!(smaller.contains("a") && smaller.contains("c"));
        assert!(!smaller.contains("b"));
    }

    #[test]
    fn concurrent_access_stays_bounded() {
        let cache = Arc::new(WordCache::new(8, 0, None));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        let term = format!("t{}", (i * 7 + t) % 20);
                        if cache.get(&term).is_none() {
                            cache.put(term, list(i));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 8);
        assert_eq!(cache.stats().hits + cache.stats().misses, 2000);
    }
}
