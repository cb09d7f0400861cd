use crate::file::{AbstractFile, FileRef};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use univfs_common::FileUrl;

const PURGE_INTERVAL: usize = 256;

/// Pool key: location plus credentials and properties
#[derive(Debug, Clone)]
pub struct PoolKey(FileUrl);

impl PartialEq for PoolKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.equals_with(&other.0, true, true)
    }
}

impl Eq for PoolKey {}

impl Hash for PoolKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

/// Per-scheme cache of live file instances. Entries are weak, so a file
/// leaves the pool once the last handle to it is dropped.
#[derive(Default)]
pub struct FilePool {
    files: DashMap<PoolKey, Weak<dyn AbstractFile>>,
    inserts: AtomicUsize,
}

impl FilePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &FileUrl) -> Option<FileRef> {
        let key = PoolKey(url.clone());
        let file = self.files.get(&key)?.upgrade();
        if file.is_none() {
            self.files.remove_if(&key, |_, weak| weak.strong_count() == 0);
        }
        file
    }

    /// Caches `file` under `url` unless a live instance is already pooled, in
    /// which case that instance wins and is returned instead.
    pub fn insert(&self, url: &FileUrl, file: FileRef) -> FileRef {
        let winner = match self.files.entry(PoolKey(url.clone())) {
            Entry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(existing) => {
                    debug!("Discarding duplicate instance of {}", url);
                    existing
                }
                None => {
                    occupied.insert(Arc::downgrade(&file));
                    file
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(&file));
                file
            }
        };

        if self.inserts.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            self.purge();
        }
        winner
    }

    pub fn remove(&self, url: &FileUrl) -> Option<FileRef> {
        self.files
            .remove(&PoolKey(url.clone()))
            .and_then(|(_, weak)| weak.upgrade())
    }

    /// Drops entries whose file is gone
    pub fn purge(&self) {
        self.files.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn clear(&self) {
        self.files.clear();
    }

    /// Number of entries, dead ones included until the next purge
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl std::fmt::Debug for FilePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePool").field("len", &self.len()).finish()
    }
}
