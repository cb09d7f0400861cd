use super::ArchiveEntryIterator;
use std::collections::{BTreeSet, HashMap};
use univfs_common::{ArchiveEntry, VfsError};

/// Index of an archive's entries by path, with parent directories that the
/// archive does not record synthesized as implicit entries.
#[derive(Debug, Default)]
pub struct EntryTree {
    entries: HashMap<String, ArchiveEntry>,
    // parent path ("" for the top level) -> child paths
    children: HashMap<String, BTreeSet<String>>,
}

impl EntryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains `iter` into a new tree
    pub fn build(iter: &mut dyn ArchiveEntryIterator) -> Result<Self, VfsError> {
        let mut tree = Self::new();
        while let Some(entry) = iter.next_entry()? {
            tree.insert(entry);
        }
        Ok(tree)
    }

    pub fn insert(&mut self, entry: ArchiveEntry) {
        if entry.path.is_empty() {
            return;
        }

        let mut path = entry.path.clone();
        self.entries.insert(path.clone(), entry);

        loop {
            let parent = match path.rfind('/') {
                Some(pos) => &path[..pos],
                None => "",
            };
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(path.clone());

            if parent.is_empty() || self.entries.contains_key(parent) {
                break;
            }
            self.entries
                .insert(parent.to_string(), ArchiveEntry::implicit_directory(parent));
            path = parent.to_string();
        }
    }

    pub fn get(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.get(path)
    }

    /// Direct children of the directory at `path` ("" for the top level),
    /// sorted by path
    pub fn children(&self, path: &str) -> Vec<&ArchiveEntry> {
        self.children
            .get(path)
            .map(|paths| paths.iter().filter_map(|p| self.entries.get(p)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
