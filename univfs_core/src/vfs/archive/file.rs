use super::{ArchiveReader, EntryTree};
use crate::file::{
    unwrap_archive, AbstractFile, FileKind, FileRef, InputStream, OutputStream, ParentSlot,
    RandomAccessInput,
};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;
use tracing::debug;
use univfs_common::{
    ArchiveEntry, FileCapabilities, FilePermissions, FileUrl, PermissionAccess, PermissionType,
    VfsError,
};

/// Raw file viewed as an archive. Data operations go to the raw file; the
/// listing comes from the format's reader.
pub struct ArchiveFile {
    raw: FileRef,
    reader: Arc<dyn ArchiveReader>,
    // raw file date the tree was built for
    tree: Mutex<Option<(SystemTime, Arc<EntryTree>)>>,
    this: Weak<ArchiveFile>,
    parent: ParentSlot,
}

impl ArchiveFile {
    pub fn new(raw: FileRef, reader: Arc<dyn ArchiveReader>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            raw,
            reader,
            tree: Mutex::new(None),
            this: this.clone(),
            parent: ParentSlot::default(),
        })
    }

    pub fn raw(&self) -> &FileRef {
        &self.raw
    }

    fn handle(&self) -> Result<Arc<ArchiveFile>, VfsError> {
        self.this
            .upgrade()
            .ok_or_else(|| VfsError::archive(self.raw.url().to_string(), "archive was dropped"))
    }

    /// Entry index, rebuilt when the raw file's date changed since the last build
    pub fn entry_tree(&self) -> Result<Arc<EntryTree>, VfsError> {
        let modified = self.raw.last_modified();
        let mut cached = self.tree.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((date, tree)) = cached.as_ref() {
            if *date == modified {
                return Ok(tree.clone());
            }
        }

        debug!("Building entry tree for {}", self.raw.url());
        let mut entries = self.reader.entries(self.raw.as_ref())?;
        let built = EntryTree::build(entries.as_mut());
        let closed = entries.close();
        let tree = Arc::new(built?);
        closed?;

        debug!("{} entries in {}", tree.len(), self.raw.url());
        *cached = Some((modified, tree.clone()));
        Ok(tree)
    }

    /// File for the entry at `path` (`/`-separated, relative to the archive
    /// root). Missing entries yield a file that does not exist.
    pub fn entry_file(&self, path: &str) -> Result<FileRef, VfsError> {
        let path = univfs_common::normalize_entry_path(path);
        if path.is_empty() {
            return Ok(self.handle()? as FileRef);
        }
        let entry = self.entry_tree()?.get(&path).cloned();
        Ok(Arc::new(ArchiveEntryFile::new(self.handle()?, path, entry)))
    }

    /// Files for the direct children of the directory at `path`
    pub fn entry_children(&self, path: &str) -> Result<Vec<FileRef>, VfsError> {
        let archive = self.handle()?;
        let tree = self.entry_tree()?;
        Ok(tree
            .children(path)
            .into_iter()
            .map(|entry| {
                Arc::new(ArchiveEntryFile::new(
                    archive.clone(),
                    entry.path.clone(),
                    Some(entry.clone()),
                )) as FileRef
            })
            .collect())
    }

    pub fn entry_input_stream(&self, entry: &ArchiveEntry) -> Result<Box<dyn InputStream>, VfsError> {
        self.reader.entry_input_stream(self.raw.as_ref(), entry)
    }
}

impl fmt::Debug for ArchiveFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveFile")
            .field("raw", &self.raw.url().to_string())
            .finish()
    }
}

impl AbstractFile for ArchiveFile {
    fn url(&self) -> &FileUrl {
        self.raw.url()
    }

    fn kind(&self) -> FileKind {
        FileKind::ArchiveRoot
    }

    fn ancestor(&self) -> Option<FileRef> {
        Some(self.raw.clone())
    }

    fn parent(&self) -> Result<Option<FileRef>, VfsError> {
        self.parent.get_or_try_init(|| self.raw.parent())
    }

    fn set_parent(&self, parent: FileRef) {
        self.parent.set(parent);
    }

    fn exists(&self) -> bool {
        self.raw.exists()
    }

    fn is_directory(&self) -> bool {
        false
    }

    fn is_symlink(&self) -> bool {
        self.raw.is_symlink()
    }

    fn is_archive(&self) -> bool {
        true
    }

    fn size(&self) -> Option<u64> {
        self.raw.size()
    }

    fn last_modified(&self) -> SystemTime {
        self.raw.last_modified()
    }

    fn change_date(&self, modified: SystemTime) -> Result<(), VfsError> {
        self.raw.change_date(modified)
    }

    fn permissions(&self) -> FilePermissions {
        self.raw.permissions()
    }

    fn changeable_permissions(&self) -> u16 {
        self.raw.changeable_permissions()
    }

    fn change_permission(
        &self,
        access: PermissionAccess,
        ty: PermissionType,
        enabled: bool,
    ) -> Result<(), VfsError> {
        self.raw.change_permission(access, ty, enabled)
    }

    fn change_permissions(&self, bits: u16) -> Result<(), VfsError> {
        self.raw.change_permissions(bits)
    }

    fn capabilities(&self) -> FileCapabilities {
        self.raw.capabilities()
    }

    fn ls(&self) -> Result<Vec<FileRef>, VfsError> {
        self.entry_children("")
    }

    fn child(&self, name: &str) -> Result<FileRef, VfsError> {
        self.entry_file(name)
    }

    fn delete(&self) -> Result<(), VfsError> {
        self.raw.delete()
    }

    fn rename_to(&self, dest: &dyn AbstractFile) -> Result<(), VfsError> {
        self.raw.rename_to(unwrap_archive(dest))
    }

    fn copy_remotely_to(&self, dest: &dyn AbstractFile) -> Result<(), VfsError> {
        self.raw.copy_remotely_to(unwrap_archive(dest))
    }

    fn input_stream(&self) -> Result<Box<dyn InputStream>, VfsError> {
        self.raw.input_stream()
    }

    fn output_stream(&self) -> Result<Box<dyn OutputStream>, VfsError> {
        self.raw.output_stream()
    }

    fn append_stream(&self) -> Result<Box<dyn OutputStream>, VfsError> {
        self.raw.append_stream()
    }

    fn random_access_input(&self) -> Result<Box<dyn RandomAccessInput>, VfsError> {
        self.raw.random_access_input()
    }

    fn free_space(&self) -> Result<u64, VfsError> {
        self.raw.free_space()
    }

    fn total_space(&self) -> Result<u64, VfsError> {
        self.raw.total_space()
    }

    fn is_same_file(&self, other: &dyn AbstractFile) -> bool {
        self.raw.is_same_file(unwrap_archive(other))
    }

    fn as_archive(&self) -> Option<&ArchiveFile> {
        Some(self)
    }
}

/// Read-only file inside an archive
pub struct ArchiveEntryFile {
    url: FileUrl,
    archive: Arc<ArchiveFile>,
    path: String,
    entry: Option<ArchiveEntry>,
    parent: ParentSlot,
}

impl ArchiveEntryFile {
    pub fn new(archive: Arc<ArchiveFile>, path: String, entry: Option<ArchiveEntry>) -> Self {
        let url = path
            .split('/')
            .fold(archive.url().clone(), |url, segment| url.child(segment));
        Self {
            url,
            archive,
            path,
            entry,
            parent: ParentSlot::default(),
        }
    }

    /// Path relative to the archive root
    pub fn entry_path(&self) -> &str {
        &self.path
    }

    pub fn entry(&self) -> Option<&ArchiveEntry> {
        self.entry.as_ref()
    }

    pub fn archive(&self) -> &Arc<ArchiveFile> {
        &self.archive
    }

    fn existing_entry(&self) -> Result<&ArchiveEntry, VfsError> {
        self.entry
            .as_ref()
            .ok_or_else(|| VfsError::NotFound(self.url.to_string()))
    }
}

impl fmt::Debug for ArchiveEntryFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntryFile")
            .field("archive", &self.archive.url().to_string())
            .field("path", &self.path)
            .field("exists", &self.entry.is_some())
            .finish()
    }
}

impl AbstractFile for ArchiveEntryFile {
    fn url(&self) -> &FileUrl {
        &self.url
    }

    fn kind(&self) -> FileKind {
        FileKind::ArchiveEntry
    }

    fn ancestor(&self) -> Option<FileRef> {
        Some(self.archive.clone() as FileRef)
    }

    fn parent(&self) -> Result<Option<FileRef>, VfsError> {
        self.parent.get_or_try_init(|| {
            let parent = match self.path.rfind('/') {
                Some(pos) => self.archive.entry_file(&self.path[..pos])?,
                None => self.archive.clone() as FileRef,
            };
            Ok(Some(parent))
        })
    }

    fn set_parent(&self, parent: FileRef) {
        self.parent.set(parent);
    }

    fn exists(&self) -> bool {
        self.entry.is_some()
    }

    fn is_directory(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.is_dir)
    }

    fn is_symlink(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.is_symlink)
    }

    fn size(&self) -> Option<u64> {
        self.entry.as_ref().filter(|e| !e.is_dir).map(|e| e.size)
    }

    fn last_modified(&self) -> SystemTime {
        self.entry
            .as_ref()
            .map(|e| e.modified)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn permissions(&self) -> FilePermissions {
        let defaults = if self.is_directory() {
            FilePermissions::DEFAULT_DIRECTORY
        } else {
            FilePermissions::DEFAULT_FILE
        };
        match self.entry.as_ref().and_then(|e| e.permissions) {
            Some(permissions) => permissions.pad(&defaults),
            None => defaults,
        }
    }

    fn capabilities(&self) -> FileCapabilities {
        FileCapabilities::read_only()
    }

    fn ls(&self) -> Result<Vec<FileRef>, VfsError> {
        if !self.is_directory() {
            return Err(VfsError::NotADirectory(self.url.to_string()));
        }
        self.archive.entry_children(&self.path)
    }

    fn child(&self, name: &str) -> Result<FileRef, VfsError> {
        self.archive.entry_file(&format!("{}/{}", self.path, name))
    }

    fn input_stream(&self) -> Result<Box<dyn InputStream>, VfsError> {
        let entry = self.existing_entry()?;
        if entry.is_dir {
            return Err(VfsError::NotAFile(self.url.to_string()));
        }
        self.archive.entry_input_stream(entry)
    }

    fn is_same_file(&self, other: &dyn AbstractFile) -> bool {
        other.kind() == FileKind::ArchiveEntry && self.url == *other.url()
    }
}
