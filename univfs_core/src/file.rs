//! The uniform file contract every backend implements.

use crate::vfs::archive::ArchiveFile;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use univfs_common::{
    FileCapabilities, FileOperation, FilePermissions, FileUrl, PermissionAccess, PermissionType,
    VfsError,
};

/// Shared handle to a resolved file
pub type FileRef = Arc<dyn AbstractFile>;

/// Closed set of file flavors. Archive roots own the raw file they wrap,
/// archive entries own their archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Raw,
    ArchiveRoot,
    ArchiveEntry,
}

/// Readable stream with an explicit, fallible close
pub trait InputStream: Read + Send {
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl InputStream for File {}
impl InputStream for Cursor<Vec<u8>> {}

/// Writable stream with an explicit, fallible close
pub trait OutputStream: Write + Send {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.flush()
    }
}

impl OutputStream for File {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl OutputStream for Cursor<Vec<u8>> {}

/// Seekable read access
pub trait RandomAccessInput: Read + Seek + Send {
    fn length(&mut self) -> io::Result<u64> {
        let current = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(current))?;
        Ok(end)
    }
}

impl RandomAccessInput for File {}
impl RandomAccessInput for Cursor<Vec<u8>> {}

/// Uniform file interface.
///
/// Backends implement the primitives; everything built on top of them
/// (copy, move, recursive delete, checksums) lives in [`crate::ops::FileOps`].
/// Operations a backend does not implement return [`VfsError::Unsupported`].
pub trait AbstractFile: Send + Sync + fmt::Debug {
    fn url(&self) -> &FileUrl;

    fn kind(&self) -> FileKind {
        FileKind::Raw
    }

    /// Owning file: the raw file behind an archive, or the archive behind an entry
    fn ancestor(&self) -> Option<FileRef> {
        None
    }

    fn parent(&self) -> Result<Option<FileRef>, VfsError>;

    /// Replaces the lazily computed parent
    fn set_parent(&self, parent: FileRef);

    fn exists(&self) -> bool;

    fn is_directory(&self) -> bool;

    fn is_symlink(&self) -> bool {
        false
    }

    fn is_archive(&self) -> bool {
        false
    }

    /// Directories and archives can both be listed. Not meant to be overridden.
    fn is_browsable(&self) -> bool {
        self.is_directory() || self.is_archive()
    }

    fn is_hidden(&self) -> bool {
        self.name().starts_with('.')
    }

    fn name(&self) -> String {
        self.url().filename().unwrap_or_default().to_string()
    }

    /// Size in bytes, `None` when unknown
    fn size(&self) -> Option<u64>;

    fn last_modified(&self) -> SystemTime;

    fn change_date(&self, _modified: SystemTime) -> Result<(), VfsError> {
        Err(unsupported(self.url(), FileOperation::ChangeDate))
    }

    fn permissions(&self) -> FilePermissions;

    /// Mask of the permission bits this backend can change
    fn changeable_permissions(&self) -> u16 {
        0
    }

    fn change_permission(
        &self,
        _access: PermissionAccess,
        _ty: PermissionType,
        _enabled: bool,
    ) -> Result<(), VfsError> {
        Err(unsupported(self.url(), FileOperation::ChangePermission))
    }

    /// Sets every changeable bit to the matching bit of `bits`. Backends able
    /// to set all bits at once may override this, keeping the same end state.
    fn change_permissions(&self, bits: u16) -> Result<(), VfsError> {
        crate::ops::change_permissions_bitwise(self, bits)
    }

    /// `ls -l` style: type character then permission triplets
    fn permissions_string(&self) -> String {
        let type_char = if self.is_symlink() {
            'l'
        } else if self.is_directory() {
            'd'
        } else {
            '-'
        };
        self.permissions().render(type_char)
    }

    fn capabilities(&self) -> FileCapabilities;

    fn ls(&self) -> Result<Vec<FileRef>, VfsError>;

    /// File named `name` inside this one, existing or not
    fn child(&self, name: &str) -> Result<FileRef, VfsError>;

    fn mkdir(&self) -> Result<(), VfsError> {
        Err(unsupported(self.url(), FileOperation::CreateDirectory))
    }

    /// Deletes this file, or this directory when empty
    fn delete(&self) -> Result<(), VfsError> {
        Err(unsupported(self.url(), FileOperation::Delete))
    }

    fn rename_to(&self, _dest: &dyn AbstractFile) -> Result<(), VfsError> {
        Err(unsupported(self.url(), FileOperation::Rename))
    }

    /// Server-side copy, for backends declaring `copy_remotely`
    fn copy_remotely_to(&self, _dest: &dyn AbstractFile) -> Result<(), VfsError> {
        Err(unsupported(self.url(), FileOperation::CopyRemotely))
    }

    fn input_stream(&self) -> Result<Box<dyn InputStream>, VfsError>;

    fn output_stream(&self) -> Result<Box<dyn OutputStream>, VfsError> {
        Err(unsupported(self.url(), FileOperation::WriteFile))
    }

    fn append_stream(&self) -> Result<Box<dyn OutputStream>, VfsError> {
        Err(unsupported(self.url(), FileOperation::AppendFile))
    }

    fn random_access_input(&self) -> Result<Box<dyn RandomAccessInput>, VfsError> {
        Err(unsupported(self.url(), FileOperation::RandomReadFile))
    }

    fn free_space(&self) -> Result<u64, VfsError> {
        Err(unsupported(self.url(), FileOperation::GetFreeSpace))
    }

    fn total_space(&self) -> Result<u64, VfsError> {
        Err(unsupported(self.url(), FileOperation::GetTotalSpace))
    }

    /// Whether both files designate the same physical file
    fn is_same_file(&self, other: &dyn AbstractFile) -> bool {
        self.url() == other.url()
    }

    fn as_archive(&self) -> Option<&ArchiveFile> {
        None
    }
}

pub(crate) fn unsupported(url: &FileUrl, operation: FileOperation) -> VfsError {
    VfsError::unsupported(operation, url.to_string())
}

/// True when `a` and `b` are the same allocation
pub fn same_instance(a: &FileRef, b: &FileRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Whether `file` lives inside an archive, at any depth
pub fn is_inside_archive(file: &dyn AbstractFile) -> bool {
    if file.kind() == FileKind::ArchiveEntry {
        return true;
    }
    match file.ancestor() {
        Some(ancestor) => ancestor.ancestors().any(|f| f.kind() == FileKind::ArchiveEntry),
        None => false,
    }
}

/// The raw file behind `file` when it is an archive, `file` otherwise
pub fn unwrap_archive(file: &dyn AbstractFile) -> &dyn AbstractFile {
    match file.as_archive() {
        Some(archive) => archive.raw().as_ref(),
        None => file,
    }
}

/// Walks the ownership chain, starting with the file itself. Stops when a
/// file has no owner or names itself as its owner.
pub struct Ancestors {
    next: Option<FileRef>,
}

impl Iterator for Ancestors {
    type Item = FileRef;

    fn next(&mut self) -> Option<FileRef> {
        let current = self.next.take()?;
        self.next = current
            .ancestor()
            .filter(|owner| !same_instance(owner, &current));
        Some(current)
    }
}

/// Ownership-chain queries on shared file handles
pub trait FileRefExt {
    fn ancestors(&self) -> Ancestors;

    /// Outermost owner, the file itself when it has none
    fn top_ancestor(&self) -> FileRef;

    /// Whether this file or one of its owners is of `kind`
    fn has_ancestor_of_kind(&self, kind: FileKind) -> bool;

    /// Number of archive roots in the chain
    fn archive_boundaries(&self) -> usize;

    /// Closest archive owning this file, excluding the file itself
    fn parent_archive(&self) -> Option<FileRef>;
}

impl FileRefExt for FileRef {
    fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    fn top_ancestor(&self) -> FileRef {
        self.ancestors().last().unwrap_or_else(|| self.clone())
    }

    fn has_ancestor_of_kind(&self, kind: FileKind) -> bool {
        self.ancestors().any(|f| f.kind() == kind)
    }

    fn archive_boundaries(&self) -> usize {
        self.ancestors()
            .filter(|f| f.kind() == FileKind::ArchiveRoot)
            .count()
    }

    fn parent_archive(&self) -> Option<FileRef> {
        self.ancestors()
            .skip(1)
            .find(|f| f.kind() == FileKind::ArchiveRoot)
    }
}

/// Parent reference that is either attached by the resolver or computed on first use
#[derive(Default)]
pub struct ParentSlot(RwLock<Option<FileRef>>);

impl ParentSlot {
    pub fn get(&self) -> Option<FileRef> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, parent: FileRef) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(parent);
    }

    pub fn get_or_try_init(
        &self,
        init: impl FnOnce() -> Result<Option<FileRef>, VfsError>,
    ) -> Result<Option<FileRef>, VfsError> {
        if let Some(parent) = self.get() {
            return Ok(Some(parent));
        }
        let parent = init()?;
        if let Some(parent) = &parent {
            self.set(parent.clone());
        }
        Ok(parent)
    }
}

impl fmt::Debug for ParentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parent = self.get().map(|p| p.url().to_string());
        f.debug_tuple("ParentSlot").field(&parent).finish()
    }
}
