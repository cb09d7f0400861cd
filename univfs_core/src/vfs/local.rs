use crate::factory::ProtocolProvider;
use crate::file::{
    is_inside_archive, unsupported, unwrap_archive, AbstractFile, FileKind, FileRef, InputStream,
    OutputStream, ParentSlot, RandomAccessInput,
};
use std::any::Any;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;
use univfs_common::{
    FileCapabilities, FileOperation, FilePermissions, FileUrl, PermissionAccess, PermissionType,
    VfsError, LOCAL_SCHEME,
};

/// File on the local file system
#[derive(Debug)]
pub struct LocalFile {
    url: FileUrl,
    path: PathBuf,
    parent: ParentSlot,
}

impl LocalFile {
    pub fn new(path: &Path) -> Self {
        Self::from_parts(FileUrl::from_local_path(path), path.to_path_buf())
    }

    pub fn from_url(url: &FileUrl) -> Self {
        Self::from_parts(url.clone(), local_path_of(url))
    }

    /// Uses `path` as is for a location already parsed into `url`
    pub fn from_parts(url: FileUrl, path: PathBuf) -> Self {
        Self {
            url,
            path,
            parent: ParentSlot::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self) -> Result<fs::Metadata, VfsError> {
        fs::metadata(&self.path).map_err(|e| io_error(&self.path, e))
    }
}

/// File system path designated by a `file://` location
pub fn local_path_of(url: &FileUrl) -> PathBuf {
    let sep = url.separator();
    let path = url.path();
    let trimmed = match path.trim_end_matches(sep) {
        "" => sep,
        trimmed => trimmed,
    };

    // "\C:\dir" on Windows
    #[cfg(windows)]
    let trimmed = match trimmed.strip_prefix(sep) {
        Some(rest) if rest.as_bytes().get(1) == Some(&b':') => rest,
        _ => trimmed,
    };

    PathBuf::from(trimmed)
}

fn io_error(path: &Path, e: io::Error) -> VfsError {
    let display = path.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => VfsError::NotFound(display),
        io::ErrorKind::PermissionDenied => VfsError::PermissionDenied(display),
        io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(display),
        _ => VfsError::io(display, e),
    }
}

#[cfg(unix)]
const CHANGEABLE_BITS: u16 = 0o777;
#[cfg(not(unix))]
const CHANGEABLE_BITS: u16 = 0o200;

impl AbstractFile for LocalFile {
    fn url(&self) -> &FileUrl {
        &self.url
    }

    fn parent(&self) -> Result<Option<FileRef>, VfsError> {
        self.parent.get_or_try_init(|| {
            Ok(self
                .url
                .parent()
                .map(|url| Arc::new(LocalFile::from_url(&url)) as FileRef))
        })
    }

    fn set_parent(&self, parent: FileRef) {
        self.parent.set(parent);
    }

    fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn is_symlink(&self) -> bool {
        fs::symlink_metadata(&self.path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn size(&self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }

    fn last_modified(&self) -> SystemTime {
        self.metadata()
            .and_then(|m| m.modified().map_err(|e| io_error(&self.path, e)))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn change_date(&self, modified: SystemTime) -> Result<(), VfsError> {
        filetime::set_file_mtime(&self.path, filetime::FileTime::from_system_time(modified))
            .map_err(|e| io_error(&self.path, e))
    }

    #[cfg(unix)]
    fn permissions(&self) -> FilePermissions {
        use std::os::unix::fs::PermissionsExt;
        match self.metadata() {
            Ok(meta) => FilePermissions::from_mode(meta.permissions().mode()),
            Err(_) => FilePermissions::EMPTY,
        }
    }

    #[cfg(not(unix))]
    fn permissions(&self) -> FilePermissions {
        match self.metadata() {
            Ok(meta) if meta.permissions().readonly() => FilePermissions::new(0, CHANGEABLE_BITS),
            Ok(_) => FilePermissions::new(CHANGEABLE_BITS, CHANGEABLE_BITS),
            Err(_) => FilePermissions::EMPTY,
        }
    }

    fn changeable_permissions(&self) -> u16 {
        CHANGEABLE_BITS
    }

    #[cfg(unix)]
    fn change_permission(
        &self,
        access: PermissionAccess,
        ty: PermissionType,
        enabled: bool,
    ) -> Result<(), VfsError> {
        let bit = univfs_common::permission_bit(access, ty);
        let current = self.permissions().value();
        let bits = if enabled { current | bit } else { current & !bit };
        self.change_permissions(bits)
    }

    #[cfg(not(unix))]
    fn change_permission(
        &self,
        access: PermissionAccess,
        ty: PermissionType,
        enabled: bool,
    ) -> Result<(), VfsError> {
        if (access, ty) != (PermissionAccess::User, PermissionType::Write) {
            return Err(unsupported(&self.url, FileOperation::ChangePermission));
        }
        let mut permissions = self.metadata()?.permissions();
        permissions.set_readonly(!enabled);
        fs::set_permissions(&self.path, permissions).map_err(|e| io_error(&self.path, e))
    }

    #[cfg(unix)]
    fn change_permissions(&self, bits: u16) -> Result<(), VfsError> {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::Permissions::from_mode(u32::from(bits & CHANGEABLE_BITS));
        fs::set_permissions(&self.path, mode).map_err(|e| io_error(&self.path, e))
    }

    fn capabilities(&self) -> FileCapabilities {
        FileCapabilities::full()
    }

    fn ls(&self) -> Result<Vec<FileRef>, VfsError> {
        if !self.is_directory() {
            return Err(VfsError::NotADirectory(self.path.display().to_string()));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(|e| io_error(&self.path, e))? {
            let entry = entry.map_err(|e| io_error(&self.path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| {
                let path = self.path.join(&name);
                Arc::new(LocalFile::from_parts(self.url.child(&name), path)) as FileRef
            })
            .collect())
    }

    fn child(&self, name: &str) -> Result<FileRef, VfsError> {
        Ok(Arc::new(LocalFile::from_parts(
            self.url.child(name),
            self.path.join(name),
        )))
    }

    fn mkdir(&self) -> Result<(), VfsError> {
        fs::create_dir(&self.path).map_err(|e| io_error(&self.path, e))
    }

    fn delete(&self) -> Result<(), VfsError> {
        let meta = fs::symlink_metadata(&self.path).map_err(|e| io_error(&self.path, e))?;
        let result = if meta.is_dir() {
            fs::remove_dir(&self.path)
        } else {
            fs::remove_file(&self.path)
        };
        result.map_err(|e| io_error(&self.path, e))
    }

    fn rename_to(&self, dest: &dyn AbstractFile) -> Result<(), VfsError> {
        let dest = unwrap_archive(dest);
        if !is_local(dest) {
            return Err(unsupported(&self.url, FileOperation::Rename));
        }
        let target = local_path_of(dest.url());
        debug!("Renaming {} to {}", self.path.display(), target.display());
        fs::rename(&self.path, &target).map_err(|e| io_error(&self.path, e))
    }

    fn input_stream(&self) -> Result<Box<dyn InputStream>, VfsError> {
        if self.is_directory() {
            return Err(VfsError::NotAFile(self.path.display().to_string()));
        }
        let file = fs::File::open(&self.path).map_err(|e| io_error(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn output_stream(&self) -> Result<Box<dyn OutputStream>, VfsError> {
        let file = fs::File::create(&self.path).map_err(|e| io_error(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn append_stream(&self) -> Result<Box<dyn OutputStream>, VfsError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn random_access_input(&self) -> Result<Box<dyn RandomAccessInput>, VfsError> {
        if self.is_directory() {
            return Err(VfsError::NotAFile(self.path.display().to_string()));
        }
        let file = fs::File::open(&self.path).map_err(|e| io_error(&self.path, e))?;
        Ok(Box::new(file))
    }

    fn is_same_file(&self, other: &dyn AbstractFile) -> bool {
        let other = unwrap_archive(other);
        if !is_local(other) {
            return false;
        }
        let other_path = local_path_of(other.url());
        match (fs::canonicalize(&self.path), fs::canonicalize(&other_path)) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.url == *other.url(),
        }
    }
}

fn is_local(file: &dyn AbstractFile) -> bool {
    file.kind() == FileKind::Raw
        && file.url().scheme().eq_ignore_ascii_case(LOCAL_SCHEME)
        && !is_inside_archive(file)
}

/// Provider for the `file` scheme. Accepts an optional [`PathBuf`]
/// instantiation parameter used instead of the location's path.
#[derive(Debug, Default)]
pub struct LocalProtocolProvider;

impl ProtocolProvider for LocalProtocolProvider {
    fn get_file(
        &self,
        url: &FileUrl,
        params: &[&(dyn Any + Send + Sync)],
    ) -> Result<FileRef, VfsError> {
        let file = match params.iter().find_map(|p| p.downcast_ref::<PathBuf>()) {
            Some(path) => LocalFile::from_parts(url.clone(), path.clone()),
            None => LocalFile::from_url(url),
        };
        Ok(Arc::new(file))
    }
}
