use crate::FilePermissions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Operations a file backend may or may not implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileOperation {
    ReadFile,
    RandomReadFile,
    WriteFile,
    AppendFile,
    CreateDirectory,
    ListChildren,
    Delete,
    Rename,
    ChangeDate,
    ChangePermission,
    CopyRemotely,
    GetFreeSpace,
    GetTotalSpace,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileOperation::ReadFile => "read",
            FileOperation::RandomReadFile => "random read",
            FileOperation::WriteFile => "write",
            FileOperation::AppendFile => "append",
            FileOperation::CreateDirectory => "create directory",
            FileOperation::ListChildren => "list children",
            FileOperation::Delete => "delete",
            FileOperation::Rename => "rename",
            FileOperation::ChangeDate => "change date",
            FileOperation::ChangePermission => "change permission",
            FileOperation::CopyRemotely => "remote copy",
            FileOperation::GetFreeSpace => "get free space",
            FileOperation::GetTotalSpace => "get total space",
        };
        f.write_str(name)
    }
}

/// Capabilities flags for file backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCapabilities {
    pub read: bool,
    pub random_read: bool,
    pub write: bool,
    pub append: bool,
    pub create_dir: bool,
    pub list: bool,
    pub delete: bool,
    pub rename: bool,
    pub change_date: bool,
    pub change_permission: bool,
    pub copy_remotely: bool,
    pub space_info: bool,
}

impl FileCapabilities {
    /// Full read-write capabilities (local filesystem)
    pub fn full() -> Self {
        Self {
            read: true,
            random_read: true,
            write: true,
            append: true,
            create_dir: true,
            list: true,
            delete: true,
            rename: true,
            change_date: true,
            change_permission: true,
            copy_remotely: false,
            space_info: false,
        }
    }

    /// Read-only capabilities (archive entries)
    pub fn read_only() -> Self {
        Self {
            read: true,
            list: true,
            ..Self::default()
        }
    }

    pub fn supports(&self, operation: FileOperation) -> bool {
        match operation {
            FileOperation::ReadFile => self.read,
            FileOperation::RandomReadFile => self.random_read,
            FileOperation::WriteFile => self.write,
            FileOperation::AppendFile => self.append,
            FileOperation::CreateDirectory => self.create_dir,
            FileOperation::ListChildren => self.list,
            FileOperation::Delete => self.delete,
            FileOperation::Rename => self.rename,
            FileOperation::ChangeDate => self.change_date,
            FileOperation::ChangePermission => self.change_permission,
            FileOperation::CopyRemotely => self.copy_remotely,
            FileOperation::GetFreeSpace | FileOperation::GetTotalSpace => self.space_info,
        }
    }
}

/// One item inside an archive, as reported by an entry iterator.
///
/// `path` uses `/` separators, has no leading separator and no trailing
/// separator, even for directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
    pub permissions: Option<FilePermissions>,
    pub is_symlink: bool,
}

impl ArchiveEntry {
    pub fn new(path: &str, is_dir: bool, size: u64, modified: SystemTime) -> Self {
        Self {
            path: normalize_entry_path(path),
            is_dir,
            size,
            modified,
            permissions: None,
            is_symlink: false,
        }
    }

    /// Synthesized directory for an entry whose parent has no record of its own
    pub fn implicit_directory(path: &str) -> Self {
        Self::new(path, true, 0, SystemTime::UNIX_EPOCH)
    }

    pub fn with_permissions(mut self, permissions: FilePermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path of the enclosing directory, `None` at the archive's top level
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rfind('/').map(|pos| &self.path[..pos])
    }

    pub fn depth(&self) -> usize {
        self.path.split('/').count()
    }
}

/// Strips leading `./` and `/` prefixes and trailing separators, and turns
/// backslashes into slashes.
pub fn normalize_entry_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.trim_end_matches('/').to_string()
}
