//! Unix-style permission bits paired with a mask of the bits a backend supports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whose access a permission bit governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionAccess {
    User,
    Group,
    Other,
}

impl PermissionAccess {
    pub const ALL: [PermissionAccess; 3] = [
        PermissionAccess::User,
        PermissionAccess::Group,
        PermissionAccess::Other,
    ];

    fn shift(self) -> u16 {
        match self {
            PermissionAccess::User => 6,
            PermissionAccess::Group => 3,
            PermissionAccess::Other => 0,
        }
    }
}

/// Kind of access a permission bit grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionType {
    Read,
    Write,
    Execute,
}

impl PermissionType {
    pub const ALL: [PermissionType; 3] = [
        PermissionType::Read,
        PermissionType::Write,
        PermissionType::Execute,
    ];

    fn bit(self) -> u16 {
        match self {
            PermissionType::Read => 4,
            PermissionType::Write => 2,
            PermissionType::Execute => 1,
        }
    }

    fn letter(self) -> char {
        match self {
            PermissionType::Read => 'r',
            PermissionType::Write => 'w',
            PermissionType::Execute => 'x',
        }
    }
}

/// Single bit for an (access, type) pair within the 9-bit space
pub fn permission_bit(access: PermissionAccess, ty: PermissionType) -> u16 {
    ty.bit() << access.shift()
}

const ALL_BITS: u16 = 0o777;
const TRIPLET: u16 = 0o7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilePermissions {
    value: u16,
    mask: u16,
}

impl FilePermissions {
    /// No bit supported
    pub const EMPTY: FilePermissions = FilePermissions { value: 0, mask: 0 };

    /// rw-r--r--, every bit supported
    pub const DEFAULT_FILE: FilePermissions = FilePermissions {
        value: 0o644,
        mask: ALL_BITS,
    };

    /// rwxr-xr-x, every bit supported
    pub const DEFAULT_DIRECTORY: FilePermissions = FilePermissions {
        value: 0o755,
        mask: ALL_BITS,
    };

    pub fn new(value: u16, mask: u16) -> Self {
        let mask = mask & ALL_BITS;
        Self {
            value: value & mask,
            mask,
        }
    }

    /// All nine bits meaningful
    pub fn from_mode(mode: u32) -> Self {
        Self::new((mode & ALL_BITS as u32) as u16, ALL_BITS)
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn mask(&self) -> u16 {
        self.mask
    }

    pub fn get(&self, access: PermissionAccess, ty: PermissionType) -> bool {
        self.value & permission_bit(access, ty) != 0
    }

    pub fn is_supported(&self, access: PermissionAccess, ty: PermissionType) -> bool {
        self.mask & permission_bit(access, ty) != 0
    }

    /// Sets or clears one bit. Unsupported bits are left untouched.
    pub fn with(mut self, access: PermissionAccess, ty: PermissionType, enabled: bool) -> Self {
        let bit = permission_bit(access, ty);
        if self.mask & bit == 0 {
            return self;
        }
        if enabled {
            self.value |= bit;
        } else {
            self.value &= !bit;
        }
        self
    }

    /// Fills the bits this set does not support with the supported bits of
    /// `defaults`. Only the masks decide which side a bit comes from.
    pub fn pad(&self, defaults: &FilePermissions) -> FilePermissions {
        let borrowed = defaults.mask & !self.mask;
        FilePermissions {
            value: (self.value & self.mask) | (defaults.value & borrowed),
            mask: self.mask | defaults.mask,
        }
    }

    /// Renders the `rwx` triplets the way `ls -l` does, after the type
    /// character. The user triplet is always present; group and other
    /// triplets only when the mask has a bit in them.
    pub fn render(&self, type_char: char) -> String {
        let mut out = String::with_capacity(10);
        out.push(type_char);
        for access in PermissionAccess::ALL {
            let triplet_supported = (self.mask >> access.shift()) & TRIPLET != 0;
            if access != PermissionAccess::User && !triplet_supported {
                continue;
            }
            for ty in PermissionType::ALL {
                if self.is_supported(access, ty) && self.get(access, ty) {
                    out.push(ty.letter());
                } else {
                    out.push('-');
                }
            }
        }
        out
    }

    /// Octal rendering of the value, e.g. `755`
    pub fn to_octal(&self) -> String {
        format!("{:03o}", self.value)
    }
}

impl Default for FilePermissions {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for FilePermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render('-')[1..])
    }
}
