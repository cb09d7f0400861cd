use crate::file::AbstractFile;
use sha2::Digest;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use tracing::{debug, warn};
use univfs_common::{
    permission_bit, FileUrl, PermissionAccess, PermissionType, TransferError, TransferReason,
    VfsError,
};

/// Buffer size used by [`FileOps::copy_to`]
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithms available through [`FileOps::checksum`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 5] = [
        ChecksumAlgorithm::Sha224,
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Sha384,
        ChecksumAlgorithm::Sha512,
        ChecksumAlgorithm::Blake3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha224 => "sha224",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha384 => "sha384",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Sha224 => 56,
            ChecksumAlgorithm::Sha256 | ChecksumAlgorithm::Blake3 => 64,
            ChecksumAlgorithm::Sha384 => 96,
            ChecksumAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('-', "");
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == wanted)
            .ok_or_else(|| format!("unknown checksum algorithm '{s}'"))
    }
}

/// Operations written once against the [`AbstractFile`] primitives
pub trait FileOps {
    /// Copies this file or directory tree to `dest`
    fn copy_to(&self, dest: &dyn AbstractFile) -> Result<(), VfsError> {
        self.copy_to_with(dest, DEFAULT_COPY_BUFFER_SIZE)
    }

    fn copy_to_with(&self, dest: &dyn AbstractFile, buffer_size: usize) -> Result<(), VfsError>;

    /// Renames when the backend can, otherwise copies then deletes the source
    fn move_to(&self, dest: &dyn AbstractFile) -> Result<(), VfsError> {
        self.move_to_with(dest, DEFAULT_COPY_BUFFER_SIZE)
    }

    fn move_to_with(&self, dest: &dyn AbstractFile, buffer_size: usize) -> Result<(), VfsError>;

    /// Deletes this file and, for directories, everything below it
    fn delete_recursively(&self) -> Result<(), VfsError>;

    /// Feeds the file's content to `digest` and returns the lowercase hex result
    fn calculate_checksum<D: Digest>(&self, digest: D) -> Result<String, VfsError>;

    fn checksum(&self, algorithm: ChecksumAlgorithm) -> Result<String, VfsError>;
}

impl<T: AbstractFile + ?Sized> FileOps for T {
    fn copy_to_with(&self, dest: &dyn AbstractFile, buffer_size: usize) -> Result<(), VfsError> {
        if try_remote_copy(self, dest) {
            return Ok(());
        }

        check_prerequisites(self, dest, false)?;
        copy_recursively(self, dest, buffer_size)
    }

    fn move_to_with(&self, dest: &dyn AbstractFile, buffer_size: usize) -> Result<(), VfsError> {
        check_prerequisites(self, dest, true)?;

        if self.capabilities().rename {
            match self.rename_to(dest) {
                Ok(()) => return Ok(()),
                // A case-only rename has no copy fallback
                Err(e) if self.is_same_file(dest) => return Err(e),
                Err(e) => debug!(
                    "Rename of {} to {} failed, moving by copy: {}",
                    self.url(),
                    dest.url(),
                    e
                ),
            }
        }

        if !try_remote_copy(self, dest) {
            copy_recursively(self, dest, buffer_size)?;
        }
        delete_tree(self).map_err(|e| transfer(TransferReason::DeletingSource, self.url(), e))
    }

    fn delete_recursively(&self) -> Result<(), VfsError> {
        delete_tree(self)
    }

    fn calculate_checksum<D: Digest>(&self, mut digest: D) -> Result<String, VfsError> {
        let mut input = self.input_stream()?;
        let fed = feed(&mut *input, |chunk| digest.update(chunk));
        let closed = input.close();
        fed?;
        closed?;
        Ok(hex::encode(digest.finalize()))
    }

    fn checksum(&self, algorithm: ChecksumAlgorithm) -> Result<String, VfsError> {
        match algorithm {
            ChecksumAlgorithm::Sha224 => self.calculate_checksum(sha2::Sha224::new()),
            ChecksumAlgorithm::Sha256 => self.calculate_checksum(sha2::Sha256::new()),
            ChecksumAlgorithm::Sha384 => self.calculate_checksum(sha2::Sha384::new()),
            ChecksumAlgorithm::Sha512 => self.calculate_checksum(sha2::Sha512::new()),
            ChecksumAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                let mut input = self.input_stream()?;
                let fed = feed(&mut *input, |chunk| {
                    hasher.update(chunk);
                });
                let closed = input.close();
                fed?;
                closed?;
                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Sets each changeable permission bit one at a time. A zero mask is a no-op.
pub fn change_permissions_bitwise<F: AbstractFile + ?Sized>(
    file: &F,
    bits: u16,
) -> Result<(), VfsError> {
    let mask = file.changeable_permissions();
    if mask == 0 {
        return Ok(());
    }

    for access in PermissionAccess::ALL {
        for ty in PermissionType::ALL {
            let bit = permission_bit(access, ty);
            if mask & bit != 0 {
                file.change_permission(access, ty, bits & bit != 0)?;
            }
        }
    }
    Ok(())
}

fn transfer(
    reason: TransferReason,
    url: &FileUrl,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> VfsError {
    TransferError::with_source(reason, url.to_string(), source).into()
}

/// Server-side copy when the source's backend offers one. A failure is
/// logged and reported as `false` so the caller copies manually.
fn try_remote_copy<S: AbstractFile + ?Sized>(source: &S, dest: &dyn AbstractFile) -> bool {
    if !source.capabilities().copy_remotely {
        return false;
    }
    match source.copy_remotely_to(dest) {
        Ok(()) => true,
        Err(e) => {
            debug!(
                "Remote copy of {} to {} failed, copying manually: {}",
                source.url(),
                dest.url(),
                e
            );
            false
        }
    }
}

fn check_prerequisites<S: AbstractFile + ?Sized>(
    source: &S,
    dest: &dyn AbstractFile,
    allow_case_variation: bool,
) -> Result<(), VfsError> {
    if !source.exists() {
        return Err(TransferError::new(TransferReason::FileNotFound, source.url().to_string()).into());
    }

    if source.is_same_file(dest)
        && !(allow_case_variation && is_case_variation(&source.name(), &dest.name()))
    {
        return Err(TransferError::new(
            TransferReason::SourceAndDestinationIdentical,
            dest.url().to_string(),
        )
        .into());
    }

    if source.is_browsable() && is_url_ancestor(source.url(), dest.url()) {
        return Err(TransferError::new(
            TransferReason::SourceParentOfDestination,
            dest.url().to_string(),
        )
        .into());
    }

    Ok(())
}

fn is_case_variation(a: &str, b: &str) -> bool {
    a != b && a.to_lowercase() == b.to_lowercase()
}

fn is_url_ancestor(candidate: &FileUrl, url: &FileUrl) -> bool {
    let mut current = url.parent();
    while let Some(parent) = current {
        if &parent == candidate {
            return true;
        }
        current = parent.parent();
    }
    false
}

fn copy_recursively<S: AbstractFile + ?Sized>(
    source: &S,
    dest: &dyn AbstractFile,
    buffer_size: usize,
) -> Result<(), VfsError> {
    if !source.is_directory() {
        return copy_stream(source, dest, buffer_size).map(|_| ());
    }

    if !dest.exists() {
        dest.mkdir()
            .map_err(|e| transfer(TransferReason::OpeningDestination, dest.url(), e))?;
    }

    let children = source
        .ls()
        .map_err(|e| transfer(TransferReason::ReadingSource, source.url(), e))?;

    for child in children {
        if child.is_symlink() {
            debug!("Skipping symlink {}", child.url());
            continue;
        }
        let target = dest
            .child(&child.name())
            .map_err(|e| transfer(TransferReason::OpeningDestination, dest.url(), e))?;
        copy_recursively(child.as_ref(), target.as_ref(), buffer_size)?;
    }
    Ok(())
}

/// Buffered copy of the content of `source` to `dest`. Both streams are
/// closed on every path; close failures after an earlier error are only logged.
fn copy_stream<S: AbstractFile + ?Sized>(
    source: &S,
    dest: &dyn AbstractFile,
    buffer_size: usize,
) -> Result<u64, VfsError> {
    let mut input = source
        .input_stream()
        .map_err(|e| transfer(TransferReason::OpeningSource, source.url(), e))?;

    let mut output = match dest.output_stream() {
        Ok(output) => output,
        Err(e) => {
            if let Err(close_err) = input.close() {
                warn!("Failed to close {}: {}", source.url(), close_err);
            }
            return Err(transfer(TransferReason::OpeningDestination, dest.url(), e));
        }
    };

    match pump(&mut *input, &mut *output, buffer_size.max(1), source.url(), dest.url()) {
        Ok(bytes) => {
            let input_closed = input.close();
            let output_closed = output.close();
            input_closed.map_err(|e| transfer(TransferReason::ClosingSource, source.url(), e))?;
            output_closed
                .map_err(|e| transfer(TransferReason::ClosingDestination, dest.url(), e))?;
            debug!("Copied {} bytes from {} to {}", bytes, source.url(), dest.url());
            Ok(bytes)
        }
        Err(e) => {
            if let Err(close_err) = input.close() {
                warn!("Failed to close {}: {}", source.url(), close_err);
            }
            if let Err(close_err) = output.close() {
                warn!("Failed to close {}: {}", dest.url(), close_err);
            }
            Err(e)
        }
    }
}

fn pump<R: Read + ?Sized, W: Write + ?Sized>(
    input: &mut R,
    output: &mut W,
    buffer_size: usize,
    source: &FileUrl,
    dest: &FileUrl,
) -> Result<u64, VfsError> {
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let read = match input.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(transfer(TransferReason::ReadingSource, source, e)),
        };
        output
            .write_all(&buffer[..read])
            .map_err(|e| transfer(TransferReason::WritingDestination, dest, e))?;
        total += read as u64;
    }
}

fn feed<R: Read + ?Sized>(input: &mut R, mut update: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buffer = vec![0u8; DEFAULT_COPY_BUFFER_SIZE];
    loop {
        match input.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn delete_tree<S: AbstractFile + ?Sized>(file: &S) -> Result<(), VfsError> {
    if file.is_directory() && !file.is_symlink() {
        for child in file.ls()? {
            delete_tree(child.as_ref())?;
        }
    }
    file.delete()
}
