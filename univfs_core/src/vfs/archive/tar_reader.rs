use super::{ArchiveEntryIterator, ArchiveReader, Compression, VecEntryIterator};
use crate::file::{AbstractFile, InputStream};
use std::io::{Cursor, Read};
use std::time::{Duration, SystemTime};
use univfs_common::{normalize_entry_path, ArchiveEntry, FilePermissions, VfsError};

/// Reader for tar archives, optionally behind a compression layer
#[derive(Debug, Clone, Copy)]
pub struct TarReader {
    compression: Compression,
}

impl TarReader {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn open(&self, raw: &dyn AbstractFile) -> Result<tar::Archive<Box<dyn Read + Send>>, VfsError> {
        let input = raw.input_stream()?;
        Ok(tar::Archive::new(self.compression.decoder(input)))
    }
}

fn entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> std::io::Result<String> {
    Ok(normalize_entry_path(&entry.path()?.to_string_lossy()))
}

fn is_metadata(kind: tar::EntryType) -> bool {
    matches!(
        kind,
        tar::EntryType::XGlobalHeader | tar::EntryType::XHeader | tar::EntryType::GNULongName
    )
}

impl ArchiveReader for TarReader {
    /// Headers are interleaved with content in a tar stream, so the whole
    /// (possibly compressed) stream is read once and the headers collected.
    fn entries(&self, raw: &dyn AbstractFile) -> Result<Box<dyn ArchiveEntryIterator>, VfsError> {
        let location = raw.url().to_string();
        let archive_err = |e: std::io::Error| VfsError::archive(location.clone(), e);

        let mut archive = self.open(raw)?;
        let mut entries = Vec::new();
        for entry in archive.entries().map_err(archive_err)? {
            let entry = entry.map_err(archive_err)?;
            let header = entry.header();
            let kind = header.entry_type();
            if is_metadata(kind) {
                continue;
            }

            let path = entry_path(&entry).map_err(archive_err)?;
            let modified = header
                .mtime()
                .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let mut record = ArchiveEntry::new(&path, kind.is_dir(), entry.size(), modified);
            record.is_symlink = kind.is_symlink();
            if let Ok(mode) = header.mode() {
                record = record.with_permissions(FilePermissions::from_mode(mode));
            }
            entries.push(record);
        }

        Ok(Box::new(VecEntryIterator::new(entries)))
    }

    fn entry_input_stream(
        &self,
        raw: &dyn AbstractFile,
        wanted: &ArchiveEntry,
    ) -> Result<Box<dyn InputStream>, VfsError> {
        let location = raw.url().to_string();
        let archive_err = |e: std::io::Error| VfsError::archive(location.clone(), e);

        let mut archive = self.open(raw)?;
        for entry in archive.entries().map_err(archive_err)? {
            let mut entry = entry.map_err(archive_err)?;
            if is_metadata(entry.header().entry_type())
                || entry_path(&entry).map_err(archive_err)? != wanted.path
            {
                continue;
            }
            if entry.header().entry_type().is_dir() {
                return Err(VfsError::NotAFile(format!("{}/{}", location, wanted.path)));
            }

            // header sizes are untrusted, let the buffer grow with the data
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(|e| {
                VfsError::archive(format!("{}/{}", location, wanted.path), e)
            })?;
            return Ok(Box::new(Cursor::new(contents)));
        }

        Err(VfsError::NotFound(format!("{}/{}", location, wanted.path)))
    }
}
