use super::{ArchiveEntryIterator, ArchiveReader};
use crate::file::{AbstractFile, InputStream, RandomAccessInput};
use std::io::{Cursor, Read};
use std::time::{Duration, SystemTime};
use tracing::debug;
use univfs_common::{normalize_entry_path, ArchiveEntry, FilePermissions, VfsError};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

type Archive = ZipArchive<Box<dyn RandomAccessInput>>;

/// Reader for the zip family (zip, jar, war, ear, apk, epub)
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipReader;

/// Opens the central directory, seeking the raw file when it allows random
/// access and buffering it in memory otherwise
fn open(raw: &dyn AbstractFile) -> Result<Archive, VfsError> {
    let input: Box<dyn RandomAccessInput> = match raw.random_access_input() {
        Ok(input) => input,
        Err(e) if e.is_unsupported() => {
            debug!("Buffering {} to read it as a zip", raw.url());
            let mut stream = raw.input_stream()?;
            let mut data = Vec::new();
            let read = stream.read_to_end(&mut data);
            let closed = stream.close();
            read?;
            closed?;
            Box::new(Cursor::new(data))
        }
        Err(e) => return Err(e),
    };
    ZipArchive::new(input).map_err(|e| VfsError::archive(raw.url().to_string(), e))
}

fn to_system_time(modified: zip::DateTime) -> SystemTime {
    let timestamp = modified
        .to_time()
        .map(|dt| dt.unix_timestamp())
        .unwrap_or(0);
    u64::try_from(timestamp)
        .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Walks the central directory one record at a time
struct ZipEntries {
    archive: Option<Archive>,
    index: usize,
    location: String,
}

impl ArchiveEntryIterator for ZipEntries {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, VfsError> {
        let Some(archive) = self.archive.as_mut() else {
            return Ok(None);
        };
        if self.index >= archive.len() {
            return Ok(None);
        }

        let file = archive
            .by_index(self.index)
            .map_err(|e| VfsError::archive(self.location.clone(), e))?;
        self.index += 1;

        let mut entry = ArchiveEntry::new(
            file.name(),
            file.is_dir(),
            file.size(),
            to_system_time(file.last_modified()),
        );
        if let Some(mode) = file.unix_mode() {
            entry.is_symlink = mode & S_IFMT == S_IFLNK;
            entry = entry.with_permissions(FilePermissions::from_mode(mode));
        }
        Ok(Some(entry))
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.archive = None;
        Ok(())
    }
}

impl ArchiveReader for ZipReader {
    fn entries(&self, raw: &dyn AbstractFile) -> Result<Box<dyn ArchiveEntryIterator>, VfsError> {
        Ok(Box::new(ZipEntries {
            archive: Some(open(raw)?),
            index: 0,
            location: raw.url().to_string(),
        }))
    }

    fn entry_input_stream(
        &self,
        raw: &dyn AbstractFile,
        entry: &ArchiveEntry,
    ) -> Result<Box<dyn InputStream>, VfsError> {
        let location = raw.url().to_string();
        let mut archive = open(raw)?;

        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| VfsError::archive(location.clone(), e))?;
            if normalize_entry_path(file.name()) != entry.path {
                continue;
            }
            if file.is_dir() {
                return Err(VfsError::NotAFile(format!("{}/{}", location, entry.path)));
            }

            // header sizes are untrusted, let the buffer grow with the data
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).map_err(|e| {
                VfsError::archive(format!("{}/{}", location, entry.path), e)
            })?;
            return Ok(Box::new(Cursor::new(contents)));
        }

        Err(VfsError::NotFound(format!("{}/{}", location, entry.path)))
    }
}
