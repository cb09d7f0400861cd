use super::{ArchiveEntryIterator, ArchiveReader, Compression, ReadStream, VecEntryIterator};
use crate::file::{AbstractFile, InputStream};
use std::io;
use tracing::debug;
use univfs_common::{ArchiveEntry, VfsError};

/// Single compressed file (`notes.txt.gz`) seen as an archive holding one
/// entry named after the file without its compression extension.
#[derive(Debug, Clone, Copy)]
pub struct CompressedReader {
    compression: Compression,
}

impl CompressedReader {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    /// Size of the content once decompressed, found by decoding the whole stream
    fn decoded_size(&self, raw: &dyn AbstractFile) -> Result<u64, VfsError> {
        let mut decoder = self.compression.decoder(raw.input_stream()?);
        let size = io::copy(&mut decoder, &mut io::sink())
            .map_err(|e| VfsError::archive(raw.url().to_string(), e))?;
        debug!("{} decompresses to {} bytes", raw.url(), size);
        Ok(size)
    }
}

/// Name of the only entry: the file name minus its last extension
pub fn entry_name(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    }
}

impl ArchiveReader for CompressedReader {
    fn entries(&self, raw: &dyn AbstractFile) -> Result<Box<dyn ArchiveEntryIterator>, VfsError> {
        let name = raw.name();
        let entry = ArchiveEntry::new(
            entry_name(&name),
            false,
            self.decoded_size(raw)?,
            raw.last_modified(),
        );
        Ok(Box::new(VecEntryIterator::new(vec![entry])))
    }

    fn entry_input_stream(
        &self,
        raw: &dyn AbstractFile,
        _entry: &ArchiveEntry,
    ) -> Result<Box<dyn InputStream>, VfsError> {
        let input = raw.input_stream()?;
        Ok(Box::new(ReadStream(self.compression.decoder(input))))
    }
}
