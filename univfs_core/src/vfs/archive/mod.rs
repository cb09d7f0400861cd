//! Archive support: entry iteration, format matching and the archive file views.
//!
//! An [`ArchiveFile`] wraps a raw file whose name matches a registered
//! [`ArchiveFormatProvider`]. Its content is exposed as a tree of
//! [`ArchiveEntryFile`]s built from the format's [`ArchiveReader`].

mod file;
mod tree;

#[cfg(feature = "archives")]
mod compressed;
#[cfg(feature = "archives")]
mod tar_reader;
#[cfg(feature = "archives")]
mod zip_reader;

pub use file::{ArchiveEntryFile, ArchiveFile};
pub use tree::EntryTree;

#[cfg(feature = "archives")]
pub use compressed::CompressedReader;
#[cfg(feature = "archives")]
pub use tar_reader::TarReader;
#[cfg(feature = "archives")]
pub use zip_reader::ZipReader;

use crate::file::{AbstractFile, FileRef, InputStream};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use univfs_common::{ArchiveEntry, VfsError};

/// Single-pass source of archive entries. Once closed, it yields nothing.
pub trait ArchiveEntryIterator: Send {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, VfsError>;

    fn close(&mut self) -> Result<(), VfsError> {
        Ok(())
    }
}

/// Entry iterator over entries collected up front
pub struct VecEntryIterator {
    entries: std::vec::IntoIter<ArchiveEntry>,
    closed: bool,
}

impl VecEntryIterator {
    pub fn new(entries: Vec<ArchiveEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
            closed: false,
        }
    }
}

impl ArchiveEntryIterator for VecEntryIterator {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, VfsError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.entries.next())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.closed = true;
        Ok(())
    }
}

/// Codec for one archive format
pub trait ArchiveReader: Send + Sync {
    fn entries(&self, raw: &dyn AbstractFile) -> Result<Box<dyn ArchiveEntryIterator>, VfsError>;

    fn entry_input_stream(
        &self,
        raw: &dyn AbstractFile,
        entry: &ArchiveEntry,
    ) -> Result<Box<dyn InputStream>, VfsError>;
}

/// Recognizes archive file names and wraps matching raw files
pub trait ArchiveFormatProvider: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, filename: &str) -> bool;

    fn wrap(&self, raw: FileRef) -> Arc<ArchiveFile>;
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Format matched by file name glob patterns
pub struct ArchiveFormat {
    name: String,
    patterns: Vec<Pattern>,
    reader: Arc<dyn ArchiveReader>,
}

impl ArchiveFormat {
    pub fn new(
        name: &str,
        patterns: &[&str],
        reader: Arc<dyn ArchiveReader>,
    ) -> Result<Self, VfsError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    VfsError::UnknownArchiveFormat(format!("{name}: invalid pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            patterns,
            reader,
        })
    }

    pub fn reader(&self) -> &Arc<dyn ArchiveReader> {
        &self.reader
    }
}

impl ArchiveFormatProvider for ArchiveFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, filename: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(filename, MATCH_OPTIONS))
    }

    fn wrap(&self, raw: FileRef) -> Arc<ArchiveFile> {
        ArchiveFile::new(raw, self.reader.clone())
    }
}

impl fmt::Debug for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self.patterns.iter().map(Pattern::as_str).collect();
        f.debug_struct("ArchiveFormat")
            .field("name", &self.name)
            .field("patterns", &patterns)
            .finish()
    }
}

/// Stream compression in front of an archive or a single compressed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    #[cfg(feature = "archives")]
    pub fn decoder(self, input: Box<dyn InputStream>) -> Box<dyn Read + Send> {
        match self {
            Compression::None => Box::new(input),
            Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(input)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(input)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(input)),
        }
    }
}

/// Adapts a plain reader to [`InputStream`]
pub struct ReadStream<R>(pub R);

impl<R: Read + Send> Read for ReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> InputStream for ReadStream<R> {}

/// Built-in formats, most specific first so `backup.tar.gz` is a tar.gz
/// rather than a gzip-compressed single file.
#[cfg(feature = "archives")]
pub fn default_formats() -> Result<Vec<Arc<dyn ArchiveFormatProvider>>, VfsError> {
    const NAMES: [&str; 8] = ["tar.gz", "tar.bz2", "tar.xz", "tar", "zip", "gz", "bz2", "xz"];
    NAMES.iter().map(|name| format_by_name(name)).collect()
}

#[cfg(not(feature = "archives"))]
pub fn default_formats() -> Result<Vec<Arc<dyn ArchiveFormatProvider>>, VfsError> {
    Ok(Vec::new())
}

/// Built-in format called `name`
#[cfg(feature = "archives")]
pub fn format_by_name(name: &str) -> Result<Arc<dyn ArchiveFormatProvider>, VfsError> {
    let tar = |compression| -> Arc<dyn ArchiveReader> { Arc::new(TarReader::new(compression)) };
    let single = |compression| -> Arc<dyn ArchiveReader> {
        Arc::new(CompressedReader::new(compression))
    };

    let format = match name.to_ascii_lowercase().as_str() {
        "tar.gz" => ArchiveFormat::new("tar.gz", &["*.tar.gz", "*.tgz"], tar(Compression::Gzip)),
        "tar.bz2" => ArchiveFormat::new(
            "tar.bz2",
            &["*.tar.bz2", "*.tbz2"],
            tar(Compression::Bzip2),
        ),
        "tar.xz" => ArchiveFormat::new("tar.xz", &["*.tar.xz", "*.txz"], tar(Compression::Xz)),
        "tar" => ArchiveFormat::new("tar", &["*.tar"], tar(Compression::None)),
        "zip" => ArchiveFormat::new(
            "zip",
            &["*.zip", "*.jar", "*.war", "*.ear", "*.apk", "*.epub"],
            Arc::new(ZipReader),
        ),
        "gz" => ArchiveFormat::new("gz", &["*.gz"], single(Compression::Gzip)),
        "bz2" => ArchiveFormat::new("bz2", &["*.bz2"], single(Compression::Bzip2)),
        "xz" => ArchiveFormat::new("xz", &["*.xz"], single(Compression::Xz)),
        _ => return Err(VfsError::UnknownArchiveFormat(name.to_string())),
    }?;
    Ok(Arc::new(format))
}

#[cfg(not(feature = "archives"))]
pub fn format_by_name(name: &str) -> Result<Arc<dyn ArchiveFormatProvider>, VfsError> {
    Err(VfsError::UnknownArchiveFormat(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_iterator_yields_nothing() {
        let mut entries = VecEntryIterator::new(vec![ArchiveEntry::implicit_directory("a")]);
        entries.close().unwrap();
        assert!(entries.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_iterator_is_single_pass() {
        let mut entries = VecEntryIterator::new(vec![
            ArchiveEntry::implicit_directory("a"),
            ArchiveEntry::implicit_directory("b"),
        ]);
        assert_eq!(entries.next_entry().unwrap().unwrap().path, "a");
        assert_eq!(entries.next_entry().unwrap().unwrap().path, "b");
        assert!(entries.next_entry().unwrap().is_none());
        assert!(entries.next_entry().unwrap().is_none());
    }

    #[cfg(feature = "archives")]
    #[test]
    fn test_patterns_ignore_case() {
        let zip = format_by_name("zip").unwrap();
        assert!(zip.matches("Photos.ZIP"));
        assert!(zip.matches("app.jar"));
        assert!(!zip.matches("zip"));
        assert!(!zip.matches("notes.txt"));
    }

    #[cfg(feature = "archives")]
    #[test]
    fn test_default_order_prefers_tarballs() {
        let formats = default_formats().unwrap();
        let first = formats.iter().find(|f| f.matches("backup.tar.gz")).unwrap();
        assert_eq!(first.name(), "tar.gz");
        let first = formats.iter().find(|f| f.matches("notes.txt.gz")).unwrap();
        assert_eq!(first.name(), "gz");
    }

    #[test]
    fn test_unknown_format_name() {
        assert!(matches!(
            format_by_name("rar"),
            Err(VfsError::UnknownArchiveFormat(_))
        ));
    }
}
