pub mod archive;
pub mod local;

#[cfg(test)]
mod tests_local;

#[cfg(all(test, feature = "archives"))]
mod tests_archive;

pub use archive::{
    ArchiveEntryFile, ArchiveEntryIterator, ArchiveFile, ArchiveFormat, ArchiveFormatProvider,
    ArchiveReader,
};
pub use local::{LocalFile, LocalProtocolProvider};
