pub mod auth;
pub mod factory;
pub mod file;
pub mod ops;
pub mod pool;
pub mod vfs;

pub use auth::{Authenticator, CredentialsStore};
pub use factory::{FileFactory, ProtocolProvider};
pub use file::{
    is_inside_archive, same_instance, AbstractFile, FileKind, FileRef, FileRefExt, InputStream,
    OutputStream, RandomAccessInput,
};
pub use ops::{ChecksumAlgorithm, FileOps};
pub use pool::FilePool;
pub use vfs::{ArchiveEntryFile, ArchiveFile, ArchiveFormatProvider, LocalFile};
