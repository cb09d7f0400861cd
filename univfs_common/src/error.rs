use crate::FileOperation;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnivfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("VFS error: {0}")]
    Vfs(#[from] VfsError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, UnivfsError>;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {path}: {source}")]
    IoAt {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed location '{input}': {reason}")]
    MalformedLocation { input: String, reason: String },

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("Unknown archive format: {0}")]
    UnknownArchiveFormat(String),

    #[error("Unsupported operation {operation} on {path}")]
    Unsupported {
        operation: FileOperation,
        path: String,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Archive error in {path}: {reason}")]
    Archive { path: String, reason: String },
}

impl VfsError {
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        VfsError::MalformedLocation {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// IO failure on a known file
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        VfsError::IoAt {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported(operation: FileOperation, path: impl Into<String>) -> Self {
        VfsError::Unsupported {
            operation,
            path: path.into(),
        }
    }

    pub fn archive(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        VfsError::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the backend does not implement the operation at all,
    /// as opposed to a transient failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, VfsError::Unsupported { .. })
    }

    /// Returns the transfer reason when this error came out of a copy/move/delete.
    pub fn transfer_reason(&self) -> Option<TransferReason> {
        match self {
            VfsError::Transfer(e) => Some(e.reason),
            _ => None,
        }
    }
}

/// Phase of a transfer in which a copy, move or delete failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferReason {
    OpeningSource,
    OpeningDestination,
    ReadingSource,
    WritingDestination,
    ClosingSource,
    ClosingDestination,
    DeletingSource,
    SourceAndDestinationIdentical,
    SourceParentOfDestination,
    FileNotFound,
}

impl TransferReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferReason::OpeningSource => "opening source",
            TransferReason::OpeningDestination => "opening destination",
            TransferReason::ReadingSource => "reading source",
            TransferReason::WritingDestination => "writing destination",
            TransferReason::ClosingSource => "closing source",
            TransferReason::ClosingDestination => "closing destination",
            TransferReason::DeletingSource => "deleting source",
            TransferReason::SourceAndDestinationIdentical => {
                "source and destination are identical"
            }
            TransferReason::SourceParentOfDestination => "source is a parent of destination",
            TransferReason::FileNotFound => "file not found",
        }
    }
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Transfer failed ({reason}) on {path}")]
pub struct TransferError {
    pub reason: TransferReason,
    pub path: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransferError {
    pub fn new(reason: TransferReason, path: impl Into<String>) -> Self {
        Self {
            reason,
            path: path.into(),
            source: None,
        }
    }

    pub fn with_source(
        reason: TransferReason,
        path: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            reason,
            path: path.into(),
            source: Some(source.into()),
        }
    }
}
