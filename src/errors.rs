use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ImportError {
    #[error("root directory must not be empty")]
    EmptyRoot,
    #[error("failed to open root directory {root:?}: {source}")]
    CannotOpenRoot {
        root: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to get absolute path of {path:?}: {source}")]
    CannotResolveAbsolutePath {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("library path {path:?} (interpreted as {resolved:?}) is outside root directory {root:?}")]
    LibraryPathOutsideRoot {
        path: String,
        resolved: PathBuf,
        root: PathBuf,
    },
    #[error("{argument} contains an invalid null byte: {value:?}")]
    InvalidNullByte { argument: &'static str, value: String },
    #[error("forbidden absolute import path {path:?} (resolved to {resolved:?}) is outside root directory {root:?}")]
    ForbiddenAbsolutePath {
        path: String,
        resolved: PathBuf,
        root: PathBuf,
    },
    #[error("forbidden relative import path traversal {path:?} from {from:?} (resolved to {resolved:?}) is outside root directory {root:?}")]
    ForbiddenRelativePathTraversal {
        path: String,
        from: String,
        resolved: PathBuf,
        root: PathBuf,
    },
    #[error("file {path:?} not found in any library path (imported from {from:?})")]
    FileNotFound { path: String, from: String },
    #[error("failed to open file {path:?}: {source}")]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to read file {path:?}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("internal cache error: unexpected entry for key {key:?}")]
    CacheInternalType { key: PathBuf },
    #[error("failed to close root directory {root:?}: {source}")]
    CloseFailure {
        root: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("importer for root {root:?} is closed")]
    Closed { root: PathBuf },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub code: &'a str,
    pub message: String,
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::EmptyRoot => "EmptyRoot",
            ImportError::CannotOpenRoot { .. } => "CannotOpenRoot",
            ImportError::CannotResolveAbsolutePath { .. } => "CannotResolveAbsolutePath",
            ImportError::LibraryPathOutsideRoot { .. } => "LibraryPathOutsideRoot",
            ImportError::InvalidNullByte { .. } => "InvalidNullByte",
            ImportError::ForbiddenAbsolutePath { .. } => "ForbiddenAbsolutePath",
            ImportError::ForbiddenRelativePathTraversal { .. } => "ForbiddenRelativePathTraversal",
            ImportError::FileNotFound { .. } => "FileNotFound",
            ImportError::OpenFailure { .. } => "OpenFailure",
            ImportError::ReadFailure { .. } => "ReadFailure",
            ImportError::CacheInternalType { .. } => "CacheInternalType",
            ImportError::CloseFailure { .. } => "CloseFailure",
            ImportError::Closed { .. } => "Closed",
        }
    }

    /// Security rejections, as opposed to plain absence or I/O trouble.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            ImportError::ForbiddenAbsolutePath { .. } | ImportError::ForbiddenRelativePathTraversal { .. }
        )
    }

    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            ImportError::EmptyRoot
                | ImportError::CannotOpenRoot { .. }
                | ImportError::CannotResolveAbsolutePath { .. }
                | ImportError::LibraryPathOutsideRoot { .. }
        )
    }

    pub fn body(&self) -> ErrorBody<'static> {
        ErrorBody { code: self.code(), message: self.to_string() }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;

pub(crate) fn null_byte_check(argument: &'static str, value: &str) -> ImportResult<()> {
    if value.contains('\0') {
        return Err(ImportError::InvalidNullByte { argument, value: value.to_string() });
    }
    Ok(())
}
