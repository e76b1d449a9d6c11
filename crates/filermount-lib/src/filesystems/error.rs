use thiserror::Error;

use crate::filer::FilerError;
use crate::path::FullPath;

/// Errors that can occur in filesystem operations
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Filer error: {0}")]
    Filer(#[from] FilerError),

    #[error("Path not found: {0}")]
    PathNotFound(FullPath),

    #[error("Inode {0} not found")]
    InodeNotFound(u64),

    #[error("Not a directory: {0}")]
    NotADirectory(FullPath),

    #[error("Is a directory: {0}")]
    IsADirectory(FullPath),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(FullPath),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Operation not permitted on {0}")]
    PermissionDenied(FullPath),

    #[error("Invalid operation in read-only mode")]
    ReadOnlyFs,

    #[error("Filer refused to delete {path}: {message}")]
    DeleteRefused { path: FullPath, message: String },
}

/// Extension trait to convert FsError to i32 error codes for FUSE
pub trait FsErrorCode {
    /// Convert to a libc error code for FUSE replies
    fn to_error_code(&self) -> i32;
}

impl FsErrorCode for FsError {
    fn to_error_code(&self) -> i32 {
        use libc::*;

        match self {
            FsError::Filer(e) => match e {
                FilerError::Io(e) => e.raw_os_error().unwrap_or(EIO),
                FilerError::Nix(e) => *e as i32,
                FilerError::NotFound(_) => ENOENT,
                FilerError::AlreadyExists(_) => EEXIST,
                FilerError::NotADirectory(_) => ENOTDIR,
                FilerError::DirectoryNotEmpty(_) => ENOTEMPTY,
            },
            FsError::PathNotFound(_) => ENOENT,
            FsError::InodeNotFound(_) => ENOENT,
            FsError::NotADirectory(_) => ENOTDIR,
            FsError::IsADirectory(_) => EISDIR,
            FsError::DirectoryNotEmpty(_) => ENOTEMPTY,
            FsError::InvalidName(_) => EINVAL,
            FsError::PermissionDenied(_) => EPERM,
            FsError::ReadOnlyFs => EROFS,
            FsError::DeleteRefused { .. } => EIO,
        }
    }
}

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;
