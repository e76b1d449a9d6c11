use std::io;

use thiserror::Error;

use crate::path::FullPath;

/// Errors returned by filer backends
#[derive(Error, Debug)]
pub enum FilerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("System call error: {0}")]
    Nix(#[from] nix::Error),

    #[error("{0} not found")]
    NotFound(FullPath),

    #[error("{0} already exists")]
    AlreadyExists(FullPath),

    #[error("{0} is not a directory")]
    NotADirectory(FullPath),

    #[error("{0}: directory not empty")]
    DirectoryNotEmpty(FullPath),
}

impl FilerError {
    /// Classify an I/O error against the path it was raised for
    pub fn from_io(err: io::Error, path: &FullPath) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FilerError::NotFound(path.clone()),
            io::ErrorKind::AlreadyExists => FilerError::AlreadyExists(path.clone()),
            _ => match err.raw_os_error() {
                Some(libc::ENOTDIR) => FilerError::NotADirectory(path.clone()),
                Some(libc::ENOTEMPTY) => FilerError::DirectoryNotEmpty(path.clone()),
                _ => FilerError::Io(err),
            },
        }
    }
}

pub type FilerResult<T> = Result<T, FilerError>;
