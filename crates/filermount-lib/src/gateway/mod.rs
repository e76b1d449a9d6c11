//! Object-storage gateway helpers
//!
//! Bucket and object operations reduce to a handful of directory calls on the
//! filer. These helpers build the requests, log them, and wrap backend
//! failures with the directory and name that were attempted. They never touch
//! the mount's inode table.

use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::filer::{
    self, CreateEntryRequest, DeleteEntryRequest, Entry, FileChunk, FilerClient, FilerError,
    FuseAttributes, ListEntriesRequest, MODE_DIR,
};
use crate::path::FullPath;

/// Owner recorded on every entry the gateway creates
pub const OS_UID: u32 = 0;
pub const OS_GID: u32 = 0;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("mkdir {directory}/{name}: {source}")]
    Mkdir {
        directory: FullPath,
        name: String,
        source: FilerError,
    },

    #[error("create file {directory}/{name}: {source}")]
    CreateFile {
        directory: FullPath,
        name: String,
        source: FilerError,
    },

    #[error("list dir {directory}: {source}")]
    List {
        directory: FullPath,
        source: FilerError,
    },

    #[error("delete entry {directory}/{name}: {source}")]
    Delete {
        directory: FullPath,
        name: String,
        source: FilerError,
    },

    /// The filer accepted the request but refused the delete
    #[error("delete entry {directory}/{name}: {message}")]
    DeleteRefused {
        directory: FullPath,
        name: String,
        message: String,
    },

    #[error("exists {directory}/{name}: {source}")]
    Exists {
        directory: FullPath,
        name: String,
        source: FilerError,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway-side view of the filer
pub struct S3Gateway<C: FilerClient> {
    client: Arc<C>,
}

impl<C: FilerClient> Clone for S3Gateway<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

fn new_attributes(file_mode: u32) -> FuseAttributes {
    let now = chrono::Utc::now().timestamp();
    FuseAttributes {
        file_size: 0,
        mtime: now,
        crtime: now,
        file_mode,
        uid: OS_UID,
        gid: OS_GID,
    }
}

impl<C: FilerClient> S3Gateway<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Create a directory entry, letting `customize` adjust it first
    pub fn mkdir<F>(
        &self,
        parent_directory: &FullPath,
        dir_name: &str,
        customize: Option<F>,
    ) -> GatewayResult<()>
    where
        F: FnOnce(&mut Entry),
    {
        let mut entry = Entry {
            name: dir_name.to_string(),
            is_directory: true,
            attributes: new_attributes(0o777 | MODE_DIR),
            chunks: Vec::new(),
        };
        if let Some(customize) = customize {
            customize(&mut entry);
        }

        let request = CreateEntryRequest {
            directory: parent_directory.clone(),
            entry,
        };
        debug!("mkdir: {:?}", request);
        self.client.create_entry(&request).map_err(|source| {
            info!("mkdir {:?}: {}", request, source);
            GatewayError::Mkdir {
                directory: parent_directory.clone(),
                name: dir_name.to_string(),
                source,
            }
        })
    }

    /// Create a file entry pointing at already-uploaded chunks
    pub fn mk_file(
        &self,
        parent_directory: &FullPath,
        file_name: &str,
        chunks: Vec<FileChunk>,
    ) -> GatewayResult<()> {
        let entry = Entry {
            name: file_name.to_string(),
            is_directory: false,
            attributes: new_attributes(0o770),
            chunks,
        };
        let request = CreateEntryRequest {
            directory: parent_directory.clone(),
            entry,
        };

        debug!("create file: {}/{}", parent_directory, file_name);
        self.client.create_entry(&request).map_err(|source| {
            info!("create file {:?}: {}", request, source);
            GatewayError::CreateFile {
                directory: parent_directory.clone(),
                name: file_name.to_string(),
                source,
            }
        })
    }

    /// List one page of a directory
    pub fn list(
        &self,
        parent_directory: &FullPath,
        prefix: &str,
        start_from: &str,
        inclusive: bool,
        limit: u32,
    ) -> GatewayResult<Vec<Entry>> {
        let request = ListEntriesRequest {
            directory: parent_directory.clone(),
            prefix: prefix.to_string(),
            start_from_file_name: start_from.to_string(),
            inclusive_start_from: inclusive,
            limit,
        };
        debug!("read directory: {:?}", request);

        let wrap = |source: FilerError| GatewayError::List {
            directory: parent_directory.clone(),
            source,
        };
        let stream = self.client.list_entries(&request).map_err(|source| {
            info!("read directory {:?}: {}", request, source);
            wrap(source)
        })?;

        stream.map(|entry| entry.map_err(&wrap)).collect()
    }

    /// Delete an entry, optionally with its data and children
    pub fn rm(
        &self,
        parent_directory: &FullPath,
        entry_name: &str,
        is_delete_data: bool,
        is_recursive: bool,
    ) -> GatewayResult<()> {
        let request = DeleteEntryRequest {
            directory: parent_directory.clone(),
            name: entry_name.to_string(),
            is_delete_data,
            is_recursive,
        };
        debug!(
            "delete entry {}/{}: {:?}",
            parent_directory, entry_name, request
        );

        let response = self.client.delete_entry(&request).map_err(|source| {
            info!("delete entry {:?}: {}", request, source);
            GatewayError::Delete {
                directory: parent_directory.clone(),
                name: entry_name.to_string(),
                source,
            }
        })?;
        if !response.error.is_empty() {
            return Err(GatewayError::DeleteRefused {
                directory: parent_directory.clone(),
                name: entry_name.to_string(),
                message: response.error,
            });
        }
        Ok(())
    }

    pub fn exists(
        &self,
        parent_directory: &FullPath,
        entry_name: &str,
        is_directory: bool,
    ) -> GatewayResult<bool> {
        filer::exists(
            self.client.as_ref(),
            parent_directory,
            entry_name,
            is_directory,
        )
        .map_err(|source| GatewayError::Exists {
            directory: parent_directory.clone(),
            name: entry_name.to_string(),
            source,
        })
    }
}

/// Strip the leading slash from an object key
pub fn object_key(key: &str) -> &str {
    key.strip_prefix('/').unwrap_or(key)
}
