//! Filer client seam
//!
//! The filer is the path-addressed metadata service behind the mount and the
//! object-storage gateway. Everything above this module talks to it through
//! [`FilerClient`]; the two backends here are an in-process map
//! ([`MemoryFiler`]) and a directory on local disk ([`LocalFiler`]).

pub mod error;
pub mod local;
pub mod memory;

pub use error::{FilerError, FilerResult};
pub use local::LocalFiler;
pub use memory::MemoryFiler;

use crate::path::FullPath;

/// Directory bit folded into [`FuseAttributes::file_mode`]
pub const MODE_DIR: u32 = libc::S_IFDIR as u32;

/// File type mask for [`FuseAttributes::file_mode`]
pub const MODE_TYPE_MASK: u32 = libc::S_IFMT as u32;

/// Symlink type bits
pub const MODE_SYMLINK: u32 = libc::S_IFLNK as u32;

/// Attributes stored with every entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseAttributes {
    pub file_size: u64,
    /// Unix seconds
    pub mtime: i64,
    /// Unix seconds
    pub crtime: i64,
    pub file_mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Reference to a piece of file content held by the data plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub file_id: String,
    pub offset: i64,
    pub size: u64,
    pub mtime: i64,
}

/// A directory entry as the filer stores it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_directory: bool,
    pub attributes: FuseAttributes,
    /// Ordered content chunks, empty for directories
    pub chunks: Vec<FileChunk>,
}

impl Entry {
    /// Total size according to the attributes, falling back to the chunks
    pub fn size(&self) -> u64 {
        if self.attributes.file_size > 0 {
            return self.attributes.file_size;
        }
        self.chunks
            .iter()
            .map(|c| c.offset.max(0) as u64 + c.size)
            .max()
            .unwrap_or(0)
    }

    pub fn is_symlink(&self) -> bool {
        self.attributes.file_mode & MODE_TYPE_MASK == MODE_SYMLINK
    }
}

#[derive(Debug, Clone)]
pub struct CreateEntryRequest {
    pub directory: FullPath,
    pub entry: Entry,
}

/// Paginated directory listing
#[derive(Debug, Clone, Default)]
pub struct ListEntriesRequest {
    pub directory: FullPath,
    /// Only names starting with this prefix
    pub prefix: String,
    /// Pagination cursor, empty to start from the beginning
    pub start_from_file_name: String,
    /// Whether the cursor name itself is included
    pub inclusive_start_from: bool,
    /// Maximum number of entries, 0 for no limit
    pub limit: u32,
}

impl ListEntriesRequest {
    pub fn new(directory: FullPath) -> Self {
        Self {
            directory,
            ..Default::default()
        }
    }

    /// Whether `name` passes the prefix and cursor filters
    pub fn accepts(&self, name: &str) -> bool {
        if !name.starts_with(&self.prefix) {
            return false;
        }
        if self.start_from_file_name.is_empty() {
            return true;
        }
        if self.inclusive_start_from {
            name >= self.start_from_file_name.as_str()
        } else {
            name > self.start_from_file_name.as_str()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteEntryRequest {
    pub directory: FullPath,
    pub name: String,
    /// Also delete the content chunks
    pub is_delete_data: bool,
    /// Delete directory contents too
    pub is_recursive: bool,
}

/// Backend-reported outcome of a delete; an empty `error` means success
#[derive(Debug, Clone, Default)]
pub struct DeleteEntryResponse {
    pub error: String,
}

/// Finite, single-pass sequence of listed entries
pub type EntryStream = Box<dyn Iterator<Item = FilerResult<Entry>> + Send>;

/// Operations the mount and the gateway issue against the filer
pub trait FilerClient: Send + Sync {
    /// Create `entry` inside `directory`
    fn create_entry(&self, request: &CreateEntryRequest) -> FilerResult<()>;

    /// List a directory in name order
    fn list_entries(&self, request: &ListEntriesRequest) -> FilerResult<EntryStream>;

    /// Delete one entry; refusals are reported in the response
    fn delete_entry(&self, request: &DeleteEntryRequest) -> FilerResult<DeleteEntryResponse>;

    /// Fetch a single entry, `None` if absent
    fn lookup_entry(&self, directory: &FullPath, name: &str) -> FilerResult<Option<Entry>>;

    /// Move an entry, replacing the destination if it exists
    fn rename_entry(
        &self,
        old_directory: &FullPath,
        old_name: &str,
        new_directory: &FullPath,
        new_name: &str,
    ) -> FilerResult<()>;

    /// Replace the attributes of an existing entry
    fn update_entry(&self, directory: &FullPath, entry: &Entry) -> FilerResult<()>;
}

/// Look an entry up by its full path; the root is always a directory
pub fn lookup_path<C: FilerClient + ?Sized>(
    client: &C,
    path: &FullPath,
) -> FilerResult<Option<Entry>> {
    if path.is_root() {
        return Ok(Some(root_entry()));
    }
    let (dir, name) = path.dir_and_name();
    client.lookup_entry(&dir, &name)
}

/// Whether `directory/name` exists with the expected kind
pub fn exists<C: FilerClient + ?Sized>(
    client: &C,
    directory: &FullPath,
    name: &str,
    is_directory: bool,
) -> FilerResult<bool> {
    Ok(client
        .lookup_entry(directory, name)?
        .map(|entry| entry.is_directory == is_directory)
        .unwrap_or(false))
}

pub(crate) fn root_entry() -> Entry {
    Entry {
        name: String::new(),
        is_directory: true,
        attributes: FuseAttributes {
            file_mode: MODE_DIR | 0o755,
            ..Default::default()
        },
        chunks: Vec::new(),
    }
}
