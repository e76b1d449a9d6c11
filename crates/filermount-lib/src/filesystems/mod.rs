pub mod error;
pub mod filer_fs;
pub mod inode_to_path;

// Re-export key types for convenience
pub use error::{FsError, FsErrorCode, FsResult};
pub use filer_fs::{DirRow, FilerFS, SetAttr};
pub use inode_to_path::{Inode, InodeError, InodeToPath, NO_INODE, ROOT_INODE};
