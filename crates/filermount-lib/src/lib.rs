pub mod cli;
pub mod config;
pub mod filer;
pub mod filesystems;
pub mod gateway;
pub mod path;

pub use config::{ConfigError, MountConfig};
pub use filer::{FilerClient, LocalFiler, MemoryFiler};
pub use filesystems::{FilerFS, Inode, InodeError, InodeToPath, NO_INODE, ROOT_INODE};
pub use gateway::S3Gateway;
pub use path::FullPath;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
