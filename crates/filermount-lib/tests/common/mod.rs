//! Common test utilities for filermount

use std::ffi::OsString;
use std::sync::Arc;

use filermount_lib::{FilerFS, InodeToPath, LocalFiler, MountConfig};
use tempfile::TempDir;

/// Route library logs to the test output when RUST_LOG is set
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A FilerFS over a LocalFiler rooted in a fresh temp directory
pub struct LocalFsContext {
    pub fs: FilerFS<LocalFiler>,
    pub inodes: Arc<InodeToPath>,
    pub source_dir: TempDir,
}

pub fn setup_local_fs() -> LocalFsContext {
    init_logging();
    let source_dir = tempfile::tempdir().unwrap();
    let filer = LocalFiler::new(source_dir.path()).unwrap();
    let inodes = Arc::new(InodeToPath::new());
    let fs = FilerFS::new(
        Arc::new(filer),
        inodes.clone(),
        "/mnt/filermount-test",
        MountConfig::default(),
    );
    LocalFsContext {
        fs,
        inodes,
        source_dir,
    }
}

pub fn os(name: &str) -> OsString {
    OsString::from(name)
}
