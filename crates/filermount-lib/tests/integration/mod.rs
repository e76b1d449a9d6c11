//! Integration tests for filermount

pub mod filer_fs_local_test;
pub mod gateway_local_test;
pub mod inode_table_concurrency_test;
