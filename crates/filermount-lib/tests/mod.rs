//! Test suite for filermount
//!
//! - `integration`: the inode table under concurrency and random operation
//!   sequences, plus the dispatcher and gateway against a real local filer
//!
//! Shared setup lives in `common`.

pub mod common;
pub mod integration;
