//! FilerFS driving a LocalFiler rooted in a temp directory

use std::fs;

use filermount_lib::filesystems::{FsErrorCode, SetAttr};
use filermount_lib::{FullPath, NO_INODE, ROOT_INODE};
use fuser::FileType;

use crate::common::{os, setup_local_fs};

#[test]
fn test_mkdir_and_create_reach_disk() {
    let ctx = setup_local_fs();
    let dir = ctx.fs.do_mkdir(ROOT_INODE, &os("docs"), 0o755, 0, 0).unwrap();
    let file = ctx.fs.do_create(dir.ino, &os("a.txt"), 0o640, 0, 0).unwrap();

    let real_dir = ctx.source_dir.path().join("docs");
    assert!(real_dir.is_dir());
    assert!(real_dir.join("a.txt").is_file());

    assert_eq!(dir.kind, FileType::Directory);
    assert_eq!(file.kind, FileType::RegularFile);
    assert_eq!(file.perm, 0o640);
    assert_eq!(ctx.inodes.get_path(file.ino), FullPath::new("/docs/a.txt"));
}

#[test]
fn test_lookup_of_preexisting_file() {
    let ctx = setup_local_fs();
    fs::create_dir(ctx.source_dir.path().join("sub")).unwrap();
    fs::write(ctx.source_dir.path().join("sub/data"), b"hello").unwrap();

    let sub = ctx.fs.do_lookup(ROOT_INODE, &os("sub")).unwrap();
    let data = ctx.fs.do_lookup(sub.ino, &os("data")).unwrap();
    assert_eq!(data.size, 5);
    assert_eq!(ctx.fs.do_getattr(data.ino).unwrap().size, 5);

    let err = ctx.fs.do_lookup(sub.ino, &os("nope")).unwrap_err();
    assert_eq!(err.to_error_code(), libc::ENOENT);
}

#[test]
fn test_setattr_truncates_real_file() {
    let ctx = setup_local_fs();
    fs::write(ctx.source_dir.path().join("big"), vec![7u8; 100]).unwrap();
    let big = ctx.fs.do_lookup(ROOT_INODE, &os("big")).unwrap();

    let changes = SetAttr {
        size: Some(10),
        mode: Some(0o600),
        ..Default::default()
    };
    let attr = ctx.fs.do_setattr(big.ino, &changes).unwrap();
    assert_eq!(attr.size, 10);
    assert_eq!(attr.perm, 0o600);
    assert_eq!(fs::metadata(ctx.source_dir.path().join("big")).unwrap().len(), 10);
}

#[test]
fn test_rename_moves_file_and_keeps_inode() {
    let ctx = setup_local_fs();
    let file = ctx.fs.do_create(ROOT_INODE, &os("old"), 0o644, 0, 0).unwrap();
    let dir = ctx.fs.do_mkdir(ROOT_INODE, &os("dst"), 0o755, 0, 0).unwrap();

    ctx.fs
        .do_rename(ROOT_INODE, &os("old"), dir.ino, &os("new"))
        .unwrap();

    assert!(!ctx.source_dir.path().join("old").exists());
    assert!(ctx.source_dir.path().join("dst/new").is_file());
    assert_eq!(ctx.inodes.get_path(file.ino), FullPath::new("/dst/new"));
    assert_eq!(ctx.inodes.get_inode(&FullPath::new("/old")), NO_INODE);
    assert_eq!(ctx.fs.do_getattr(file.ino).unwrap().ino, file.ino);
}

#[test]
fn test_rmdir_and_unlink() {
    let ctx = setup_local_fs();
    let dir = ctx.fs.do_mkdir(ROOT_INODE, &os("d"), 0o755, 0, 0).unwrap();
    let file = ctx.fs.do_create(dir.ino, &os("f"), 0o644, 0, 0).unwrap();

    let err = ctx.fs.do_rmdir(ROOT_INODE, &os("d")).unwrap_err();
    assert_eq!(err.to_error_code(), libc::ENOTEMPTY);
    assert!(ctx.source_dir.path().join("d/f").exists());

    ctx.fs.do_unlink(dir.ino, &os("f")).unwrap();
    assert!(!ctx.inodes.has_inode(file.ino));
    ctx.fs.do_rmdir(ROOT_INODE, &os("d")).unwrap();
    assert!(!ctx.source_dir.path().join("d").exists());
    assert!(ctx.inodes.is_empty());
}

#[test]
fn test_readdir_reports_disk_contents_without_counting() {
    let ctx = setup_local_fs();
    fs::write(ctx.source_dir.path().join("b"), b"").unwrap();
    fs::create_dir(ctx.source_dir.path().join("a")).unwrap();
    let b = ctx.fs.do_lookup(ROOT_INODE, &os("b")).unwrap();

    let rows = ctx.fs.do_readdir(ROOT_INODE).unwrap();
    let names: Vec<&str> = rows.iter().map(|(_, _, name)| name.as_str()).collect();
    assert_eq!(names, vec![".", "..", "a", "b"]);
    assert_eq!(rows[0].0, ROOT_INODE);
    assert_eq!(rows[1].0, ROOT_INODE);
    assert_eq!(rows[2].1, FileType::Directory);
    assert_eq!(rows[3].0, b.ino);

    assert!(!ctx.inodes.has_path(&FullPath::new("/a")));
    assert_eq!(ctx.inodes.lookup_count(b.ino), Some(1));
}

#[test]
fn test_forget_collects_after_kernel_releases() {
    let ctx = setup_local_fs();
    fs::write(ctx.source_dir.path().join("f"), b"").unwrap();
    let first = ctx.fs.do_lookup(ROOT_INODE, &os("f")).unwrap();
    let second = ctx.fs.do_lookup(ROOT_INODE, &os("f")).unwrap();
    assert_eq!(first.ino, second.ino);

    ctx.fs.do_forget(first.ino, 1);
    assert!(ctx.inodes.has_inode(first.ino));
    ctx.fs.do_forget(first.ino, 1);
    assert!(!ctx.inodes.has_inode(first.ino));

    // a later lookup of the same file gets a fresh inode
    let third = ctx.fs.do_lookup(ROOT_INODE, &os("f")).unwrap();
    assert_ne!(third.ino, first.ino);
}

#[test]
fn test_directory_rename_carries_child_inodes() {
    let ctx = setup_local_fs();
    let d = ctx.fs.do_mkdir(ROOT_INODE, &os("d"), 0o755, 0, 0).unwrap();
    let f = ctx.fs.do_create(d.ino, &os("f"), 0o644, 0, 0).unwrap();

    ctx.fs
        .do_rename(ROOT_INODE, &os("d"), ROOT_INODE, &os("e"))
        .unwrap();
    assert_eq!(ctx.inodes.get_path(f.ino), FullPath::new("/e/f"));
    assert_eq!(ctx.inodes.get_inode(&FullPath::new("/d/f")), NO_INODE);

    // recreate the old names; the kernel still holds the moved inodes
    let new_d = ctx.fs.do_mkdir(ROOT_INODE, &os("d"), 0o755, 0, 0).unwrap();
    let new_f = ctx.fs.do_create(new_d.ino, &os("f"), 0o600, 0, 0).unwrap();
    assert_ne!(new_f.ino, f.ino);

    fs::write(ctx.source_dir.path().join("e/f"), b"moved").unwrap();
    assert_eq!(ctx.fs.do_getattr(f.ino).unwrap().size, 5);
    assert_eq!(ctx.fs.do_getattr(new_f.ino).unwrap().size, 0);
    assert_eq!(ctx.fs.do_getattr(new_f.ino).unwrap().perm, 0o600);
}
