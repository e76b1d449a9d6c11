//! Gateway helpers against a LocalFiler, sharing the tree with a mount

use std::fs;
use std::sync::Arc;

use filermount_lib::filer::{Entry, MODE_DIR};
use filermount_lib::gateway::{object_key, GatewayError};
use filermount_lib::{FullPath, LocalFiler, S3Gateway, ROOT_INODE};
use tempfile::TempDir;

use crate::common::{init_logging, os, setup_local_fs};

fn gateway() -> (S3Gateway<LocalFiler>, TempDir) {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let filer = LocalFiler::new(dir.path()).unwrap();
    (S3Gateway::new(Arc::new(filer)), dir)
}

#[test]
fn test_bucket_lifecycle_on_disk() {
    let (gw, dir) = gateway();
    let buckets = FullPath::root();
    gw.mkdir(&buckets, "photos", None::<fn(&mut Entry)>).unwrap();
    assert!(dir.path().join("photos").is_dir());
    assert!(gw.exists(&buckets, "photos", true).unwrap());
    assert!(!gw.exists(&buckets, "photos", false).unwrap());

    let bucket = FullPath::new(object_key("/photos"));
    gw.mk_file(&bucket, "cat.jpg", Vec::new()).unwrap();
    gw.mk_file(&bucket, "dog.jpg", Vec::new()).unwrap();
    gw.mk_file(&bucket, "readme", Vec::new()).unwrap();

    let jpgs: Vec<String> = gw
        .list(&bucket, "", "", false, 0)
        .unwrap()
        .into_iter()
        .filter(|e| e.name.ends_with(".jpg"))
        .map(|e| e.name)
        .collect();
    assert_eq!(jpgs, vec!["cat.jpg", "dog.jpg"]);

    let page: Vec<String> = gw
        .list(&bucket, "", "cat.jpg", true, 1)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(page, vec!["cat.jpg"]);

    let err = gw.rm(&buckets, "photos", true, false).unwrap_err();
    assert!(matches!(err, GatewayError::DeleteRefused { .. }));
    assert!(dir.path().join("photos/cat.jpg").exists());

    gw.rm(&buckets, "photos", true, true).unwrap();
    assert!(!dir.path().join("photos").exists());
}

#[test]
fn test_mkdir_customize_applies_mode() {
    let (gw, dir) = gateway();
    gw.mkdir(
        &FullPath::root(),
        "private",
        Some(|entry: &mut Entry| entry.attributes.file_mode = MODE_DIR | 0o700),
    )
    .unwrap();

    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(dir.path().join("private"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o7777, 0o700);
}

#[test]
fn test_duplicate_bucket_is_reported() {
    let (gw, _dir) = gateway();
    gw.mkdir(&FullPath::root(), "b", None::<fn(&mut Entry)>).unwrap();
    let err = gw
        .mkdir(&FullPath::root(), "b", None::<fn(&mut Entry)>)
        .unwrap_err();
    assert!(matches!(err, GatewayError::Mkdir { .. }));
    assert!(err.to_string().starts_with("mkdir //b: "));
}

#[test]
fn test_gateway_writes_show_up_in_mount_without_touching_inodes() {
    let ctx = setup_local_fs();
    let filer = LocalFiler::new(ctx.source_dir.path()).unwrap();
    let gw = S3Gateway::new(Arc::new(filer));

    gw.mkdir(&FullPath::root(), "bucket", None::<fn(&mut Entry)>)
        .unwrap();
    assert!(ctx.inodes.is_empty());

    let bucket = ctx.fs.do_lookup(ROOT_INODE, &os("bucket")).unwrap();
    gw.mk_file(&FullPath::new("/bucket"), "obj", Vec::new())
        .unwrap();
    let names: Vec<String> = ctx
        .fs
        .do_readdir(bucket.ino)
        .unwrap()
        .into_iter()
        .map(|(_, _, name)| name)
        .collect();
    assert_eq!(names, vec![".", "..", "obj"]);

    // removal through the gateway leaves the mount's inode to the kernel
    gw.rm(&FullPath::root(), "bucket", true, true).unwrap();
    assert!(ctx.inodes.has_inode(bucket.ino));
    ctx.fs.do_forget(bucket.ino, 1);
    assert!(ctx.inodes.is_empty());
}

#[test]
fn test_dot_dot_keys_stay_inside_source() {
    init_logging();
    let outer = tempfile::tempdir().unwrap();
    let source = outer.path().join("src");
    fs::create_dir(&source).unwrap();
    let gw = S3Gateway::new(Arc::new(LocalFiler::new(&source).unwrap()));

    let (dir, name) = FullPath::new(object_key("a/../../x")).dir_and_name();
    gw.mk_file(&dir, &name, Vec::new()).unwrap();
    assert!(source.join("x").is_file());
    assert!(!outer.path().join("x").exists());

    gw.mkdir(&FullPath::new("/"), "../../up", None::<fn(&mut Entry)>)
        .unwrap();
    assert!(source.join("up").is_dir());
    assert!(!outer.path().join("up").exists());
}
