//! The inode table shared across threads, as the FUSE session shares it

use std::sync::{Arc, Barrier};
use std::thread;

use filermount_lib::{FullPath, InodeToPath, NO_INODE, ROOT_INODE};
use more_asserts::assert_ge;

const THREADS: usize = 8;
const ROUNDS: usize = 200;

#[test]
fn test_concurrent_lookups_of_one_path_share_an_inode() {
    let table = Arc::new(InodeToPath::new());
    let barrier = Arc::new(Barrier::new(THREADS));
    let path = FullPath::new("/shared/file");

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = table.clone();
            let barrier = barrier.clone();
            let path = path.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..ROUNDS).map(|_| table.lookup(&path)).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = Vec::new();
    for handle in handles {
        seen.extend(handle.join().unwrap());
    }

    let inode = seen[0];
    assert!(seen.iter().all(|&i| i == inode));
    assert_ge!(inode, 2);
    assert_eq!(table.len(), 1);
    assert_eq!(table.lookup_count(inode), Some((THREADS * ROUNDS) as u64));

    table.forget(inode, (THREADS * ROUNDS) as u64);
    assert!(table.is_empty());
    assert_eq!(table.get_inode(&path), NO_INODE);
}

#[test]
fn test_concurrent_lookup_and_forget_balance_out() {
    let table = Arc::new(InodeToPath::new());
    let path = FullPath::new("/balanced");
    // one standing reference keeps the entry alive throughout
    let inode = table.lookup(&path);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let table = table.clone();
            let path = path.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let got = table.lookup(&path);
                    assert_eq!(table.get_path(got), path);
                    table.forget(got, 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.get_inode(&path), inode);
    assert_eq!(table.lookup_count(inode), Some(1));
}

#[test]
fn test_distinct_paths_get_distinct_inodes_across_threads() {
    let table = Arc::new(InodeToPath::new());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let table = table.clone();
            thread::spawn(move || {
                (0..ROUNDS)
                    .map(|i| {
                        let path = FullPath::new(format!("/t{}/f{}", t, i));
                        (path.clone(), table.lookup(&path))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    let mut inodes: Vec<u64> = all.iter().map(|(_, ino)| *ino).collect();
    inodes.sort_unstable();
    inodes.dedup();
    assert_eq!(inodes.len(), THREADS * ROUNDS);
    assert!(!inodes.contains(&ROOT_INODE));
    assert!(!inodes.contains(&NO_INODE));

    for (path, inode) in &all {
        assert_eq!(table.get_path(*inode), *path);
        assert_eq!(table.get_inode(path), *inode);
    }
}

#[test]
fn test_renames_racing_with_lookups_keep_maps_consistent() {
    let table = Arc::new(InodeToPath::new());
    let names: Vec<FullPath> = (0..16).map(|i| FullPath::new(format!("/n{}", i))).collect();
    for name in &names {
        table.lookup(name);
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let table = table.clone();
            let names = names.clone();
            thread::spawn(move || {
                for i in 0..ROUNDS {
                    let a = &names[(t + i) % names.len()];
                    let b = &names[(t * 7 + i * 3) % names.len()];
                    match i % 3 {
                        0 => table.move_path(a, b),
                        1 => {
                            table.lookup(a);
                        }
                        _ => table.remove_path(b),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // every surviving path maps to an inode that maps back to it
    for name in &names {
        let inode = table.get_inode(name);
        if inode != NO_INODE {
            assert_eq!(table.get_path(inode), *name);
            assert_ge!(table.lookup_count(inode).unwrap(), 1);
        }
    }
    let bound = names.iter().filter(|n| table.has_path(n)).count();
    assert_eq!(bound, table.len());
}

#[test]
fn test_table_survives_a_panicking_reader() {
    let table = Arc::new(InodeToPath::new());
    let ino = table.lookup(&FullPath::new("/ok"));

    let reader = table.clone();
    let result = thread::spawn(move || reader.get_path(9999)).join();
    assert!(result.is_err());

    assert_eq!(table.get_path(ino), FullPath::new("/ok"));
    assert_eq!(table.lookup(&FullPath::new("/ok")), ino);
}
