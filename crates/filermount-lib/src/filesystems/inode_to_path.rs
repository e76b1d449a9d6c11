//! Inode to path translation table
//!
//! The kernel talks to the mount in inode numbers and counts how many times it
//! has looked each one up. The filer only understands paths. `InodeToPath`
//! hands out one stable inode per live path, tracks the kernel's lookup count
//! for it, and drops the mapping once the kernel forgets every lookup.
//!
//! Inodes are never reused within a process: a path that is collected and then
//! looked up again gets a fresh number, so stale kernel caches can never alias
//! a different file.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, error, warn};
use thiserror::Error;

use crate::path::FullPath;

/// Kernel-facing inode number
pub type Inode = u64;

/// The root inode number, hardcoded as 1
pub const ROOT_INODE: Inode = 1;

/// Returned by [`InodeToPath::get_inode`] for paths without an inode
pub const NO_INODE: Inode = 0;

/// First inode handed out by the generator (after root)
const FIRST_INODE: Inode = 2;

/// Contract violations raised by the table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeError {
    /// The caller presented an inode that was never issued or is already gone
    #[error("not found inode {0}")]
    UnknownInode(Inode),
}

#[derive(Debug)]
struct InodeEntry {
    path: FullPath,
    nlookup: u64,
}

#[derive(Debug)]
struct Inner {
    next_inode: Inode,
    /// Owns the entries
    inode2path: HashMap<Inode, InodeEntry>,
    /// Index into `inode2path`
    path2inode: HashMap<FullPath, Inode>,
}

/// Concurrent bidirectional map between inodes and filer paths.
///
/// Root (`/` and inode 1) is axiomatic and never stored. Every other entry is
/// created by [`lookup`](Self::lookup) and lives until its lookup count drops
/// to zero through [`forget`](Self::forget) or it is dropped explicitly by
/// [`remove_path`](Self::remove_path) or displaced by
/// [`move_path`](Self::move_path).
///
/// Construct one per mount session and share it as `Arc<InodeToPath>`.
#[derive(Debug)]
pub struct InodeToPath {
    inner: RwLock<Inner>,
}

impl InodeToPath {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_inode: FIRST_INODE,
                inode2path: HashMap::new(),
                path2inode: HashMap::new(),
            }),
        }
    }

    // A panic never happens while the lock is held, so a poisoned lock still
    // guards consistent maps.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a path to its inode, counting one kernel lookup.
    ///
    /// Allocates a new inode with a lookup count of 1 the first time a path is
    /// seen; afterwards returns the same inode and bumps the count.
    pub fn lookup(&self, path: &FullPath) -> Inode {
        if path.is_root() {
            return ROOT_INODE;
        }
        let mut guard = self.write();
        let inner = &mut *guard;

        if let Some(&inode) = inner.path2inode.get(path) {
            if let Some(entry) = inner.inode2path.get_mut(&inode) {
                entry.nlookup += 1;
            }
            return inode;
        }

        let inode = inner.next_inode;
        inner.next_inode += 1;
        inner.path2inode.insert(path.clone(), inode);
        inner.inode2path.insert(
            inode,
            InodeEntry {
                path: path.clone(),
                nlookup: 1,
            },
        );
        debug!("add {} {}", path, inode);
        inode
    }

    /// Inode currently bound to `path`, or [`NO_INODE`].
    ///
    /// Never allocates. An absent path is a normal outcome, e.g. the parent of
    /// a subtree the kernel has not visited yet.
    pub fn get_inode(&self, path: &FullPath) -> Inode {
        if path.is_root() {
            return ROOT_INODE;
        }
        self.read().path2inode.get(path).copied().unwrap_or(NO_INODE)
    }

    /// Current path of a live inode.
    ///
    /// Returns [`InodeError::UnknownInode`] if the table never issued `inode` or
    /// has already collected it.
    pub fn try_get_path(&self, inode: Inode) -> Result<FullPath, InodeError> {
        if inode == ROOT_INODE {
            return Ok(FullPath::root());
        }
        self.read()
            .inode2path
            .get(&inode)
            .map(|entry| entry.path.clone())
            .ok_or(InodeError::UnknownInode(inode))
    }

    /// Current path of a live inode.
    ///
    /// # Panics
    ///
    /// Panics with [`InodeError::UnknownInode`] if `inode` is not live. Callers
    /// may only present inodes they obtained from [`lookup`](Self::lookup) and
    /// have not forgotten.
    pub fn get_path(&self, inode: Inode) -> FullPath {
        match self.try_get_path(inode) {
            Ok(path) => path,
            Err(e) => {
                error!("{}", e);
                panic!("{}", e);
            }
        }
    }

    pub fn has_path(&self, path: &FullPath) -> bool {
        if path.is_root() {
            return true;
        }
        self.read().path2inode.contains_key(path)
    }

    pub fn has_inode(&self, inode: Inode) -> bool {
        if inode == ROOT_INODE {
            return true;
        }
        self.read().inode2path.contains_key(&inode)
    }

    /// Drop the mapping for `path` regardless of its lookup count.
    pub fn remove_path(&self, path: &FullPath) {
        if path.is_root() {
            return;
        }
        let mut guard = self.write();
        let inner = &mut *guard;
        if let Some(inode) = inner.path2inode.remove(path) {
            inner.inode2path.remove(&inode);
            debug!("remove {} {}", path, inode);
        }
    }

    /// Re-point the inode of `source` at `target`.
    ///
    /// An inode already bound to `target` is discarded along with its lookup
    /// count. If `target` was unbound, the moved inode gains one lookup so a
    /// forget still in flight for the old name cannot collect the new one.
    /// Does nothing when `source` has no inode.
    pub fn move_path(&self, source: &FullPath, target: &FullPath) {
        if source.is_root() || target.is_root() || source == target {
            return;
        }
        let mut guard = self.write();
        let inner = &mut *guard;

        // entries under a directory the kernel never visited have no inode
        let Some(source_inode) = inner.path2inode.remove(source) else {
            return;
        };
        let target_inode = inner.path2inode.insert(target.clone(), source_inode);

        if let Some(entry) = inner.inode2path.get_mut(&source_inode) {
            entry.path = target.clone();
            if target_inode.is_none() {
                entry.nlookup += 1;
            }
        }
        if let Some(target_inode) = target_inode {
            inner.inode2path.remove(&target_inode);
            debug!("move {} -> {} drops {}", source, target, target_inode);
        }
        debug!("move {} -> {} inode {}", source, target, source_inode);
    }

    /// Re-point every inode below `source` to the same place below `target`.
    ///
    /// Follows a directory rename, where the kernel carries the child dentries
    /// along with the directory. Lookup counts are kept, and an inode already
    /// bound to a rewritten path is discarded. Returns how many entries moved.
    pub fn move_descendants(&self, source: &FullPath, target: &FullPath) -> usize {
        if source.is_root() || target.is_root() || source == target {
            return 0;
        }
        // a directory cannot be moved into itself
        if target.strip_ancestor(source).is_some() {
            return 0;
        }
        let mut guard = self.write();
        let inner = &mut *guard;

        let moved: Vec<(FullPath, FullPath, Inode)> = inner
            .path2inode
            .iter()
            .filter_map(|(path, &inode)| {
                path.strip_ancestor(source)
                    .map(|rest| (path.clone(), target.child(rest), inode))
            })
            .collect();

        for (old_path, _, _) in &moved {
            inner.path2inode.remove(old_path);
        }
        for (old_path, new_path, inode) in &moved {
            if let Some(displaced) = inner.path2inode.insert(new_path.clone(), *inode) {
                inner.inode2path.remove(&displaced);
                debug!("move {} -> {} drops {}", old_path, new_path, displaced);
            }
            if let Some(entry) = inner.inode2path.get_mut(inode) {
                entry.path = new_path.clone();
            }
        }
        if !moved.is_empty() {
            debug!("move {} -> {}: {} descendants", source, target, moved.len());
        }
        moved.len()
    }

    /// Give back `nlookup` kernel lookups of `inode`.
    ///
    /// The entry is collected once the count reaches zero. Releasing more
    /// than was granted also collects it and is logged.
    pub fn forget(&self, inode: Inode, nlookup: u64) {
        if inode == ROOT_INODE {
            return;
        }
        let mut guard = self.write();
        let inner = &mut *guard;

        // may already be gone through remove_path or move_path
        let Some(entry) = inner.inode2path.get_mut(&inode) else {
            return;
        };
        if nlookup < entry.nlookup {
            entry.nlookup -= nlookup;
            return;
        }
        if nlookup > entry.nlookup {
            warn!(
                "forget {} on {}: releasing {} of {} lookups",
                inode, entry.path, nlookup, entry.nlookup
            );
        }
        if let Some(entry) = inner.inode2path.remove(&inode) {
            inner.path2inode.remove(&entry.path);
            debug!("forget {} {}", entry.path, inode);
        }
    }

    /// Outstanding lookups of a live non-root inode
    pub fn lookup_count(&self, inode: Inode) -> Option<u64> {
        self.read().inode2path.get(&inode).map(|entry| entry.nlookup)
    }

    /// Number of live non-root inodes
    pub fn len(&self) -> usize {
        self.read().inode2path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InodeToPath {
    fn default() -> Self {
        Self::new()
    }
}
