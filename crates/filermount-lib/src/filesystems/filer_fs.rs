//! FilerFS - FUSE dispatcher over a filer backend
//!
//! Translates kernel requests into filer calls, using [`InodeToPath`] to turn
//! the kernel's inode numbers into filer paths and back:
//!
//! - `lookup`, `mkdir`, `create` count a lookup for the resulting path
//! - `forget` gives lookups back
//! - `unlink`, `rmdir` drop the path's inode after the filer delete succeeds
//! - `rename` re-points the source inode, and any inodes below it, after the
//!   filer rename succeeds
//! - everything holding an inode recovers its path through the table first
//!
//! Each request is handled by a `do_*` method returning [`FsResult`]; the
//! `Filesystem` impl only turns results into replies.
//!
//! File content (open/read/write) is not served by this layer.

use std::collections::hash_map::DefaultHasher;
use std::ffi::OsStr;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, Request, TimeOrNow,
};
use log::{debug, error, info, warn};

use super::error::{FsError, FsErrorCode, FsResult};
use super::inode_to_path::{Inode, InodeToPath, NO_INODE, ROOT_INODE};
use crate::config::MountConfig;
use crate::filer::{
    self, CreateEntryRequest, DeleteEntryRequest, Entry, FilerClient, FuseAttributes,
    ListEntriesRequest, MODE_DIR, MODE_TYPE_MASK,
};
use crate::path::FullPath;

/// Readdir does not count as a lookup, so children the kernel has not looked
/// up yet are reported with a path-derived number in this range, which the
/// inode generator never reaches.
const UNSEEN_INODE_BASE: u64 = 1 << 63;

const BLOCK_SIZE: u32 = 4096;

/// Attribute changes requested through `setattr`
#[derive(Debug, Clone, Default)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    /// Unix seconds
    pub mtime: Option<i64>,
}

impl SetAttr {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.size.is_none()
            && self.mtime.is_none()
    }
}

/// One `readdir` row: inode, kind, name
pub type DirRow = (u64, FileType, String);

/// FUSE filesystem serving a filer namespace
pub struct FilerFS<C: FilerClient> {
    client: Arc<C>,
    inodes: Arc<InodeToPath>,
    mount_point: PathBuf,
    config: MountConfig,
}

impl<C: FilerClient> FilerFS<C> {
    /// Create a filesystem for one mount session
    ///
    /// `inodes` should be freshly created for this session; it is shared so
    /// other components can resolve paths against the same table.
    pub fn new<P: AsRef<Path>>(
        client: Arc<C>,
        inodes: Arc<InodeToPath>,
        mount_point: P,
        config: MountConfig,
    ) -> Self {
        let mount_point = mount_point.as_ref().to_path_buf();
        info!(
            "Initialized FilerFS at {:?} (read_only: {})",
            mount_point, config.read_only
        );
        Self {
            client,
            inodes,
            mount_point,
            config,
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn inodes(&self) -> &Arc<InodeToPath> {
        &self.inodes
    }

    pub fn read_only(&self) -> bool {
        self.config.read_only
    }

    /// Mount the filesystem and serve requests until unmounted
    pub fn mount(self) -> io::Result<()> {
        let options = self.config.mount_options();
        let mount_point = self.mount_point.clone();
        fuser::mount2(self, mount_point, &options)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn check_writable(&self) -> FsResult<()> {
        if self.config.read_only {
            Err(FsError::ReadOnlyFs)
        } else {
            Ok(())
        }
    }

    fn child_of(&self, parent: Inode, name: &OsStr) -> FsResult<(FullPath, String, FullPath)> {
        let name = name
            .to_str()
            .ok_or_else(|| FsError::InvalidName(name.to_string_lossy().into_owned()))?;
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(FsError::InvalidName(name.to_string()));
        }
        let parent_path = self.inodes.get_path(parent);
        let child = parent_path.child(name);
        Ok((parent_path, name.to_string(), child))
    }

    fn fetch(&self, path: &FullPath) -> FsResult<Entry> {
        filer::lookup_path(self.client.as_ref(), path)?
            .ok_or_else(|| FsError::PathNotFound(path.clone()))
    }

    fn unseen_inode(path: &FullPath) -> u64 {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        UNSEEN_INODE_BASE | (hasher.finish() & !UNSEEN_INODE_BASE)
    }

    fn file_type(entry: &Entry) -> FileType {
        if entry.is_directory {
            FileType::Directory
        } else if entry.is_symlink() {
            FileType::Symlink
        } else {
            FileType::RegularFile
        }
    }

    fn to_system_time(secs: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }

    /// Convert a filer entry to fuser::FileAttr
    pub fn entry_to_attr(entry: &Entry, ino: u64) -> FileAttr {
        let attrs = &entry.attributes;
        let size = if entry.is_directory { 0 } else { entry.size() };
        let mtime = Self::to_system_time(attrs.mtime);

        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: Self::to_system_time(attrs.crtime),
            kind: Self::file_type(entry),
            perm: (attrs.file_mode & 0o7777) as u16,
            nlink: if entry.is_directory { 2 } else { 1 },
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn time_or_now_secs(time: TimeOrNow) -> i64 {
        let time = match time {
            TimeOrNow::SpecificTime(t) => t,
            TimeOrNow::Now => SystemTime::now(),
        };
        time.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn new_entry(name: &str, is_directory: bool, mode: u32, uid: u32, gid: u32) -> Entry {
        let now = chrono::Utc::now().timestamp();
        let type_bits = if is_directory { MODE_DIR } else { 0 };
        Entry {
            name: name.to_string(),
            is_directory,
            attributes: FuseAttributes {
                file_size: 0,
                mtime: now,
                crtime: now,
                file_mode: type_bits | (mode & 0o7777),
                uid,
                gid,
            },
            chunks: Vec::new(),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Resolve `name` under `parent`, counting one lookup on success
    pub fn do_lookup(&self, parent: Inode, name: &OsStr) -> FsResult<FileAttr> {
        let (parent_path, name, child) = self.child_of(parent, name)?;
        let entry = self
            .client
            .lookup_entry(&parent_path, &name)?
            .ok_or(FsError::PathNotFound(child.clone()))?;

        let ino = self.inodes.lookup(&child);
        Ok(Self::entry_to_attr(&entry, ino))
    }

    pub fn do_forget(&self, ino: Inode, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    pub fn do_getattr(&self, ino: Inode) -> FsResult<FileAttr> {
        let path = self.inodes.get_path(ino);
        let entry = self.fetch(&path)?;
        Ok(Self::entry_to_attr(&entry, ino))
    }

    pub fn do_setattr(&self, ino: Inode, changes: &SetAttr) -> FsResult<FileAttr> {
        self.check_writable()?;
        let path = self.inodes.get_path(ino);
        // the root entry is synthesized and has nowhere to store changes
        if path.is_root() && !changes.is_empty() {
            return Err(FsError::PermissionDenied(path));
        }
        let mut entry = self.fetch(&path)?;

        let attrs = &mut entry.attributes;
        if let Some(mode) = changes.mode {
            attrs.file_mode = (attrs.file_mode & MODE_TYPE_MASK) | (mode & 0o7777);
        }
        if let Some(uid) = changes.uid {
            attrs.uid = uid;
        }
        if let Some(gid) = changes.gid {
            attrs.gid = gid;
        }
        if let Some(size) = changes.size {
            if entry.is_directory {
                return Err(FsError::IsADirectory(path));
            }
            attrs.file_size = size;
        }
        if let Some(mtime) = changes.mtime {
            attrs.mtime = mtime;
        }

        if !path.is_root() {
            let (dir, _) = path.dir_and_name();
            self.client.update_entry(&dir, &entry)?;
        }
        self.do_getattr(ino)
    }

    fn create_child(
        &self,
        parent: Inode,
        name: &OsStr,
        is_directory: bool,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<FileAttr> {
        self.check_writable()?;
        let (parent_path, name, child) = self.child_of(parent, name)?;

        let request = CreateEntryRequest {
            directory: parent_path.clone(),
            entry: Self::new_entry(&name, is_directory, mode, uid, gid),
        };
        self.client.create_entry(&request)?;

        // read back what the filer stored
        let entry = self
            .client
            .lookup_entry(&parent_path, &name)?
            .unwrap_or(request.entry);

        // the filer had nothing at this path, so any inode still bound to it
        // belongs to an entry that went away behind the kernel's back
        let stale = self.inodes.get_inode(&child);
        if stale != NO_INODE {
            warn!("create {}: dropping stale inode {}", child, stale);
            self.inodes.remove_path(&child);
        }

        // the reply hands the kernel a reference, same as a lookup
        let ino = self.inodes.lookup(&child);
        Ok(Self::entry_to_attr(&entry, ino))
    }

    pub fn do_mkdir(
        &self,
        parent: Inode,
        name: &OsStr,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<FileAttr> {
        self.create_child(parent, name, true, mode, uid, gid)
    }

    pub fn do_create(
        &self,
        parent: Inode,
        name: &OsStr,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<FileAttr> {
        self.create_child(parent, name, false, mode, uid, gid)
    }

    fn delete_child(&self, parent_path: &FullPath, name: &str, child: &FullPath) -> FsResult<()> {
        let request = DeleteEntryRequest {
            directory: parent_path.clone(),
            name: name.to_string(),
            is_delete_data: true,
            is_recursive: false,
        };
        let response = self.client.delete_entry(&request)?;
        if !response.error.is_empty() {
            return Err(FsError::DeleteRefused {
                path: child.clone(),
                message: response.error,
            });
        }
        self.inodes.remove_path(child);
        Ok(())
    }

    pub fn do_unlink(&self, parent: Inode, name: &OsStr) -> FsResult<()> {
        self.check_writable()?;
        let (parent_path, name, child) = self.child_of(parent, name)?;
        let entry = self.fetch(&child)?;
        if entry.is_directory {
            return Err(FsError::IsADirectory(child));
        }
        self.delete_child(&parent_path, &name, &child)
    }

    pub fn do_rmdir(&self, parent: Inode, name: &OsStr) -> FsResult<()> {
        self.check_writable()?;
        let (parent_path, name, child) = self.child_of(parent, name)?;
        let entry = self.fetch(&child)?;
        if !entry.is_directory {
            return Err(FsError::NotADirectory(child));
        }

        let probe = ListEntriesRequest {
            limit: 1,
            ..ListEntriesRequest::new(child.clone())
        };
        if self.client.list_entries(&probe)?.next().is_some() {
            return Err(FsError::DirectoryNotEmpty(child));
        }
        self.delete_child(&parent_path, &name, &child)
    }

    pub fn do_rename(
        &self,
        parent: Inode,
        name: &OsStr,
        newparent: Inode,
        newname: &OsStr,
    ) -> FsResult<()> {
        self.check_writable()?;
        let (old_dir, old_name, source) = self.child_of(parent, name)?;
        let (new_dir, new_name, target) = self.child_of(newparent, newname)?;

        self.client
            .rename_entry(&old_dir, &old_name, &new_dir, &new_name)?;
        self.inodes.move_path(&source, &target);
        // the kernel moves the child dentries along with a directory
        self.inodes.move_descendants(&source, &target);
        Ok(())
    }

    /// List a directory, including `.` and `..`
    pub fn do_readdir(&self, ino: Inode) -> FsResult<Vec<DirRow>> {
        let path = self.inodes.get_path(ino);
        let entry = self.fetch(&path)?;
        if !entry.is_directory {
            return Err(FsError::NotADirectory(path));
        }

        let parent_ino = match path.parent() {
            None => ROOT_INODE,
            Some(parent) => match self.inodes.get_inode(&parent) {
                NO_INODE => Self::unseen_inode(&parent),
                known => known,
            },
        };
        let mut rows: Vec<DirRow> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];

        for child in self.client.list_entries(&ListEntriesRequest::new(path.clone()))? {
            let child = child?;
            let child_path = path.child(&child.name);
            let child_ino = match self.inodes.get_inode(&child_path) {
                NO_INODE => Self::unseen_inode(&child_path),
                known => known,
            };
            rows.push((child_ino, Self::file_type(&child), child.name));
        }
        Ok(rows)
    }

    pub fn do_opendir(&self, ino: Inode) -> FsResult<()> {
        if self.inodes.has_inode(ino) {
            Ok(())
        } else {
            Err(FsError::InodeNotFound(ino))
        }
    }
}

impl<C: FilerClient> Filesystem for FilerFS<C> {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        info!("FilerFS initialized at {:?}", self.mount_point);
        Ok(())
    }

    fn destroy(&mut self) {
        info!(
            "FilerFS destroyed with {} live inodes",
            self.inodes.len()
        );
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);
        let ttl = self.config.attr_ttl();
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&ttl, &attr, 0),
            Err(e) => {
                debug!("lookup: {:?} under {}: {}", name, parent, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!("forget(ino={}, nlookup={})", ino, nlookup);
        self.do_forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr(ino={})", ino);
        let ttl = self.config.attr_ttl();
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&ttl, &attr),
            Err(e) => {
                error!("getattr: inode {}: {}", ino, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(
            "setattr(ino={}, mode={:?}, uid={:?}, gid={:?}, size={:?}, fh={:?})",
            ino, mode, uid, gid, size, fh
        );
        let changes = SetAttr {
            mode,
            uid,
            gid,
            size,
            mtime: mtime.map(Self::time_or_now_secs),
        };
        let ttl = self.config.attr_ttl();
        match self.do_setattr(ino, &changes) {
            Ok(attr) => reply.attr(&ttl, &attr),
            Err(e) => {
                error!("setattr: inode {}: {}", ino, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        debug!(
            "mkdir(parent={}, name={:?}, mode=0o{:o})",
            parent, name, mode
        );
        let ttl = self.config.attr_ttl();
        match self.do_mkdir(parent, name, mode & !umask, req.uid(), req.gid()) {
            Ok(attr) => reply.entry(&ttl, &attr, 0),
            Err(e) => {
                error!("mkdir: {:?} under {}: {}", name, parent, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        debug!(
            "create(parent={}, name={:?}, mode=0o{:o}, flags=0x{:x})",
            parent, name, mode, flags
        );
        let ttl = self.config.attr_ttl();
        match self.do_create(parent, name, mode & !umask, req.uid(), req.gid()) {
            Ok(attr) => reply.created(&ttl, &attr, 0, 0, 0),
            Err(e) => {
                error!("create: {:?} under {}: {}", name, parent, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink(parent={}, name={:?})", parent, name);
        match self.do_unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("unlink: {:?} under {}: {}", name, parent, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir(parent={}, name={:?})", parent, name);
        match self.do_rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("rmdir: {:?} under {}: {}", name, parent, e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename(parent={}, name={:?}, newparent={}, newname={:?})",
            parent, name, newparent, newname
        );
        match self.do_rename(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("rename: failed: {}", e);
                reply.error(e.to_error_code());
            }
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir(ino={})", ino);
        match self.do_opendir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_error_code()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino={}, offset={})", ino, offset);
        let rows = match self.do_readdir(ino) {
            Ok(rows) => rows,
            Err(e) => {
                error!("readdir: inode {}: {}", ino, e);
                reply.error(e.to_error_code());
                return;
            }
        };

        for (i, (entry_ino, kind, name)) in rows.iter().enumerate().skip(offset as usize) {
            // reply.add returns true if the buffer is full
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        debug!("releasedir()");
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        debug!("statfs()");
        let blocks = 1 << 40;
        let files = 1 << 30;
        reply.statfs(
            blocks,
            blocks,
            blocks,
            files,
            files - self.inodes.len() as u64,
            BLOCK_SIZE,
            255,
            BLOCK_SIZE,
        );
    }
}
