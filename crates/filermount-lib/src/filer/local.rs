//! Local directory filer backend
//!
//! Serves a directory on disk as a filer namespace: `/a/b` maps to
//! `<root>/a/b`. Only metadata is handled here; chunk references in create
//! requests are accepted and dropped.

use std::fs::{self, Metadata, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::{debug, info};
use nix::fcntl::AT_FDCWD;
use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::time::TimeSpec;
use nix::unistd::{chown, Gid, Uid};

use super::{
    CreateEntryRequest, DeleteEntryRequest, DeleteEntryResponse, Entry, EntryStream, FilerClient,
    FilerError, FilerResult, FuseAttributes, ListEntriesRequest,
};
use crate::path::FullPath;

/// Filer backed by a local directory
pub struct LocalFiler {
    root: PathBuf,
}

impl LocalFiler {
    /// Serve `root` as the filer namespace
    ///
    /// # Errors
    /// Returns an error if `root` doesn't exist or isn't a directory
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Source directory not found: {:?}", root),
            ));
        }
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Source path is not a directory: {:?}", root),
            ));
        }

        info!("Serving local filer from {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a filer path to the real path under root
    fn to_real(&self, path: &FullPath) -> PathBuf {
        self.root.join(path.relative())
    }

    fn entry_from_metadata(name: String, meta: &Metadata) -> Entry {
        Entry {
            name,
            is_directory: meta.is_dir(),
            attributes: FuseAttributes {
                file_size: if meta.is_dir() { 0 } else { meta.size() },
                mtime: meta.mtime(),
                crtime: meta.ctime(),
                file_mode: meta.mode(),
                uid: meta.uid(),
                gid: meta.gid(),
            },
            chunks: Vec::new(),
        }
    }

    fn apply_attributes(
        real_path: &Path,
        meta: &Metadata,
        attrs: &FuseAttributes,
    ) -> FilerResult<()> {
        let is_symlink = meta.file_type().is_symlink();

        let perm = attrs.file_mode & 0o7777;
        if !is_symlink && perm != meta.mode() & 0o7777 {
            fs::set_permissions(real_path, Permissions::from_mode(perm))?;
        }

        if attrs.uid != meta.uid() || attrs.gid != meta.gid() {
            chown(
                real_path,
                Some(Uid::from_raw(attrs.uid)),
                Some(Gid::from_raw(attrs.gid)),
            )?;
        }

        if meta.is_file() && attrs.file_size != meta.size() {
            let file = OpenOptions::new().write(true).open(real_path)?;
            file.set_len(attrs.file_size)?;
        }

        if attrs.mtime != 0 && attrs.mtime != meta.mtime() {
            let atime = TimeSpec::new(meta.atime(), 0);
            let mtime = TimeSpec::new(attrs.mtime, 0);
            utimensat(
                AT_FDCWD,
                real_path,
                &atime,
                &mtime,
                UtimensatFlags::NoFollowSymlink,
            )?;
        }
        Ok(())
    }
}

impl FilerClient for LocalFiler {
    fn create_entry(&self, request: &CreateEntryRequest) -> FilerResult<()> {
        let path = request.directory.child(&request.entry.name);
        let real_path = self.to_real(&path);
        let perm = request.entry.attributes.file_mode & 0o7777;
        debug!("local: create {} at {:?}", path, real_path);

        let created = if request.entry.is_directory {
            fs::create_dir(&real_path)
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&real_path)
                .map(|_| ())
        };
        created.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FilerError::NotFound(request.directory.clone()),
            _ => FilerError::from_io(e, &path),
        })?;

        if !request.entry.chunks.is_empty() {
            debug!(
                "local: ignoring {} chunks for {}",
                request.entry.chunks.len(),
                path
            );
        }
        fs::set_permissions(&real_path, Permissions::from_mode(perm))?;
        Ok(())
    }

    fn list_entries(&self, request: &ListEntriesRequest) -> FilerResult<EntryStream> {
        let real_path = self.to_real(&request.directory);
        let dir = fs::read_dir(&real_path).map_err(|e| FilerError::from_io(e, &request.directory))?;

        let mut names: Vec<String> = dir
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| request.accepts(name))
            .collect();
        names.sort();
        if request.limit > 0 {
            names.truncate(request.limit as usize);
        }

        // metadata is read lazily so a listing never holds more than one stat
        let root = real_path;
        let stream = names.into_iter().filter_map(move |name| {
            match fs::symlink_metadata(root.join(&name)) {
                Ok(meta) => Some(Ok(Self::entry_from_metadata(name, &meta))),
                // removed between readdir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => Some(Err(FilerError::Io(e))),
            }
        });
        Ok(Box::new(stream))
    }

    fn delete_entry(&self, request: &DeleteEntryRequest) -> FilerResult<DeleteEntryResponse> {
        let path = request.directory.child(&request.name);
        let real_path = self.to_real(&path);

        let meta = match fs::symlink_metadata(&real_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(DeleteEntryResponse {
                    error: format!("{} not found", path),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let removed = if meta.is_dir() {
            if request.is_recursive {
                fs::remove_dir_all(&real_path)
            } else {
                fs::remove_dir(&real_path)
            }
        } else {
            fs::remove_file(&real_path)
        };

        match removed {
            Ok(()) => {
                debug!("local: deleted {}", path);
                Ok(DeleteEntryResponse::default())
            }
            Err(e) => match FilerError::from_io(e, &path) {
                FilerError::Io(e) => Err(FilerError::Io(e)),
                refused => Ok(DeleteEntryResponse {
                    error: refused.to_string(),
                }),
            },
        }
    }

    fn lookup_entry(&self, directory: &FullPath, name: &str) -> FilerResult<Option<Entry>> {
        let path = directory.child(name);
        match fs::symlink_metadata(self.to_real(&path)) {
            Ok(meta) => Ok(Some(Self::entry_from_metadata(name.to_string(), &meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => match e.raw_os_error() {
                Some(libc::ENOTDIR) => Ok(None),
                _ => Err(e.into()),
            },
        }
    }

    fn rename_entry(
        &self,
        old_directory: &FullPath,
        old_name: &str,
        new_directory: &FullPath,
        new_name: &str,
    ) -> FilerResult<()> {
        let source = old_directory.child(old_name);
        let target = new_directory.child(new_name);
        debug!("local: rename {} -> {}", source, target);

        fs::rename(self.to_real(&source), self.to_real(&target)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FilerError::NotFound(source.clone()),
            _ => FilerError::from_io(e, &target),
        })
    }

    fn update_entry(&self, directory: &FullPath, entry: &Entry) -> FilerResult<()> {
        let path = directory.child(&entry.name);
        let real_path = self.to_real(&path);
        let meta = fs::symlink_metadata(&real_path).map_err(|e| FilerError::from_io(e, &path))?;
        debug!("local: update {} {:?}", path, entry.attributes);
        Self::apply_attributes(&real_path, &meta, &entry.attributes)
    }
}
