//! In-process filer backend
//!
//! Keeps every entry in one ordered map keyed by full path. Used by tests and
//! by `filermount mount --memory` for a scratch namespace.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use super::{
    root_entry, CreateEntryRequest, DeleteEntryRequest, DeleteEntryResponse, Entry, EntryStream,
    FilerClient, FilerError, FilerResult, ListEntriesRequest,
};
use crate::path::FullPath;

pub struct MemoryFiler {
    entries: RwLock<BTreeMap<FullPath, Entry>>,
}

impl MemoryFiler {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(FullPath::root(), root_entry());
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<FullPath, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<FullPath, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored entries, not counting the root
    pub fn len(&self) -> usize {
        self.read().len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryFiler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_descendant(path: &FullPath, ancestor: &FullPath) -> bool {
    path.strip_ancestor(ancestor).is_some()
}

fn has_children(entries: &BTreeMap<FullPath, Entry>, dir: &FullPath) -> bool {
    entries.keys().any(|path| is_descendant(path, dir))
}

fn require_directory(entries: &BTreeMap<FullPath, Entry>, dir: &FullPath) -> FilerResult<()> {
    match entries.get(dir) {
        Some(entry) if entry.is_directory => Ok(()),
        Some(_) => Err(FilerError::NotADirectory(dir.clone())),
        None => Err(FilerError::NotFound(dir.clone())),
    }
}

impl FilerClient for MemoryFiler {
    fn create_entry(&self, request: &CreateEntryRequest) -> FilerResult<()> {
        let mut entries = self.write();
        require_directory(&entries, &request.directory)?;

        let path = request.directory.child(&request.entry.name);
        if entries.contains_key(&path) {
            return Err(FilerError::AlreadyExists(path));
        }
        debug!("memory: create {}", path);
        entries.insert(path, request.entry.clone());
        Ok(())
    }

    fn list_entries(&self, request: &ListEntriesRequest) -> FilerResult<EntryStream> {
        let entries = self.read();
        require_directory(&entries, &request.directory)?;

        let limit = if request.limit == 0 {
            usize::MAX
        } else {
            request.limit as usize
        };
        let listed: Vec<FilerResult<Entry>> = entries
            .iter()
            .filter(|(path, _)| !path.is_root() && path.dir_and_name().0 == request.directory)
            .filter(|(_, entry)| request.accepts(&entry.name))
            .take(limit)
            .map(|(_, entry)| Ok(entry.clone()))
            .collect();
        Ok(Box::new(listed.into_iter()))
    }

    fn delete_entry(&self, request: &DeleteEntryRequest) -> FilerResult<DeleteEntryResponse> {
        let mut entries = self.write();
        let path = request.directory.child(&request.name);

        let Some(entry) = entries.get(&path) else {
            return Ok(DeleteEntryResponse {
                error: format!("{} not found", path),
            });
        };
        if entry.is_directory && has_children(&entries, &path) {
            if !request.is_recursive {
                return Ok(DeleteEntryResponse {
                    error: format!("{}: directory not empty", path),
                });
            }
            entries.retain(|p, _| !is_descendant(p, &path));
        }
        entries.remove(&path);
        debug!("memory: delete {}", path);
        Ok(DeleteEntryResponse::default())
    }

    fn lookup_entry(&self, directory: &FullPath, name: &str) -> FilerResult<Option<Entry>> {
        Ok(self.read().get(&directory.child(name)).cloned())
    }

    fn rename_entry(
        &self,
        old_directory: &FullPath,
        old_name: &str,
        new_directory: &FullPath,
        new_name: &str,
    ) -> FilerResult<()> {
        let mut entries = self.write();
        let source = old_directory.child(old_name);
        let target = new_directory.child(new_name);

        let Some(mut moved) = entries.get(&source).cloned() else {
            return Err(FilerError::NotFound(source));
        };
        require_directory(&entries, new_directory)?;
        if source == target {
            return Ok(());
        }
        if let Some(existing) = entries.get(&target) {
            if existing.is_directory && has_children(&entries, &target) {
                return Err(FilerError::DirectoryNotEmpty(target));
            }
            if existing.is_directory && !moved.is_directory {
                return Err(FilerError::AlreadyExists(target));
            }
            if !existing.is_directory && moved.is_directory {
                return Err(FilerError::NotADirectory(target));
            }
        }

        let descendants: Vec<FullPath> = entries
            .keys()
            .filter(|p| is_descendant(p, &source))
            .cloned()
            .collect();
        for old in descendants {
            if let Some(entry) = entries.remove(&old) {
                let suffix = &old.as_str()[source.as_str().len()..];
                entries.insert(FullPath::new(format!("{}{}", target, suffix)), entry);
            }
        }
        entries.remove(&source);
        moved.name = new_name.to_string();
        entries.insert(target.clone(), moved);
        debug!("memory: rename {} -> {}", source, target);
        Ok(())
    }

    fn update_entry(&self, directory: &FullPath, entry: &Entry) -> FilerResult<()> {
        let mut entries = self.write();
        let path = directory.child(&entry.name);
        match entries.get_mut(&path) {
            Some(existing) => {
                existing.attributes = entry.attributes.clone();
                existing.chunks = entry.chunks.clone();
                Ok(())
            }
            None => Err(FilerError::NotFound(path)),
        }
    }
}
