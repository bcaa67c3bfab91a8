use std::sync::Arc;

use tracing::warn;

use crate::domain::{FileMetadata, SegmentRef};
use crate::error::{NzbfsError, Result};
use crate::store::{MetadataStore, join_virtual};
use crate::util::sanitize::{normalize_virtual_path, split_parent};

/// A derived directory. Only the name is meaningful; nothing is stored for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryInfo {
    pub name: String,
    pub path: String,
}

impl DirectoryInfo {
    fn from_path(path: String) -> Self {
        let name = split_parent(&path).1.to_string();
        Self { name, path }
    }

    pub fn is_dir(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualFileEntry {
    pub name: String,
    pub path: String,
    pub metadata: FileMetadata,
}

/// Read-only query layer over a [`MetadataStore`].
#[derive(Clone)]
pub struct MetadataReader {
    store: Arc<dyn MetadataStore>,
}

impl MetadataReader {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Immediate children of `dir`. An absent directory lists as empty.
    pub fn list_directory_contents(
        &self,
        dir: &str,
    ) -> Result<(Vec<DirectoryInfo>, Vec<VirtualFileEntry>)> {
        let key = normalize_virtual_path(dir)?;
        let dirs = self
            .store
            .list_subdirectories(&key)?
            .into_iter()
            .map(DirectoryInfo::from_path)
            .collect();

        let mut files = Vec::new();
        for name in self.store.list_directory(&key)? {
            let path = join_virtual(&key, &name);
            match self.store.read(&path) {
                Ok(Some(metadata)) => files.push(VirtualFileEntry {
                    name,
                    path,
                    metadata,
                }),
                // removed between list and read
                Ok(None) => {}
                Err(e) => warn!(path = %path, error = %e, "skipping unreadable metadata"),
            }
        }
        Ok((dirs, files))
    }

    pub fn list_directory(&self, dir: &str) -> Result<Vec<String>> {
        self.store.list_directory(dir)
    }

    pub fn list_subdirectories(&self, dir: &str) -> Result<Vec<String>> {
        self.store.list_subdirectories(dir)
    }

    pub fn get_file_metadata(&self, path: &str) -> Result<Option<FileMetadata>> {
        self.store.read(path)
    }

    /// The root always exists.
    pub fn path_exists(&self, path: &str) -> Result<bool> {
        let key = normalize_virtual_path(path)?;
        if key.is_empty() || self.store.directory_exists(&key)? {
            return Ok(true);
        }
        Ok(self.store.exists(&key))
    }

    /// Fails with `NotFound` when the path is neither a file nor a directory.
    pub fn is_directory(&self, path: &str) -> Result<bool> {
        let key = normalize_virtual_path(path)?;
        if key.is_empty() || self.store.directory_exists(&key)? {
            return Ok(true);
        }
        if self.store.exists(&key) {
            return Ok(false);
        }
        Err(NzbfsError::NotFound(format!("path does not exist: {key}")))
    }

    pub fn get_file_segments(&self, path: &str) -> Result<Vec<SegmentRef>> {
        self.store
            .read(path)?
            .map(|m| m.segments)
            .ok_or_else(|| NzbfsError::NotFound(format!("file not found: {path}")))
    }

    pub fn get_directory_info(&self, path: &str) -> Result<DirectoryInfo> {
        let key = normalize_virtual_path(path)?;
        if key.is_empty() || self.store.directory_exists(&key)? {
            return Ok(DirectoryInfo::from_path(key));
        }
        if self.store.exists(&key) {
            return Err(NzbfsError::InvalidPath(format!(
                "path is not a directory: {key}"
            )));
        }
        Err(NzbfsError::NotFound(format!("directory not found: {key}")))
    }
}
