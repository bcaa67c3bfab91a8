use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use crate::domain::FileMetadata;
use crate::error::{NzbfsError, Result};
use crate::store::{MetadataStore, join_virtual, next_modified};
use crate::util::sanitize::normalize_virtual_path;

/// Ordered map keyed by normalized virtual path. Directory queries are prefix
/// scans over the keys.
#[derive(Debug, Default)]
pub struct InMemMetadataStore {
    by_path: RwLock<BTreeMap<String, FileMetadata>>,
}

impl InMemMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_key(path: &str) -> Result<String> {
        let key = normalize_virtual_path(path)?;
        if key.is_empty() {
            return Err(NzbfsError::InvalidPath("empty file path".into()));
        }
        Ok(key)
    }

    fn prefix(dir: &str) -> String {
        if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        }
    }

    /// Immediate children under `dir`: (files, subdirectory names).
    fn children(&self, dir: &str) -> Result<(Vec<String>, BTreeSet<String>)> {
        let key = normalize_virtual_path(dir)?;
        let prefix = Self::prefix(&key);
        let map = self.by_path.read().unwrap_or_else(PoisonError::into_inner);
        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for k in map
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&prefix))
        {
            let rest = &k[prefix.len()..];
            match rest.split_once('/') {
                Some((sub, _)) => {
                    dirs.insert(sub.to_string());
                }
                None => files.push(rest.to_string()),
            }
        }
        Ok((files, dirs))
    }
}

impl MetadataStore for InMemMetadataStore {
    fn write(&self, path: &str, meta: &FileMetadata) -> Result<()> {
        let key = Self::file_key(path)?;
        self.by_path
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, meta.clone());
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Option<FileMetadata>> {
        let key = Self::file_key(path)?;
        Ok(self
            .by_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned())
    }

    fn update(&self, path: &str, mutate: &mut dyn FnMut(&mut FileMetadata)) -> Result<()> {
        let key = Self::file_key(path)?;
        let mut map = self.by_path.write().unwrap_or_else(PoisonError::into_inner);
        let current = map
            .get(&key)
            .ok_or_else(|| NzbfsError::NotFound(key.clone()))?;
        let mut next = current.clone();
        mutate(&mut next);
        next.modified_at = next_modified(current.modified_at);
        map.insert(key, next);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let key = Self::file_key(path)?;
        self.by_path
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }

    fn delete_tree(&self, dir: &str) -> Result<usize> {
        let key = normalize_virtual_path(dir)?;
        if key.is_empty() {
            return Err(NzbfsError::InvalidPath(
                "refusing to delete the metadata root".into(),
            ));
        }
        let prefix = Self::prefix(&key);
        let mut map = self.by_path.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|k, _| !k.starts_with(&prefix));
        Ok(before - map.len())
    }

    fn exists(&self, path: &str) -> bool {
        Self::file_key(path)
            .map(|key| {
                self.by_path
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains_key(&key)
            })
            .unwrap_or(false)
    }

    fn list_directory(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self.children(dir)?.0)
    }

    fn list_subdirectories(&self, dir: &str) -> Result<Vec<String>> {
        let key = normalize_virtual_path(dir)?;
        let (_, dirs) = self.children(&key)?;
        Ok(dirs.into_iter().map(|d| join_virtual(&key, &d)).collect())
    }

    fn directory_exists(&self, dir: &str) -> Result<bool> {
        let key = normalize_virtual_path(dir)?;
        let prefix = Self::prefix(&key);
        let map = self.by_path.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix)))
    }
}
