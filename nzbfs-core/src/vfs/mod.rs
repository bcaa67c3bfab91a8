//! Filesystem-shaped view over the metadata tree, for WebDAV and HTTP range
//! handlers.

pub mod dir;
pub mod file;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::DEFAULT_STREAMING_CHUNK_BYTES;
use crate::domain::{FileMetadata, FileStatus};
use crate::error::{NzbfsError, Result};
use crate::meta::reader::MetadataReader;
use crate::read::factory::{ReaderFactory, SegmentStream};
use crate::registry::metadata_key;
use crate::store::MetadataStore;
use crate::util::path_args::PathWithArgs;
use crate::util::sanitize::split_parent;

pub use dir::VirtualDirectory;
pub use file::VirtualFile;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    /// Unix seconds.
    pub modified: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub virtual_path: String,
    pub normalized_path: String,
    pub source_archive: String,
    pub file_size: u64,
    pub segment_count: usize,
    pub created_at: Option<i64>,
}

impl FileDescriptor {
    pub(crate) fn from_metadata(virtual_path: &str, normalized: &str, meta: &FileMetadata) -> Self {
        Self {
            virtual_path: virtual_path.to_string(),
            normalized_path: normalized.to_string(),
            source_archive: meta.source_archive_path.trim().to_string(),
            file_size: meta.file_size,
            segment_count: meta.segments.len(),
            created_at: (meta.created_at > 0).then_some(meta.created_at),
        }
    }
}

/// Told about files whose content turned out to be missing or damaged.
pub trait HealthReporter: Send + Sync {
    fn mark_partial(&self, path: &str, err: &NzbfsError);
    fn mark_corrupted(&self, path: &str, err: &NzbfsError);
}

/// Persists health findings as the file's status.
pub struct StoreHealthReporter {
    store: Arc<dyn MetadataStore>,
}

impl StoreHealthReporter {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    fn set(&self, path: &str, status: FileStatus, err: &NzbfsError) {
        if let Err(e) = self.store.update_status(path, status) {
            warn!(path, %status, cause = %err, error = %e, "cannot record file health");
        } else {
            warn!(path, %status, cause = %err, "file health changed");
        }
    }
}

impl HealthReporter for StoreHealthReporter {
    fn mark_partial(&self, path: &str, err: &NzbfsError) {
        self.set(path, FileStatus::Partial, err);
    }

    fn mark_corrupted(&self, path: &str, err: &NzbfsError) {
        self.set(path, FileStatus::Corrupted, err);
    }
}

/// Decrypts the decoded stream of an encrypted file for `[start, end]`.
#[async_trait]
pub trait EncryptionAdapter: Send + Sync {
    async fn wrap(
        &self,
        meta: &FileMetadata,
        start: u64,
        end: u64,
        inner: SegmentStream,
    ) -> Result<SegmentStream>;
}

pub enum VirtualNode {
    Directory(VirtualDirectory),
    File(VirtualFile),
}

impl VirtualNode {
    pub fn is_dir(&self) -> bool {
        matches!(self, VirtualNode::Directory(_))
    }

    pub fn stat(&self) -> FileInfo {
        match self {
            VirtualNode::Directory(d) => d.stat(),
            VirtualNode::File(f) => f.stat(),
        }
    }
}

pub struct VirtualFs {
    reader: MetadataReader,
    factory: Arc<dyn ReaderFactory>,
    health: Option<Arc<dyn HealthReporter>>,
    encryption: Option<Arc<dyn EncryptionAdapter>>,
    chunk_bytes: u64,
}

impl VirtualFs {
    pub fn new(reader: MetadataReader, factory: Arc<dyn ReaderFactory>) -> Self {
        Self {
            reader,
            factory,
            health: None,
            encryption: None,
            chunk_bytes: DEFAULT_STREAMING_CHUNK_BYTES,
        }
    }

    pub fn with_health_reporter(mut self, health: Arc<dyn HealthReporter>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_encryption(mut self, adapter: Arc<dyn EncryptionAdapter>) -> Self {
        self.encryption = Some(adapter);
        self
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: u64) -> Self {
        if chunk_bytes > 0 {
            self.chunk_bytes = chunk_bytes;
        }
        self
    }

    /// `Ok(None)` when nothing lives at `path`. Opening a corrupted file is
    /// an error.
    pub fn open(
        &self,
        path: &str,
        args: PathWithArgs,
        cancel: CancellationToken,
    ) -> Result<Option<VirtualNode>> {
        let key = metadata_key(path)?;
        let name = split_parent(&key).1.to_string();
        let store = self.reader.store();

        if key.is_empty() || store.directory_exists(&key)? {
            return Ok(Some(self.directory(name, key)));
        }

        let Some(meta) = self.reader.get_file_metadata(&key)? else {
            // a missing child of an existing directory lists as empty
            let (parent, _) = split_parent(&key);
            if parent.is_empty() || store.directory_exists(parent)? {
                return Ok(Some(self.directory(name, key)));
            }
            return Ok(None);
        };
        if meta.status == FileStatus::Corrupted {
            return Err(NzbfsError::FileCorrupted);
        }

        Ok(Some(VirtualNode::File(VirtualFile::new(file::FileParts {
            name,
            path: key,
            meta,
            args,
            factory: Arc::clone(&self.factory),
            health: self.health.clone(),
            encryption: self.encryption.clone(),
            chunk_bytes: self.chunk_bytes,
            cancel,
        }))))
    }

    pub fn describe(&self, path: &str) -> Result<FileDescriptor> {
        let key = metadata_key(path)?;
        let meta = self
            .reader
            .get_file_metadata(&key)?
            .ok_or_else(|| NzbfsError::NotFound(path.to_string()))?;
        Ok(FileDescriptor::from_metadata(path, &key, &meta))
    }

    fn directory(&self, name: String, key: String) -> VirtualNode {
        VirtualNode::Directory(VirtualDirectory::new(name, key, self.reader.clone()))
    }
}
