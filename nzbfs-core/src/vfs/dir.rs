use crate::domain::now_unix;
use crate::error::Result;
use crate::meta::reader::MetadataReader;
use crate::util::sanitize::split_parent;
use crate::vfs::FileInfo;

pub struct VirtualDirectory {
    name: String,
    path: String,
    reader: MetadataReader,
}

impl VirtualDirectory {
    pub(crate) fn new(name: String, path: String, reader: MetadataReader) -> Self {
        Self { name, path, reader }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Subdirectories first, then files. `limit == 0` returns everything.
    pub fn read_dir(&self, limit: usize) -> Result<Vec<FileInfo>> {
        let (dirs, files) = self.reader.list_directory_contents(&self.path)?;
        let now = now_unix();
        let infos = dirs
            .into_iter()
            .map(|d| FileInfo {
                name: d.name,
                size: 0,
                is_dir: true,
                modified: now,
            })
            .chain(files.into_iter().map(|f| FileInfo {
                name: f.name,
                size: f.metadata.file_size,
                is_dir: false,
                modified: f.metadata.modified_at,
            }));
        Ok(if limit > 0 {
            infos.take(limit).collect()
        } else {
            infos.collect()
        })
    }

    pub fn read_dir_names(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self.read_dir(limit)?.into_iter().map(|i| i.name).collect())
    }

    pub fn stat(&self) -> FileInfo {
        FileInfo {
            name: split_parent(&self.path).1.to_string(),
            size: 0,
            is_dir: true,
            modified: now_unix(),
        }
    }
}
