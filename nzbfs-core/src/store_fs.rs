use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dashmap::DashMap;
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use crate::container::record::{self, EXTENSION};
use crate::domain::FileMetadata;
use crate::error::{NzbfsError, Result};
use crate::store::{MetadataStore, StoreParams, join_virtual, next_modified};
use crate::util::sanitize::normalize_virtual_path;

/// One `<path>.meta` file per virtual path, mirroring the virtual tree under
/// `root`.
///
/// Per-path mutexes serialize writers of one record. Every path operation
/// also holds `tree` shared, and `delete_tree` takes it exclusively, so a
/// subtree removal never interleaves with a read-modify-write beneath it.
pub struct FsMetadataStore {
    root: PathBuf,
    tree: RwLock<()>,
    /// Only paths with an operation in flight keep an entry.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FsMetadataStore {
    pub fn new(params: StoreParams) -> Result<Self> {
        fs::create_dir_all(&params.root)?;
        Ok(Self {
            root: params.root,
            tree: RwLock::new(()),
            locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_key(path: &str) -> Result<String> {
        let key = normalize_virtual_path(path)?;
        if key.is_empty() {
            return Err(NzbfsError::InvalidPath("empty file path".into()));
        }
        Ok(key)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{EXTENSION}"))
    }

    fn dir_path(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `op` holding the tree lock shared and the path lock exclusively,
    /// then drop the path's entry unless another caller is waiting on it.
    fn with_path_lock<T>(&self, key: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let _tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        let lock = self.lock_for(key);
        let out = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        drop(lock);
        self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
        out
    }

    /// Caller holds the path lock.
    fn write_locked(&self, key: &str, meta: &FileMetadata) -> Result<()> {
        let target = self.record_path(key);
        let parent = target
            .parent()
            .ok_or_else(|| NzbfsError::InvalidPath(key.to_string()))?;
        fs::create_dir_all(parent)?;

        // temp file lives beside the target so persist() is a same-fs rename
        let tmp = NamedTempFile::new_in(parent)?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            record::write_record(&mut w, meta)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| NzbfsError::Io(e.error))?;
        Ok(())
    }

    fn read_key(&self, key: &str) -> Result<Option<FileMetadata>> {
        let f = match File::open(self.record_path(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        record::read_record(BufReader::new(f)).map(Some)
    }

    fn has_record_beneath(dir: &Path) -> bool {
        WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file() && is_record(e.path()))
    }
}

fn is_record(p: &Path) -> bool {
    p.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
}

impl MetadataStore for FsMetadataStore {
    fn write(&self, path: &str, meta: &FileMetadata) -> Result<()> {
        let key = Self::file_key(path)?;
        self.with_path_lock(&key, || self.write_locked(&key, meta))?;
        debug!(path = %key, size = meta.file_size, "metadata written");
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Option<FileMetadata>> {
        let key = Self::file_key(path)?;
        self.read_key(&key)
    }

    fn update(&self, path: &str, mutate: &mut dyn FnMut(&mut FileMetadata)) -> Result<()> {
        let key = Self::file_key(path)?;
        self.with_path_lock(&key, || {
            let current = self
                .read_key(&key)?
                .ok_or_else(|| NzbfsError::NotFound(key.clone()))?;
            let mut next = current.clone();
            mutate(&mut next);
            next.modified_at = next_modified(current.modified_at);
            self.write_locked(&key, &next)
        })
    }

    fn delete(&self, path: &str) -> Result<()> {
        let key = Self::file_key(path)?;
        self.with_path_lock(&key, || match fs::remove_file(self.record_path(&key)) {
            Ok(()) => {
                debug!(path = %key, "metadata deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
    }

    fn delete_tree(&self, dir: &str) -> Result<usize> {
        let key = normalize_virtual_path(dir)?;
        if key.is_empty() {
            return Err(NzbfsError::InvalidPath(
                "refusing to delete the metadata root".into(),
            ));
        }
        let _tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        let prefix = format!("{key}/");
        self.locks.retain(|k, _| !k.starts_with(&prefix));

        let target = self.dir_path(&key);
        let removed = WalkDir::new(&target)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_record(e.path()))
            .count();
        match fs::remove_dir_all(&target) {
            Ok(()) => {
                debug!(dir = %key, removed, "metadata tree deleted");
                Ok(removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        Self::file_key(path)
            .map(|key| self.record_path(&key).is_file())
            .unwrap_or(false)
    }

    fn list_directory(&self, dir: &str) -> Result<Vec<String>> {
        let key = normalize_virtual_path(dir)?;
        let rd = match fs::read_dir(self.dir_path(&key)) {
            Ok(rd) => rd,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in rd {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let p = entry.path();
            if !is_record(&p) {
                continue;
            }
            if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn list_subdirectories(&self, dir: &str) -> Result<Vec<String>> {
        let key = normalize_virtual_path(dir)?;
        let rd = match fs::read_dir(self.dir_path(&key)) {
            Ok(rd) => rd,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut dirs = Vec::new();
        for entry in rd {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            // empty leftovers are not directories
            if !Self::has_record_beneath(&entry.path()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                dirs.push(join_virtual(&key, name));
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn directory_exists(&self, dir: &str) -> Result<bool> {
        let key = normalize_virtual_path(dir)?;
        let p = self.dir_path(&key);
        Ok(p.is_dir() && Self::has_record_beneath(&p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Encryption, FileStatus, SegmentRef};

    fn sample(size: u64) -> FileMetadata {
        FileMetadata::create(
            size,
            "/streams/x/x.nzb",
            FileStatus::Healthy,
            vec![SegmentRef::new("seg1@example", 500).unwrap()],
            Encryption::None,
        )
    }

    fn store() -> (tempfile::TempDir, FsMetadataStore) {
        let tmp = tempfile::tempdir().unwrap();
        let s = FsMetadataStore::new(StoreParams {
            root: tmp.path().join("meta"),
        })
        .unwrap();
        (tmp, s)
    }

    #[test]
    fn write_read_update_delete() {
        let (_tmp, s) = store();
        s.write("/movies/a.mkv", &sample(1000)).unwrap();
        let back = s.read("movies/a.mkv").unwrap().unwrap();
        assert_eq!(back.file_size, 1000);
        assert_eq!(back.source_archive_path, "/streams/x/x.nzb");

        s.update("movies/a.mkv", &mut |m| m.file_size = 2000).unwrap();
        let updated = s.read("movies/a.mkv").unwrap().unwrap();
        assert_eq!(updated.file_size, 2000);
        assert!(updated.modified_at > back.modified_at);

        s.delete("movies/a.mkv").unwrap();
        s.delete("movies/a.mkv").unwrap();
        assert!(!s.exists("movies/a.mkv"));
        assert!(s.read("movies/a.mkv").unwrap().is_none());
    }

    #[test]
    fn update_missing_path_fails() {
        let (_tmp, s) = store();
        let err = s.update("nope.mkv", &mut |_| {}).unwrap_err();
        assert!(matches!(err, NzbfsError::NotFound(_)));
    }

    #[test]
    fn rapid_updates_bump_modified_each_time() {
        let (_tmp, s) = store();
        s.write("a.mkv", &sample(1)).unwrap();
        let mut last = s.read("a.mkv").unwrap().unwrap().modified_at;
        for _ in 0..5 {
            s.update_status("a.mkv", FileStatus::Partial).unwrap();
            let m = s.read("a.mkv").unwrap().unwrap();
            assert!(m.modified_at > last);
            assert_eq!(m.status, FileStatus::Partial);
            last = m.modified_at;
        }
    }

    #[test]
    fn listings_are_derived_from_records() {
        let (_tmp, s) = store();
        s.write("movies/a.mkv", &sample(1)).unwrap();
        s.write("movies/extras/b.mkv", &sample(1)).unwrap();
        assert_eq!(s.list_directory("movies").unwrap(), vec!["a.mkv"]);
        assert_eq!(
            s.list_subdirectories("movies").unwrap(),
            vec!["movies/extras"]
        );
        assert_eq!(s.list_subdirectories("").unwrap(), vec!["movies"]);
        assert!(s.list_directory("missing").unwrap().is_empty());

        s.delete("movies/extras/b.mkv").unwrap();
        assert!(s.list_subdirectories("movies").unwrap().is_empty());
        assert!(!s.directory_exists("movies/extras").unwrap());
        assert!(s.directory_exists("movies").unwrap());
    }

    #[test]
    fn delete_tree_removes_all_records() {
        let (_tmp, s) = store();
        s.write("abc/one.mkv", &sample(1)).unwrap();
        s.write("abc/sub/two.mkv", &sample(1)).unwrap();
        assert_eq!(s.delete_tree("abc").unwrap(), 2);
        assert!(!s.directory_exists("abc").unwrap());
        assert_eq!(s.delete_tree("abc").unwrap(), 0);
        assert!(s.delete_tree("/").is_err());
    }

    #[test]
    fn rejects_escaping_paths() {
        let (_tmp, s) = store();
        assert!(matches!(
            s.write("../evil.mkv", &sample(1)),
            Err(NzbfsError::InvalidPath(_))
        ));
        assert!(!s.exists("../evil.mkv"));
    }

    #[test]
    fn concurrent_writers_to_distinct_paths() {
        let (_tmp, s) = store();
        let s = Arc::new(s);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    s.write(&format!("d/f{i}.mkv"), &sample(i)).unwrap();
                    s.update(&format!("d/f{i}.mkv"), &mut |m| m.file_size += 1)
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.list_directory("d").unwrap().len(), 8);
        assert_eq!(s.read("d/f3.mkv").unwrap().unwrap().file_size, 4);
    }

    #[test]
    fn path_locks_are_released() {
        let (_tmp, s) = store();
        s.write("abc/one.mkv", &sample(1)).unwrap();
        s.update("abc/one.mkv", &mut |m| m.file_size = 2).unwrap();
        s.delete("abc/one.mkv").unwrap();
        s.write("abc/two.mkv", &sample(1)).unwrap();
        assert!(s.locks.is_empty());
        s.delete_tree("abc").unwrap();
        assert!(s.locks.is_empty());
    }

    #[test]
    fn concurrent_updates_to_one_path_serialize() {
        let (_tmp, s) = store();
        s.write("one.mkv", &sample(0)).unwrap();
        let before = s.read("one.mkv").unwrap().unwrap().modified_at;

        let s = Arc::new(s);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        s.update("one.mkv", &mut |m| m.file_size += 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let after = s.read("one.mkv").unwrap().unwrap();
        assert_eq!(after.file_size, 200);
        // each update moved modified_at by at least one second
        assert!(after.modified_at >= before + 200);
    }

    #[test]
    fn delete_tree_is_not_undone_by_inflight_updates() {
        let (_tmp, s) = store();
        s.write("abc/one.mkv", &sample(0)).unwrap();
        let s = Arc::new(s);

        let updaters: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        match s.update_status("abc/one.mkv", FileStatus::Partial) {
                            Ok(()) | Err(NzbfsError::NotFound(_)) => {}
                            Err(e) => panic!("unexpected {e:?}"),
                        }
                    }
                })
            })
            .collect();
        let evictor = {
            let s = Arc::clone(&s);
            std::thread::spawn(move || s.delete_tree("abc").unwrap())
        };
        evictor.join().unwrap();
        for h in updaters {
            h.join().unwrap();
        }

        assert!(!s.exists("abc/one.mkv"));
        assert!(!s.directory_exists("abc").unwrap());
        assert!(matches!(
            s.update("abc/one.mkv", &mut |_| {}),
            Err(NzbfsError::NotFound(_))
        ));
        assert!(!s.root().join("abc").exists());
    }
}
