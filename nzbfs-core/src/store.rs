// nzbfs_core/src/store.rs
use std::path::PathBuf;

use crate::domain::{FileMetadata, FileStatus, now_unix};
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct StoreParams {
    pub root: PathBuf,
}

/// Durable virtual path -> [`FileMetadata`] mapping. Directories are never
/// stored; they exist while at least one file lives beneath them.
///
/// Paths are normalized on the way in (`/a//b/` == `a/b`). Writes to the
/// same path are serialized by the store; callers need no external locking.
pub trait MetadataStore: Send + Sync {
    fn write(&self, path: &str, meta: &FileMetadata) -> Result<()>;

    /// `Ok(None)` means absent; `Err` means the lookup itself failed.
    fn read(&self, path: &str) -> Result<Option<FileMetadata>>;

    /// Read-modify-write on a copy of the stored record. Fails with
    /// `NotFound` when the path has no record. `modified_at` always moves
    /// strictly forward: it becomes `max(now, previous + 1)`. A burst of N
    /// updates within one second therefore leaves it up to N seconds ahead
    /// of the wall clock until real time catches up; readers comparing it to
    /// `now` must tolerate future values.
    fn update(&self, path: &str, mutate: &mut dyn FnMut(&mut FileMetadata)) -> Result<()>;

    fn update_status(&self, path: &str, status: FileStatus) -> Result<()> {
        self.update(path, &mut |m| m.status = status)
    }

    /// Idempotent.
    fn delete(&self, path: &str) -> Result<()>;

    /// Remove every record under `dir`. Returns how many were removed.
    fn delete_tree(&self, dir: &str) -> Result<usize>;

    fn exists(&self, path: &str) -> bool;

    /// Names of the immediate file children of `dir`, sorted.
    fn list_directory(&self, dir: &str) -> Result<Vec<String>>;

    /// Full virtual paths of the immediate subdirectories of `dir`, sorted.
    fn list_subdirectories(&self, dir: &str) -> Result<Vec<String>>;

    fn directory_exists(&self, dir: &str) -> Result<bool>;
}

/// Next `modified_at` after `prev`, visible even within the same second.
pub(crate) fn next_modified(prev: i64) -> i64 {
    now_unix().max(prev.saturating_add(1))
}

pub(crate) fn join_virtual(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_modified_is_strictly_increasing() {
        let far_future = now_unix() + 1_000;
        assert_eq!(next_modified(far_future), far_future + 1);
        assert!(next_modified(0) >= now_unix());
    }

    #[test]
    fn burst_runs_ahead_of_the_clock() {
        let start = now_unix();
        let mut m = start;
        for _ in 0..50 {
            m = next_modified(m);
        }
        assert!(m >= start + 50);
        assert!(m > now_unix());
    }

    #[test]
    fn join_at_root_has_no_separator() {
        assert_eq!(join_virtual("", "a.mkv"), "a.mkv");
        assert_eq!(join_virtual("x/y", "a.mkv"), "x/y/a.mkv");
    }
}
