use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Encryption, FileMetadata, FileStatus, SegmentRef};
use crate::error::{NzbfsError, Result};
use crate::nzb::parser::parse_nzb;
use crate::nzb::select::select_stream;
use crate::store::MetadataStore;
use crate::util::sanitize::{normalize_virtual_path, sanitize_file_name};

/// Public prefix under which registrations are exposed.
pub const PUBLIC_PREFIX: &str = "streams";
/// Nested layout written by older releases; still swept.
const LEGACY_DIR: &str = "streams";
const FALLBACK_MEDIA_NAME: &str = "stream.bin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    /// `streams/<id>/<name>`
    pub path: String,
    /// `<id>/<name>`, the metadata store key.
    pub metadata_path: String,
    pub archive_path: PathBuf,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Turns uploaded NZB documents into virtual files and evicts stale ones.
pub struct Registry {
    store: Arc<dyn MetadataStore>,
    root: PathBuf,
    max_age: Option<Duration>,
    mu: Mutex<()>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        root: impl Into<PathBuf>,
        max_age: Option<Duration>,
    ) -> Self {
        Self {
            store,
            root: root.into(),
            max_age,
            mu: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn register(&self, nzb_bytes: &[u8], suggested_name: &str) -> Result<Registration> {
        let suggested_name = suggested_name.trim();
        info!(file = suggested_name, bytes = nzb_bytes.len(), "register begin");

        let nzb = parse_nzb(nzb_bytes)?;
        let selected = select_stream(&nzb)?;

        let size = match selected.decoded_size {
            Some(decoded) => decoded,
            None => {
                warn!(
                    subject = %selected.subject,
                    declared = selected.declared_size,
                    "no decoded size marker, using encoded size estimate"
                );
                selected.declared_size
            }
        };
        if size == 0 {
            return Err(NzbfsError::Nzb("unable to determine file size".into()));
        }

        let segments = selected
            .segments
            .iter()
            .map(|s| SegmentRef::new(&s.id, s.bytes))
            .collect::<Result<Vec<_>>>()?;
        info!(
            subject = %selected.subject,
            segments = segments.len(),
            size,
            "register parsed"
        );

        let id = Uuid::new_v4().to_string();
        let media_name = [selected.file_name.as_str(), suggested_name]
            .into_iter()
            .map(sanitize_file_name)
            .find(|n| !n.is_empty())
            .unwrap_or_else(|| FALLBACK_MEDIA_NAME.to_string());
        let archive_name = archive_file_name(suggested_name, &id);

        let stream_dir = self.root.join(&id);
        let archive_path = stream_dir.join(&archive_name);
        let metadata_path = format!("{id}/{media_name}");
        let public_path = format!("{PUBLIC_PREFIX}/{metadata_path}");

        let meta = FileMetadata::create(
            size,
            archive_path.to_string_lossy(),
            FileStatus::Healthy,
            segments,
            Encryption::None,
        );

        let _guard = self.mu.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep_locked();
        fs::create_dir_all(&stream_dir)?;
        fs::write(&archive_path, nzb_bytes)?;
        // last step: nothing resolves until this succeeds
        self.store.write(&metadata_path, &meta)?;

        info!(
            path = %public_path,
            size,
            nzb = %archive_path.display(),
            "register complete"
        );
        Ok(Registration {
            id,
            path: public_path,
            metadata_path,
            archive_path,
            size,
        })
    }

    /// Evict registrations older than the configured age. Never fails; each
    /// removal failure is logged and counted.
    pub fn sweep(&self) -> SweepReport {
        let _guard = self.mu.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep_locked()
    }

    fn sweep_locked(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(max_age) = self.max_age else {
            return report;
        };
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let entries = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(root = %self.root.display(), error = %e, "cannot list stream root");
                }
                return report;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LEGACY_DIR {
                self.sweep_legacy(&entry.path(), cutoff, &mut report);
                continue;
            }
            if !is_older_than(&entry.path(), cutoff) {
                continue;
            }
            match self.evict(&name) {
                Ok(()) => {
                    info!(id = %name, "evicted stale registration");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(id = %name, error = %e, "eviction failed");
                    report.failed += 1;
                }
            }
        }
        if report.removed > 0 || report.failed > 0 {
            debug!(removed = report.removed, failed = report.failed, "sweep finished");
        }
        report
    }

    fn sweep_legacy(&self, legacy: &Path, cutoff: SystemTime, report: &mut SweepReport) {
        let Ok(entries) = fs::read_dir(legacy) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() || !is_older_than(&path, cutoff) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(dir = %path.display(), "removed legacy stream directory");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "legacy cleanup failed");
                    report.failed += 1;
                }
            }
        }
    }

    /// Metadata goes first so the path stops resolving before bytes vanish.
    fn evict(&self, id: &str) -> Result<()> {
        self.store.delete_tree(id)?;
        fs::remove_dir_all(self.root.join(id))?;
        Ok(())
    }

    /// Refresh the stream directory's mtime so an active stream survives the
    /// next sweep. Accepts public (`streams/<id>/..`) or metadata paths.
    pub fn touch(&self, path: &str) -> Result<()> {
        let id = registration_id(path)?;
        let dir = self.root.join(&id);
        File::open(&dir)?.set_modified(SystemTime::now())?;
        debug!(id = %id, "touched stream directory");
        Ok(())
    }
}

/// Registration id from a public or metadata path.
pub fn registration_id(path: &str) -> Result<String> {
    let key = normalize_virtual_path(path)?;
    let key = key
        .strip_prefix(PUBLIC_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key.as_str());
    key.split('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| NzbfsError::InvalidPath(format!("no registration id in {path:?}")))
}

/// Strip the public prefix, yielding the metadata key.
pub fn metadata_key(path: &str) -> Result<String> {
    let key = normalize_virtual_path(path)?;
    Ok(match key.strip_prefix(PUBLIC_PREFIX) {
        Some("") => String::new(),
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => key,
    })
}

fn archive_file_name(suggested: &str, id: &str) -> String {
    let mut name = sanitize_file_name(suggested);
    if name.is_empty() {
        name = format!("{id}.nzb");
    }
    if !name.to_ascii_lowercase().ends_with(".nzb") {
        name.push_str(".nzb");
    }
    name
}

fn is_older_than(path: &Path, cutoff: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|mtime| mtime < cutoff)
        .unwrap_or(false)
}

/// Run [`Registry::sweep`] every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    registry: Arc<Registry>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(interval_secs = interval.as_secs(), "sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let reg = Arc::clone(&registry);
                    match tokio::task::spawn_blocking(move || reg.sweep()).await {
                        Ok(report) if report.failed > 0 => {
                            warn!(removed = report.removed, failed = report.failed, "sweep had failures");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "sweep task panicked"),
                    }
                }
            }
        }
        debug!("sweeper stopped");
    })
}
