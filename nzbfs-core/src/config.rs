use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NzbfsError, Result};

pub const DEFAULT_WORKERS: usize = 15;
pub const DEFAULT_MAX_AGE_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_STREAMING_CHUNK_BYTES: u64 = 32 * 1024 * 1024;

/// Process-wide streaming settings. Read once at startup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct StreamingConfig {
    pub metadata_root: PathBuf,
    pub stream_root: PathBuf,
    /// `0` disables eviction.
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
    /// `0` falls back to [`DEFAULT_WORKERS`].
    pub max_workers: usize,
    pub streaming_chunk_bytes: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            metadata_root: PathBuf::from("data/metadata"),
            stream_root: PathBuf::from("data/streams"),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            max_workers: 0,
            streaming_chunk_bytes: DEFAULT_STREAMING_CHUNK_BYTES,
        }
    }
}

impl StreamingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|e| NzbfsError::Format(format!("config {}: {e}", path.display())))
    }

    pub fn workers(&self) -> usize {
        if self.max_workers == 0 {
            DEFAULT_WORKERS
        } else {
            self.max_workers
        }
    }

    pub fn max_age(&self) -> Option<std::time::Duration> {
        (self.max_age_secs > 0).then(|| std::time::Duration::from_secs(self.max_age_secs))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn chunk_bytes(&self) -> u64 {
        if self.streaming_chunk_bytes == 0 {
            DEFAULT_STREAMING_CHUNK_BYTES
        } else {
            self.streaming_chunk_bytes
        }
    }
}
