// nzbfs_core/src/domain.rs
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::error::{NzbfsError, Result};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FileStatus {
    #[default]
    Healthy,
    Partial,
    Corrupted,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileStatus::Healthy => "healthy",
            FileStatus::Partial => "partial",
            FileStatus::Corrupted => "corrupted",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for FileStatus {
    type Err = NzbfsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(FileStatus::Healthy),
            "partial" => Ok(FileStatus::Partial),
            "corrupted" => Ok(FileStatus::Corrupted),
            other => Err(NzbfsError::InvalidArgument(format!(
                "unknown file status {other:?}"
            ))),
        }
    }
}

/// Encryption applied to the decoded byte stream. Key material is only
/// present when the stream is actually encrypted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub enum Encryption {
    #[default]
    None,
    Rclone {
        key_ref: String,
        iv: String,
    },
}

impl Encryption {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Encryption::None)
    }
}

/// Decoded-stream coordinates of a segment. Decode overhead varies per
/// article, so these stay unresolved until the fetch layer has seen the data.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SegmentOffsets {
    #[default]
    Unresolved,
    Resolved { start: u64, end: u64 },
}

impl SegmentOffsets {
    /// Decoded length, when known.
    pub fn decoded_len(&self) -> Option<u64> {
        match *self {
            SegmentOffsets::Unresolved => None,
            SegmentOffsets::Resolved { start, end } if end >= start => Some(end - start + 1),
            SegmentOffsets::Resolved { .. } => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SegmentRef {
    /// Encoded size declared by the archive, not the decoded size.
    pub segment_size: u64,
    pub offsets: SegmentOffsets,
    /// Remote article identifier (message-id), stored trimmed.
    pub id: String,
}

impl SegmentRef {
    pub fn new(id: &str, segment_size: u64) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(NzbfsError::InvalidArgument("segment id is empty".into()));
        }
        if segment_size == 0 {
            return Err(NzbfsError::InvalidArgument(format!(
                "segment {id} has non-positive size"
            )));
        }
        Ok(Self {
            segment_size,
            offsets: SegmentOffsets::Unresolved,
            id: id.to_string(),
        })
    }

    pub fn with_offsets(mut self, start: u64, end: u64) -> Self {
        self.offsets = SegmentOffsets::Resolved { start, end };
        self
    }

    pub fn is_valid(&self) -> bool {
        self.segment_size > 0 && !self.id.is_empty() && self.id.trim() == self.id
    }
}

/// Everything known about one virtual file. Treated as an immutable value:
/// updates produce a new record that replaces the stored one wholesale.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_size: u64,
    pub source_archive_path: String,
    pub status: FileStatus,
    pub segments: Vec<SegmentRef>,
    pub encryption: Encryption,
    pub created_at: i64,
    pub modified_at: i64,
}

impl FileMetadata {
    /// Pure constructor; never touches storage. Segments violating the
    /// size/id invariant are dropped.
    pub fn create(
        file_size: u64,
        source_archive_path: impl Into<String>,
        status: FileStatus,
        segments: Vec<SegmentRef>,
        encryption: Encryption,
    ) -> Self {
        let declared = segments.len();
        let segments: Vec<SegmentRef> = segments
            .into_iter()
            .filter_map(|s| {
                if s.is_valid() {
                    Some(s)
                } else {
                    SegmentRef::new(&s.id, s.segment_size)
                        .ok()
                        .map(|mut fixed| {
                            fixed.offsets = s.offsets;
                            fixed
                        })
                }
            })
            .collect();
        if segments.len() != declared {
            warn!(
                declared,
                kept = segments.len(),
                "dropped invalid segment references"
            );
        }
        let now = now_unix();
        Self {
            file_size,
            source_archive_path: source_archive_path.into(),
            status,
            segments,
            encryption,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Sum of declared encoded sizes.
    pub fn encoded_size(&self) -> u64 {
        self.segments.iter().map(|s| s.segment_size).sum()
    }
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
