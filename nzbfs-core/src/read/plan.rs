use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::domain::{FileMetadata, SegmentRef};
use crate::error::{NzbfsError, Result};
use crate::nzb::parser::parse_nzb;

/// One segment of a plan and the inclusive byte span to take from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedSegment {
    pub id: String,
    /// Offsets within the decoded segment.
    pub read_start: u64,
    pub read_end: u64,
    /// Decoded size, exact when resolved, estimated otherwise.
    pub segment_size: u64,
    pub groups: Vec<String>,
}

impl PlannedSegment {
    pub fn byte_len(&self) -> u64 {
        self.read_end - self.read_start + 1
    }
}

/// Contiguous, declaration-ordered run of segments covering `[start, end]`
/// (or a prefix of it when the window limit cut the run short).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentPlan {
    pub start: u64,
    pub end: u64,
    pub segments: Vec<PlannedSegment>,
}

impl SegmentPlan {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn byte_len(&self) -> u64 {
        self.segments.iter().map(PlannedSegment::byte_len).sum()
    }

    /// `group:count` pairs sorted by group, or `none`.
    pub fn summarize_groups(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for g in self.segments.iter().flat_map(|s| s.groups.iter()) {
            *counts.entry(g.trim()).or_default() += 1;
        }
        if counts.is_empty() {
            return "none".to_string();
        }
        counts
            .into_iter()
            .map(|(g, n)| format!("{g}:{n}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub trait SegmentPlanner: Send + Sync {
    /// Window of at most `max_segments` segments (0 = unbounded) covering
    /// `[start, end]`. `end` past the file is clamped.
    fn build_plan(
        &self,
        meta: &FileMetadata,
        start: u64,
        end: u64,
        max_segments: usize,
    ) -> Result<SegmentPlan>;
}

/// Plans against decoded offsets when resolved, otherwise against an
/// estimate of 97% of the encoded size.
///
/// Newsgroups come from the stored NZB, parsed once per archive path. A
/// registered archive never changes under its path, so hits are not
/// revalidated.
#[derive(Debug, Default)]
pub struct EstimatingPlanner {
    groups: DashMap<String, Arc<SegmentGroups>>,
}

const ESTIMATE_PERCENT: u64 = 97;
const GROUP_CACHE_ENTRIES: usize = 64;

type SegmentGroups = HashMap<String, Vec<String>>;

impl EstimatingPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    fn groups_for(&self, archive_path: &str) -> Result<Arc<SegmentGroups>> {
        if let Some(hit) = self.groups.get(archive_path) {
            return Ok(Arc::clone(hit.value()));
        }
        let groups = Arc::new(groups_by_segment(archive_path)?);
        if self.groups.len() >= GROUP_CACHE_ENTRIES {
            self.groups.clear();
        }
        self.groups.insert(archive_path.to_string(), Arc::clone(&groups));
        Ok(groups)
    }
}

pub fn estimated_decoded_size(seg: &SegmentRef) -> u64 {
    if let Some(len) = seg.offsets.decoded_len() {
        return len;
    }
    match seg.segment_size * ESTIMATE_PERCENT / 100 {
        0 => seg.segment_size,
        n => n,
    }
}

/// Segment id -> newsgroups of its file, read from the stored NZB.
fn groups_by_segment(archive_path: &str) -> Result<SegmentGroups> {
    if archive_path.trim().is_empty() {
        return Err(NzbfsError::NotFound("empty archive path".into()));
    }
    let nzb = parse_nzb(&std::fs::read(archive_path)?)?;
    let mut map = HashMap::new();
    for f in &nzb.files {
        let groups: Vec<String> = f
            .groups
            .groups
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        for s in &f.segments.segments {
            let id = s.id.trim();
            if !id.is_empty() {
                map.insert(id.to_string(), groups.clone());
            }
        }
    }
    Ok(map)
}

impl SegmentPlanner for EstimatingPlanner {
    fn build_plan(
        &self,
        meta: &FileMetadata,
        start: u64,
        end: u64,
        max_segments: usize,
    ) -> Result<SegmentPlan> {
        if meta.file_size == 0 || start >= meta.file_size || end < start {
            return Err(NzbfsError::EmptyPlan { start, end });
        }
        let end = end.min(meta.file_size - 1);

        let groups = self
            .groups_for(&meta.source_archive_path)
            .unwrap_or_else(|e| {
                warn!(nzb = %meta.source_archive_path, error = %e, "cannot read groups for segments");
                Arc::default()
            });

        let mut plan = SegmentPlan {
            start,
            end,
            segments: Vec::new(),
        };
        let mut offset = 0u64;
        for seg in &meta.segments {
            let size = estimated_decoded_size(seg);
            if size == 0 {
                continue;
            }
            let seg_start = offset;
            let seg_end = offset + size - 1;
            offset += size;
            if start > seg_end {
                continue;
            }

            plan.segments.push(PlannedSegment {
                id: seg.id.clone(),
                read_start: start.saturating_sub(seg_start),
                read_end: end.min(seg_end) - seg_start,
                segment_size: size,
                groups: groups.get(&seg.id).cloned().unwrap_or_default(),
            });

            if max_segments > 0 && plan.segments.len() >= max_segments {
                debug!(max_segments, "segment window limit reached");
                break;
            }
            if seg_end >= end {
                break;
            }
        }

        if plan.segments.is_empty() {
            return Err(NzbfsError::EmptyPlan { start, end });
        }
        Ok(plan)
    }
}
