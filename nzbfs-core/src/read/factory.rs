use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{FileMetadata, now_unix};
use crate::error::{NzbfsError, Result};
use crate::read::plan::{EstimatingPlanner, SegmentPlan, SegmentPlanner};
use crate::read::window::window_limit;

pub type SegmentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opaque handle to the remote connection pool.
pub trait ConnectionPool: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait PoolProvider: Send + Sync {
    fn get_pool(&self) -> Result<Arc<dyn ConnectionPool>>;
}

/// Remote fetch side: turns a plan into decoded bytes. Dropping the returned
/// future or stream must release any connections it holds.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open_reader(
        &self,
        pool: Arc<dyn ConnectionPool>,
        plan: SegmentPlan,
        workers: usize,
        cancel: CancellationToken,
    ) -> Result<SegmentStream>;
}

/// Byte source for `[start, end]` (inclusive) of a virtual file.
#[async_trait]
pub trait ReaderFactory: Send + Sync {
    async fn new_reader(
        &self,
        meta: &FileMetadata,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream>;
}

/// Bounds every read to a segment window sized from the worker count and the
/// requested range, then hands the plan to the remote opener.
pub struct SegmentReaderFactory {
    pool: Option<Arc<dyn PoolProvider>>,
    opener: Option<Arc<dyn StreamOpener>>,
    planner: Arc<dyn SegmentPlanner>,
    workers: usize,
}

impl SegmentReaderFactory {
    pub fn new(workers: usize) -> Self {
        Self {
            pool: None,
            opener: None,
            planner: Arc::new(EstimatingPlanner::new()),
            workers: if workers == 0 {
                crate::config::DEFAULT_WORKERS
            } else {
                workers
            },
        }
    }

    pub fn with_pool_provider(mut self, pool: Arc<dyn PoolProvider>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn StreamOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn SegmentPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl ReaderFactory for SegmentReaderFactory {
    async fn new_reader(
        &self,
        meta: &FileMetadata,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream> {
        let pool_provider = self.pool.as_ref().ok_or(NzbfsError::NotConfigured("usenet pool"))?;
        let opener = self
            .opener
            .as_ref()
            .ok_or(NzbfsError::NotConfigured("stream opener"))?;
        if cancel.is_cancelled() {
            return Err(NzbfsError::Cancelled);
        }
        let limit = window_limit(self.workers, end.saturating_sub(start).saturating_add(1));
        let pool = pool_provider.get_pool().inspect_err(|e| {
            warn!(start, end, limit, error = %e, "usenet pool unavailable");
        })?;
        let plan = self
            .planner
            .build_plan(meta, start, end, limit)
            .inspect_err(|e| {
                warn!(
                    nzb = %meta.source_archive_path.trim(),
                    start,
                    end,
                    limit,
                    error = %e,
                    "segment plan failed"
                );
            })?;

        info!(
            nzb = %meta.source_archive_path.trim(),
            start,
            end,
            segments = plan.segment_count(),
            size = meta.file_size,
            groups = %plan.summarize_groups(),
            limit,
            created = meta.created_at,
            age_secs = now_unix().saturating_sub(meta.created_at),
            "segment reader start"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NzbfsError::Cancelled),
            r = opener.open_reader(pool, plan, self.workers, cancel.clone()) => r,
        };
        if let Err(e) = &opened {
            warn!(start, end, limit, error = %e, "segment reader error");
        }
        opened
    }
}
