use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::FileMetadata;
use crate::error::{NzbfsError, Result};
use crate::read::factory::{ReaderFactory, SegmentStream};
use crate::util::path_args::PathWithArgs;
use crate::util::range::RangeHeader;
use crate::vfs::{EncryptionAdapter, FileDescriptor, FileInfo, HealthReporter};

/// Absolute byte window a file handle serves. `end` is `None` only for an
/// empty file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedRange {
    pub start: u64,
    pub end: Option<u64>,
    /// No explicit end was requested; fetch in streaming chunks.
    pub open_ended: bool,
}

impl ResolvedRange {
    pub(crate) fn resolve(size: u64, requested: Option<RangeHeader>) -> Self {
        let open_ended = matches!(requested, None | Some(RangeHeader::OpenEnded { .. }));
        let fixed = requested
            .unwrap_or(RangeHeader::OpenEnded { start: 0 })
            .fix(size);
        match fixed {
            Some(RangeHeader::Bounded { start, end }) => Self {
                start,
                end: Some(end),
                open_ended,
            },
            _ => Self {
                start: 0,
                end: None,
                open_ended,
            },
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.end.map_or(0, |e| e - self.start + 1)
    }
}

/// Read handle over one virtual file, serving the range carried in its
/// path arguments.
pub struct VirtualFile {
    name: String,
    path: String,
    meta: FileMetadata,
    factory: Arc<dyn ReaderFactory>,
    health: Option<Arc<dyn HealthReporter>>,
    encryption: Option<Arc<dyn EncryptionAdapter>>,
    chunk_bytes: u64,
    cancel: CancellationToken,
    range: ResolvedRange,
    current: u64,
    reader: Option<SegmentStream>,
    /// Inclusive end of the sub-range `reader` serves.
    reader_end: u64,
    /// `reader` has delivered at least one byte.
    reader_progressed: bool,
    closed: bool,
}

pub(crate) struct FileParts {
    pub name: String,
    pub path: String,
    pub meta: FileMetadata,
    pub args: PathWithArgs,
    pub factory: Arc<dyn ReaderFactory>,
    pub health: Option<Arc<dyn HealthReporter>>,
    pub encryption: Option<Arc<dyn EncryptionAdapter>>,
    pub chunk_bytes: u64,
    pub cancel: CancellationToken,
}

impl VirtualFile {
    pub(crate) fn new(p: FileParts) -> Self {
        let requested = match p.args.range() {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %p.path, error = %e, "ignoring unparsable range argument");
                None
            }
        };
        let range = ResolvedRange::resolve(p.meta.file_size, requested);
        if let Some(hdr) = requested {
            info!(
                path = %p.path,
                requested = %hdr,
                start = range.start,
                end = ?range.end,
                range_size = range.len(),
                file_size = p.meta.file_size,
                "range initialized"
            );
        }
        Self {
            name: p.name,
            path: p.path,
            meta: p.meta,
            factory: p.factory,
            health: p.health,
            encryption: p.encryption,
            chunk_bytes: p.chunk_bytes.max(1),
            cancel: p.cancel,
            current: range.start,
            range,
            reader: None,
            reader_end: 0,
            reader_progressed: false,
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.meta
    }

    /// `(start, end, total)`; `end` is `None` for an empty file.
    pub fn range_info(&self) -> (u64, Option<u64>, u64) {
        (self.range.start, self.range.end, self.meta.file_size)
    }

    /// Size reported is the length of the served range.
    pub fn stat(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.range.len(),
            is_dir: false,
            modified: self.meta.modified_at,
        }
    }

    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor::from_metadata(&self.name, &self.path, &self.meta)
    }

    /// Sequential read. `Ok(0)` once the range is exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed || buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(end) = self.range.end else {
                return Ok(0);
            };
            if self.current > end {
                self.reader = None;
                return Ok(0);
            }
            if self.reader.is_none() {
                self.open_sub_range(end).await?;
            }
            let want = (self.reader_end - self.current + 1).min(buf.len() as u64) as usize;
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };
            let res = reader.read(&mut buf[..want]).await;
            match res {
                // plans are window-bounded; resume past what was served
                Ok(0) if self.current <= self.reader_end && self.reader_progressed => {
                    debug!(path = %self.path, at = self.current, "segment window exhausted, reopening");
                    self.reader = None;
                }
                Ok(0) if self.current <= self.reader_end => {
                    self.reader = None;
                    let short = std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!(
                            "source ended at byte {} of range ending {}",
                            self.current, self.reader_end
                        ),
                    );
                    return Err(self.content_error(short.into()));
                }
                Ok(0) => self.reader = None,
                Ok(n) => {
                    self.current += n as u64;
                    self.reader_progressed = true;
                    if self.current > self.reader_end {
                        self.reader = None;
                    }
                    return Ok(n);
                }
                Err(e) => {
                    self.reader = None;
                    return Err(self.content_error(e.into()));
                }
            }
        }
    }

    /// Drain the rest of the range.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.reader = None;
    }

    async fn open_sub_range(&mut self, end: u64) -> Result<()> {
        let start = self.current;
        let mut sub_end = end;
        if self.range.open_ended {
            sub_end = sub_end.min(start.saturating_add(self.chunk_bytes - 1));
        }

        let mut stream = self
            .factory
            .new_reader(&self.meta, start, sub_end, &self.cancel)
            .await?;
        if self.meta.encryption.is_encrypted() {
            let adapter = self.encryption.as_ref().ok_or(NzbfsError::NoCipherConfig)?;
            stream = adapter.wrap(&self.meta, start, sub_end, stream).await?;
        }
        let len = sub_end - start + 1;
        debug!(path = %self.path, start, end = sub_end, len, "issuing range reader");
        self.reader = Some(Box::new(stream.take(len)));
        self.reader_end = sub_end;
        self.reader_progressed = false;
        Ok(())
    }

    /// Classify a mid-stream failure and report it.
    fn content_error(&self, cause: NzbfsError) -> NzbfsError {
        let delivered = self.current - self.range.start;
        let expected = self.range.len();
        let err = if delivered > 0 {
            NzbfsError::PartialContent {
                bytes_read: delivered,
                expected,
                source: Box::new(cause),
            }
        } else {
            NzbfsError::Corrupted {
                expected,
                source: Box::new(cause),
            }
        };
        if let Some(h) = &self.health {
            if delivered > 0 {
                h.mark_partial(&self.path, &err);
            } else {
                h.mark_corrupted(&self.path, &err);
            }
        }
        warn!(path = %self.path, delivered, expected, error = %err, "read failed");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_covers_header_shapes() {
        let full = ResolvedRange::resolve(1000, None);
        assert_eq!((full.start, full.end, full.open_ended), (0, Some(999), true));

        let suffix = ResolvedRange::resolve(1000, Some(RangeHeader::Suffix { len: 200 }));
        assert_eq!((suffix.start, suffix.end, suffix.open_ended), (800, Some(999), false));

        let clamped =
            ResolvedRange::resolve(1000, Some(RangeHeader::Bounded { start: 990, end: 5000 }));
        assert_eq!((clamped.start, clamped.end), (990, Some(999)));
        assert_eq!(clamped.len(), 10);

        let open = ResolvedRange::resolve(1000, Some(RangeHeader::OpenEnded { start: 10 }));
        assert!(open.open_ended);
        assert_eq!(open.len(), 990);

        let empty = ResolvedRange::resolve(0, Some(RangeHeader::Bounded { start: 0, end: 5 }));
        assert_eq!(empty.end, None);
        assert_eq!(empty.len(), 0);

        let nothing = ResolvedRange::resolve(1000, Some(RangeHeader::Suffix { len: 0 }));
        assert_eq!(nothing.end, None);
        assert_eq!(nothing.len(), 0);
    }
}
