use thiserror::Error;

/// Boxed cause carried by the content-error variants.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum NzbfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid virtual path: {0}")]
    InvalidPath(String),

    #[error("nzb: {0}")]
    Nzb(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("no segments cover bytes {start}-{end}")]
    EmptyPlan { start: u64, end: u64 },

    /// Some bytes were delivered before the underlying source failed.
    #[error("partial content: read {bytes_read}/{expected} bytes, underlying error: {source}")]
    PartialContent {
        bytes_read: u64,
        expected: u64,
        #[source]
        source: Cause,
    },

    /// Nothing could be read against a nonzero expectation.
    #[error("corrupted file: no content available from {expected} expected bytes, underlying error: {source}")]
    Corrupted {
        expected: u64,
        #[source]
        source: Cause,
    },

    #[error("file is corrupted, there are some missing segments")]
    FileCorrupted,

    #[error("no cipher configured for encryption")]
    NoCipherConfig,

    #[error("operation cancelled")]
    Cancelled,

    #[error("remote: {0}")]
    Remote(String),
}

impl NzbfsError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NzbfsError::Cancelled)
    }

    /// True for errors that describe missing or damaged content rather than
    /// a failure of the request itself.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            NzbfsError::PartialContent { .. }
                | NzbfsError::Corrupted { .. }
                | NzbfsError::FileCorrupted
        )
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, NzbfsError>;
