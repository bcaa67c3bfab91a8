#![forbid(unsafe_code)]

pub mod config;
pub mod content_type;
pub mod domain;
pub mod error;
pub mod registry;
pub mod store;
pub mod store_factory;
pub mod store_fs;

pub mod util {
    pub mod path_args;
    pub mod range;
    pub mod sanitize;
}

pub mod container {
    pub mod record;
}

pub mod index {
    pub mod inmem;
}

pub mod meta {
    pub mod reader;
}

pub mod nzb {
    pub mod parser;
    pub mod select;
}

pub mod read {
    pub mod factory;
    pub mod plan;
    pub mod window;
}

pub mod vfs;

// Re-exports: stable API surface
pub use config::StreamingConfig;
pub use domain::{Encryption, FileMetadata, FileStatus, SegmentOffsets, SegmentRef};
pub use error::{NzbfsError, Result};
pub use index::inmem::InMemMetadataStore;
pub use meta::reader::{DirectoryInfo, MetadataReader, VirtualFileEntry};
pub use read::factory::{
    ConnectionPool, PoolProvider, ReaderFactory, SegmentReaderFactory, SegmentStream, StreamOpener,
};
pub use read::plan::{EstimatingPlanner, PlannedSegment, SegmentPlan, SegmentPlanner};
pub use read::window::window_limit;
pub use registry::{Registration, Registry, SweepReport, spawn_sweeper};
pub use store::{MetadataStore, StoreParams};
pub use store_factory::{Backend, open_store};
pub use store_fs::FsMetadataStore;
pub use util::path_args::PathWithArgs;
pub use util::range::RangeHeader;
pub use vfs::{FileDescriptor, FileInfo, VirtualFs, VirtualNode};
