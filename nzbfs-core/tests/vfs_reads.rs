use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use nzbfs_core::vfs::{StoreHealthReporter, VirtualNode};
use nzbfs_core::{
    Encryption, FileMetadata, FileStatus, InMemMetadataStore, MetadataReader, MetadataStore,
    NzbfsError, PathWithArgs, ReaderFactory, SegmentRef, SegmentStream, VirtualFs,
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;

const CONTENT: &[u8] = b"0123456789";

struct Failing;

impl AsyncRead for Failing {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("article not found")))
    }
}

/// Serves `CONTENT`, optionally failing after `fail_after` bytes of each
/// reader, and records every requested window.
#[derive(Default)]
struct FakeFactory {
    fail_after: Option<usize>,
    truncate_to: Option<usize>,
    /// Most bytes one reader serves, like a window-bounded plan.
    per_reader: Option<usize>,
    calls: Mutex<Vec<(u64, u64)>>,
}

#[async_trait]
impl ReaderFactory for FakeFactory {
    async fn new_reader(
        &self,
        _meta: &FileMetadata,
        start: u64,
        end: u64,
        _cancel: &CancellationToken,
    ) -> nzbfs_core::Result<SegmentStream> {
        self.calls.lock().unwrap().push((start, end));
        let limit = self.truncate_to.unwrap_or(CONTENT.len());
        let from = (start as usize).min(limit);
        let mut to = (end as usize + 1).min(limit);
        if let Some(cap) = self.per_reader {
            to = to.min(from + cap);
        }
        let bytes = CONTENT[from..to].to_vec();
        match self.fail_after {
            Some(n) => {
                let head = bytes[..n.min(bytes.len())].to_vec();
                Ok(Box::new(io::Cursor::new(head).chain(Failing)))
            }
            None => Ok(Box::new(io::Cursor::new(bytes))),
        }
    }
}

fn meta(encryption: Encryption) -> FileMetadata {
    FileMetadata::create(
        CONTENT.len() as u64,
        "/nzbs/a.nzb",
        FileStatus::Healthy,
        vec![SegmentRef::new("a@x", 14).unwrap()],
        encryption,
    )
}

fn setup(factory: Arc<FakeFactory>) -> (Arc<InMemMetadataStore>, VirtualFs) {
    let store = Arc::new(InMemMetadataStore::new());
    store.write("movies/a.mkv", &meta(Encryption::None)).unwrap();
    let vfs = VirtualFs::new(MetadataReader::new(store.clone()), factory)
        .with_health_reporter(Arc::new(StoreHealthReporter::new(store.clone())));
    (store, vfs)
}

fn open_file(vfs: &VirtualFs, args: PathWithArgs) -> nzbfs_core::vfs::VirtualFile {
    let path = args.path.clone();
    match vfs.open(&path, args, CancellationToken::new()).unwrap() {
        Some(VirtualNode::File(f)) => f,
        _ => panic!("expected a file at {path}"),
    }
}

#[tokio::test]
async fn open_ended_read_is_chunked() {
    let factory = Arc::new(FakeFactory::default());
    let (_store, vfs) = setup(factory.clone());
    let vfs = vfs.with_chunk_bytes(4);

    let mut file = open_file(&vfs, PathWithArgs::new("streams/movies/a.mkv"));
    let mut out = Vec::new();
    assert_eq!(file.read_to_end(&mut out).await.unwrap(), 10);
    assert_eq!(out, CONTENT);
    assert_eq!(*factory.calls.lock().unwrap(), vec![(0, 3), (4, 7), (8, 9)]);
}

#[tokio::test]
async fn bounded_range_is_one_request() {
    let factory = Arc::new(FakeFactory::default());
    let (_store, vfs) = setup(factory.clone());
    let vfs = vfs.with_chunk_bytes(4);

    let mut args = PathWithArgs::new("movies/a.mkv");
    args.set_range("bytes=2-7");
    let mut file = open_file(&vfs, args);
    assert_eq!(file.stat().size, 6);
    assert_eq!(file.range_info(), (2, Some(7), 10));

    let mut out = Vec::new();
    file.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"234567");
    assert_eq!(*factory.calls.lock().unwrap(), vec![(2, 7)]);
}

#[tokio::test]
async fn window_bounded_readers_are_resumed() {
    let factory = Arc::new(FakeFactory {
        per_reader: Some(4),
        ..Default::default()
    });
    let (_store, vfs) = setup(factory.clone());

    let mut args = PathWithArgs::new("movies/a.mkv");
    args.set_range("bytes=0-9");
    let mut file = open_file(&vfs, args);
    let mut out = Vec::new();
    file.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, CONTENT);
    assert_eq!(*factory.calls.lock().unwrap(), vec![(0, 9), (4, 9), (8, 9)]);
}

#[tokio::test]
async fn unparsable_range_serves_whole_file() {
    let (_store, vfs) = setup(Arc::new(FakeFactory::default()));
    let mut args = PathWithArgs::new("movies/a.mkv");
    args.set_range("lines=1-2");
    let file = open_file(&vfs, args);
    assert_eq!(file.range_info(), (0, Some(9), 10));
}

#[tokio::test]
async fn failure_after_some_bytes_is_partial_content() {
    let factory = Arc::new(FakeFactory {
        fail_after: Some(3),
        ..Default::default()
    });
    let (store, vfs) = setup(factory);

    let mut file = open_file(&vfs, PathWithArgs::new("movies/a.mkv"));
    let mut out = Vec::new();
    let err = file.read_to_end(&mut out).await.unwrap_err();
    match err {
        NzbfsError::PartialContent {
            bytes_read,
            expected,
            ..
        } => assert_eq!((bytes_read, expected), (3, 10)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(out, b"012");
    let status = store.read("movies/a.mkv").unwrap().unwrap().status;
    assert_eq!(status, FileStatus::Partial);
}

#[tokio::test]
async fn early_end_of_source_is_partial_content() {
    let factory = Arc::new(FakeFactory {
        truncate_to: Some(6),
        ..Default::default()
    });
    let (_store, vfs) = setup(factory);

    let mut file = open_file(&vfs, PathWithArgs::new("movies/a.mkv"));
    let mut out = Vec::new();
    let err = file.read_to_end(&mut out).await.unwrap_err();
    assert!(matches!(err, NzbfsError::PartialContent { bytes_read: 6, .. }));
}

#[tokio::test]
async fn failure_before_any_byte_marks_file_corrupted() {
    let factory = Arc::new(FakeFactory {
        fail_after: Some(0),
        ..Default::default()
    });
    let (store, vfs) = setup(factory);

    let mut file = open_file(&vfs, PathWithArgs::new("movies/a.mkv"));
    let mut buf = [0u8; 16];
    let err = file.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, NzbfsError::Corrupted { expected: 10, .. }));
    assert!(err.is_content_error());

    let status = store.read("movies/a.mkv").unwrap().unwrap().status;
    assert_eq!(status, FileStatus::Corrupted);
    let reopen = vfs.open(
        "movies/a.mkv",
        PathWithArgs::new("movies/a.mkv"),
        CancellationToken::new(),
    );
    assert!(matches!(reopen, Err(NzbfsError::FileCorrupted)));
}

#[tokio::test]
async fn encrypted_file_without_cipher_fails() {
    let (store, vfs) = setup(Arc::new(FakeFactory::default()));
    store
        .write(
            "movies/secret.mkv",
            &meta(Encryption::Rclone {
                key_ref: "k1".into(),
                iv: "00".into(),
            }),
        )
        .unwrap();

    let mut file = open_file(&vfs, PathWithArgs::new("movies/secret.mkv"));
    let mut buf = [0u8; 4];
    let err = file.read(&mut buf).await.unwrap_err();
    assert!(matches!(err, NzbfsError::NoCipherConfig));
}

#[tokio::test]
async fn closed_file_reads_nothing() {
    let (_store, vfs) = setup(Arc::new(FakeFactory::default()));
    let mut file = open_file(&vfs, PathWithArgs::new("movies/a.mkv"));
    file.close();
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);
}

#[test]
fn open_resolves_directories() {
    let (_store, vfs) = setup(Arc::new(FakeFactory::default()));
    let cancel = CancellationToken::new();

    let root = vfs.open("", PathWithArgs::new(""), cancel.clone()).unwrap();
    assert!(root.is_some_and(|n| n.is_dir()));

    let streams = vfs
        .open("streams", PathWithArgs::new("streams"), cancel.clone())
        .unwrap();
    assert!(streams.is_some_and(|n| n.is_dir()));

    match vfs.open("movies", PathWithArgs::new("movies"), cancel.clone()).unwrap() {
        Some(VirtualNode::Directory(d)) => {
            assert_eq!(d.read_dir_names(0).unwrap(), vec!["a.mkv".to_string()]);
        }
        _ => panic!("movies should be a directory"),
    }

    // a missing child of an existing directory lists as empty
    match vfs
        .open("movies/extra", PathWithArgs::new("movies/extra"), cancel.clone())
        .unwrap()
    {
        Some(VirtualNode::Directory(d)) => assert!(d.read_dir(0).unwrap().is_empty()),
        _ => panic!("expected an empty directory"),
    }

    let missing = vfs
        .open("nowhere/deep", PathWithArgs::new("nowhere/deep"), cancel.clone())
        .unwrap();
    assert!(missing.is_none());

    assert!(matches!(
        vfs.open("../etc", PathWithArgs::new("../etc"), cancel),
        Err(NzbfsError::InvalidPath(_))
    ));
}

#[test]
fn describe_reports_metadata() {
    let (_store, vfs) = setup(Arc::new(FakeFactory::default()));
    let d = vfs.describe("streams/movies/a.mkv").unwrap();
    assert_eq!(d.normalized_path, "movies/a.mkv");
    assert_eq!(d.file_size, 10);
    assert_eq!(d.segment_count, 1);
    assert_eq!(d.source_archive, "/nzbs/a.nzb");
    assert!(matches!(
        vfs.describe("movies/none.mkv"),
        Err(NzbfsError::NotFound(_))
    ));
}
