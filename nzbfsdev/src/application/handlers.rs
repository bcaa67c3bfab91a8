use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use nzbfs_core::error::{NzbfsError, Result};
use nzbfs_core::registry::metadata_key;
use nzbfs_core::store_factory::{Backend, open_store};
use nzbfs_core::{
    FileStatus, MetadataReader, MetadataStore, PathWithArgs, RangeHeader, Registry,
    SegmentOffsets, SegmentReaderFactory, StoreParams, StreamingConfig, VirtualFs, spawn_sweeper,
    window_limit,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub fn load_config(
    config: Option<PathBuf>,
    metadata_root: Option<PathBuf>,
    stream_root: Option<PathBuf>,
) -> Result<StreamingConfig> {
    let mut cfg = match config {
        Some(p) => StreamingConfig::load(&p)?,
        None => StreamingConfig::default(),
    };
    if let Some(root) = metadata_root {
        cfg.metadata_root = root;
    }
    if let Some(root) = stream_root {
        cfg.stream_root = root;
    }
    debug!(
        metadata_root = %cfg.metadata_root.display(),
        stream_root = %cfg.stream_root.display(),
        "config loaded"
    );
    Ok(cfg)
}

fn store_from_config(cfg: &StreamingConfig) -> Result<Arc<dyn MetadataStore>> {
    open_store(
        Backend::Fs,
        StoreParams {
            root: cfg.metadata_root.clone(),
        },
    )
}

fn registry_from_config(cfg: &StreamingConfig) -> Result<Registry> {
    Ok(Registry::new(
        store_from_config(cfg)?,
        cfg.stream_root.clone(),
        cfg.max_age(),
    ))
}

pub fn handle_register(cfg: &StreamingConfig, nzb: PathBuf, name: Option<String>) -> Result<()> {
    let bytes = fs::read(&nzb)?;
    let name = name.unwrap_or_else(|| {
        nzb.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let reg = registry_from_config(cfg)?.register(&bytes, &name)?;
    println!("{}\t{}\t{}", reg.path, reg.size, reg.archive_path.display());
    Ok(())
}

pub fn handle_ls(cfg: &StreamingConfig, dir: &str, long: bool) -> Result<()> {
    let reader = MetadataReader::new(store_from_config(cfg)?);
    let (dirs, files) = reader.list_directory_contents(&metadata_key(dir)?)?;
    for d in dirs {
        if long {
            println!("d {:>14} {:>9} {:>12} {}/", "-", "-", "-", d.name);
        } else {
            println!("{}/", d.name);
        }
    }
    for f in files {
        if long {
            println!(
                "- {:>14} {:>9} {:>12} {}",
                f.metadata.file_size, f.metadata.status, f.metadata.modified_at, f.name
            );
        } else {
            println!("{}", f.name);
        }
    }
    Ok(())
}

pub fn handle_stat(cfg: &StreamingConfig, path: &str) -> Result<()> {
    let reader = MetadataReader::new(store_from_config(cfg)?);
    let status = reader
        .get_file_metadata(&metadata_key(path)?)?
        .map(|m| m.status);
    let vfs = VirtualFs::new(reader, Arc::new(SegmentReaderFactory::new(cfg.workers())))
        .with_chunk_bytes(cfg.chunk_bytes());
    let desc = vfs.describe(path)?;
    println!("virtual_path:   {}", desc.virtual_path);
    println!("metadata_key:   {}", desc.normalized_path);
    println!("source_archive: {}", desc.source_archive);
    println!("size:           {}", desc.file_size);
    println!("segments:       {}", desc.segment_count);
    if let Some(status) = status {
        println!("status:         {status}");
    }
    if let Some(created) = desc.created_at {
        println!("created_at:     {created}");
    }
    Ok(())
}

pub fn handle_segments(cfg: &StreamingConfig, path: &str) -> Result<()> {
    let reader = MetadataReader::new(store_from_config(cfg)?);
    let segments = reader.get_file_segments(&metadata_key(path)?)?;
    for (i, s) in segments.iter().enumerate() {
        match s.offsets {
            SegmentOffsets::Resolved { start, end } => {
                println!("{i:>6} {:>10} [{start}..{end}] {}", s.segment_size, s.id)
            }
            SegmentOffsets::Unresolved => println!("{i:>6} {:>10} [?] {}", s.segment_size, s.id),
        }
    }
    Ok(())
}

pub fn handle_rm(cfg: &StreamingConfig, path: &str) -> Result<()> {
    let key = metadata_key(path)?;
    store_from_config(cfg)?.delete(&key)?;
    println!("removed {key}");
    Ok(())
}

pub fn handle_status(cfg: &StreamingConfig, path: &str, status: &str) -> Result<()> {
    let status: FileStatus = status.parse()?;
    let key = metadata_key(path)?;
    store_from_config(cfg)?.update_status(&key, status)?;
    println!("{key}: {status}");
    Ok(())
}

pub fn handle_sweep(cfg: &StreamingConfig, watch: bool) -> Result<()> {
    if cfg.max_age().is_none() {
        return Err(NzbfsError::InvalidArgument(
            "eviction disabled (max_age_secs = 0)".into(),
        ));
    }
    let registry = registry_from_config(cfg)?;
    if !watch {
        let report = registry.sweep();
        println!("removed {} failed {}", report.removed, report.failed);
        return Ok(());
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(Arc::new(registry), cfg.sweep_interval(), cancel.clone());
        info!(interval_secs = cfg.sweep_interval().as_secs(), "watching for stale registrations");
        tokio::signal::ctrl_c().await?;
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "sweeper task failed");
        }
        Ok::<_, NzbfsError>(())
    })
}

pub fn handle_window(cfg: &StreamingConfig, range_len: u64, workers: Option<usize>) -> Result<()> {
    let workers = workers.unwrap_or_else(|| cfg.workers());
    println!("{}", window_limit(workers, range_len));
    Ok(())
}

pub fn handle_range(header: &str, total: u64) -> Result<()> {
    let range = RangeHeader::parse(header)?;
    let (offset, len) = range.decode(total);
    let len = len.map_or_else(|| "to end".to_string(), |n| n.to_string());
    println!("parsed:  {range}");
    println!("decoded: offset {offset} length {len}");
    match range.fix(total) {
        Some(fixed) => println!("fixed:   {}", fixed.to_header()),
        None => println!("fixed:   unsatisfiable"),
    }
    Ok(())
}

pub fn handle_args(encoded: &str) -> Result<()> {
    let pa = PathWithArgs::parse(encoded)?;
    println!("path: {}", pa.path);
    for (k, v) in &pa.args {
        println!("arg:  {k} = {v}");
    }
    if let Some(range) = pa.range()? {
        println!("range: {}", range.to_header());
    }
    if let Some(size) = pa.file_size()? {
        println!("file_size: {size}");
    }
    println!("is_copy: {}", pa.is_copy());
    if let Some(origin) = pa.origin() {
        println!("origin: {origin}");
    }
    Ok(())
}
