//! On-disk framing of one metadata record: magic, version byte, CBOR body.

use std::io::{Read, Write};

use crate::domain::FileMetadata;
use crate::error::{NzbfsError, Result};

pub const MAGIC: &[u8; 8] = b"NZBMETA\0";
pub const VERSION: u8 = 1;
pub const EXTENSION: &str = "meta";

pub fn write_record(mut w: impl Write, meta: &FileMetadata) -> Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(&[VERSION])?;
    ciborium::into_writer(meta, &mut w)
        .map_err(|e| NzbfsError::Format(format!("encode metadata: {e}")))?;
    w.flush()?;
    Ok(())
}

pub fn read_record(mut r: impl Read) -> Result<FileMetadata> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)
        .map_err(|e| NzbfsError::Format(format!("truncated metadata header: {e}")))?;
    if &magic != MAGIC {
        return Err(NzbfsError::Format("bad metadata magic".into()));
    }
    let mut v = [0u8; 1];
    r.read_exact(&mut v)?;
    if v[0] != VERSION {
        return Err(NzbfsError::Format(format!(
            "unsupported metadata version {}",
            v[0]
        )));
    }
    ciborium::from_reader(r).map_err(|e| NzbfsError::Format(format!("decode metadata: {e}")))
}

pub fn encode(meta: &FileMetadata) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    write_record(&mut buf, meta)?;
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<FileMetadata> {
    read_record(bytes)
}
