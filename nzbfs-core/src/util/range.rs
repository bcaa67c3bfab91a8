//! HTTP-style single byte ranges (`bytes=START-END`, `bytes=START-`,
//! `bytes=-SUFFIX`).

use crate::error::{NzbfsError, Result};

const UNIT_PREAMBLE: &str = "bytes=";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeHeader {
    /// Inclusive `[start, end]`.
    Bounded { start: u64, end: u64 },
    /// `start` to the end of the resource.
    OpenEnded { start: u64 },
    /// The last `len` bytes of the resource.
    Suffix { len: u64 },
}

impl RangeHeader {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let body = text.strip_prefix(UNIT_PREAMBLE).ok_or_else(|| {
            NzbfsError::InvalidRange(format!("unsupported range unit in {text:?}"))
        })?;
        if body.contains(',') {
            return Err(NzbfsError::InvalidRange(format!(
                "multiple ranges are not supported: {text:?}"
            )));
        }
        let (first, last) = body
            .split_once('-')
            .ok_or_else(|| NzbfsError::InvalidRange(format!("missing '-' in {text:?}")))?;
        let (first, last) = (first.trim(), last.trim());

        match (first.is_empty(), last.is_empty()) {
            (true, true) => Err(NzbfsError::InvalidRange(format!("empty range {text:?}"))),
            (true, false) => match parse_bound(last, text)? {
                0 => Err(NzbfsError::InvalidRange(format!(
                    "zero-length suffix in {text:?}"
                ))),
                len => Ok(RangeHeader::Suffix { len }),
            },
            (false, true) => Ok(RangeHeader::OpenEnded {
                start: parse_bound(first, text)?,
            }),
            (false, false) => {
                let start = parse_bound(first, text)?;
                let end = parse_bound(last, text)?;
                if end < start {
                    return Err(NzbfsError::InvalidRange(format!(
                        "range end precedes start in {text:?}"
                    )));
                }
                Ok(RangeHeader::Bounded { start, end })
            }
        }
    }

    /// Zero-based offset and byte count. `None` means "read to end". An
    /// inverted bounded range decodes to zero bytes.
    pub fn decode(&self, total_size: u64) -> (u64, Option<u64>) {
        match *self {
            RangeHeader::Bounded { start, end } if end < start => (start, Some(0)),
            RangeHeader::Bounded { start, end } => (start, Some(end - start + 1)),
            RangeHeader::OpenEnded { start } => (start, None),
            RangeHeader::Suffix { len } => (total_size.saturating_sub(len), None),
        }
    }

    /// Resolve against a known total into absolute, in-bounds coordinates.
    /// Returns `None` when no byte can be addressed: an empty resource, an
    /// empty suffix or an inverted bounded range.
    pub fn fix(&self, total_size: u64) -> Option<RangeHeader> {
        match *self {
            _ if total_size == 0 => return None,
            RangeHeader::Suffix { len: 0 } => return None,
            RangeHeader::Bounded { start, end } if end < start => return None,
            _ => {}
        }
        let last = total_size - 1;
        let (start, end) = match *self {
            RangeHeader::Suffix { len } => (total_size.saturating_sub(len), last),
            RangeHeader::OpenEnded { start } => (start.min(last), last),
            RangeHeader::Bounded { start, end } => (start.min(last), end.min(last)),
        };
        Some(RangeHeader::Bounded { start, end })
    }

    pub fn to_header(&self) -> String {
        match *self {
            RangeHeader::Bounded { start, end } => format!("{UNIT_PREAMBLE}{start}-{end}"),
            RangeHeader::OpenEnded { start } => format!("{UNIT_PREAMBLE}{start}-"),
            RangeHeader::Suffix { len } => format!("{UNIT_PREAMBLE}-{len}"),
        }
    }
}

impl std::fmt::Display for RangeHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_header())
    }
}

impl std::str::FromStr for RangeHeader {
    type Err = NzbfsError;

    fn from_str(s: &str) -> Result<Self> {
        RangeHeader::parse(s)
    }
}

fn parse_bound(raw: &str, whole: &str) -> Result<u64> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NzbfsError::InvalidRange(format!(
            "non-numeric bound {raw:?} in {whole:?}"
        )));
    }
    raw.parse::<u64>()
        .map_err(|e| NzbfsError::InvalidRange(format!("{raw:?} in {whole:?}: {e}")))
}
