//! A virtual path with an argument bag smuggled after a separator token, for
//! layers that only carry a single string.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::error::{NzbfsError, Result};
use crate::util::range::RangeHeader;

pub const ARGS_SEPARATOR: &str = "?ARGS?";

pub const RANGE_KEY: &str = "webdav context key rangeKey";
pub const FILE_SIZE_KEY: &str = "webdav context key fileSizeKey";
pub const IS_COPY_KEY: &str = "webdav context key isCopyKey";
pub const ORIGIN_KEY: &str = "webdav context key originKey";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathWithArgs {
    pub path: String,
    /// Open bag; unknown keys are preserved as-is.
    pub args: BTreeMap<String, String>,
}

impl PathWithArgs {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: BTreeMap::new(),
        }
    }

    /// Splits on the last separator; the encoded block never holds a raw `?`,
    /// so a separator inside the path survives.
    pub fn parse(text: &str) -> Result<Self> {
        let Some((path, query)) = text.rsplit_once(ARGS_SEPARATOR) else {
            return Ok(Self::new(text));
        };
        validate_percent_encoding(query)?;
        let args = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self {
            path: path.to_string(),
            args,
        })
    }

    pub fn set_range(&mut self, range: &str) {
        self.args.insert(RANGE_KEY.to_string(), range.to_string());
    }

    pub fn set_file_size(&mut self, size: &str) {
        self.args.insert(FILE_SIZE_KEY.to_string(), size.to_string());
    }

    pub fn set_is_copy(&mut self) {
        self.args.insert(IS_COPY_KEY.to_string(), "true".to_string());
    }

    pub fn set_origin(&mut self, origin: &str) {
        self.args.insert(ORIGIN_KEY.to_string(), origin.to_string());
    }

    /// `Ok(None)` when no range was attached.
    pub fn range(&self) -> Result<Option<RangeHeader>> {
        match self.args.get(RANGE_KEY) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => RangeHeader::parse(raw).map(Some),
        }
    }

    /// `Ok(None)` when no size was attached; an error when it is not an integer.
    pub fn file_size(&self) -> Result<Option<u64>> {
        match self.args.get(FILE_SIZE_KEY) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                NzbfsError::InvalidArgument(format!("file size {raw:?}: {e}"))
            }),
        }
    }

    pub fn is_copy(&self) -> bool {
        self.args.contains_key(IS_COPY_KEY)
    }

    pub fn origin(&self) -> Option<&str> {
        self.args.get(ORIGIN_KEY).map(String::as_str)
    }
}

impl std::fmt::Display for PathWithArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.args.is_empty() && !self.path.contains(ARGS_SEPARATOR) {
            return f.write_str(&self.path);
        }
        let mut ser = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.args {
            ser.append_pair(k, v);
        }
        write!(f, "{}{}{}", self.path, ARGS_SEPARATOR, ser.finish())
    }
}

impl std::str::FromStr for PathWithArgs {
    type Err = NzbfsError;

    fn from_str(s: &str) -> Result<Self> {
        PathWithArgs::parse(s)
    }
}

/// `form_urlencoded::parse` is lossy on bad escapes; reject them up front.
fn validate_percent_encoding(query: &str) -> Result<()> {
    let bytes = query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                return Err(NzbfsError::Decode(format!(
                    "invalid percent-encoding at byte {i} of {query:?}"
                )));
            }
            i += 3;
            continue;
        }
        i += 1;
    }
    Ok(())
}
