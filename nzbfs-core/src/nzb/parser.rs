use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::{NzbfsError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Nzb {
    #[serde(rename = "file", default)]
    pub files: Vec<NzbFile>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NzbFile {
    #[serde(rename = "@poster", default)]
    pub poster: Option<String>,
    #[serde(rename = "@date", default)]
    pub date: Option<i64>,
    #[serde(rename = "@subject", default)]
    pub subject: String,
    #[serde(default)]
    pub groups: NzbGroups,
    #[serde(default)]
    pub segments: NzbSegments,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NzbGroups {
    #[serde(rename = "group", default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NzbSegments {
    #[serde(rename = "segment", default)]
    pub segments: Vec<NzbSegment>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NzbSegment {
    /// Signed so that bogus negative sizes parse and get filtered later.
    #[serde(rename = "@bytes")]
    pub bytes: i64,
    #[serde(rename = "@number", default)]
    pub number: Option<u32>,
    #[serde(rename = "$text", default)]
    pub id: String,
}

impl NzbSegment {
    pub fn is_usable(&self) -> bool {
        self.bytes > 0 && !self.id.trim().is_empty()
    }
}

impl Nzb {
    /// Every distinct newsgroup named anywhere in the document, trimmed and
    /// sorted.
    pub fn groups(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .files
            .iter()
            .flat_map(|f| f.groups.groups.iter())
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        set.into_iter().collect()
    }
}

pub fn parse_nzb(bytes: &[u8]) -> Result<Nzb> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| NzbfsError::Nzb(format!("document is not UTF-8: {e}")))?;
    quick_xml::de::from_str(xml).map_err(|e| NzbfsError::Nzb(format!("malformed xml: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head><meta type="title">Example</meta></head>
  <file poster="poster@example.com" date="1700000000" subject="&quot;movie.mkv&quot; yEnc (1/2)">
    <groups>
      <group>alt.binaries.movies</group>
      <group>alt.binaries.hdtv</group>
    </groups>
    <segments>
      <segment bytes="739811" number="1">part1@example.com</segment>
      <segment bytes="-5" number="2">bad@example.com</segment>
    </segments>
  </file>
  <file subject="movie.nfo">
    <groups><group>alt.binaries.movies</group></groups>
    <segments><segment bytes="100" number="1">nfo@example.com</segment></segments>
  </file>
</nzb>"#;

    #[test]
    fn parses_files_groups_and_segments() {
        let nzb = parse_nzb(DOC.as_bytes()).unwrap();
        assert_eq!(nzb.files.len(), 2);
        let f = &nzb.files[0];
        assert_eq!(f.subject, "\"movie.mkv\" yEnc (1/2)");
        assert_eq!(f.date, Some(1_700_000_000));
        assert_eq!(f.segments.segments.len(), 2);
        assert_eq!(f.segments.segments[0].id, "part1@example.com");
        assert!(f.segments.segments[0].is_usable());
        assert!(!f.segments.segments[1].is_usable());
        assert_eq!(
            nzb.groups(),
            vec!["alt.binaries.hdtv", "alt.binaries.movies"]
        );
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(matches!(
            parse_nzb(b"<nzb><file subject='x'>"),
            Err(NzbfsError::Nzb(_))
        ));
        assert!(parse_nzb(&[0xff, 0xfe, 0x00]).is_err());
    }
}
