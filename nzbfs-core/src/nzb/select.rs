//! Picks the streamable media file out of a multi-file NZB.

use tracing::debug;

use crate::content_type::detect_container_ext;
use crate::error::{NzbfsError, Result};
use crate::nzb::parser::{Nzb, NzbSegment};

/// Subjects containing any of these are parity, verification or info files.
const SKIP_FRAGMENTS: &[&str] = &[".par2", ".par", ".srr", ".sfv", ".nfo"];

/// Lower is better. Anything not listed ranks after all of these.
const STREAM_PREFERENCE: &[&str] = &[
    ".mp4", ".mkv", ".ts", ".m2ts", ".mts", ".avi", ".mov", ".webm",
];

const SIZE_MARKER: &str = "yEnc";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedSegment {
    pub id: String,
    pub bytes: u64,
}

#[derive(Clone, Debug)]
pub struct Selection {
    pub subject: String,
    /// Quoted file name from the subject when present, else the subject.
    pub file_name: String,
    pub segments: Vec<SelectedSegment>,
    /// Sum of declared encoded sizes.
    pub declared_size: u64,
    /// Size announced by the subject's size marker.
    pub decoded_size: Option<u64>,
    pub rank: usize,
}

impl Selection {
    /// Decoded size when announced, else the encoded sum (an overestimate of
    /// a few percent).
    pub fn total_size(&self) -> u64 {
        self.decoded_size.unwrap_or(self.declared_size)
    }
}

pub fn should_skip_subject(subject: &str) -> bool {
    let lower = subject.to_ascii_lowercase();
    SKIP_FRAGMENTS.iter().any(|f| lower.contains(f))
}

pub fn extension_rank(name: &str) -> usize {
    detect_container_ext(name)
        .and_then(|ext| STREAM_PREFERENCE.iter().position(|p| *p == ext))
        .unwrap_or(STREAM_PREFERENCE.len() + 1)
}

/// Decoded size from a subject like `"video.mkv" yEnc 1314508577 (1/1834)`.
/// The digits must directly follow the marker (after whitespace) and end at
/// whitespace, `(` or the end of the subject.
pub fn extract_decoded_size(subject: &str) -> Option<u64> {
    let idx = subject.find(SIZE_MARKER)?;
    let rest = subject[idx + SIZE_MARKER.len()..].trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    match rest[end..].chars().next() {
        None => {}
        Some(c) if c.is_whitespace() || c == '(' => {}
        Some(_) => return None,
    }
    rest[..end].parse::<u64>().ok().filter(|n| *n > 0)
}

/// `"name.ext"` inside the subject, if quoted.
pub fn subject_file_name(subject: &str) -> Option<&str> {
    let start = subject.find('"')? + 1;
    let len = subject[start..].find('"')?;
    let name = subject[start..start + len].trim();
    (!name.is_empty()).then_some(name)
}

fn usable_segments(segs: &[NzbSegment]) -> Vec<SelectedSegment> {
    segs.iter()
        .filter(|s| s.is_usable())
        .map(|s| SelectedSegment {
            id: s.id.trim().to_string(),
            bytes: s.bytes as u64,
        })
        .collect()
}

/// Best streamable candidate: lowest extension rank, ties broken by the
/// larger declared total. The first candidate wins full ties.
pub fn select_stream(nzb: &Nzb) -> Result<Selection> {
    if nzb.files.is_empty() {
        return Err(NzbfsError::Nzb("nzb has no files".into()));
    }

    let mut best: Option<Selection> = None;
    for f in &nzb.files {
        let subject = f.subject.trim();
        if should_skip_subject(subject) {
            debug!(subject, "skipping non-media file");
            continue;
        }
        let segments = usable_segments(&f.segments.segments);
        let declared_size: u64 = segments.iter().map(|s| s.bytes).sum();
        if segments.is_empty() || declared_size == 0 {
            continue;
        }

        let rank = extension_rank(subject);
        let better = match &best {
            None => true,
            Some(b) => rank < b.rank || (rank == b.rank && declared_size > b.declared_size),
        };
        if better {
            best = Some(Selection {
                subject: subject.to_string(),
                file_name: subject_file_name(subject).unwrap_or(subject).to_string(),
                segments,
                declared_size,
                decoded_size: extract_decoded_size(subject),
                rank,
            });
        }
    }

    best.ok_or_else(|| NzbfsError::Nzb("nzb file contains no usable segments".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nzb::parser::parse_nzb;

    fn file(subject: &str, segs: &[(i64, &str)]) -> String {
        let segs: String = segs
            .iter()
            .enumerate()
            .map(|(i, (b, id))| {
                format!(r#"<segment bytes="{b}" number="{}">{id}</segment>"#, i + 1)
            })
            .collect();
        format!(
            r#"<file subject="{subject}"><groups><group>alt.bin</group></groups><segments>{segs}</segments></file>"#
        )
    }

    fn doc(files: &[String]) -> Nzb {
        let xml = format!("<nzb>{}</nzb>", files.concat());
        parse_nzb(xml.as_bytes()).unwrap()
    }

    #[test]
    fn prefers_rank_over_segment_count() {
        let nzb = doc(&[
            file("sample.par2", &[(10_000, "p@x")]),
            file("movie.mkv", &[(100, "k1@x"), (100, "k2@x")]),
            file("movie.mp4", &[(500, "m1@x")]),
        ]);
        let sel = select_stream(&nzb).unwrap();
        assert_eq!(sel.file_name, "movie.mp4");
        assert_eq!(sel.segments.len(), 1);
        assert_eq!(sel.total_size(), 500);
    }

    #[test]
    fn ties_go_to_larger_total() {
        let nzb = doc(&[
            file("a.mkv", &[(100, "a@x")]),
            file("b.mkv", &[(300, "b@x")]),
        ]);
        assert_eq!(select_stream(&nzb).unwrap().file_name, "b.mkv");
    }

    #[test]
    fn unknown_extensions_still_selectable() {
        let nzb = doc(&[file("archive.bin", &[(100, "a@x")])]);
        let sel = select_stream(&nzb).unwrap();
        assert_eq!(sel.rank, STREAM_PREFERENCE.len() + 1);
    }

    #[test]
    fn only_bad_segments_fail() {
        let nzb = doc(&[file("movie.mkv", &[(0, "a@x"), (-1, "b@x"), (100, "   ")])]);
        assert!(matches!(select_stream(&nzb), Err(NzbfsError::Nzb(_))));
        assert!(select_stream(&Nzb::default()).is_err());
        let only_par = doc(&[file("x.par2", &[(100, "a@x")])]);
        assert!(select_stream(&only_par).is_err());
    }

    #[test]
    fn size_marker_extraction() {
        assert_eq!(
            extract_decoded_size(r#"[1/8] - "video.mkv" yEnc  1314508577 (1/1834)"#),
            Some(1_314_508_577)
        );
        assert_eq!(extract_decoded_size("x yEnc 42"), Some(42));
        assert_eq!(extract_decoded_size("x yEnc\t77(1/2)"), Some(77));
        // part counters are not sizes
        assert_eq!(extract_decoded_size(r#""video.mkv" yEnc (1/612)"#), None);
        assert_eq!(extract_decoded_size("x yEnc 12ab"), None);
        assert_eq!(extract_decoded_size("no marker 123"), None);
        assert_eq!(extract_decoded_size("x yEnc 0"), None);
    }

    #[test]
    fn quoted_name_is_extracted() {
        assert_eq!(
            subject_file_name(r#"[1/8] - "video.mkv" yEnc (1/2)"#),
            Some("video.mkv")
        );
        assert_eq!(subject_file_name("plain.mkv"), None);
        assert_eq!(subject_file_name(r#"a "" b"#), None);
    }

    #[test]
    fn skip_fragments_are_case_insensitive() {
        assert!(should_skip_subject("Movie.PAR2"));
        assert!(should_skip_subject("movie.vol01+02.par2"));
        assert!(should_skip_subject("info.NFO"));
        assert!(!should_skip_subject("movie.mkv"));
    }
}
