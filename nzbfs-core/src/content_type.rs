//! Container detection shared by stream selection and content-type guessing.

const CONTAINERS: &[(&str, &str)] = &[
    (".mp4", "video/mp4"),
    (".m4v", "video/mp4"),
    (".webm", "video/webm"),
    (".mkv", "video/x-matroska"),
    (".m2ts", "video/mp2t"),
    (".mts", "video/mp2t"),
    (".ts", "video/mp2t"),
    (".avi", "video/x-msvideo"),
    (".mov", "video/quicktime"),
    (".mpeg", "video/mpeg"),
    (".mpg", "video/mpeg"),
    (".m3u8", "application/vnd.apple.mpegurl"),
];

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Known container extension (with the leading dot) found in `name`, either
/// as the real extension or embedded before `_`, `.`, `-` or a quote.
pub fn detect_container_ext(name: &str) -> Option<&'static str> {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    if let Some(dot) = lower.rfind('.') {
        let ext = &lower[dot..];
        if let Some((known, _)) = CONTAINERS.iter().find(|(e, _)| *e == ext) {
            return Some(known);
        }
    }
    CONTAINERS.iter().map(|(e, _)| *e).find(|e| {
        lower.ends_with(e)
            || ['_', '.', '-', '"']
                .iter()
                .any(|sep| lower.contains(&format!("{e}{sep}")))
    })
}

pub fn guess_content_type(name: &str) -> &'static str {
    detect_container_ext(name)
        .and_then(|ext| CONTAINERS.iter().find(|(e, _)| *e == ext))
        .map(|(_, ct)| *ct)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
