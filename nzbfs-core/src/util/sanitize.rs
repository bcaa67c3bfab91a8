use crate::error::{NzbfsError, Result};

/// Make a single safe path component out of an arbitrary name. Returns an
/// empty string when nothing usable survives.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.trim().chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        if keep {
            out.push(c);
            in_run = false;
        } else if !in_run {
            // separators and punctuation collapse to one underscore
            out.push('_');
            in_run = true;
        }
    }
    out.trim_start_matches(['.', '_', '-'])
        .trim_matches('_')
        .to_string()
}

/// Normalize a caller-supplied virtual path to `a/b/c` form (no leading or
/// trailing separator, `""` for the root). `..` components are rejected.
pub fn normalize_virtual_path(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(NzbfsError::InvalidPath(format!(
                    "{path:?} escapes the metadata root"
                )));
            }
            p => parts.push(p),
        }
    }
    Ok(parts.join("/"))
}

/// Parent directory of a normalized path and the final component.
pub fn split_parent(normalized: &str) -> (&str, &str) {
    match normalized.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", normalized),
    }
}
