use std::fmt;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::OutputFormat;

const MAX_STEM_LEN: usize = 80;

/// Why a relative path was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathViolation {
    Empty,
    Absolute(String),
    ParentTraversal(String),
}

impl fmt::Display for PathViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathViolation::Empty => write!(f, "empty path"),
            PathViolation::Absolute(p) => write!(f, "absolute path {p:?}"),
            PathViolation::ParentTraversal(p) => write!(f, "parent traversal in {p:?}"),
        }
    }
}

impl std::error::Error for PathViolation {}

/// Lexically validate a path that must stay below the archive root.
///
/// Backslashes count as separators so Windows-style hints cannot smuggle `..`
/// through on Unix. Returns the normalised relative path (`.` components dropped).
pub fn check_relative(raw: &str) -> Result<PathBuf, PathViolation> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(PathViolation::Empty);
    }
    let mut normalised = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => normalised.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathViolation::ParentTraversal(raw.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathViolation::Absolute(raw.to_string()))
            }
        }
    }
    if normalised.as_os_str().is_empty() {
        return Err(PathViolation::Empty);
    }
    Ok(normalised)
}

/// Manifest spelling of a relative path: `/` separated on every platform.
pub fn to_manifest_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// First eight hex chars of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..4])
}

/// Deterministic document file name: `{sanitized_slug}--{short_hash(url)}.{ext}`.
pub fn document_file_name(slug: &str, source_url: &str, format: OutputFormat) -> String {
    format!(
        "{}--{}.{}",
        sanitize_component(slug),
        short_hash(source_url),
        format.extension()
    )
}

/// Stem and extension suggested by the last path segment of an asset URL.
///
/// CDN URLs embed the percent-encoded origin URL as their last segment, so the text
/// after the final encoded slash is used when present.
pub fn asset_name_parts(url: &str) -> (String, Option<String>) {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = without_query.rsplit('/').next().unwrap_or_default();
    let lower = last_segment.to_ascii_lowercase();
    let segment = match lower.rfind("%2f") {
        Some(idx) => &last_segment[idx + 3..],
        None => last_segment,
    };
    match segment.rsplit_once('.') {
        Some((stem, ext)) if is_plausible_extension(ext) => {
            (sanitize_component(stem), Some(ext.to_ascii_lowercase()))
        }
        _ => (sanitize_component(segment), None),
    }
}

fn is_plausible_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Deterministic asset file name: `{stem}--{short_hash(url)}.{ext}`.
pub fn asset_file_name(url: &str, default_extension: &str) -> (String, String) {
    let (stem, ext) = asset_name_parts(url);
    let ext = ext.unwrap_or_else(|| default_extension.to_string());
    (format!("{stem}--{}.{ext}", short_hash(url)), ext)
}

/// Windows-safe file name component.
pub fn sanitize_component(input: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "untitled".to_string();
    }
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut final_name = compacted;
    if final_name.len() > MAX_STEM_LEN {
        let mut end = MAX_STEM_LEN;
        while !final_name.is_char_boundary(end) {
            end -= 1;
        }
        final_name.truncate(end);
    }
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '#' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
