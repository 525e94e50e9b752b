use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::paths::{check_relative, PathViolation};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown output format {0:?} (expected html, md or txt)")]
    UnknownFormat(String),
    #[error("unknown image quality {0:?} (expected high, medium or low)")]
    UnknownImageQuality(String),
    #[error("invalid date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("date range is empty: after {after} is later than before {before}")]
    EmptyDateRange { after: NaiveDate, before: NaiveDate },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} escapes the archive root: {violation}")]
    PathTraversal {
        field: &'static str,
        violation: PathViolation,
    },
}

/// Target document format. A closed set: unknown names are rejected while the
/// configuration is built, never during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Md,
    Txt,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Md => "md",
            OutputFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "md" | "markdown" => Ok(OutputFormat::Md),
            "txt" | "text" => Ok(OutputFormat::Txt),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

const CDN_FETCH_MARKER: &str = "/image/fetch/";

/// Image quality tier. The variant fetched for a tier is decided here, never
/// negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    #[default]
    High,
    Medium,
    Low,
}

impl ImageQuality {
    /// CDN transformation segment requested for this tier.
    pub fn transform(self) -> &'static str {
        match self {
            ImageQuality::High => "f_auto,q_auto:best",
            ImageQuality::Medium => "w_800,c_limit,f_auto,q_auto:good",
            ImageQuality::Low => "w_400,c_limit,f_auto,q_auto:good",
        }
    }

    /// Resolve `url` to the variant for this tier.
    ///
    /// Only image-CDN fetch URLs (`.../image/fetch/<transform>/<origin>`) carry
    /// variants; every other URL is returned unchanged.
    pub fn resolve_variant(self, url: &str) -> String {
        let Some(idx) = url.find(CDN_FETCH_MARKER) else {
            return url.to_string();
        };
        let (head, tail) = url.split_at(idx + CDN_FETCH_MARKER.len());
        let origin = match tail.split_once('/') {
            Some((first, rest)) if !first.starts_with("http") => rest,
            _ => tail,
        };
        format!("{head}{}/{origin}", self.transform())
    }
}

impl fmt::Display for ImageQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageQuality::High => "high",
            ImageQuality::Medium => "medium",
            ImageQuality::Low => "low",
        };
        f.write_str(name)
    }
}

impl FromStr for ImageQuality {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(ImageQuality::High),
            "medium" => Ok(ImageQuality::Medium),
            "low" => Ok(ImageQuality::Low),
            _ => Err(ConfigError::UnknownImageQuality(s.to_string())),
        }
    }
}

/// Inclusive publication date window, compared on the UTC calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(after: Option<NaiveDate>, before: Option<NaiveDate>) -> Result<Self, ConfigError> {
        if let (Some(after), Some(before)) = (after, before) {
            if after > before {
                return Err(ConfigError::EmptyDateRange { after, before });
            }
        }
        Ok(Self { after, before })
    }

    pub fn parse(after: Option<&str>, before: Option<&str>) -> Result<Self, ConfigError> {
        Self::new(
            after.map(parse_date).transpose()?,
            before.map(parse_date).transpose()?,
        )
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        self.after.map_or(true, |after| day >= after) && self.before.map_or(true, |before| day <= before)
    }

    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveFlags {
    pub download_images: bool,
    pub download_files: bool,
    pub add_source_url: bool,
    pub create_archive: bool,
    pub dry_run: bool,
}

/// Fully resolved settings for one run. Immutable once the run starts.
///
/// `auth_cookie` is an opaque secret: its `Debug` output is redacted and nothing in
/// the workspace formats its value into a log line.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// Maximum fetch attempts started per rolling second, across all workers.
    pub rate_limit: u32,
    pub date_range: DateRange,
    pub proxy: Option<String>,
    pub auth_cookie: Option<SecretString>,
    pub image_quality: ImageQuality,
    /// Lowercase extensions without the dot. Empty means "every attachment".
    pub file_extension_allowlist: Vec<String>,
    pub flags: ArchiveFlags,
    pub post_limit: Option<usize>,
    pub images_dir: String,
    pub files_dir: String,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            format: OutputFormat::default(),
            rate_limit: 2,
            date_range: DateRange::default(),
            proxy: None,
            auth_cookie: None,
            image_quality: ImageQuality::default(),
            file_extension_allowlist: Vec::new(),
            flags: ArchiveFlags::default(),
            post_limit: None,
            images_dir: "images".to_string(),
            files_dir: "files".to_string(),
            concurrency: 4,
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl ArchiveConfig {
    pub fn default_with_output(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            ..Self::default()
        }
    }

    /// Reject settings the pipeline cannot honour. Runs before any archive work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit == 0 {
            return Err(ConfigError::Zero { field: "rate_limit" });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Zero { field: "concurrency" });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero { field: "max_attempts" });
        }
        if self.post_limit == Some(0) {
            return Err(ConfigError::Zero { field: "post_limit" });
        }
        check_relative(&self.images_dir).map_err(|violation| ConfigError::PathTraversal {
            field: "images_dir",
            violation,
        })?;
        check_relative(&self.files_dir).map_err(|violation| ConfigError::PathTraversal {
            field: "files_dir",
            violation,
        })?;
        DateRange::new(self.date_range.after, self.date_range.before)?;
        Ok(())
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        if self.file_extension_allowlist.is_empty() {
            return true;
        }
        let wanted = normalize_extension(extension);
        self.file_extension_allowlist
            .iter()
            .any(|allowed| normalize_extension(allowed) == wanted)
    }
}

/// Split a comma separated extension list (`"pdf, .DOCX"`) into normalised entries.
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
