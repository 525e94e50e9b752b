use chrono::{DateTime, Utc};

use crate::config::ImageQuality;
use crate::manifest::ArtifactKind;

/// One published post as enumerated from the source index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub stable_id: String,
    pub source_url: String,
    pub title: String,
    pub slug: String,
    pub publish_timestamp: DateTime<Utc>,
    /// Body delivered inline by the index, when present.
    pub body_html: Option<String>,
}

/// Raw bytes plus the declared media type, as fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlob {
    pub bytes: Vec<u8>,
    pub media_kind: Option<String>,
}

impl ContentBlob {
    pub fn new(bytes: Vec<u8>, media_kind: Option<String>) -> Self {
        Self { bytes, media_kind }
    }

    pub fn inline_html(html: &str) -> Self {
        Self {
            bytes: html.as_bytes().to_vec(),
            media_kind: Some("text/html; charset=utf-8".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    File,
}

impl AssetKind {
    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            AssetKind::Image => ArtifactKind::Image,
            AssetKind::File => ArtifactKind::File,
        }
    }
}

/// An embedded image or attachment discovered while processing a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// URL that will be fetched (already resolved to the quality variant for images).
    pub source_url: String,
    /// Attribute value exactly as it appeared in the document.
    pub reference: String,
    pub suggested_local_name: String,
    pub extension: String,
    pub kind: AssetKind,
    pub quality_tier: Option<ImageQuality>,
    /// Relative path inside the archive the asset is planned to occupy.
    pub local_path: String,
}
