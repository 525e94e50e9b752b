//! Pure manifest model: keyed entries, merge rules, and the on-disk document shape.
//!
//! Loading, saving, and serialising mutations across workers live in the engine;
//! everything here is deterministic and free of I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths::{check_relative, PathViolation};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Document,
    Image,
    File,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Document => "document",
            ArtifactKind::Image => "image",
            ArtifactKind::File => "file",
        };
        f.write_str(name)
    }
}

/// Identity of a manifest entry.
///
/// `url` is the source URL of a fetched artifact, or the canonical local path of a
/// generated one (such as the archive index).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryKey {
    pub url: String,
    pub kind: ArtifactKind,
}

impl EntryKey {
    pub fn new(url: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub kind: ArtifactKind,
    pub downloaded_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.url.clone(), self.kind)
    }
}

/// `manifest.json` as it is laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub schema_version: u32,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestInvalid {
    #[error("unsupported schema_version {found} (supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
    #[error("duplicate entry for {url} ({kind})")]
    DuplicateKey { url: String, kind: ArtifactKind },
    #[error("entry for {url} has an unsafe path: {violation}")]
    UnsafePath { url: String, violation: PathViolation },
    #[error("entry for {url} has a malformed sha256 digest")]
    MalformedDigest { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    entries: BTreeMap<EntryKey, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an on-disk document and index it by key.
    pub fn from_file(file: ManifestFile) -> Result<Self, ManifestInvalid> {
        if file.schema_version != SCHEMA_VERSION {
            return Err(ManifestInvalid::UnsupportedSchema {
                found: file.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        let mut entries = BTreeMap::new();
        for entry in file.entries {
            check_relative(&entry.path).map_err(|violation| ManifestInvalid::UnsafePath {
                url: entry.url.clone(),
                violation,
            })?;
            if !is_sha256_hex(&entry.sha256) {
                return Err(ManifestInvalid::MalformedDigest { url: entry.url });
            }
            let key = entry.key();
            if entries.contains_key(&key) {
                return Err(ManifestInvalid::DuplicateKey {
                    url: key.url,
                    kind: key.kind,
                });
            }
            entries.insert(key, entry);
        }
        Ok(Self { entries })
    }

    /// On-disk shape with entries in stable key order.
    pub fn to_file(&self) -> ManifestFile {
        ManifestFile {
            schema_version: SCHEMA_VERSION,
            entries: self.entries.values().cloned().collect(),
        }
    }

    /// Insert `entry`, or update the entry sharing its key.
    ///
    /// An entry whose path, digest, and length already match is left untouched so
    /// its `downloaded_at` survives idempotent re-runs.
    pub fn upsert(&mut self, entry: ManifestEntry) -> UpsertOutcome {
        let key = entry.key();
        match self.entries.get_mut(&key) {
            Some(existing)
                if existing.path == entry.path
                    && existing.sha256 == entry.sha256
                    && existing.bytes == entry.bytes =>
            {
                UpsertOutcome::Unchanged
            }
            Some(existing) => {
                *existing = entry;
                UpsertOutcome::Updated
            }
            None => {
                self.entries.insert(key, entry);
                UpsertOutcome::Inserted
            }
        }
    }

    /// The path `entry` would leave unowned: the current path of the entry sharing
    /// its key, when that differs from `entry.path` and no other entry uses it.
    pub fn superseded_path(&self, entry: &ManifestEntry) -> Option<&str> {
        let key = entry.key();
        let existing = self.entries.get(&key)?;
        if existing.path == entry.path {
            return None;
        }
        let shared = self
            .entries
            .iter()
            .any(|(other_key, other)| *other_key != key && other.path == existing.path);
        (!shared).then_some(existing.path.as_str())
    }

    pub fn get(&self, key: &EntryKey) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.values().find(|e| e.path == path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}
