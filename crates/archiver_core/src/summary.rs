use std::fmt;

use crate::manifest::{ArtifactKind, ManifestEntry};

/// Error taxonomy used when reporting per-item failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Network,
    Parse,
    Filesystem,
    Manifest,
    Integrity,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureClass::Network => "network",
            FailureClass::Parse => "parse",
            FailureClass::Filesystem => "filesystem",
            FailureClass::Manifest => "manifest",
            FailureClass::Integrity => "integrity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Post or asset URL (or listing source) the failure belongs to.
    pub item: String,
    pub class: FailureClass,
    pub message: String,
}

/// Overall result surfaced to the caller of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some posts or assets failed; the archive is still usable.
    PartialFailure,
    AllFailed,
    AuditFailed,
    Fatal,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::PartialFailure => 0,
            RunStatus::Fatal => 1,
            RunStatus::AllFailed => 2,
            RunStatus::AuditFailed => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAsset {
    pub url: String,
    pub local_path: String,
    pub kind: ArtifactKind,
}

/// What a dry run would have written for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPost {
    pub source_url: String,
    pub title: String,
    pub document_path: String,
    pub assets: Vec<PlannedAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub dry_run: bool,
    pub cancelled: bool,
    pub posts_listed: usize,
    pub posts_archived: usize,
    pub posts_unchanged: usize,
    pub assets_stored: usize,
    pub assets_unchanged: usize,
    pub bytes_written: u64,
    pub manifest_changes: usize,
    pub failures: Vec<ItemFailure>,
    /// References left pointing at the remote URL because the asset was not written.
    pub flagged_references: Vec<String>,
    pub plan: Vec<PlannedPost>,
}

impl RunSummary {
    pub fn posts_succeeded(&self) -> usize {
        if self.dry_run {
            self.plan.len()
        } else {
            self.posts_archived + self.posts_unchanged
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.failures.is_empty() {
            RunStatus::Success
        } else if self.posts_succeeded() == 0 {
            RunStatus::AllFailed
        } else {
            RunStatus::PartialFailure
        }
    }

    /// True when a real run wrote nothing and changed nothing.
    pub fn is_no_op(&self) -> bool {
        !self.dry_run && self.bytes_written == 0 && self.manifest_changes == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    pub entry: ManifestEntry,
    /// Set when the file exists but could not be read.
    pub cause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptEntry {
    pub entry: ManifestEntry,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditReport {
    pub matched: Vec<ManifestEntry>,
    pub missing: Vec<MissingEntry>,
    pub corrupt: Vec<CorruptEntry>,
}

impl AuditReport {
    pub fn total(&self) -> usize {
        self.matched.len() + self.missing.len() + self.corrupt.len()
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }

    pub fn status(&self) -> RunStatus {
        if self.is_clean() {
            RunStatus::Success
        } else {
            RunStatus::AuditFailed
        }
    }
}
