//! Archiver core: pure data model, configuration, and manifest rules.
mod config;
mod manifest;
mod model;
mod paths;
mod summary;

pub use config::{
    parse_extension_list, ArchiveConfig, ArchiveFlags, ConfigError, DateRange, ImageQuality,
    OutputFormat,
};
pub use manifest::{
    ArtifactKind, EntryKey, Manifest, ManifestEntry, ManifestFile, ManifestInvalid, UpsertOutcome,
    SCHEMA_VERSION,
};
pub use model::{Asset, AssetKind, ContentBlob, Post};
pub use paths::{
    asset_file_name, asset_name_parts, check_relative, document_file_name, sanitize_component,
    sha256_hex, short_hash, to_manifest_path, PathViolation,
};
pub use summary::{
    AuditReport, CorruptEntry, FailureClass, ItemFailure, MissingEntry, PlannedAsset, PlannedPost,
    RunStatus, RunSummary,
};
