use std::io;
use std::path::{Path, PathBuf};

use archive_logging::{archive_info, archive_warn};
use archiver_core::{check_relative, AuditReport, CorruptEntry, Manifest, MissingEntry};

use crate::manifest::{ManifestError, ManifestManager};
use crate::persist::file_digest;

/// Read-only integrity check of an archive against its manifest.
#[derive(Debug, Clone)]
pub struct Auditor {
    root: PathBuf,
}

impl Auditor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Hash every file the manifest names and sort the entries into matched,
    /// missing and corrupt.
    pub fn audit(&self, manifest: &Manifest) -> AuditReport {
        let mut report = AuditReport::default();
        for entry in manifest.entries() {
            let path = match check_relative(&entry.path) {
                Ok(relative) => self.root.join(relative),
                Err(violation) => {
                    report.missing.push(MissingEntry {
                        entry: entry.clone(),
                        cause: Some(violation.to_string()),
                    });
                    continue;
                }
            };
            match file_digest(&path) {
                Ok((actual, _)) if actual == entry.sha256 => report.matched.push(entry.clone()),
                Ok((actual, _)) => {
                    archive_warn!("{} is corrupt", entry.path);
                    report.corrupt.push(CorruptEntry {
                        entry: entry.clone(),
                        expected: entry.sha256.clone(),
                        actual,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    archive_warn!("{} is missing", entry.path);
                    report.missing.push(MissingEntry {
                        entry: entry.clone(),
                        cause: None,
                    });
                }
                Err(err) => {
                    archive_warn!("{} is unreadable: {}", entry.path, err);
                    report.missing.push(MissingEntry {
                        entry: entry.clone(),
                        cause: Some(err.to_string()),
                    });
                }
            }
        }
        archive_info!(
            "audit: {} matched, {} missing, {} corrupt",
            report.matched.len(),
            report.missing.len(),
            report.corrupt.len()
        );
        report
    }
}

/// Audit the archive rooted at the directory holding `manifest_path`.
///
/// Unlike a download run, an audit requires the manifest to exist.
pub fn audit_manifest_file(manifest_path: &Path) -> Result<AuditReport, ManifestError> {
    if !manifest_path.is_file() {
        return Err(ManifestError::Read {
            path: manifest_path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "manifest not found"),
        });
    }
    let manager = ManifestManager::load(manifest_path)?;
    let root = match manifest_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(Auditor::new(root).audit(manager.manifest()))
}
