use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use archive_logging::{archive_debug, archive_trace};
use archiver_core::{check_relative, sha256_hex, to_manifest_path};

use crate::persist::{ensure_output_dir, file_digest, AtomicFileWriter, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("refusing to write {hint:?}: {reason}")]
    PathTraversal { hint: String, reason: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("archive root unusable: {0}")]
    OutputDir(String),
}

impl StoreError {
    fn io(path: &str, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_string(),
            source,
        }
    }

    fn traversal(hint: &str, reason: impl Into<String>) -> Self {
        StoreError::PathTraversal {
            hint: hint.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of one `store` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// `/` separated path relative to the archive root.
    pub relative_path: String,
    pub sha256: String,
    /// Zero when an identical file was already present.
    pub bytes_written: u64,
    pub byte_length: u64,
    /// An identical file was already present; nothing was touched.
    pub unchanged: bool,
}

type PathLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Content-addressed, idempotent file persistence below one archive root.
#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    locks: PathLocks,
}

impl ContentStore {
    /// Create the root if needed and pin its canonical location.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        ensure_output_dir(root).map_err(|err| match err {
            PersistError::OutputDir(msg) => StoreError::OutputDir(msg),
            PersistError::Io(source) => StoreError::io(&root.display().to_string(), source),
        })?;
        let root = fs::canonicalize(root)
            .map_err(|source| StoreError::io(&root.display().to_string(), source))?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` at `destination_hint` (relative to the root).
    ///
    /// Identical content already on disk is left untouched. Otherwise the file is
    /// replaced atomically. Concurrent calls for the same path run one at a time.
    pub async fn store(
        &self,
        bytes: Vec<u8>,
        destination_hint: &str,
    ) -> Result<StoredArtifact, StoreError> {
        let relative = check_relative(destination_hint)
            .map_err(|violation| StoreError::traversal(destination_hint, violation.to_string()))?;
        let relative_path = to_manifest_path(&relative);

        let lock = self.lock_for(&relative_path);
        let guard = lock.lock().await;

        let root = self.root.clone();
        let hint = destination_hint.to_string();
        let task_path = relative_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            write_blocking(&root, &relative, &task_path, &hint, bytes)
        })
        .await
        .map_err(|err| StoreError::io(&relative_path, io::Error::other(err.to_string())))?;

        drop(guard);
        self.release(&relative_path, lock);
        result
    }

    /// Delete the file at `relative_hint` if present. Returns `false` when there was
    /// nothing to delete. Symbolic links and directories are left alone.
    pub async fn remove(&self, relative_hint: &str) -> Result<bool, StoreError> {
        let relative = check_relative(relative_hint)
            .map_err(|violation| StoreError::traversal(relative_hint, violation.to_string()))?;
        let relative_path = to_manifest_path(&relative);

        let lock = self.lock_for(&relative_path);
        let guard = lock.lock().await;

        let root = self.root.clone();
        let hint = relative_hint.to_string();
        let task_path = relative_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            remove_blocking(&root, &relative, &task_path, &hint)
        })
        .await
        .map_err(|err| StoreError::io(&relative_path, io::Error::other(err.to_string())))?;

        drop(guard);
        self.release(&relative_path, lock);
        result
    }

    fn lock_for(&self, relative_path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(relative_path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release(&self, relative_path: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks
            .get(relative_path)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(relative_path);
        }
    }
}

fn write_blocking(
    root: &Path,
    relative: &Path,
    relative_path: &str,
    hint: &str,
    bytes: Vec<u8>,
) -> Result<StoredArtifact, StoreError> {
    let digest = sha256_hex(&bytes);
    let byte_length = bytes.len() as u64;
    let target = root.join(relative);
    let parent = target
        .parent()
        .ok_or_else(|| StoreError::traversal(hint, "no parent directory"))?
        .to_path_buf();
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::traversal(hint, "no file name"))?
        .to_string();

    ensure_contained(root, &parent, hint)?;
    fs::create_dir_all(&parent).map_err(|source| StoreError::io(relative_path, source))?;
    ensure_contained(root, &parent, hint)?;

    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            return Err(StoreError::traversal(hint, "destination is a symbolic link"));
        }
        Ok(meta) if meta.is_dir() => {
            return Err(StoreError::io(
                relative_path,
                io::Error::other("destination is a directory"),
            ));
        }
        Ok(meta) if meta.len() == byte_length => {
            let (existing, _) =
                file_digest(&target).map_err(|source| StoreError::io(relative_path, source))?;
            if existing == digest {
                archive_trace!("{} unchanged", relative_path);
                return Ok(StoredArtifact {
                    relative_path: relative_path.to_string(),
                    sha256: digest,
                    bytes_written: 0,
                    byte_length,
                    unchanged: true,
                });
            }
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(StoreError::io(relative_path, source)),
    }

    AtomicFileWriter::new(parent)
        .write(&file_name, &bytes)
        .map_err(|err| match err {
            PersistError::Io(source) => StoreError::io(relative_path, source),
            PersistError::OutputDir(msg) => StoreError::OutputDir(msg),
        })?;
    archive_debug!("wrote {} ({} bytes)", relative_path, byte_length);

    Ok(StoredArtifact {
        relative_path: relative_path.to_string(),
        sha256: digest,
        bytes_written: byte_length,
        byte_length,
        unchanged: false,
    })
}

fn remove_blocking(
    root: &Path,
    relative: &Path,
    relative_path: &str,
    hint: &str,
) -> Result<bool, StoreError> {
    let target = root.join(relative);
    if let Some(parent) = target.parent() {
        ensure_contained(root, parent, hint)?;
    }
    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(StoreError::traversal(hint, "destination is a symbolic link"))
        }
        Ok(meta) if meta.is_dir() => Err(StoreError::io(
            relative_path,
            io::Error::other("destination is a directory"),
        )),
        Ok(_) => {
            fs::remove_file(&target).map_err(|source| StoreError::io(relative_path, source))?;
            archive_debug!("removed {}", relative_path);
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::io(relative_path, source)),
    }
}

/// The deepest existing ancestor of `dir` must canonicalise to a location inside
/// `root`, which rules out symlinked directories that point elsewhere.
fn ensure_contained(root: &Path, dir: &Path, hint: &str) -> Result<(), StoreError> {
    let mut ancestor = dir;
    loop {
        match fs::canonicalize(ancestor) {
            Ok(real) => {
                return if real.starts_with(root) {
                    Ok(())
                } else {
                    Err(StoreError::traversal(hint, "resolves outside the archive root"))
                };
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => return Err(StoreError::traversal(hint, "no existing ancestor")),
            },
            Err(source) => return Err(StoreError::io(hint, source)),
        }
    }
}
