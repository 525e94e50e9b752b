use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use archive_logging::{archive_debug, archive_info};
use archiver_core::{Manifest, ManifestEntry, ManifestFile, ManifestInvalid, UpsertOutcome};
use tokio::sync::{mpsc, oneshot};

use crate::persist::{AtomicFileWriter, PersistError};

pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("could not read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest {path} is not valid JSON: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("manifest {path} rejected: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ManifestInvalid,
    },
    #[error("could not write manifest {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("manifest task stopped")]
    Closed,
}

/// Owns the in-memory manifest and its file.
#[derive(Debug)]
pub struct ManifestManager {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestManager {
    /// Load `path`; a missing file starts an empty manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let manifest = match fs::read(path) {
            Ok(bytes) => parse_manifest(path, &bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                archive_debug!("no manifest at {}, starting empty", path.display());
                Manifest::new()
            }
            Err(source) => {
                return Err(ManifestError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn upsert(&mut self, entry: ManifestEntry) -> UpsertOutcome {
        self.manifest.upsert(entry)
    }

    /// Upsert `entry` and report the file path nothing records any more.
    pub fn replace(&mut self, entry: ManifestEntry) -> Replaced {
        let superseded = self.manifest.superseded_path(&entry).map(str::to_string);
        Replaced {
            outcome: self.manifest.upsert(entry),
            superseded,
        }
    }

    /// Write the manifest to its own path. Returns `false` when the file already
    /// held exactly these bytes and was left alone.
    pub fn save(&self) -> Result<bool, ManifestError> {
        self.save_to(&self.path)
    }

    pub fn save_to(&self, path: &Path) -> Result<bool, ManifestError> {
        let write_error = |message: String| ManifestError::Write {
            path: path.to_path_buf(),
            message,
        };
        let mut bytes = serde_json::to_vec_pretty(&self.manifest.to_file())
            .map_err(|err| write_error(err.to_string()))?;
        bytes.push(b'\n');

        if fs::read(path).is_ok_and(|existing| existing == bytes) {
            archive_debug!("manifest {} unchanged", path.display());
            return Ok(false);
        }

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| write_error("manifest path has no file name".to_string()))?;
        AtomicFileWriter::new(dir)
            .write(file_name, &bytes)
            .map_err(|err| match err {
                PersistError::Io(source) => write_error(source.to_string()),
                PersistError::OutputDir(msg) => write_error(msg),
            })?;
        archive_info!(
            "saved manifest {} ({} entries)",
            path.display(),
            self.manifest.len()
        );
        Ok(true)
    }
}

fn parse_manifest(path: &Path, bytes: &[u8]) -> Result<Manifest, ManifestError> {
    let file: ManifestFile =
        serde_json::from_slice(bytes).map_err(|err| ManifestError::Malformed {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Manifest::from_file(file).map_err(|source| ManifestError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Result of [`ManifestManager::replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replaced {
    pub outcome: UpsertOutcome,
    /// Previous path of the entry when it moved and no other entry shares it.
    pub superseded: Option<String>,
}

enum ManifestCommand {
    Upsert {
        entry: ManifestEntry,
        reply: oneshot::Sender<Replaced>,
    },
    Snapshot {
        reply: oneshot::Sender<Manifest>,
    },
    Save {
        reply: oneshot::Sender<Result<bool, ManifestError>>,
    },
}

/// Cloneable handle to the task that owns a [`ManifestManager`].
///
/// Every mutation goes through the task's queue, so workers never touch the
/// manifest directly and updates apply in arrival order.
#[derive(Debug, Clone)]
pub struct ManifestHandle {
    cmd_tx: mpsc::Sender<ManifestCommand>,
}

impl std::fmt::Debug for ManifestCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ManifestCommand::Upsert { .. } => "Upsert",
            ManifestCommand::Snapshot { .. } => "Snapshot",
            ManifestCommand::Save { .. } => "Save",
        };
        f.write_str(name)
    }
}

impl ManifestHandle {
    /// Move `manager` onto its own task. The task ends once every handle is dropped.
    pub fn spawn(manager: ManifestManager) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut manager = manager;
            while let Some(command) = cmd_rx.recv().await {
                handle_command(&mut manager, command);
            }
        });
        Self { cmd_tx }
    }

    pub async fn upsert(&self, entry: ManifestEntry) -> Result<UpsertOutcome, ManifestError> {
        Ok(self.replace(entry).await?.outcome)
    }

    pub async fn replace(&self, entry: ManifestEntry) -> Result<Replaced, ManifestError> {
        let (reply, rx) = oneshot::channel();
        self.send(ManifestCommand::Upsert { entry, reply }).await?;
        rx.await.map_err(|_| ManifestError::Closed)
    }

    pub async fn snapshot(&self) -> Result<Manifest, ManifestError> {
        let (reply, rx) = oneshot::channel();
        self.send(ManifestCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| ManifestError::Closed)
    }

    pub async fn save(&self) -> Result<bool, ManifestError> {
        let (reply, rx) = oneshot::channel();
        self.send(ManifestCommand::Save { reply }).await?;
        rx.await.map_err(|_| ManifestError::Closed)?
    }

    async fn send(&self, command: ManifestCommand) -> Result<(), ManifestError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| ManifestError::Closed)
    }
}

fn handle_command(manager: &mut ManifestManager, command: ManifestCommand) {
    match command {
        ManifestCommand::Upsert { entry, reply } => {
            let _ = reply.send(manager.replace(entry));
        }
        ManifestCommand::Snapshot { reply } => {
            let _ = reply.send(manager.manifest().clone());
        }
        ManifestCommand::Save { reply } => {
            let _ = reply.send(manager.save());
        }
    }
}
