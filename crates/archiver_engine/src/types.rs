use std::fmt;

use archiver_core::{ConfigError, FailureClass};

use crate::list::ListError;
use crate::manifest::ManifestError;
use crate::processor::ProcessError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub byte_len: u64,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message} (after {attempts} attempt(s))")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 0,
        }
    }

    pub fn after_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    InvalidProxy,
    InvalidHeader,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
}

impl FailureKind {
    /// Failures worth another attempt: connection trouble, timeouts, 5xx and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::Network => true,
            FailureKind::HttpStatus(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidProxy => write!(f, "invalid proxy"),
            FailureKind::InvalidHeader => write!(f, "invalid header value"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Run-level error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("network error: {0}")]
    Network(#[from] FetchError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("filesystem error: {0}")]
    Filesystem(#[from] StoreError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("integrity error: {path} expected {expected}, found {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ArchiveError {
    pub fn class(&self) -> FailureClass {
        match self {
            ArchiveError::Network(_) => FailureClass::Network,
            ArchiveError::Parse(_) => FailureClass::Parse,
            ArchiveError::Filesystem(_) | ArchiveError::Config(_) => FailureClass::Filesystem,
            ArchiveError::Manifest(_) => FailureClass::Manifest,
            ArchiveError::Integrity { .. } => FailureClass::Integrity,
        }
    }
}

impl From<ListError> for ArchiveError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::Fetch(fetch) => ArchiveError::Network(fetch),
            parse @ ListError::Parse { .. } => ArchiveError::Parse(parse.to_string()),
        }
    }
}

impl From<ProcessError> for ArchiveError {
    fn from(err: ProcessError) -> Self {
        ArchiveError::Parse(err.to_string())
    }
}
