use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use aws_sdk_s3::types::{DeleteMarkerEntry, ObjectVersion};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::types::error::MoveObjectError;

pub mod error;
pub mod token;

const VERSION_SEPARATOR: char = ',';

/// The kind of bulk operation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Operation {
    /// Copy objects from the source endpoint into the target endpoint.
    Migrate,
    /// Copy the current version to a rewritten key, then remove the original version.
    Move,
    /// Copy objects to a rewritten key in the same bucket.
    Copy,
    /// Remove the current version of each object.
    Delete,
    /// Write a `versionID,key` listing of the latest versions in the bucket.
    List,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Migrate => "migrate",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }

    /// File name stem used for the `<stem>_success.txt` / `<stem>_fails.txt` logs.
    pub fn log_file_stem(&self) -> &'static str {
        match self {
            Operation::Migrate => "migration",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
            Operation::List => "version_listing",
        }
    }

    /// Past-tense verb used in the final summary line.
    pub fn summary_verb(&self) -> &'static str {
        match self {
            Operation::Migrate => "Migrated",
            Operation::Move => "Moved",
            Operation::Copy => "Copied",
            Operation::Delete => "Deleted",
            Operation::List => "Listed",
        }
    }

    /// Whether listing-file input lines must carry a `versionID,` prefix.
    pub fn requires_version(&self) -> bool {
        matches!(self, Operation::Move)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One object awaiting an operation.
///
/// Immutable once enqueued and consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTask {
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectTask {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    pub fn with_version(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }

    /// Parse one line of a listing file.
    ///
    /// A line is either a bare `key` or a `versionID,key` pair split at the
    /// first comma. An empty version part yields no version. When
    /// `require_version` is set a line without separator is malformed.
    pub fn parse_line(line: &str, require_version: bool) -> Result<Self> {
        if line.is_empty() {
            return Err(anyhow!(MoveObjectError::InvalidInput(
                "empty line in object listing".to_string()
            )));
        }

        match line.split_once(VERSION_SEPARATOR) {
            Some((_, "")) => Err(anyhow!(MoveObjectError::InvalidInput(format!(
                "missing key after version separator: {line}"
            )))),
            Some(("", key)) => Ok(ObjectTask::new(key)),
            Some((version_id, key)) => Ok(ObjectTask::with_version(key, version_id)),
            None if require_version => Err(anyhow!(MoveObjectError::InvalidInput(format!(
                "expected 'versionID,key' but got: {line}"
            )))),
            None => Ok(ObjectTask::new(line)),
        }
    }

    /// Render the task in listing-file form.
    pub fn to_line(&self) -> String {
        match &self.version_id {
            Some(version_id) => format!("{version_id}{VERSION_SEPARATOR}{}", self.key),
            None => self.key.clone(),
        }
    }
}

/// Recorded result of executing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success { key: String },
    Failure { key: String },
}

impl TaskOutcome {
    pub fn key(&self) -> &str {
        match self {
            TaskOutcome::Success { key } | TaskOutcome::Failure { key } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// Entry produced by a versioned listing.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEntry {
    Version(ObjectVersion),
    DeleteMarker(DeleteMarkerEntry),
}

impl ObjectEntry {
    pub fn key(&self) -> &str {
        match &self {
            Self::Version(object) => object.key().unwrap_or_default(),
            Self::DeleteMarker(marker) => marker.key().unwrap_or_default(),
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        match &self {
            Self::Version(object) => object.version_id(),
            Self::DeleteMarker(marker) => marker.version_id(),
        }
    }

    pub fn is_latest(&self) -> bool {
        match &self {
            Self::Version(object) => object.is_latest().unwrap_or(false),
            Self::DeleteMarker(marker) => marker.is_latest().unwrap_or(false),
        }
    }

    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::DeleteMarker(_))
    }

    pub fn to_task(&self) -> ObjectTask {
        ObjectTask {
            key: self.key().to_string(),
            version_id: self.version_id().map(|v| v.to_string()),
        }
    }
}

/// Progress events sent through the stats channel during a run.
#[derive(Debug, PartialEq)]
pub enum TransferStatistics {
    TaskComplete { key: String },
    TaskFailed { key: String },
}

/// Snapshot of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub enqueued: u64,
    pub processed: u64,
    pub failed: u64,
}

/// Process-wide counters shared by the source and the workers.
#[derive(Debug, Default)]
pub struct TransferStatsReport {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl TransferStatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// AWS credential types supported by moveobject-rs.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair with secure zeroization.
///
/// The secret_access_key and session_token are securely cleared from memory
/// when this struct is dropped, using the zeroize crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
