//! Outcome reports for multi-step mutations.
//!
//! These exist because the store offers no transactions: a caller that sees a
//! failure needs to know which steps already took effect.

use serde::Serialize;
use std::path::PathBuf;

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub source: PathBuf,
    pub key: String,
    pub bytes_sent: u64,
    /// An object already existed at `key` and was overwritten.
    pub replaced: bool,
}

/// One key relocated by a folder move.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MovedKey {
    pub from: String,
    pub to: String,
}

/// Progress of a folder move.
///
/// On success every content key is in `moved`. When the move aborts,
/// `failed` names the key whose move failed and `pending` the keys that
/// were never attempted; keys in `moved` are already at their destination.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FolderMoveReport {
    pub from: String,
    pub to: String,
    pub moved: Vec<MovedKey>,
    pub failed: Option<String>,
    pub pending: Vec<String>,
    /// The source folder sentinel is gone (or never existed).
    pub source_removed: bool,
}

impl FolderMoveReport {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    /// Content keys the move set out to relocate.
    pub fn total(&self) -> usize {
        self.moved.len() + usize::from(self.failed.is_some()) + self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.pending.is_empty() && self.source_removed
    }
}
