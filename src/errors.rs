//! Errors returned by the public operations of [`crate::BucketService`].
//!
//! Connector failures never escape raw: they are folded into [`BucketError`],
//! whose `Display` is the diagnostic shown to users. Callers that only care
//! about success can test `is_ok()`; callers that need the category use
//! [`BucketError::kind`].

use crate::{models::report::FolderMoveReport, store::StoreError};
use serde::Serialize;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Coarse failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    TransientStore,
    LocalIo,
    InvalidArgument,
    /// A multi-step operation stopped halfway; its effects were not undone.
    Partial,
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("`{key}` not found")]
    NotFound { key: String },

    #[error("`{key}` already exists; pass overwrite to replace it")]
    AlreadyExists { key: String },

    #[error("folder `{prefix}` is not empty; delete its contents first")]
    FolderNotEmpty { prefix: String },

    #[error("local file `{}` unavailable: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store request failed: {0}")]
    Store(#[source] StoreError),

    /// The copy landed but the source could not be removed: both keys exist.
    #[error("copied `{from}` to `{to}` but could not delete the source, both keys now exist: {source}")]
    MoveIncomplete {
        from: String,
        to: String,
        #[source]
        source: StoreError,
    },

    /// Folder move stopped early; `report` lists what already moved.
    #[error(
        "moving folder `{}` to `{}` stopped after {} of {} objects: {source}",
        report.from,
        report.to,
        report.moved.len(),
        report.total()
    )]
    FolderMoveAborted {
        report: FolderMoveReport,
        #[source]
        source: Box<BucketError>,
    },
}

pub type BucketResult<T> = Result<T, BucketError>;

impl BucketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BucketError::NotFound { .. } => ErrorKind::NotFound,
            BucketError::AlreadyExists { .. } | BucketError::FolderNotEmpty { .. } => {
                ErrorKind::AlreadyExists
            }
            BucketError::LocalIo { .. } => ErrorKind::LocalIo,
            BucketError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BucketError::Store(_) => ErrorKind::TransientStore,
            BucketError::MoveIncomplete { .. } | BucketError::FolderMoveAborted { .. } => {
                ErrorKind::Partial
            }
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        BucketError::InvalidArgument(msg.into())
    }

    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BucketError::LocalIo {
            path: path.into(),
            source,
        }
    }
}

impl From<StoreError> for BucketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => BucketError::NotFound { key },
            other => BucketError::Store(other),
        }
    }
}
