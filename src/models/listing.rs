//! Listing request/response shapes exchanged with connectors.

use crate::models::object::ObjectSummary;
use serde::Serialize;

/// Keys requested per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Largest page S3 will return.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size used for existence probes.
pub const PROBE_PAGE_SIZE: usize = 2;

/// Parameters for one ListObjectsV2-style request.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

/// One page of a listing. Never persisted.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Result of a capped existence probe on a folder prefix.
///
/// `count` is the number of keys the probe saw (0, 1 or 2). The folder's own
/// sentinel, when present, always sorts first under its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FolderProbe {
    pub count: usize,
    pub has_sentinel: bool,
}

impl FolderProbe {
    pub fn exists(&self) -> bool {
        self.count > 0
    }

    /// Keys seen besides the sentinel. Capped by the probe size.
    pub fn content_count(&self) -> usize {
        self.count - usize::from(self.has_sentinel)
    }

    pub fn has_content(&self) -> bool {
        self.content_count() > 0
    }
}
