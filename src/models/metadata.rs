//! Per-object metadata surfaced to callers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Fallback when the store does not report a content type.
pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// Snapshot of an object's metadata. Always refetched, never cached.
///
/// Exactly four fields: `LastModified` (already localized), `ContentLength`,
/// `ContentType` and `ETag`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectMetadata {
    pub last_modified: DateTime<FixedOffset>,
    pub content_length: u64,
    pub content_type: String,
    #[serde(rename = "ETag")]
    pub etag: String,
}
