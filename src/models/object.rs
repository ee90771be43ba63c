//! Object shapes returned by connectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One listed key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object key.
    pub key: String,

    /// Last modification time as reported by the listing.
    pub last_modified: DateTime<Utc>,

    /// Size in bytes. Zero for folder sentinels.
    pub size: u64,

    /// ETag, when the store reports one in listings.
    pub etag: Option<String>,
}

/// Raw HEAD response from a connector, before any localization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    pub last_modified: DateTime<Utc>,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}
