//! Bucket row persisted by the local connector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A bucket registered in the local store's SQLite catalog.
///
/// Objects reference it by `id`; payload files live beneath a directory
/// named after `name`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal identifier used as the objects' foreign key.
    pub id: Uuid,

    /// Bucket name (S3 naming rules).
    pub name: String,

    /// Region label, kept for parity with remote buckets.
    pub region: String,

    /// When the bucket was first opened.
    pub created_at: DateTime<Utc>,
}
