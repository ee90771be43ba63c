//! Metadata reads. Also the existence check the other services rely on.

use crate::{
    errors::{BucketError, BucketResult},
    models::metadata::{DEFAULT_CONTENT_TYPE, ObjectMetadata},
    services::BucketService,
};
use tracing::{debug, warn};

impl BucketService {
    /// Fetch `LastModified` (localized), `ContentLength`, `ContentType` and
    /// `ETag` for a key.
    pub async fn get_metadata(&self, key: &str) -> BucketResult<ObjectMetadata> {
        let head = match self.store.head_object(key).await {
            Ok(head) => head,
            Err(err) => {
                let err = BucketError::from(err);
                match &err {
                    BucketError::NotFound { .. } => debug!("object `{}` not found", key),
                    other => warn!("cannot get details of `{}`: {}", key, other),
                }
                return Err(err);
            }
        };

        Ok(ObjectMetadata {
            last_modified: self.localizer.localize(head.last_modified),
            content_length: head.content_length,
            content_type: head
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            etag: head.etag.unwrap_or_default(),
        })
    }

    /// `Ok(false)` only when the store says the key is absent; other store
    /// failures are returned as errors rather than read as "missing".
    pub async fn exists(&self, key: &str) -> BucketResult<bool> {
        match self.get_metadata(key).await {
            Ok(_) => Ok(true),
            Err(BucketError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
