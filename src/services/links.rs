//! Time-limited download links.

use crate::{
    errors::{BucketError, BucketResult},
    services::BucketService,
};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(3600);

/// Longest lifetime S3 accepts for a presigned URL.
pub const MAX_LINK_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

impl BucketService {
    /// Presigned GET URL for `key`, valid for `expires_in`.
    ///
    /// The key is checked first so no link is issued for a missing object.
    pub async fn get_link(&self, key: &str, expires_in: Duration) -> BucketResult<String> {
        if expires_in.is_zero() {
            return Err(BucketError::invalid("link lifetime must be positive"));
        }
        if expires_in > MAX_LINK_TTL {
            return Err(BucketError::invalid(format!(
                "link lifetime {}s exceeds the maximum of {}s",
                expires_in.as_secs(),
                MAX_LINK_TTL.as_secs()
            )));
        }

        self.get_metadata(key).await.inspect_err(|err| {
            warn!("no link issued for `{}`: {}", key, err);
        })?;

        let url = self
            .store
            .presign_get(key, expires_in)
            .await
            .map_err(|err| {
                warn!("cannot sign a link for `{}`: {}", key, err);
                BucketError::from(err)
            })?;
        info!(
            "link for `{}` generated, valid for {}s",
            key,
            expires_in.as_secs()
        );
        Ok(url)
    }
}
