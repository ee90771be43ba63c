//! Folder creation. A folder is a zero-byte object whose key ends in `/`.

use crate::{
    errors::{BucketError, BucketResult},
    keys,
    services::BucketService,
    store::empty_body,
};
use tracing::{debug, info, warn};

impl BucketService {
    /// Create the folder `name` by writing its sentinel.
    ///
    /// Returns `Ok(true)` when a sentinel was written and `Ok(false)` when the
    /// folder already existed and `replace` was not set. With `replace` the
    /// sentinel is rewritten, but the folder's content is left alone; use
    /// [`BucketService::delete_folder_contents`] to clear it.
    pub async fn create_folder(&self, name: &str, replace: bool) -> BucketResult<bool> {
        if name.is_empty() {
            return Err(BucketError::invalid("folder name must not be empty"));
        }
        let key = keys::folder_key(name);

        if self.probe_folder(&key).await?.exists() {
            if !replace {
                info!("folder already present: `{}`", key);
                return Ok(false);
            }
            debug!("rewriting sentinel of existing folder `{}`", key);
        }

        self.store
            .put_object(&key, None, empty_body())
            .await
            .map_err(|err| {
                warn!("cannot create the folder `{}`: {}", key, err);
                BucketError::from(err)
            })?;
        info!("folder created: `{}`", key);
        Ok(true)
    }
}
