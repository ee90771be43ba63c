//! Deletes: a guarded single delete and the bulk folder deletes.

use crate::{
    errors::{BucketError, BucketResult},
    keys,
    services::BucketService,
};
use tracing::{debug, info, warn};

/// Most keys S3 accepts in one DeleteObjects request.
pub const MAX_DELETE_BATCH: usize = 1000;

impl BucketService {
    /// Delete a file, or an empty folder when `key` ends in `/`.
    ///
    /// Files are deleted unconditionally; deleting a missing file succeeds.
    /// A folder must exist and hold nothing but its sentinel, otherwise the
    /// call fails with `NotFound` or `FolderNotEmpty`.
    pub async fn delete(&self, key: &str) -> BucketResult<()> {
        if key.is_empty() {
            return Err(BucketError::invalid("key must not be empty"));
        }

        if keys::is_folder_key(key) {
            let probe = self.probe_folder(key).await?;
            if !probe.exists() {
                warn!("folder `{}` does not exist", key);
                return Err(BucketError::NotFound {
                    key: key.to_string(),
                });
            }
            if probe.has_content() {
                warn!("folder `{}` contains files; delete its contents first", key);
                return Err(BucketError::FolderNotEmpty {
                    prefix: key.to_string(),
                });
            }
        }

        self.store.delete_object(key).await.map_err(|err| {
            warn!("cannot delete `{}`: {}", key, err);
            BucketError::from(err)
        })?;
        info!("`{}` deleted", key);
        Ok(())
    }

    /// Delete everything inside the folder `prefix`, keeping its sentinel.
    ///
    /// Fails with `NotFound` when the folder is absent or already empty.
    /// Returns the number of deleted keys. Batches go out one after another
    /// and are not rolled back if a later batch fails.
    pub async fn delete_folder_contents(&self, prefix: &str) -> BucketResult<usize> {
        let prefix = bulk_prefix(prefix)?;
        let objects = self.list_objects(Some(&prefix)).await?;
        if objects.is_empty() {
            warn!("folder `{}` is empty", prefix);
            return Err(BucketError::NotFound { key: prefix });
        }

        let keys: Vec<String> = objects.into_iter().map(|obj| obj.key).collect();
        self.delete_batches(&keys).await?;
        info!(
            "contents of folder `{}` deleted ({} objects)",
            prefix,
            keys.len()
        );
        Ok(keys.len())
    }

    /// Delete the folder `prefix` with everything in it, sentinel included.
    pub async fn purge_folder(&self, prefix: &str) -> BucketResult<usize> {
        let prefix = bulk_prefix(prefix)?;
        let keys = self.list_all_keys(&prefix).await?;
        self.delete_batches(&keys).await?;
        info!("folder `{}` purged ({} objects)", prefix, keys.len());
        Ok(keys.len())
    }

    async fn delete_batches(&self, keys: &[String]) -> BucketResult<()> {
        for (n, batch) in keys.chunks(MAX_DELETE_BATCH).enumerate() {
            self.store.delete_objects(batch).await.map_err(|err| {
                warn!("cannot delete batch {} ({} keys): {}", n + 1, batch.len(), err);
                BucketError::from(err)
            })?;
            debug!("deleted batch {} ({} keys)", n + 1, batch.len());
        }
        Ok(())
    }
}

/// Bulk deletes must name a folder; an empty prefix would mean the whole bucket.
fn bulk_prefix(prefix: &str) -> BucketResult<String> {
    if prefix.is_empty() || prefix == "/" {
        return Err(BucketError::invalid(
            "refusing to bulk-delete the bucket root",
        ));
    }
    Ok(keys::folder_key(prefix))
}
