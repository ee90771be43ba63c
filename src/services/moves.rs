//! Moves and renames.
//!
//! The store has no rename, so a move is a copy followed by a delete of the
//! source. Neither file nor folder moves are atomic and nothing is rolled
//! back: a failure leaves whatever already happened in place and says so.

use crate::{
    errors::{BucketError, BucketResult},
    keys,
    models::report::{FolderMoveReport, MovedKey},
    services::BucketService,
};
use tracing::{debug, info, warn};

impl BucketService {
    /// Move the file `old_key` to `new_key`.
    ///
    /// Fails with `NotFound` when `old_key` is absent. When the copy lands
    /// but the source cannot be deleted the error is `MoveIncomplete` and
    /// both keys exist.
    pub async fn move_file(&self, old_key: &str, new_key: &str) -> BucketResult<()> {
        if old_key.is_empty() || new_key.is_empty() {
            return Err(BucketError::invalid("source and destination keys are required"));
        }
        if old_key == new_key {
            return Err(BucketError::invalid(format!(
                "cannot move `{old_key}` onto itself"
            )));
        }
        if keys::is_folder_key(old_key) || keys::is_folder_key(new_key) {
            return Err(BucketError::invalid(format!(
                "`{old_key}` -> `{new_key}` names a folder; use move_folder"
            )));
        }

        self.move_key(old_key, new_key).await?;
        info!("file moved from `{}` to `{}`", old_key, new_key);
        Ok(())
    }

    /// Move the folder `old_prefix` with everything under it to `new_prefix`.
    ///
    /// The destination sentinel is written first, then every content key is
    /// moved one at a time, then the source sentinel is deleted. The first
    /// failing step stops the move with `FolderMoveAborted`, whose report
    /// tells which keys were moved, which failed and which were never tried.
    /// Content already present at the destination is overwritten key by key.
    pub async fn move_folder(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> BucketResult<FolderMoveReport> {
        if old_prefix.is_empty() || new_prefix.is_empty() {
            return Err(BucketError::invalid("source and destination folders are required"));
        }
        let from = keys::folder_key(old_prefix);
        let to = keys::folder_key(new_prefix);
        if keys::is_within(&to, &from) {
            return Err(BucketError::invalid(format!(
                "cannot move folder `{from}` into itself (`{to}`)"
            )));
        }

        let probe = self.probe_folder(&from).await?;
        if !probe.exists() {
            warn!("folder `{}` does not exist", from);
            return Err(BucketError::NotFound { key: from });
        }

        self.create_folder(&to, false).await?;

        let content: Vec<String> = self
            .list_objects(Some(&from))
            .await?
            .into_iter()
            .map(|obj| obj.key)
            .collect();
        debug!("moving {} keys from `{}` to `{}`", content.len(), from, to);

        let mut report = FolderMoveReport::new(&from, &to);
        let mut remaining = content.into_iter();
        while let Some(key) = remaining.next() {
            let dst = keys::rebase_key(&key, &from, &to);
            if let Err(err) = self.move_key(&key, &dst).await {
                warn!("folder move stopped at `{}`: {}", key, err);
                report.failed = Some(key);
                report.pending = remaining.collect();
                return Err(BucketError::FolderMoveAborted {
                    report,
                    source: Box::new(err),
                });
            }
            report.moved.push(MovedKey { from: key, to: dst });
        }

        if probe.has_sentinel {
            if let Err(err) = self.delete(&from).await {
                warn!("content of `{}` moved but the folder remains: {}", from, err);
                return Err(BucketError::FolderMoveAborted {
                    report,
                    source: Box::new(err),
                });
            }
        }
        report.source_removed = true;

        info!(
            "folder moved from `{}` to `{}` ({} objects)",
            from,
            to,
            report.moved.len()
        );
        Ok(report)
    }

    /// Copy-then-delete for any single key, sentinels included.
    async fn move_key(&self, src: &str, dst: &str) -> BucketResult<()> {
        self.store.copy_object(src, dst).await.map_err(|err| {
            warn!("cannot copy `{}` to `{}`: {}", src, dst, err);
            BucketError::from(err)
        })?;

        self.store
            .delete_object(src)
            .await
            .map_err(|source| {
                warn!(
                    "`{}` copied to `{}` but the source could not be deleted: {}",
                    src, dst, source
                );
                BucketError::MoveIncomplete {
                    from: src.to_string(),
                    to: dst.to_string(),
                    source,
                }
            })
    }
}
