//! Duplicate-aware uploads from local files.

use crate::{
    errors::{BucketError, BucketResult},
    keys,
    models::report::UploadReceipt,
    progress::ProgressObserver,
    services::BucketService,
};
use futures::StreamExt;
use std::{path::Path, sync::Arc};
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

impl BucketService {
    /// Upload `local_path` as `remote_name` (default: the file's base name).
    ///
    /// The local file is checked before any store request. An existing key
    /// is only replaced when `overwrite` is set; otherwise the call fails
    /// with `AlreadyExists` and no bytes are sent. Progress is reported per
    /// chunk and has no influence on the transfer. Names ending in `/` are
    /// folder sentinels and are rejected.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: Option<&str>,
        overwrite: bool,
        progress: Arc<dyn ProgressObserver>,
    ) -> BucketResult<UploadReceipt> {
        let meta = fs::metadata(local_path).await.map_err(|err| {
            warn!("file cannot be found at {}: {}", local_path.display(), err);
            BucketError::local_io(local_path, err)
        })?;
        if !meta.is_file() {
            return Err(BucketError::invalid(format!(
                "{} is not a regular file",
                local_path.display()
            )));
        }

        let key = match remote_name.filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    BucketError::invalid(format!(
                        "cannot derive an object name from {}",
                        local_path.display()
                    ))
                })?,
        };
        if keys::is_folder_key(&key) {
            return Err(BucketError::invalid(format!(
                "`{key}` names a folder; files cannot be uploaded as folder sentinels"
            )));
        }
        info!("file name: {}, file size: {} bytes", key, meta.len());

        let replaced = self.exists(&key).await?;
        if replaced {
            if !overwrite {
                warn!("a file with the name `{}` already exists", key);
                return Err(BucketError::AlreadyExists { key });
            }
            info!("replacing existing object `{}`", key);
        }

        let file = File::open(local_path)
            .await
            .map_err(|err| BucketError::local_io(local_path, err))?;
        let body = ReaderStream::new(file)
            .inspect(move |chunk| {
                if let Ok(bytes) = chunk {
                    progress.on_bytes_transferred(bytes.len() as u64);
                }
            })
            .boxed();
        let content_type = mime_guess::from_path(&key)
            .first_or_octet_stream()
            .to_string();

        let bytes_sent = self
            .store
            .put_object(&key, Some(&content_type), body)
            .await
            .map_err(|err| {
                warn!("file `{}` cannot be uploaded: {}", key, err);
                BucketError::from(err)
            })?;
        info!("file uploaded: `{}` ({} bytes)", key, bytes_sent);

        Ok(UploadReceipt {
            source: local_path.to_path_buf(),
            key,
            bytes_sent,
            replaced,
        })
    }
}
