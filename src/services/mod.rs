//! The folder management layer.
//!
//! [`BucketService`] wraps one connector and implements the folder view on
//! top of it. Each concern lives in its own module as an `impl` block:
//!
//! - [`metadata`]: HEAD-based metadata reads and existence checks
//! - [`listing`]: paginated listings and the capped folder probe
//! - [`upload`]: duplicate-aware uploads from local files
//! - [`folders`]: sentinel-based folder creation
//! - [`deletion`]: guarded single deletes and bulk folder deletes
//! - [`moves`]: copy-then-delete moves for files and folders
//! - [`links`]: existence-gated presigned links
//!
//! Every operation awaits its store calls one at a time.

use crate::{
    errors::BucketResult,
    models::{
        identity::BucketConfig,
        listing::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    },
    store::ObjectStore,
    timezone::Localizer,
};
use std::sync::Arc;
use tracing::{info, warn};

pub mod deletion;
pub mod folders;
pub mod links;
pub mod listing;
pub mod metadata;
pub mod moves;
pub mod upload;

#[derive(Clone)]
pub struct BucketService {
    store: Arc<dyn ObjectStore>,
    localizer: Localizer,
    page_size: usize,
}

impl BucketService {
    pub fn new(store: Arc<dyn ObjectStore>, config: &BucketConfig) -> Self {
        let page_size = match config.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        Self {
            store,
            localizer: Localizer::new(&config.timezone),
            page_size,
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket_name()
    }

    /// Prove the connection and credentials work.
    pub async fn check_access(&self) -> BucketResult<()> {
        match self.store.check_access().await {
            Ok(()) => {
                info!("credentials and client validated for `{}`", self.bucket());
                Ok(())
            }
            Err(err) => {
                warn!("access check for `{}` failed: {}", self.bucket(), err);
                Err(err.into())
            }
        }
    }
}
