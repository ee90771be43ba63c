//! Listing engine: paginated enumeration and the folder probe.
//!
//! The store caps every response (1000 keys on S3), so a listing is a loop
//! over continuation tokens until the store stops reporting truncation.
//! Sentinel handling lives here and nowhere else.

use crate::{
    errors::{BucketError, BucketResult},
    keys,
    models::{
        listing::{FolderProbe, ListObjectsParams, PROBE_PAGE_SIZE},
        object::ObjectSummary,
    },
    services::BucketService,
    store::StoreError,
};
use tracing::{debug, info, warn};

impl BucketService {
    /// Every object under `prefix` (normalized to end in `/`), or the whole
    /// bucket when `prefix` is `None` or empty.
    ///
    /// The folder's own sentinel is not content and is left out. Returns
    /// `NotFound` when nothing at all matches; a folder holding only its
    /// sentinel yields an empty list instead.
    pub async fn list_objects(&self, prefix: Option<&str>) -> BucketResult<Vec<ObjectSummary>> {
        let prefix = keys::normalize_prefix(prefix);
        let mut objects = self.collect_pages(prefix.as_deref()).await?;
        if objects.is_empty() {
            info!("no such folder found in the bucket: {:?}", prefix);
            return Err(BucketError::NotFound {
                key: prefix.unwrap_or_default(),
            });
        }

        if let Some(prefix) = &prefix {
            if objects.first().is_some_and(|first| &first.key == prefix) {
                objects.remove(0);
            }
        }
        info!(
            "folder {:?} is present, total files inside: {}",
            prefix.as_deref().unwrap_or(""),
            objects.len()
        );
        Ok(objects)
    }

    /// Every key stored under `prefix`, sentinel included.
    ///
    /// `NotFound` when the prefix matches nothing.
    pub async fn list_all_keys(&self, prefix: &str) -> BucketResult<Vec<String>> {
        let prefix = keys::normalize_prefix(Some(prefix));
        let objects = self.collect_pages(prefix.as_deref()).await?;
        if objects.is_empty() {
            return Err(BucketError::NotFound {
                key: prefix.unwrap_or_default(),
            });
        }
        Ok(objects.into_iter().map(|obj| obj.key).collect())
    }

    /// Capped existence probe: asks for at most two keys under the folder.
    ///
    /// Enough to tell "absent", "sentinel only" and "has content" apart
    /// without materializing a listing.
    pub async fn probe_folder(&self, name: &str) -> BucketResult<FolderProbe> {
        let prefix = keys::normalize_prefix(Some(name));
        let params = ListObjectsParams {
            prefix: prefix.clone(),
            continuation_token: None,
            max_keys: PROBE_PAGE_SIZE,
        };
        let page = self.store.list_objects(&params).await.map_err(|err| {
            warn!("probe of {:?} failed: {}", prefix, err);
            BucketError::from(err)
        })?;

        let probe = FolderProbe {
            count: page.objects.len().min(PROBE_PAGE_SIZE),
            has_sentinel: match (&prefix, page.objects.first()) {
                (Some(prefix), Some(first)) => &first.key == prefix,
                _ => false,
            },
        };
        debug!("probe of {:?}: {:?}", prefix, probe);
        Ok(probe)
    }

    /// True when at least one key (sentinel or content) lives under `name`.
    pub async fn folder_exists(&self, name: &str) -> BucketResult<bool> {
        Ok(self.probe_folder(name).await?.exists())
    }

    /// Follow continuation tokens until the store reports the last page.
    async fn collect_pages(&self, prefix: Option<&str>) -> BucketResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let params = ListObjectsParams {
                prefix: prefix.map(str::to_string),
                continuation_token: continuation_token.take(),
                max_keys: self.page_size,
            };
            let page = self.store.list_objects(&params).await.map_err(|err| {
                warn!("exception while listing {:?}: {}", prefix, err);
                BucketError::from(err)
            })?;
            pages += 1;
            objects.extend(page.objects);

            if !page.is_truncated {
                break;
            }
            match page.next_continuation_token {
                Some(token) => {
                    debug!("continuation token present after page {}", pages);
                    continuation_token = Some(token);
                }
                None => {
                    return Err(BucketError::Store(StoreError::backend(format!(
                        "listing of {:?} truncated without a continuation token",
                        prefix
                    ))));
                }
            }
        }

        debug!(
            "listed {} keys under {:?} in {} page(s)",
            objects.len(),
            prefix,
            pages
        );
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        errors::ErrorKind,
        models::listing::{ListObjectsParams, ListPage},
        models::object::{ObjectHead, ObjectSummary},
        services::{
            BucketService,
            test_support::{service, service_with},
        },
        store::{
            ByteStream, ObjectStore, StoreResult,
            memory::{MemoryStore, StoreOp},
        },
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::{collections::HashSet, sync::Arc, time::Duration};

    async fn seeded(page_size: usize, page_cap: usize, keys: &[String]) -> BucketService {
        let (service, store) =
            service_with(MemoryStore::new("test").with_page_cap(page_cap), page_size);
        for key in keys {
            store.seed(key, "x").await;
        }
        service
    }

    #[tokio::test]
    async fn sentinel_is_excluded_from_content() {
        let keys = ["a/", "a/x", "a/y"].map(String::from);
        let service = seeded(1000, 1000, &keys).await;
        let listed: Vec<_> = service
            .list_objects(Some("a"))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(listed, ["a/x", "a/y"]);
    }

    #[tokio::test]
    async fn pagination_returns_every_key_once() {
        let keys: Vec<String> = (0..2_345).map(|i| format!("logs/{i:05}.json")).collect();
        for (page_size, page_cap) in [(1000, 1000), (7, 1000), (1000, 250), (1, 1000)] {
            let service = seeded(page_size, page_cap, &keys).await;
            let listed: Vec<String> = service
                .list_objects(Some("logs/"))
                .await
                .unwrap()
                .into_iter()
                .map(|o| o.key)
                .collect();
            assert_eq!(listed.len(), keys.len(), "page size {page_size}, cap {page_cap}");
            assert_eq!(listed.iter().collect::<HashSet<_>>().len(), keys.len());
            assert_eq!(listed, keys);
        }
    }

    #[tokio::test]
    async fn listing_issues_one_request_per_page() {
        let keys: Vec<String> = (0..25).map(|i| format!("k{i:02}")).collect();
        let (service, store) = service_with(MemoryStore::new("test"), 10);
        for key in &keys {
            store.seed(key, "x").await;
        }
        assert_eq!(service.list_objects(None).await.unwrap().len(), 25);
        assert_eq!(store.calls(StoreOp::List).await, 3);
    }

    #[tokio::test]
    async fn root_listing_keeps_every_key() {
        let keys = ["a/", "a/x", "b"].map(String::from);
        let service = seeded(1000, 1000, &keys).await;
        assert_eq!(service.list_objects(None).await.unwrap().len(), 3);
        assert_eq!(service.list_objects(Some("")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_folder_differs_from_missing_folder() {
        let keys = ["empty/".to_string()];
        let service = seeded(1000, 1000, &keys).await;
        assert!(service.list_objects(Some("empty/")).await.unwrap().is_empty());
        let err = service.list_objects(Some("missing/")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn raw_listing_includes_sentinel() {
        let keys = ["a/", "a/x"].map(String::from);
        let service = seeded(1000, 1000, &keys).await;
        assert_eq!(service.list_all_keys("a").await.unwrap(), ["a/", "a/x"]);
        assert!(service.list_all_keys("b").await.is_err());
    }

    #[tokio::test]
    async fn probe_reports_count_and_sentinel() {
        let keys = ["s/", "c/1", "c/2", "c/3", "f/", "f/file"].map(String::from);
        let service = seeded(1000, 1000, &keys).await;

        let absent = service.probe_folder("nothing").await.unwrap();
        assert!(!absent.exists());
        assert!(!service.folder_exists("nothing").await.unwrap());

        let sentinel_only = service.probe_folder("s").await.unwrap();
        assert_eq!(sentinel_only.count, 1);
        assert!(sentinel_only.has_sentinel);
        assert!(!sentinel_only.has_content());

        let implicit = service.probe_folder("c/").await.unwrap();
        assert_eq!(implicit.count, 2);
        assert!(!implicit.has_sentinel);

        let full = service.probe_folder("f/").await.unwrap();
        assert_eq!(full.count, 2);
        assert!(full.has_content());
    }

    #[tokio::test]
    async fn listing_failure_is_transient() {
        let (service, store) = service();
        store.seed("a/x", "1").await;
        store.fail_on(StoreOp::List, None).await;
        let err = service.list_objects(Some("a/")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientStore);
    }

    /// Claims more pages exist but never hands out a token.
    struct BrokenPager;

    #[async_trait]
    impl ObjectStore for BrokenPager {
        fn bucket_name(&self) -> &str {
            "broken"
        }
        async fn check_access(&self) -> StoreResult<()> {
            Ok(())
        }
        async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
            Err(crate::store::StoreError::not_found(key))
        }
        async fn list_objects(&self, _params: &ListObjectsParams) -> StoreResult<ListPage> {
            Ok(ListPage {
                objects: vec![ObjectSummary {
                    key: "loop".into(),
                    last_modified: Utc::now(),
                    size: 0,
                    etag: None,
                }],
                is_truncated: true,
                next_continuation_token: None,
            })
        }
        async fn put_object(
            &self,
            _key: &str,
            _content_type: Option<&str>,
            _body: ByteStream,
        ) -> StoreResult<u64> {
            Ok(0)
        }
        async fn copy_object(&self, _src: &str, _dst: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn delete_object(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn delete_objects(&self, _keys: &[String]) -> StoreResult<()> {
            Ok(())
        }
        async fn presign_get(&self, _key: &str, _ttl: Duration) -> StoreResult<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn truncated_page_without_token_does_not_loop() {
        let service = BucketService::new(Arc::new(BrokenPager), &Default::default());
        let err = service.list_objects(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientStore);
        assert!(err.to_string().contains("without a continuation token"));
    }
}
