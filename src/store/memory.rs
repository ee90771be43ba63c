//! In-process connector backed by an ordered map.
//!
//! Behaves like S3 where the folder layer can observe it: lexicographic
//! listings with opaque continuation tokens, a server-side page cap,
//! md5 ETags, idempotent deletes and `NotFound` on copying a missing key.
//! Faults can be injected per operation (and optionally per key), and every
//! request is counted, which is what the service tests rely on.

use crate::{
    models::{
        listing::{ListObjectsParams, ListPage, MAX_PAGE_SIZE},
        object::{ObjectHead, ObjectSummary},
    },
    store::{
        ByteStream, ObjectStore, StoreError, StoreResult, collect_body, decode_token,
        encode_token,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::debug;

/// Store primitives, used to target injected faults and read counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CheckAccess,
    Head,
    List,
    Put,
    Copy,
    Delete,
    DeleteBatch,
    Presign,
}

/// Lowercase hex MD5 of the payload.
fn md5_etag(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Fault {
    op: StoreOp,
    key: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    faults: Vec<Fault>,
    calls: HashMap<StoreOp, usize>,
}

impl State {
    /// Count the request and fail it if a matching fault is armed.
    fn enter(&mut self, op: StoreOp, keys: &[&str]) -> StoreResult<()> {
        *self.calls.entry(op).or_default() += 1;
        let hit = self.faults.iter().any(|fault| {
            fault.op == op
                && fault
                    .key
                    .as_deref()
                    .is_none_or(|target| keys.contains(&target))
        });
        if hit {
            return Err(StoreError::backend(format!(
                "injected {:?} failure for {:?}",
                op, keys
            )));
        }
        Ok(())
    }
}

pub struct MemoryStore {
    bucket: String,
    page_cap: usize,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_cap: MAX_PAGE_SIZE,
            state: Mutex::new(State::default()),
        }
    }

    /// Cap the number of keys returned per page regardless of what is asked.
    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = cap.max(1);
        self
    }

    /// Make every `op` fail, or only those touching `key` when given.
    pub async fn fail_on(&self, op: StoreOp, key: Option<&str>) {
        self.state.lock().await.faults.push(Fault {
            op,
            key: key.map(str::to_string),
        });
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Number of `op` requests received so far, failed ones included.
    pub async fn calls(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    /// Insert an object directly, bypassing counters and faults.
    pub async fn seed(&self, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let stored = StoredObject {
            etag: md5_etag(&data),
            data,
            content_type: None,
            last_modified: Utc::now(),
        };
        self.state
            .lock()
            .await
            .objects
            .insert(key.to_string(), stored);
    }

    /// All keys in listing order.
    pub async fn keys(&self) -> Vec<String> {
        self.state.lock().await.objects.keys().cloned().collect()
    }

    /// Payload stored at `key`, if any.
    pub async fn read(&self, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .objects
            .get(key)
            .map(|obj| obj.data.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn check_access(&self) -> StoreResult<()> {
        self.state.lock().await.enter(StoreOp::CheckAccess, &[])
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::Head, &[key])?;
        let obj = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::not_found(key))?;
        Ok(ObjectHead {
            last_modified: obj.last_modified,
            content_length: obj.data.len() as u64,
            content_type: obj.content_type.clone(),
            etag: Some(format!("\"{}\"", obj.etag)),
        })
    }

    async fn list_objects(&self, params: &ListObjectsParams) -> StoreResult<ListPage> {
        let mut state = self.state.lock().await;
        let prefix = params.prefix.clone().unwrap_or_default();
        state.enter(StoreOp::List, &[prefix.as_str()])?;

        let max_keys = params.max_keys.clamp(1, self.page_cap);
        let start = match &params.continuation_token {
            Some(token) => Bound::Excluded(decode_token(token)?),
            None => Bound::Included(prefix.clone()),
        };

        let mut objects: Vec<ObjectSummary> = state
            .objects
            .range::<String, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&prefix))
            .take(max_keys + 1)
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                last_modified: obj.last_modified,
                size: obj.data.len() as u64,
                etag: Some(format!("\"{}\"", obj.etag)),
            })
            .collect();

        let mut page = ListPage::default();
        if objects.len() > max_keys {
            objects.truncate(max_keys);
            page.is_truncated = true;
            page.next_continuation_token = objects.last().map(|obj| encode_token(&obj.key));
        }
        debug!(
            "memory list prefix={:?} returned {} keys (truncated: {})",
            prefix,
            objects.len(),
            page.is_truncated
        );
        page.objects = objects;
        Ok(page)
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: ByteStream,
    ) -> StoreResult<u64> {
        self.state.lock().await.enter(StoreOp::Put, &[key])?;
        let data = collect_body(body).await?;
        let size = data.len() as u64;
        let stored = StoredObject {
            etag: md5_etag(&data),
            data,
            content_type: content_type.map(str::to_string),
            last_modified: Utc::now(),
        };
        self.state
            .lock()
            .await
            .objects
            .insert(key.to_string(), stored);
        Ok(size)
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::Copy, &[src, dst])?;
        let mut copy = state
            .objects
            .get(src)
            .cloned()
            .ok_or_else(|| StoreError::not_found(src))?;
        copy.last_modified = Utc::now();
        state.objects.insert(dst.to_string(), copy);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::Delete, &[key])?;
        state.objects.remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        state.enter(StoreOp::DeleteBatch, &refs)?;
        for key in keys {
            state.objects.remove(key);
        }
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        self.state.lock().await.enter(StoreOp::Presign, &[key])?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            urlencoding::encode(key),
            expires
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_md5_hex() {
        assert_eq!(md5_etag(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
    use crate::store::{bytes_body, empty_body};

    fn params(prefix: Option<&str>, token: Option<String>, max_keys: usize) -> ListObjectsParams {
        ListObjectsParams {
            prefix: prefix.map(str::to_string),
            continuation_token: token,
            max_keys,
        }
    }

    #[tokio::test]
    async fn listing_pages_through_prefix() {
        let store = MemoryStore::new("test");
        for key in ["a/", "a/1", "a/2", "a/3", "b/1"] {
            store.seed(key, "x").await;
        }

        let first = store.list_objects(&params(Some("a/"), None, 2)).await.unwrap();
        let keys: Vec<_> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a/", "a/1"]);
        assert!(first.is_truncated);

        let second = store
            .list_objects(&params(Some("a/"), first.next_continuation_token, 2))
            .await
            .unwrap();
        let keys: Vec<_> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a/2", "a/3"]);
        assert!(!second.is_truncated);
        assert!(second.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn page_cap_overrides_request() {
        let store = MemoryStore::new("test").with_page_cap(1);
        store.seed("k1", "x").await;
        store.seed("k2", "x").await;
        let page = store.list_objects(&params(None, None, 1000)).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert!(page.is_truncated);
    }

    #[tokio::test]
    async fn copy_of_missing_key_is_not_found() {
        let store = MemoryStore::new("test");
        let err = store.copy_object("nope", "dst").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { key } if key == "nope"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new("test");
        store.delete_object("ghost").await.unwrap();
        store.delete_object("ghost").await.unwrap();
        assert_eq!(store.calls(StoreOp::Delete).await, 2);
    }

    #[tokio::test]
    async fn faults_can_target_one_key() {
        let store = MemoryStore::new("test");
        store.fail_on(StoreOp::Put, Some("bad")).await;
        assert!(store.put_object("bad", None, empty_body()).await.is_err());
        assert_eq!(
            store.put_object("good", None, bytes_body("abc")).await.unwrap(),
            3
        );
        store.clear_faults().await;
        assert!(store.put_object("bad", None, empty_body()).await.is_ok());
        assert_eq!(store.keys().await, ["bad", "good"]);
    }

    #[tokio::test]
    async fn head_reports_quoted_etag() {
        let store = MemoryStore::new("test");
        store
            .put_object("doc.txt", Some("text/plain"), bytes_body("hello"))
            .await
            .unwrap();
        let head = store.head_object("doc.txt").await.unwrap();
        assert_eq!(head.content_length, 5);
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            head.etag.as_deref(),
            Some("\"5d41402abc4b2a76b9719d911017c592\"")
        );
    }
}
