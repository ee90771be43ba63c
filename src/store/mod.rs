//! Store connectors.
//!
//! [`ObjectStore`] is the seam between the folder layer and a concrete
//! object store. It exposes only the primitives the services need: head,
//! one listing page, put, server-side copy, single and batch delete,
//! presigned GET links and an access check. Connectors do no folder logic.

use crate::models::{
    listing::{ListObjectsParams, ListPage},
    object::ObjectHead,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use std::{io, time::Duration};
use thiserror::Error;

pub mod local;
#[cfg(test)]
pub mod memory;
pub mod s3;

/// Object payload handed to [`ObjectStore::put_object`].
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        StoreError::NotFound { key: key.into() }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this connector is bound to.
    fn bucket_name(&self) -> &str;

    /// Cheap request proving the connection and credentials work.
    async fn check_access(&self) -> StoreResult<()>;

    /// Metadata for one key. `NotFound` when the key is absent.
    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead>;

    /// One page of keys in lexicographic order.
    async fn list_objects(&self, params: &ListObjectsParams) -> StoreResult<ListPage>;

    /// Store `body` at `key`, replacing any existing object. Returns bytes written.
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: ByteStream,
    ) -> StoreResult<u64>;

    /// Server-side copy. `NotFound` when `src` is absent.
    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()>;

    /// Remove one key. Removing a missing key succeeds.
    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// Remove several keys in one request.
    async fn delete_objects(&self, keys: &[String]) -> StoreResult<()>;

    /// Time-limited GET link. Does not check that the key exists.
    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String>;
}

/// Body of a folder sentinel.
pub fn empty_body() -> ByteStream {
    stream::empty().boxed()
}

/// Body holding a single in-memory buffer.
pub fn bytes_body(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    stream::once(async move { Ok::<_, io::Error>(data) }).boxed()
}

/// Drain a body into one buffer.
pub async fn collect_body(mut body: ByteStream) -> io::Result<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

/// Opaque continuation token for keyset pagination.
pub(crate) fn encode_token(last_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_key.as_bytes())
}

pub(crate) fn decode_token(token: &str) -> StoreResult<String> {
    URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .ok_or_else(|| StoreError::backend(format!("malformed continuation token `{token}`")))
}
