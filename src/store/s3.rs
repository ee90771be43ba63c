//! Connector for S3 and S3-compatible services, built on `rust-s3`.
//!
//! Credentials always come from the [`BucketIdentity`] handed to
//! [`S3Store::new`]; nothing is picked up from the environment or profile
//! files. `rust-s3` is built without `fail-on-err`, so HTTP failures surface
//! as status codes and are classified here.

use crate::{
    models::{
        identity::BucketIdentity,
        listing::{ListObjectsParams, ListPage, MAX_PAGE_SIZE},
        object::{ObjectHead, ObjectSummary},
    },
    store::{ByteStream, ObjectStore, StoreError, StoreResult, collect_body},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::{Region, bucket::Bucket, creds::Credentials, error::S3Error};
use std::time::Duration;
use tracing::debug;

pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    /// Build a client for the bucket. No request is sent.
    pub fn new(identity: &BucketIdentity) -> StoreResult<Self> {
        let creds = &identity.credentials;
        let credentials = Credentials::new(
            Some(creds.access_key_id.as_str()),
            Some(creds.secret_access_key.as_str()),
            creds.session_token.as_deref(),
            None,
            None,
        )
        .map_err(|e| StoreError::backend(format!("invalid S3 credentials: {e}")))?;

        let region = Region::Custom {
            region: identity.region.clone(),
            endpoint: identity.resolved_endpoint(),
        };

        let bucket = Bucket::new(&identity.bucket, region, credentials)
            .map_err(|e| StoreError::backend(format!("cannot create S3 bucket client: {e}")))?;
        let bucket = if identity.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }
}

fn request_failed(op: &str, key: &str, err: S3Error) -> StoreError {
    StoreError::backend(format!("S3 {op} `{key}` failed: {err}"))
}

fn unexpected_status(op: &str, key: &str, code: u16) -> StoreError {
    StoreError::backend(format!("S3 {op} `{key}` returned HTTP {code}"))
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

/// S3 reports RFC 3339 in listings and RFC 2822 in HEAD responses.
fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::backend(format!("unparseable timestamp `{raw}`: {e}")))
}

/// `Last-Modified` of a HEAD response; S3 always sends it.
fn head_timestamp(key: &str, raw: Option<&str>) -> StoreResult<DateTime<Utc>> {
    match raw {
        Some(raw) => parse_timestamp(raw),
        None => Err(StoreError::backend(format!(
            "S3 head `{key}` returned no Last-Modified header"
        ))),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    /// A one-key listing: fails on bad credentials, a wrong region or a
    /// missing bucket.
    async fn check_access(&self) -> StoreResult<()> {
        let (_, code) = self
            .bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .map_err(|e| request_failed("access check on", &self.bucket.name, e))?;
        if !is_success(code) {
            return Err(unexpected_status("access check on", &self.bucket.name, code));
        }
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        let head = match self.bucket.head_object(key).await {
            Ok((head, code)) if is_success(code) => head,
            Ok((_, 404)) | Err(S3Error::HttpFailWithBody(404, _)) => {
                return Err(StoreError::not_found(key));
            }
            Ok((_, code)) => return Err(unexpected_status("head", key, code)),
            Err(e) => return Err(request_failed("head", key, e)),
        };

        Ok(ObjectHead {
            last_modified: head_timestamp(key, head.last_modified.as_deref())?,
            content_length: head.content_length.unwrap_or_default().max(0) as u64,
            content_type: head.content_type,
            etag: head.e_tag,
        })
    }

    async fn list_objects(&self, params: &ListObjectsParams) -> StoreResult<ListPage> {
        let prefix = params.prefix.clone().unwrap_or_default();
        let (result, code) = self
            .bucket
            .list_page(
                prefix.clone(),
                None,
                params.continuation_token.clone(),
                None,
                Some(params.max_keys.clamp(1, MAX_PAGE_SIZE)),
            )
            .await
            .map_err(|e| request_failed("list", &prefix, e))?;
        if !is_success(code) {
            return Err(unexpected_status("list", &prefix, code));
        }

        let objects = result
            .contents
            .into_iter()
            .map(|obj| {
                Ok(ObjectSummary {
                    last_modified: parse_timestamp(&obj.last_modified)?,
                    size: obj.size as u64,
                    etag: obj.e_tag,
                    key: obj.key,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        debug!(
            "S3 list prefix={:?} returned {} keys (truncated: {})",
            prefix,
            objects.len(),
            result.is_truncated
        );

        Ok(ListPage {
            objects,
            is_truncated: result.is_truncated,
            next_continuation_token: result.next_continuation_token,
        })
    }

    /// Buffers the body and sends a single PUT.
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: ByteStream,
    ) -> StoreResult<u64> {
        let data = collect_body(body).await?;
        let response = self
            .bucket
            .put_object_with_content_type(
                key,
                &data,
                content_type.unwrap_or("application/octet-stream"),
            )
            .await
            .map_err(|e| request_failed("put", key, e))?;
        let code = response.status_code();
        if !is_success(code) {
            return Err(unexpected_status("put", key, code));
        }
        Ok(data.len() as u64)
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()> {
        // the copy source travels in a header and must be URL-encoded
        let encoded_src = urlencoding::encode(src);
        debug!("S3 CopyObject: src_key={}, dst_key={}", src, dst);
        match self.bucket.copy_object_internal(&encoded_src, dst).await {
            Ok(code) if is_success(code) => Ok(()),
            Ok(404) | Err(S3Error::HttpFailWithBody(404, _)) => Err(StoreError::not_found(src)),
            Ok(code) => Err(unexpected_status("copy", src, code)),
            Err(e) => Err(request_failed("copy", src, e)),
        }
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| request_failed("delete", key, e))?;
        let code = response.status_code();
        // S3 answers 204 whether or not the key existed
        if !is_success(code) && code != 404 {
            return Err(unexpected_status("delete", key, code));
        }
        Ok(())
    }

    /// Issued as sequential single-key deletes.
    async fn delete_objects(&self, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            self.delete_object(key).await?;
        }
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        let expiry_secs = u32::try_from(ttl.as_secs())
            .map_err(|_| StoreError::backend(format!("link lifetime {ttl:?} too long")))?;
        self.bucket
            .presign_get(key, expiry_secs, None)
            .await
            .map_err(|e| request_failed("presign", key, e))
    }
}
