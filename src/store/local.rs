//! src/store/local.rs
//!
//! LocalStore: an S3-like bucket on local disk. Object metadata lives in
//! SQLite, payloads in files sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{digest}`, where the digest is the MD5
//! of `bucket/key`. Payload paths never derive from the key itself, so keys
//! such as `a/` (a folder sentinel) and `a/b` can coexist without touching the
//! directory layout.

use crate::{
    models::{
        bucket::Bucket,
        listing::{ListObjectsParams, ListPage, MAX_PAGE_SIZE},
        object::{ObjectHead, ObjectSummary},
    },
    store::{ByteStream, ObjectStore, StoreError, StoreResult, decode_token, encode_token},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use md5::Context;
use sqlx::{FromRow, QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite};
use std::{
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Where signed links point and the secret they are signed with.
///
/// Links have the form
/// `{base_url}/{bucket}/{key}?expires={unix_secs}&signature={hex}`, the
/// signature being `md5("{secret}|{bucket}/{key}|{expires}")`. This crate
/// only issues them; whatever serves `base_url` checks them with
/// [`LocalStore::verify_link`] and must share the secret.
#[derive(Clone)]
pub struct LinkSettings {
    pub base_url: String,
    pub secret: String,
}

impl fmt::Debug for LinkSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSettings")
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, FromRow)]
struct ObjectRow {
    key: String,
    content_type: Option<String>,
    size_bytes: i64,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectSummary {
    fn from(row: ObjectRow) -> Self {
        ObjectSummary {
            key: row.key,
            last_modified: row.last_modified,
            size: row.size_bytes.max(0) as u64,
            etag: Some(format!("\"{}\"", row.etag)),
        }
    }
}

/// A single bucket stored on local disk with a SQLite catalog.
#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,

    bucket: Bucket,
    links: LinkSettings,
}

impl LocalStore {
    /// Apply the embedded schema. Safe to run repeatedly.
    ///
    /// Returns the number of statements executed.
    pub async fn migrate(db: &SqlitePool) -> StoreResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(db).await?;
        }

        Ok(statements.len())
    }

    /// Open (registering on first use) the bucket `name` under `base_path`.
    ///
    /// Expects [`LocalStore::migrate`] to have been applied.
    pub async fn open(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        name: &str,
        region: &str,
        links: LinkSettings,
    ) -> StoreResult<Self> {
        ensure_bucket_name_safe(name)?;
        let base_path = base_path.into();

        let bucket = match fetch_bucket(&db, name).await? {
            Some(bucket) => bucket,
            None => register_bucket(&db, name, region).await?,
        };

        let store = Self {
            db,
            base_path,
            bucket,
            links,
        };
        fs::create_dir_all(store.bucket_root()).await?;
        Ok(store)
    }

    /// Directory holding this bucket's payloads.
    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket.name)
    }

    /// Payload path for a key: `bucket_root/{d0}/{d1}/{digest}`.
    ///
    /// Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", self.bucket.name, key));
        let mut path = self.bucket_root();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    /// Fetch an object row. Returns NotFound if missing.
    async fn fetch_object(&self, key: &str) -> StoreResult<ObjectRow> {
        sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(self.bucket.id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::not_found(key))
    }

    /// Insert or replace the metadata row for `key`.
    async fn upsert_object(
        &self,
        conn: &mut SqliteConnection,
        key: &str,
        content_type: Option<&str>,
        size_bytes: i64,
        etag: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.bucket.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(etag)
        .bind(Utc::now())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Stream a body into a temp file next to the payload's final location.
    /// Returns the temp path, the size and the md5 ETag.
    ///
    /// The temp file is removed on any error.
    async fn write_payload(
        &self,
        key: &str,
        mut body: ByteStream,
    ) -> StoreResult<(PathBuf, i64, String)> {
        let parent = parent_dir(&self.object_path(key))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        Ok((tmp_path, size_bytes, format!("{:x}", digest.compute())))
    }

    /// Publish a staged payload: the row is written inside a transaction and
    /// the temp file is renamed into place before that transaction commits.
    ///
    /// A failed row write leaves the previous payload and row untouched, and
    /// the temp file is removed.
    async fn commit_payload(
        &self,
        key: &str,
        tmp_path: &Path,
        content_type: Option<&str>,
        size_bytes: i64,
        etag: &str,
    ) -> StoreResult<()> {
        let result = async {
            let mut tx = self.db.begin().await?;
            self.upsert_object(&mut *tx, key, content_type, size_bytes, etag)
                .await?;
            replace_file(tmp_path, &self.object_path(key)).await?;
            tx.commit().await?;
            Ok::<(), StoreError>(())
        }
        .await;
        if result.is_err() {
            let _ = fs::remove_file(tmp_path).await;
        }
        result
    }

    /// Remove a payload file and prune the shard directories it leaves empty.
    async fn remove_payload(&self, key: &str) -> StoreResult<()> {
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }
        Ok(())
    }

    /// Recursively remove empty directories up to the bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    /// Check a link produced by [`ObjectStore::presign_get`], for the server
    /// that answers on the configured base URL.
    ///
    /// Valid when the signature matches and `expires` is still in the future.
    pub fn verify_link(&self, key: &str, expires: i64, signature: &str) -> bool {
        expires > Utc::now().timestamp()
            && sign_link(&self.links.secret, &self.bucket.name, key, expires) == signature
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    /// Runs `SELECT 1` and a write/read/delete probe in the bucket directory.
    async fn check_access(&self) -> StoreResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StoreError::backend(format!(
                "unexpected SELECT 1 result: {one}"
            )));
        }

        let probe = self.bucket_root().join(format!(".probe-{}", Uuid::new_v4()));
        let payload = b"probe";
        fs::write(&probe, payload).await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != payload {
            return Err(StoreError::backend(format!(
                "disk probe in {} read back different bytes",
                self.bucket_root().display()
            )));
        }
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        let row = self.fetch_object(key).await?;
        Ok(ObjectHead {
            last_modified: row.last_modified,
            content_length: row.size_bytes.max(0) as u64,
            content_type: row.content_type,
            etag: Some(format!("\"{}\"", row.etag)),
        })
    }

    /// ListObjectsV2-style keyset pagination over the catalog.
    ///
    /// The continuation token encodes the last key returned; the next page
    /// starts strictly after it.
    async fn list_objects(&self, params: &ListObjectsParams) -> StoreResult<ListPage> {
        let max_keys = params.max_keys.clamp(1, MAX_PAGE_SIZE);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT key, content_type, size_bytes, etag, last_modified \
             FROM objects WHERE bucket_id = ",
        );
        builder.push_bind(self.bucket.id);

        // substr instead of LIKE: keys may contain `%` or `_`
        if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.to_string());
        }

        if let Some(token) = &params.continuation_token {
            builder.push(" AND key > ");
            builder.push_bind(decode_token(token)?);
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<ObjectRow> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut page = ListPage::default();
        if rows.len() == fetch_limit {
            rows.pop();
            page.is_truncated = true;
            page.next_continuation_token = rows.last().map(|row| encode_token(&row.key));
        }
        page.objects = rows.into_iter().map(ObjectSummary::from).collect();
        Ok(page)
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: ByteStream,
    ) -> StoreResult<u64> {
        ensure_key_safe(key)?;
        let (tmp_path, size_bytes, etag) = self.write_payload(key, body).await?;
        self.commit_payload(key, &tmp_path, content_type, size_bytes, &etag)
            .await?;
        debug!("stored `{}` ({} bytes, etag {})", key, size_bytes, etag);
        Ok(size_bytes as u64)
    }

    async fn copy_object(&self, src: &str, dst: &str) -> StoreResult<()> {
        ensure_key_safe(dst)?;
        let row = self.fetch_object(src).await?;

        let parent = parent_dir(&self.object_path(dst))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = fs::copy(self.object_path(src), &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(if err.kind() == ErrorKind::NotFound {
                StoreError::not_found(src)
            } else {
                StoreError::Io(err)
            });
        }

        self.commit_payload(
            dst,
            &tmp_path,
            row.content_type.as_deref(),
            row.size_bytes,
            &row.etag,
        )
        .await?;
        debug!("copied `{}` -> `{}`", src, dst);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM objects WHERE key = ? AND bucket_id = ?")
            .bind(key)
            .bind(self.bucket.id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!("delete of missing key `{}` ignored", key);
        }
        self.remove_payload(key).await
    }

    async fn delete_objects(&self, keys: &[String]) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM objects WHERE key = ? AND bucket_id = ?")
                .bind(key)
                .bind(self.bucket.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        for key in keys {
            self.remove_payload(key).await?;
        }
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = sign_link(&self.links.secret, &self.bucket.name, key, expires);
        let encoded_key = key
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!(
            "{}/{}/{}?expires={}&signature={}",
            self.links.base_url.trim_end_matches('/'),
            self.bucket.name,
            encoded_key,
            expires,
            signature
        ))
    }
}

/// Fetch bucket metadata from SQLite by name.
async fn fetch_bucket(db: &SqlitePool, name: &str) -> StoreResult<Option<Bucket>> {
    Ok(sqlx::query_as::<_, Bucket>(
        "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(db)
    .await?)
}

/// Insert a bucket row. A concurrent insert of the same name wins and is
/// returned instead.
async fn register_bucket(db: &SqlitePool, name: &str, region: &str) -> StoreResult<Bucket> {
    let bucket = Bucket {
        id: Uuid::new_v4(),
        name: name.to_string(),
        region: region.to_lowercase(),
        created_at: Utc::now(),
    };

    match sqlx::query("INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)")
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(&bucket.region)
        .bind(bucket.created_at)
        .execute(db)
        .await
    {
        Ok(_) => {
            info!("registered local bucket `{}`", name);
            Ok(bucket)
        }
        Err(err) if is_unique_violation(&err) => fetch_bucket(db, name)
            .await?
            .ok_or_else(|| StoreError::backend(format!("bucket `{name}` vanished"))),
        Err(err) => Err(StoreError::Sqlx(err)),
    }
}

fn parent_dir(path: &Path) -> StoreResult<PathBuf> {
    path.parent().map(Path::to_path_buf).ok_or_else(|| {
        StoreError::Io(io::Error::new(
            ErrorKind::Other,
            "object path missing parent directory",
        ))
    })
}

/// Move `tmp` over `target`, cleaning up `tmp` on failure.
async fn replace_file(tmp: &Path, target: &Path) -> StoreResult<()> {
    if let Err(err) = fs::rename(tmp, target).await {
        if err.kind() == ErrorKind::AlreadyExists {
            fs::remove_file(target).await?;
            fs::rename(tmp, target).await?;
        } else {
            let _ = fs::remove_file(tmp).await;
            return Err(StoreError::Io(err));
        }
    }
    Ok(())
}

/// Reject keys S3 would reject: empty, longer than 1024 bytes, or holding
/// control characters.
fn ensure_key_safe(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN || key.chars().any(char::is_control) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
fn ensure_bucket_name_safe(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn sign_link(secret: &str, bucket: &str, key: &str, expires: i64) -> String {
    format!(
        "{:x}",
        md5::compute(format!("{secret}|{bucket}/{key}|{expires}"))
    )
}
