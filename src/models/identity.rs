//! Bucket identity and the settings injected into connectors and services.
//!
//! Nothing here reads the environment. Callers build these values and pass
//! them in explicitly.

use crate::{models::listing::DEFAULT_PAGE_SIZE, timezone::DEFAULT_TIMEZONE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access key pair used to sign store requests.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Everything needed to address a single bucket.
///
/// Immutable once a connector has been built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketIdentity {
    /// Bucket name.
    pub bucket: String,

    /// Region, e.g. `ap-south-1`.
    pub region: String,

    /// Custom endpoint for S3-compatible services. `None` means AWS.
    pub endpoint: Option<String>,

    /// Credentials used for every request.
    pub credentials: Credentials,

    /// Address the bucket as `endpoint/bucket` instead of `bucket.endpoint`.
    pub path_style: bool,
}

impl BucketIdentity {
    /// Endpoint to talk to, falling back to the regional AWS endpoint.
    pub fn resolved_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Service-level settings.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Keys requested per listing page.
    pub page_size: usize,

    /// IANA zone used when reporting `LastModified`.
    pub timezone: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}
