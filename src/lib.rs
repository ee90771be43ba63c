//! Folder-aware client layer over a flat, S3-compatible object store.
//!
//! The store only knows keys. This crate layers a folder view on top of it:
//! folders are zero-byte sentinel objects whose key ends in `/`, listings are
//! paginated to completion, moves are copy-then-delete, and the destructive
//! operations refuse to drop non-empty folders or overwrite existing files.
//!
//! Multi-object operations are not atomic. A failed file move can leave both
//! keys in place and a failed folder move leaves a mixed state; both are
//! reported through [`BucketError`] together with what was already done.
//!
//! Connectors live in [`store`]: [`store::s3::S3Store`] for real buckets and
//! [`store::local::LocalStore`] for an on-disk store with SQLite metadata.
//! Unit tests run the services against an in-memory store with injected
//! faults.

pub mod errors;
pub mod keys;
pub mod models;
pub mod progress;
pub mod services;
pub mod store;
pub mod timezone;

pub use errors::{BucketError, BucketResult, ErrorKind};
pub use services::BucketService;
