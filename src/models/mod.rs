//! Data model for the folder layer.
//!
//! Connectors speak in [`object::ObjectHead`] and [`listing::ListPage`];
//! the services hand callers [`metadata::ObjectMetadata`],
//! [`object::ObjectSummary`] and the move/upload reports.

pub mod bucket;
pub mod identity;
pub mod listing;
pub mod metadata;
pub mod object;
pub mod report;
