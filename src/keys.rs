//! Key conventions used to emulate folders on a flat keyspace.
//!
//! All prefix and sentinel rules are kept here so the services agree on them.

/// Separator that marks a key as a folder.
pub const DELIMITER: char = '/';

/// Turn a folder name into its sentinel key by appending `/` when missing.
pub fn folder_key(name: &str) -> String {
    if name.ends_with(DELIMITER) {
        name.to_string()
    } else {
        format!("{name}{DELIMITER}")
    }
}

/// Normalize an optional listing prefix. Empty prefixes mean the bucket root.
pub fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    prefix.filter(|p| !p.is_empty()).map(folder_key)
}

/// True when the key names a folder sentinel.
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with(DELIMITER)
}

/// Rewrite the first occurrence of `from` in `key` with `to`.
pub fn rebase_key(key: &str, from: &str, to: &str) -> String {
    key.replacen(from, to, 1)
}

/// True when `candidate` lies inside (or is) the folder `folder`.
pub fn is_within(candidate: &str, folder: &str) -> bool {
    candidate.starts_with(folder)
}
