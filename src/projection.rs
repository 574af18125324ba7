//! Mapping of library items onto flat bucket keys
//!
//! Every photo or video is stored in the bucket under a key built from the
//! chain of folder names above it, its file name, and a short fingerprint of
//! its editable metadata:
//!
//! ```text
//! <folder>/<folder>/<stem>.<fingerprint>.<extension>
//! ```
//!
//! The fingerprint is the first 8 hex characters of the MD5 of
//! `caption|date|file_name|keywords|title`. Editing any of those fields
//! yields a new key, so the key doubles as a change detector: the old
//! object gets hidden and the new one uploaded.
//!
//! Keys already stored in existing buckets embed this fingerprint, so the
//! hash, field order, separator and truncation must never change.
//!
//! ## Examples
//!
//! ```rust
//! use photosync::projection::{project, MediaMetadata};
//!
//! let metadata = MediaMetadata {
//!     caption: "Sunset at the lake".to_string(),
//!     date: "2019-07-04T20:15:00+00:00".to_string(),
//!     file_name: "IMG_0001.JPG".to_string(),
//!     keywords: "summer; lake".to_string(),
//!     title: "Sunset".to_string(),
//! };
//!
//! let key = project("Travel/2019/", &metadata);
//! assert_eq!(key.as_str(), "Travel/2019/IMG_0001.828ec8e8.JPG");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of hex characters of the metadata digest kept in a key
pub const FINGERPRINT_LEN: usize = 8;

/// Separator between folder names in a key prefix
pub const SEPARATOR: char = '/';

/// The five metadata fields that identify a stored version of an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Free-form caption
    pub caption: String,
    /// Capture date as reported by the library
    pub date: String,
    /// Original file name, including extension
    pub file_name: String,
    /// Serialized keyword list
    pub keywords: String,
    /// Title
    pub title: String,
}

impl MediaMetadata {
    /// Fingerprint of these fields
    pub fn fingerprint(&self) -> String {
        hash_metadata(
            &self.caption,
            &self.date,
            &self.file_name,
            &self.keywords,
            &self.title,
        )
    }

    /// Attributes attached to an uploaded object
    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("caption".to_string(), self.caption.clone()),
            ("date".to_string(), self.date.clone()),
            ("file_name".to_string(), self.file_name.clone()),
            ("keywords".to_string(), self.keywords.clone()),
            ("title".to_string(), self.title.clone()),
        ])
    }
}

/// Location of an item in the bucket
///
/// Ordered lexicographically by bytes, which is the order bucket listings
/// come back in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncKey(String);

impl SyncKey {
    /// Wrap an existing key, e.g. one read back from a bucket listing
    pub fn new(key: impl Into<String>) -> Self {
        SyncKey(key.into())
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the underlying string
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this key lies under the given prefix
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SyncKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SyncKey {
    fn from(key: String) -> Self {
        SyncKey(key)
    }
}

impl From<&str> for SyncKey {
    fn from(key: &str) -> Self {
        SyncKey(key.to_string())
    }
}

/// Hash the five metadata fields into an 8-character fingerprint
pub fn hash_metadata(
    caption: &str,
    date: &str,
    file_name: &str,
    keywords: &str,
    title: &str,
) -> String {
    let joined = [caption, date, file_name, keywords, title].join("|");
    let digest = format!("{:x}", md5::compute(joined.as_bytes()));
    digest[..FINGERPRINT_LEN].to_string()
}

/// Split a file name into stem and extension at the final `.`
///
/// A name without any `.` has an empty stem and the whole name as its
/// extension.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    file_name.rsplit_once('.').unwrap_or(("", file_name))
}

/// Project an item onto its bucket key
///
/// `prefix` is the chain of ancestor folder names, each followed by `/`, or
/// empty for items directly under the root.
pub fn project(prefix: &str, metadata: &MediaMetadata) -> SyncKey {
    let (stem, extension) = split_file_name(&metadata.file_name);
    SyncKey(format!(
        "{}{}.{}.{}",
        prefix,
        stem,
        metadata.fingerprint(),
        extension
    ))
}

/// Prefix contributed by a folder for everything beneath it
pub fn child_prefix(parent_prefix: &str, name: &str) -> String {
    format!("{}{}{}", parent_prefix, name, SEPARATOR)
}
