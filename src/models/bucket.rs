//! Represents a bucket, a top-level container backed by one directory.

use serde::Serialize;

/// JSON resource returned for bucket operations (`storage#bucket`).
///
/// Buckets carry no state beyond their directory, so every field is either
/// fixed or derived from the directory's modification time.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketDescriptor {
    pub kind: &'static str,

    /// Same as `name`; the service uses the bucket name as its identifier.
    pub id: String,

    pub name: String,

    pub self_link: String,

    /// RFC 3339 timestamp of the bucket directory's modification time.
    pub time_created: String,

    pub updated: String,

    pub location: &'static str,

    pub storage_class: &'static str,

    pub metageneration: &'static str,
}
