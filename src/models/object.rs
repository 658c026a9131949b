//! Represents an object (file) stored in a bucket.

use serde::Serialize;
use std::collections::BTreeMap;

/// JSON resource describing an object (`storage#object`).
///
/// Numeric fields (`size`, `generation`, `metageneration`) are strings, as the
/// service encodes 64-bit integers that way on the wire.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResource {
    pub kind: &'static str,

    /// `{bucket}/{key}`.
    pub id: String,

    pub self_link: String,

    pub media_link: String,

    /// Object key (path-like identifier within the bucket).
    pub name: String,

    pub bucket: String,

    /// Derived from the file's modification time, in microseconds.
    pub generation: String,

    pub metageneration: String,

    pub content_type: String,

    pub storage_class: &'static str,

    /// Size in bytes.
    pub size: String,

    /// Base64 MD5 digest of the content.
    pub md5_hash: String,

    /// Base64 big-endian CRC32C checksum of the content.
    pub crc32c: String,

    /// Quoted MD5 digest, matching the `ETag` header.
    pub etag: String,

    pub time_created: String,

    pub updated: String,
}

/// An object's resource together with the response headers that mirror it.
///
/// Recomputed from disk on every request and never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRepresentation {
    pub resource: ObjectResource,

    /// Lower-cased header names mapped to their values.
    pub headers: BTreeMap<String, String>,
}
