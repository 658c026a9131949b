//! Synthesizes object resources and response headers from file contents.
//!
//! No metadata is stored alongside objects. Digests, size and timestamps are
//! recomputed from the bytes and modification time every time an object is
//! described, so they always match what is on disk.

use crate::models::object::{ObjectRepresentation, ObjectResource};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{collections::BTreeMap, io, path::Path, time::SystemTime};
use tokio::fs;

/// Content type used when neither the client nor the key suggests one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters left unescaped in URL components; everything else, `/`
/// included, is percent-encoded.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Read the file at `path` and describe it as object `key` of `bucket`.
pub async fn describe_file(
    base_url: &str,
    bucket: &str,
    key: &str,
    content_type: Option<&str>,
    path: &Path,
) -> io::Result<ObjectRepresentation> {
    let modified = fs::metadata(path).await?.modified()?;
    let content = fs::read(path).await?;
    Ok(synthesize(
        base_url,
        bucket,
        key,
        content_type,
        &content,
        modified,
    ))
}

/// Build the resource and headers for an object from its bytes and mtime.
///
/// Deterministic: identical inputs always give identical output.
pub fn synthesize(
    base_url: &str,
    bucket: &str,
    key: &str,
    content_type: Option<&str>,
    content: &[u8],
    modified: SystemTime,
) -> ObjectRepresentation {
    let md5_hash = md5_base64(content);
    let crc32c = crc32c_base64(content);
    let etag = format!("\"{}\"", md5_hash);
    let size = content.len().to_string();
    let content_type = resolve_content_type(key, content_type);

    let modified_at: DateTime<Utc> = modified.into();
    let timestamp = modified_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let generation = modified_at.timestamp_micros().to_string();

    let base_url = base_url.trim_end_matches('/');
    let encoded_key = encode_key(key);
    let self_link = format!("{base_url}/storage/v1/b/{bucket}/o/{encoded_key}");
    let media_link = format!(
        "{base_url}/download/storage/v1/b/{bucket}/o/{encoded_key}?generation={generation}&alt=media"
    );

    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), content_type.clone());
    headers.insert("content-length".to_string(), size.clone());
    headers.insert("etag".to_string(), etag.clone());
    headers.insert(
        "x-goog-hash".to_string(),
        format!("crc32c={},md5={}", crc32c, md5_hash),
    );
    headers.insert("x-goog-generation".to_string(), generation.clone());
    headers.insert("x-goog-metageneration".to_string(), "1".to_string());
    headers.insert(
        "x-goog-stored-content-encoding".to_string(),
        "identity".to_string(),
    );
    headers.insert("x-goog-stored-content-length".to_string(), size.clone());
    headers.insert(
        "last-modified".to_string(),
        modified_at
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    );

    let resource = ObjectResource {
        kind: "storage#object",
        id: format!("{bucket}/{key}"),
        self_link,
        media_link,
        name: key.to_string(),
        bucket: bucket.to_string(),
        generation,
        metageneration: "1".to_string(),
        content_type,
        storage_class: "STANDARD",
        size,
        md5_hash,
        crc32c,
        etag,
        time_created: timestamp.clone(),
        updated: timestamp,
    };

    ObjectRepresentation { resource, headers }
}

/// Explicit type first, then `text/csv` for `.csv` keys, then binary.
pub fn resolve_content_type(key: &str, explicit: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|ct| !ct.is_empty()) {
        Some(ct) => ct.to_string(),
        None if key.ends_with(".csv") => "text/csv".to_string(),
        None => DEFAULT_CONTENT_TYPE.to_string(),
    }
}

/// Percent-encode an object key for use as a single URL path segment.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

pub fn md5_base64(content: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(content).0)
}

/// CRC32C (Castagnoli) of `content`, big-endian, base64-encoded.
pub fn crc32c_base64(content: &[u8]) -> String {
    general_purpose::STANDARD.encode(crc32c::crc32c(content).to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    const BASE_URL: &str = "http://localhost:4443";

    fn fixed_time() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_digests_of_known_content() {
        assert_eq!(md5_base64(b"hello"), "XUFAKrxLKna5cZ2REBfFkg==");
        assert_eq!(crc32c_base64(b"hello"), "mnG7TA==");
        assert_eq!(md5_base64(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(crc32c_base64(b""), "AAAAAA==");
    }

    #[test]
    fn test_resource_fields() {
        let rep = synthesize(BASE_URL, "docs", "a/b.txt", None, b"hello", fixed_time());
        let r = &rep.resource;
        assert_eq!(r.kind, "storage#object");
        assert_eq!(r.id, "docs/a/b.txt");
        assert_eq!(r.name, "a/b.txt");
        assert_eq!(r.bucket, "docs");
        assert_eq!(r.size, "5");
        assert_eq!(r.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(r.md5_hash, "XUFAKrxLKna5cZ2REBfFkg==");
        assert_eq!(r.crc32c, "mnG7TA==");
        assert_eq!(r.etag, "\"XUFAKrxLKna5cZ2REBfFkg==\"");
        assert_eq!(r.generation, "1700000000000000");
        assert_eq!(r.metageneration, "1");
        assert_eq!(r.time_created, "2023-11-14T22:13:20.000Z");
        assert_eq!(r.updated, r.time_created);
    }

    #[test]
    fn test_links_keep_slashes_encoded() {
        let rep = synthesize(BASE_URL, "docs", "a/b c(1).txt", None, b"", fixed_time());
        assert_eq!(
            rep.resource.self_link,
            "http://localhost:4443/storage/v1/b/docs/o/a%2Fb%20c(1).txt"
        );
        assert_eq!(
            rep.resource.media_link,
            "http://localhost:4443/download/storage/v1/b/docs/o/a%2Fb%20c(1).txt?generation=1700000000000000&alt=media"
        );
    }

    #[test]
    fn test_headers_mirror_resource() {
        let rep = synthesize(
            "http://localhost:4443/",
            "docs",
            "k",
            Some("text/plain"),
            b"hello",
            fixed_time(),
        );
        let h = &rep.headers;
        assert_eq!(h["etag"], rep.resource.etag);
        assert_eq!(h["x-goog-hash"], "crc32c=mnG7TA==,md5=XUFAKrxLKna5cZ2REBfFkg==");
        assert_eq!(h["x-goog-generation"], "1700000000000000");
        assert_eq!(h["x-goog-stored-content-encoding"], "identity");
        assert_eq!(h["last-modified"], "Tue, 14 Nov 2023 22:13:20 GMT");
        assert_eq!(h["content-type"], "text/plain");
        assert_eq!(h["content-length"], "5");
        assert!(rep.resource.self_link.starts_with("http://localhost:4443/storage"));
    }

    #[test]
    fn test_mtime_before_epoch() {
        let rep = synthesize(
            BASE_URL,
            "docs",
            "old.txt",
            None,
            b"old",
            UNIX_EPOCH - Duration::from_secs(86_400),
        );
        assert_eq!(rep.headers["last-modified"], "Wed, 31 Dec 1969 00:00:00 GMT");
        assert_eq!(rep.resource.time_created, "1969-12-31T00:00:00.000Z");
        assert_eq!(rep.resource.generation, "-86400000000");
    }

    #[test]
    fn test_content_type_resolution_order() {
        assert_eq!(resolve_content_type("x.csv", Some("text/plain")), "text/plain");
        assert_eq!(resolve_content_type("x.csv", None), "text/csv");
        assert_eq!(resolve_content_type("x.csv", Some("  ")), "text/csv");
        assert_eq!(resolve_content_type("x.txt", None), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let a = synthesize(BASE_URL, "b", "k.csv", None, b"a,b\n1,2\n", fixed_time());
        let b = synthesize(BASE_URL, "b", "k.csv", None, b"a,b\n1,2\n", fixed_time());
        assert_eq!(a, b);
        assert_eq!(a.resource.crc32c, "SZ2HxQ==");
        assert_eq!(a.resource.content_type, "text/csv");
    }
}
