//! Decoder for `multipart/related` upload bodies.
//!
//! A multipart upload carries a JSON metadata part followed by the media part.
//! Only what an upload needs is extracted: the media bytes and the content
//! type the object should be stored with.

use crate::{
    models::multipart::{DecodedUpload, MultipartPart},
    services::metadata::DEFAULT_CONTENT_TYPE,
};
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("multipart content type has no boundary parameter")]
    MissingBoundary,
    #[error("multipart body contains no boundary-delimited parts")]
    NoParts,
    #[error("multipart body contains no media part")]
    NoMediaPart,
}

/// Decode a multipart upload into its media payload and content type.
///
/// Content type precedence: the media part's own `content-type` header, then
/// a `contentType` string in the metadata part's JSON, then
/// [`DEFAULT_CONTENT_TYPE`]. A metadata part that is not valid JSON is logged
/// and otherwise ignored.
pub fn decode(body: Bytes, content_type: &str) -> Result<DecodedUpload, MultipartError> {
    let boundary = extract_boundary(content_type)?;
    let parts = split_parts(&body, &boundary)?;
    debug!(parts = parts.len(), %boundary, "decoded multipart body");

    let mut metadata: Option<&MultipartPart> = None;
    let mut media: Option<&MultipartPart> = None;
    for part in &parts {
        if part.content_type().is_some_and(is_json_media_type) {
            metadata = metadata.or(Some(part));
        } else if media.is_none() {
            media = Some(part);
        }
    }

    let media = media.or(metadata).ok_or(MultipartError::NoMediaPart)?;
    let metadata_content_type = metadata.and_then(metadata_content_type);

    let content_type = media
        .content_type()
        .map(str::to_string)
        .or(metadata_content_type)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    Ok(DecodedUpload {
        media: media.body.clone(),
        content_type,
    })
}

/// Pull the `boundary` parameter out of a content-type header value.
///
/// Both `boundary=abc` and `boundary="abc"` are accepted.
pub fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Split `body` into the parts found between `--boundary` markers.
///
/// A part runs from just after one marker to just before the next; the text
/// after the last marker (the closing `--` and any epilogue) is never a part.
pub fn split_parts(body: &Bytes, boundary: &str) -> Result<Vec<MultipartPart>, MultipartError> {
    let marker = format!("--{boundary}").into_bytes();
    let mut cursor = find(body, &marker, 0).ok_or(MultipartError::NoParts)? + marker.len();

    let mut parts = Vec::new();
    while let Some(next) = find(body, &marker, cursor) {
        let (start, end) = trim_line_terminators(body, cursor, next);
        parts.push(parse_part(body.slice(start..end)));
        cursor = next + marker.len();
    }

    if parts.is_empty() {
        return Err(MultipartError::NoParts);
    }
    Ok(parts)
}

/// Split one segment into its header block and body.
fn parse_part(segment: Bytes) -> MultipartPart {
    // A segment that opens with a blank line has no headers at all.
    for blank in [&b"\r\n"[..], &b"\n"[..]] {
        if segment.starts_with(blank) {
            return MultipartPart {
                headers: HashMap::new(),
                body: segment.slice(blank.len()..),
            };
        }
    }

    let separator = find(&segment, b"\r\n\r\n", 0)
        .map(|at| (at, 4))
        .or_else(|| find(&segment, b"\n\n", 0).map(|at| (at, 2)));

    match separator {
        Some((at, len)) => MultipartPart {
            headers: parse_headers(&segment[..at]),
            body: segment.slice(at + len..),
        },
        None => MultipartPart {
            headers: HashMap::new(),
            body: segment,
        },
    }
}

fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(block)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

fn metadata_content_type(part: &MultipartPart) -> Option<String> {
    match serde_json::from_slice::<serde_json::Value>(&part.body) {
        Ok(value) => value
            .get("contentType")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Err(err) => {
            warn!("ignoring unparsable multipart metadata: {}", err);
            None
        }
    }
}

fn is_json_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Narrow `start..end` by one leading and one trailing line terminator.
fn trim_line_terminators(body: &[u8], mut start: usize, mut end: usize) -> (usize, usize) {
    let segment = &body[start..end];
    if segment.starts_with(b"\r\n") {
        start += 2;
    } else if segment.starts_with(b"\n") {
        start += 1;
    }
    let segment = &body[start..end];
    if segment.ends_with(b"\r\n") {
        end -= 2;
    } else if segment.ends_with(b"\n") {
        end -= 1;
    }
    (start, end)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(raw: &str) -> Bytes {
        Bytes::from(raw.replace('\n', "\r\n"))
    }

    #[test]
    fn test_metadata_content_type_is_used_when_media_has_none() {
        let raw = body(
            "--xyz\n\
             Content-Type: application/json; charset=UTF-8\n\
             \n\
             {\"name\":\"a.txt\",\"contentType\":\"text/plain\"}\n\
             --xyz\n\
             \n\
             hello world\n\
             --xyz--\n",
        );
        let decoded = decode(raw, "multipart/related; boundary=xyz").unwrap();
        assert_eq!(decoded.content_type, "text/plain");
        assert_eq!(decoded.media, Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_media_content_type_wins_over_metadata() {
        let raw = body(
            "--xyz\n\
             Content-Type: application/json\n\
             \n\
             {\"contentType\":\"text/plain\"}\n\
             --xyz\n\
             Content-Type: image/png\n\
             \n\
             PNG\n\
             --xyz--\n",
        );
        let decoded = decode(raw, "multipart/related; boundary=\"xyz\"").unwrap();
        assert_eq!(decoded.content_type, "image/png");
        assert_eq!(decoded.media, Bytes::from_static(b"PNG"));
    }

    #[test]
    fn test_defaults_to_binary_without_any_content_type() {
        let raw = body(
            "--xyz\n\
             Content-Type: application/json\n\
             \n\
             {\"name\":\"blob\"}\n\
             --xyz\n\
             \n\
             data\n\
             --xyz--\n",
        );
        let decoded = decode(raw, "multipart/related; boundary=xyz").unwrap();
        assert_eq!(decoded.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_unparsable_metadata_is_ignored() {
        let raw = body(
            "--xyz\n\
             Content-Type: application/json\n\
             \n\
             {not json\n\
             --xyz\n\
             \n\
             data\n\
             --xyz--\n",
        );
        let decoded = decode(raw, "multipart/related; boundary=xyz").unwrap();
        assert_eq!(decoded.media, Bytes::from_static(b"data"));
        assert_eq!(decoded.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_metadata_only_body_falls_back_to_metadata_payload() {
        let raw = body(
            "--xyz\n\
             Content-Type: application/json\n\
             \n\
             {\"a\":1}\n\
             --xyz--\n",
        );
        let decoded = decode(raw, "multipart/related; boundary=xyz").unwrap();
        assert_eq!(decoded.media, Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(decoded.content_type, "application/json");
    }

    #[test]
    fn test_binary_payload_keeps_inner_line_breaks() {
        let mut raw = b"--b\r\nContent-Type: application/octet-stream\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0, 1, b'\r', b'\n', 2, 255]);
        raw.extend_from_slice(b"\r\n--b--\r\n");
        let decoded = decode(Bytes::from(raw), "multipart/related; boundary=b").unwrap();
        assert_eq!(&decoded.media[..], &[0, 1, b'\r', b'\n', 2, 255]);
    }

    #[test]
    fn test_bare_line_feeds_are_accepted() {
        let raw = Bytes::from_static(
            b"--xyz\nContent-Type: application/json\n\n{}\n--xyz\nContent-Type: text/csv\n\na,b\n--xyz--\n",
        );
        let decoded = decode(raw, "multipart/related; boundary=xyz").unwrap();
        assert_eq!(decoded.content_type, "text/csv");
        assert_eq!(decoded.media, Bytes::from_static(b"a,b"));
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let raw = body("--xyz\nCONTENT-TYPE:  text/html \n\n<p>\n--xyz--\n");
        let parts = split_parts(&raw, "xyz").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type(), Some("text/html"));
    }

    #[test]
    fn test_missing_boundary_parameter() {
        assert_eq!(
            decode(Bytes::from_static(b"--x\r\n\r\nhi\r\n--x--"), "multipart/related").unwrap_err(),
            MultipartError::MissingBoundary
        );
        assert_eq!(
            extract_boundary("multipart/related; boundary=\"\"").unwrap_err(),
            MultipartError::MissingBoundary
        );
    }

    #[test]
    fn test_body_without_boundary_marker_is_malformed() {
        let err = decode(
            Bytes::from_static(b"just some bytes"),
            "multipart/related; boundary=xyz",
        )
        .unwrap_err();
        assert_eq!(err, MultipartError::NoParts);
    }

    #[test]
    fn test_single_marker_yields_no_parts() {
        let err = decode(
            Bytes::from_static(b"--xyz\r\nContent-Type: text/plain\r\n\r\nhi"),
            "multipart/related; boundary=xyz",
        )
        .unwrap_err();
        assert_eq!(err, MultipartError::NoParts);
    }

    #[test]
    fn test_boundary_parameter_forms() {
        assert_eq!(
            extract_boundary("multipart/related; boundary=abc").unwrap(),
            "abc"
        );
        assert_eq!(
            extract_boundary("multipart/related; charset=utf-8; Boundary=\"a b\"").unwrap(),
            "a b"
        );
    }
}
